//! Taleweave CLI: mix narrated story segments with background music and
//! sound effects.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use taleweave_core::assets::AssetAvailability;
use taleweave_core::types::{ChapterInput, SegmentInput};
use taleweave_core::{audio_info, mix_audio, mix_chapters, preview_mix, MixConfig, MixReport};

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "taleweave",
    about = "Emotion-aware background music and sound effect mixer for narrated stories",
    version,
)]
struct Cli {
    /// Show verbose output
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mix a list of segments into one track
    Mix(MixArgs),
    /// Mix a chapter manifest into one audiobook track
    Chapters(ChaptersArgs),
    /// Mix a single segment and keep only its start
    Preview(PreviewArgs),
    /// Report which configured assets exist on disk
    CheckAssets(CheckAssetsArgs),
    /// Print duration and format of an audio file
    Info(InfoArgs),
}

// ─── Shared arguments ────────────────────────────────────────────

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Mixer config (JSON); built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override background music gain (dB)
    #[arg(long, allow_hyphen_values = true)]
    bgm_gain: Option<f64>,

    /// Override sound effect gain (dB)
    #[arg(long, allow_hyphen_values = true)]
    sfx_gain: Option<f64>,
}

impl ConfigArgs {
    fn load(&self) -> Result<MixConfig> {
        let config = match &self.config {
            Some(path) => MixConfig::from_json_file(path)?,
            None => MixConfig::default(),
        };
        Ok(match (self.bgm_gain, self.sfx_gain) {
            (None, None) => config,
            (bgm, sfx) => {
                let bgm = bgm.unwrap_or(config.bgm_gain_db);
                let sfx = sfx.unwrap_or(config.sfx_gain_db);
                config.with_gains(bgm, sfx)
            }
        })
    }
}

// ─── Subcommand arguments ────────────────────────────────────────

#[derive(Parser, Debug)]
struct MixArgs {
    /// Segment list (JSON array of {text, emotion, sfx, audio_file})
    #[arg(long)]
    segments: PathBuf,

    /// Output WAV file
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Parser, Debug)]
struct ChaptersArgs {
    /// Chapter manifest (JSON array of {title, segments})
    #[arg(long)]
    manifest: PathBuf,

    /// Output WAV file
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Segment list (JSON array)
    #[arg(long)]
    segments: PathBuf,

    /// Which segment to preview (0-based)
    #[arg(long, default_value_t = 0)]
    index: usize,

    /// Preview length in seconds
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,

    /// Output WAV file
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Parser, Debug)]
struct CheckAssetsArgs {
    /// Mixer config (JSON); built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Audio file to inspect
    file: PathBuf,
}

// ─── Main ────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Mix(args) => run_mix(args),
        Command::Chapters(args) => run_chapters(args),
        Command::Preview(args) => run_preview(args),
        Command::CheckAssets(args) => run_check_assets(args),
        Command::Info(args) => run_info(args),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Read a JSON file into `T`.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve relative narration paths against the directory of the JSON file.
fn anchor_audio_paths(segments: &mut [SegmentInput], base: &Path) {
    let base = base.parent().unwrap_or_else(|| Path::new("."));
    for seg in segments {
        if let Some(p) = &seg.audio_file {
            if p.is_relative() {
                seg.audio_file = Some(base.join(p));
            }
        }
    }
}

fn load_segments(path: &Path) -> Result<Vec<SegmentInput>> {
    let mut segments: Vec<SegmentInput> = read_json(path)?;
    anchor_audio_paths(&mut segments, path);
    Ok(segments)
}

fn print_report(report: &MixReport) {
    println!("Output: {}", report.track.path.display());
    println!(
        "Duration: {:.2}s ({} frames), {} bytes",
        report.track.duration_s, report.track.frames, report.track.bytes
    );
    println!("SHA-256: {}", report.track.sha256);
    if !report.degradations.is_empty() {
        println!("Degradations ({}):", report.degradations.len());
        for d in &report.degradations {
            println!("  - {}", d);
        }
    }
}

// ─── Runners ─────────────────────────────────────────────────────

fn run_mix(args: MixArgs) -> Result<()> {
    let config = args.config.load()?;
    let segments = load_segments(&args.segments)?;
    let report = mix_audio(&segments, &args.output, &config)?;
    print_report(&report);
    Ok(())
}

fn run_chapters(args: ChaptersArgs) -> Result<()> {
    let config = args.config.load()?;
    let mut chapters: Vec<ChapterInput> = read_json(&args.manifest)?;
    for chapter in &mut chapters {
        anchor_audio_paths(&mut chapter.segments, &args.manifest);
    }
    let report = mix_chapters(&chapters, &args.output, &config)?;
    println!("Chapters: {}", chapters.len());
    print_report(&report);
    Ok(())
}

fn run_preview(args: PreviewArgs) -> Result<()> {
    let config = args.config.load()?;
    let segments = load_segments(&args.segments)?;
    let Some(segment) = segments.get(args.index) else {
        bail!(
            "Segment index {} out of range ({} segments in {})",
            args.index,
            segments.len(),
            args.segments.display()
        );
    };
    let report = preview_mix(segment, &args.output, args.seconds, &config)?;
    print_report(&report);
    Ok(())
}

fn run_check_assets(args: CheckAssetsArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => MixConfig::from_json_file(path)?,
        None => MixConfig::default(),
    };
    let availability = AssetAvailability::probe(&config);

    println!("Asset root: {}", config.asset_root.display());
    for asset in &availability.assets {
        println!(
            "  [{}] {:<10} {:<10} {}",
            if asset.present { "ok" } else { "--" },
            asset.kind,
            asset.key,
            asset.path.display()
        );
    }
    println!(
        "Background directory {}: {} audio file(s)",
        config.bgm_dir_path().display(),
        availability.background_dir_files
    );

    let missing = availability.missing().count();
    if availability.any_available() {
        println!("{} of {} mapped assets missing", missing, availability.assets.len());
    } else {
        println!("No assets found; mixes will use silent background and effects");
    }
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<()> {
    let info = audio_info(&args.file)?;
    println!("File: {}", info.path.display());
    println!("Duration: {} ({:.3}s)", info.timecode(), info.duration_s);
    println!("Sample rate: {} Hz", info.sample_rate);
    println!("Channels: {}", info.channels);
    println!("Size: {} bytes", info.file_size);
    Ok(())
}

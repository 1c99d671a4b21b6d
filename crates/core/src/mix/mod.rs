//! Timeline planning, rendering and export.

pub mod export;
pub mod plan;
pub mod render;
pub mod timeline;

pub use export::{MixedTrack, TrackEncoder, WavEncoder};
pub use plan::{BackgroundFallback, BackgroundLayer, Degradation, MixPlan, PlannedSegment, SfxCue, SkipReason, SkippedCue};
pub use render::{AudioMixer, RenderedTrack};
pub use timeline::TimelineBuilder;

//! Low-level audio: file decoding/encoding and sample operations.

pub mod effects;
pub mod io;

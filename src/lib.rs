//! Replays CSV sensor logs as a paced stream of timestamped readings.
//!
//! A [`playback::PlaybackEngine`] finds a source file, decodes it in chunks,
//! stamps every row and hands the resulting payloads to an
//! [`sink::IngestSink`] at the configured sample rate. [`playback::PollSession`]
//! offers the same pipeline as a synchronous pull.

pub mod config;
pub mod core;
pub mod driver;
pub mod error;
pub mod input;
pub mod playback;
pub mod sink;

pub use config::{PlaybackConfig, RawConfig};
pub use error::{ConfigError, DecodeError, PlaybackError};

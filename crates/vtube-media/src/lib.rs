//! Media inspection for uploaded files.
//!
//! Wraps the `ffprobe` CLI to read container metadata such as duration.

pub mod error;
pub mod probe;

pub use error::{MediaError, MediaResult};
pub use probe::{probe_duration, probe_media, MediaInfo};

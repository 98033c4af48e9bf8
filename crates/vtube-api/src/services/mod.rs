//! Background services.

pub mod stale_video_detector;

pub use stale_video_detector::StaleVideoDetector;

//! Frame acquisition for the stream pipeline.
//!
//! Devices are opened once at startup and then polled on demand through the
//! [`FrameSource`] trait. [`SharedSource`] serialises access when several
//! stream sessions pull from the same camera.

pub mod camera;
pub mod ffmpeg;
pub mod source;
pub mod types;

#[cfg(feature = "with-opencv")]
pub use camera::OpenCvSource;
pub use camera::parse_device_index;
pub use ffmpeg::{FfmpegSource, RawFrameReader};
pub use source::{FrameSource, SharedSource};
pub use types::{CaptureError, CaptureSettings, Frame, FrameFormat, frame_len};

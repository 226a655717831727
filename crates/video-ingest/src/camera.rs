//! OpenCV-backed camera capture (enabled with the `with-opencv` feature).

#[cfg(feature = "with-opencv")]
pub use opencv_source::OpenCvSource;

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return (index >= 0).then_some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = stripped.parse::<i32>() {
                return Some(index);
            }
        }
    }
    None
}

#[cfg(feature = "with-opencv")]
mod opencv_source {
    use opencv::{
        core::{self, MatTraitConstManual},
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait},
    };
    use tracing::{info, warn};

    use super::parse_device_index;
    use crate::{
        source::FrameSource,
        types::{CaptureError, CaptureSettings, Frame},
    };

    /// Pull-based `VideoCapture` wrapper. Each `acquire` grabs exactly one frame.
    pub struct OpenCvSource {
        settings: CaptureSettings,
        cap: VideoCapture,
        frame: Mat,
        scratch: Mat,
    }

    impl OpenCvSource {
        pub fn open(settings: CaptureSettings) -> Result<Self, CaptureError> {
            let mut cap = open_video_capture(&settings.uri)?;
            configure_camera(&mut cap, &settings);
            info!(
                "OpenCV capture opened: {} at {}x{} @ {} fps",
                settings.uri, settings.width, settings.height, settings.framerate
            );
            Ok(Self {
                settings,
                cap,
                frame: Mat::default(),
                scratch: Mat::default(),
            })
        }

        fn reopen_if_closed(&mut self) -> Result<(), CaptureError> {
            if self.cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                return Ok(());
            }
            warn!("capture device {} closed; reopening", self.settings.uri);
            self.cap = open_video_capture(&self.settings.uri)?;
            configure_camera(&mut self.cap, &self.settings);
            Ok(())
        }
    }

    impl FrameSource for OpenCvSource {
        fn acquire(&mut self) -> Result<Frame, CaptureError> {
            self.reopen_if_closed()?;

            let grabbed = self
                .cap
                .read(&mut self.frame)
                .map_err(|e| CaptureError::Other(e.into()))?;
            let size = self.frame.size().map_err(|e| CaptureError::Other(e.into()))?;
            if !grabbed || size.width <= 0 || size.height <= 0 {
                return Err(CaptureError::Unavailable(format!(
                    "{} returned an empty frame",
                    self.settings.uri
                )));
            }

            let target_w = self.settings.width as i32;
            let target_h = self.settings.height as i32;
            let working = if size.width != target_w || size.height != target_h {
                opencv::imgproc::resize(
                    &self.frame,
                    &mut self.scratch,
                    core::Size {
                        width: target_w,
                        height: target_h,
                    },
                    0.0,
                    0.0,
                    opencv::imgproc::INTER_LINEAR,
                )
                .map_err(|e| CaptureError::Other(e.into()))?;
                &self.scratch
            } else {
                &self.frame
            };

            let data = working
                .data_bytes()
                .map_err(|e| CaptureError::Other(e.into()))?
                .to_vec();

            Frame::from_bgr(data, self.settings.width, self.settings.height)
        }

        fn describe(&self) -> String {
            format!(
                "opencv:{} {}x{}@{}",
                self.settings.uri,
                self.settings.width,
                self.settings.height,
                self.settings.framerate
            )
        }
    }

    /// Attempt to open a camera input either by index or URI.
    fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
        if let Some(index) = parse_device_index(uri) {
            for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
                match VideoCapture::new(index, backend) {
                    Ok(cap) => {
                        if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                            return Ok(cap);
                        }
                    }
                    Err(err) => {
                        warn!("failed to open device #{index} with backend {backend}: {err}");
                    }
                }
            }
        }

        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::from_file(uri, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open {uri} with backend {backend}: {err}");
                }
            }
        }

        Err(CaptureError::Open {
            uri: uri.to_string(),
        })
    }

    /// Apply resolution, frame rate and a one-frame driver buffer.
    fn configure_camera(cap: &mut VideoCapture, settings: &CaptureSettings) {
        let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, settings.width as f64);
        let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, settings.height as f64);
        let _ = cap.set(videoio::CAP_PROP_FPS, settings.framerate as f64);
        // A single-slot buffer keeps each read from returning a queued, stale frame.
        let _ = cap.set(videoio::CAP_PROP_BUFFERSIZE, 1.0);
    }
}

use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Raw BGR frame captured from a video source.
///
/// A frame is owned by the pipeline iteration that acquired it. Its
/// dimensions are fixed at construction and never change afterwards.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// Wrap a packed BGR buffer, rejecting buffers whose length does not match
    /// the declared dimensions.
    pub fn from_bgr(data: Vec<u8>, width: u32, height: u32) -> Result<Self, CaptureError> {
        let expected = frame_len(width, height, FrameFormat::Bgr8);
        if width == 0 || height == 0 || data.len() != expected {
            return Err(CaptureError::Malformed {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        })
    }

    /// Solid-colour frame, mostly useful for tests and placeholder output.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(frame_len(width, height, FrameFormat::Bgr8));
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&bgr);
        }
        Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    /// BGR triple at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }
}

/// Number of bytes a packed frame of the given size occupies.
pub fn frame_len(width: u32, height: u32, format: FrameFormat) -> usize {
    width as usize * height as usize * format.bytes_per_pixel()
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    Malformed { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] Error),
}

/// Fixed capture configuration applied once when a device is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Device index (`0`), device node (`/dev/video0`) or any URI FFmpeg/OpenCV can open.
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl CaptureSettings {
    pub fn frame_len(&self) -> usize {
        frame_len(self.width, self.height, FrameFormat::Bgr8)
    }
}

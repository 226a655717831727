use tracing::debug;
use video_ingest::{Frame, FrameFormat};

use crate::detection::{Detection, Region, Symbology};

/// Finds machine-readable codes in a frame.
///
/// Detection reads the pixels only. Finding nothing is a normal outcome and
/// yields an empty vector; the order of results carries no meaning.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Vec<Detection>;
}

/// QR code detector backed by `rqrr`.
#[derive(Clone, Debug, Default)]
pub struct QrDetector;

impl QrDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for QrDetector {
    fn detect(&self, frame: &Frame) -> Vec<Detection> {
        let width = frame.width as usize;
        let height = frame.height as usize;
        let expected = width * height * frame.format.bytes_per_pixel();
        if width == 0 || height == 0 || frame.data.len() < expected {
            debug!(
                "skipping detection on short frame ({} of {} bytes)",
                frame.data.len(),
                expected
            );
            return Vec::new();
        }

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
            luma_at(frame, x, y, width)
        });

        let mut detections = Vec::new();
        for grid in prepared.detect_grids() {
            let mut payload = Vec::new();
            match grid.decode_to(&mut payload) {
                Ok(_meta) => {
                    let region = Region::bounding(grid.bounds.iter().map(|p| (p.x, p.y)));
                    debug!(bytes = payload.len(), "decoded QR grid at {:?}", region);
                    detections.push(Detection::new(payload, Symbology::qr_code(), region));
                }
                Err(err) => {
                    debug!("QR grid failed to decode: {err}");
                }
            }
        }
        detections
    }
}

/// BT.601 luma of the pixel at `(x, y)`.
fn luma_at(frame: &Frame, x: usize, y: usize, width: usize) -> u8 {
    let idx = (y * width + x) * 3;
    let px = &frame.data[idx..idx + 3];
    let (b, g, r) = match frame.format {
        FrameFormat::Bgr8 => (px[0] as u32, px[1] as u32, px[2] as u32),
    };
    ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8
}

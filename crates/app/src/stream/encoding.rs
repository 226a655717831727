//! JPEG encoding of annotated frames.

use actix_web::web::Bytes;
use image::{ImageError, RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;
use video_ingest::Frame;

/// One compressed still image ready to be framed for the client.
#[derive(Clone, Debug)]
pub(crate) struct EncodedFrame {
    pub(crate) jpeg: Bytes,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) timestamp_ms: i64,
}

#[derive(Debug, Error)]
pub(crate) enum EncodeError {
    #[error("frame buffer holds {actual} bytes, {width}x{height} BGR needs {expected}")]
    BufferMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("JPEG encode failed: {0}")]
    Codec(#[from] ImageError),
}

/// Fixed-quality JPEG encoder.
#[derive(Clone, Copy, Debug)]
pub(crate) struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub(crate) fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub(crate) fn quality(&self) -> u8 {
        self.quality
    }

    pub(crate) fn encode(&self, frame: &Frame) -> Result<EncodedFrame, EncodeError> {
        let expected = video_ingest::frame_len(frame.width, frame.height, frame.format);
        if frame.data.len() != expected {
            return Err(EncodeError::BufferMismatch {
                width: frame.width,
                height: frame.height,
                expected,
                actual: frame.data.len(),
            });
        }

        let rgb = RgbImage::from_raw(frame.width, frame.height, bgr_to_rgb(&frame.data)).ok_or(
            EncodeError::BufferMismatch {
                width: frame.width,
                height: frame.height,
                expected,
                actual: frame.data.len(),
            },
        )?;

        let mut buffer = Vec::with_capacity(expected / 8);
        JpegEncoder::new_with_quality(&mut buffer, self.quality).encode_image(&rgb)?;

        Ok(EncodedFrame {
            jpeg: Bytes::from(buffer),
            width: frame.width,
            height: frame.height,
            timestamp_ms: frame.timestamp_ms,
        })
    }
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}

#[cfg(test)]
mod tests {
    use image::ImageFormat;

    use super::*;

    fn decode(jpeg: &[u8]) -> RgbImage {
        image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8()
    }

    #[test]
    fn output_decodes_to_original_dimensions() {
        let frame = Frame::filled(640, 480, [40, 80, 120]);
        let encoded = JpegFrameEncoder::new(90).encode(&frame).unwrap();
        assert_eq!(&encoded.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!((encoded.width, encoded.height), (640, 480));
        assert_eq!(encoded.timestamp_ms, frame.timestamp_ms);

        let decoded = decode(&encoded.jpeg);
        assert_eq!(decoded.dimensions(), (640, 480));
    }

    #[test]
    fn channel_order_is_converted() {
        // Pure red in BGR order.
        let frame = Frame::filled(32, 32, [0, 0, 255]);
        let encoded = JpegFrameEncoder::new(95).encode(&frame).unwrap();
        let px = decode(&encoded.jpeg).get_pixel(16, 16).0;
        assert!(px[0] > 200 && px[1] < 60 && px[2] < 60, "{px:?}");
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut frame = Frame::filled(64, 48, [10, 20, 30]);
        for (i, byte) in frame.data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let encoder = JpegFrameEncoder::new(75);
        let a = encoder.encode(&frame).unwrap();
        let b = encoder.encode(&frame).unwrap();
        assert_eq!(a.jpeg, b.jpeg);
    }

    #[test]
    fn mismatched_buffer_is_an_encode_error() {
        let mut frame = Frame::filled(8, 8, [0, 0, 0]);
        frame.data.pop();
        assert!(matches!(
            JpegFrameEncoder::new(90).encode(&frame),
            Err(EncodeError::BufferMismatch { expected: 192, actual: 191, .. })
        ));
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(JpegFrameEncoder::new(0).quality(), 1);
        assert_eq!(JpegFrameEncoder::new(255).quality(), 100);
    }
}

//! Stream sessions: one publishing loop per connected client.
//!
//! A session is `Open` until its first iteration, `Publishing` while frames
//! flow, and `Closed` once the client is gone or the camera fails. Encode
//! failures drop a single frame and the loop carries on.

use actix_web::web::Bytes;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use video_ingest::CaptureError;

use crate::stream::pipeline::{FramePipeline, PipelineError};

pub(crate) const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n\r\n";

/// The client side of the connection stopped accepting data.
#[derive(Debug, Error)]
#[error("client transport closed")]
pub(crate) struct TransportWriteError;

/// Destination for multipart parts, usually the HTTP response body.
pub(crate) trait PartSink {
    /// Blocks until the part is accepted or the client is gone.
    fn write_part(&mut self, part: Bytes) -> Result<(), TransportWriteError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionState {
    Open,
    Publishing,
    Closed,
}

#[derive(Debug)]
pub(crate) enum SessionEnd {
    ClientGone,
    AcquisitionFailed(CaptureError),
}

/// Wrap one JPEG in its multipart boundary frame.
pub(crate) fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    payload.extend_from_slice(PART_HEADER);
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(PART_TRAILER);
    Bytes::from(payload)
}

pub(crate) struct StreamSession {
    id: u64,
    state: SessionState,
    frames_sent: u64,
    frames_skipped: u64,
}

impl StreamSession {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            state: SessionState::Open,
            frames_sent: 0,
            frames_skipped: 0,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub(crate) fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Publish frames until the client disconnects or acquisition fails.
    ///
    /// There is no frame limit or timeout; those two conditions are the only exits.
    pub(crate) fn run<S: PartSink>(
        &mut self,
        pipeline: &FramePipeline,
        sink: &mut S,
    ) -> SessionEnd {
        let session_span = tracing::info_span!("stream.session", id = self.id);
        let _session_guard = session_span.enter();
        info!("stream session opened");

        let end = loop {
            self.state = SessionState::Publishing;
            let frame_span = tracing::info_span!("frame", seq = self.frames_sent + 1);
            let _frame_guard = frame_span.enter();

            let encoded = match pipeline.next_frame() {
                Ok(encoded) => encoded,
                Err(PipelineError::Encode(err)) => {
                    self.frames_skipped += 1;
                    warn!("skipping frame: {err}");
                    continue;
                }
                Err(PipelineError::Acquisition(err)) => {
                    error!("ending session: {err}");
                    break SessionEnd::AcquisitionFailed(err);
                }
            };

            debug!(
                bytes = encoded.jpeg.len(),
                width = encoded.width,
                height = encoded.height,
                captured_at = encoded.timestamp_ms,
                "publishing frame"
            );
            if sink.write_part(multipart_part(&encoded.jpeg)).is_err() {
                debug!("client disconnected");
                break SessionEnd::ClientGone;
            }
            self.frames_sent += 1;
        };

        self.state = SessionState::Closed;
        end
    }
}

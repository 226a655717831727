//! Pull-based frame acquisition shared by every stream session.

use std::sync::{Mutex, PoisonError};

use tracing::{trace, warn};

use crate::types::{CaptureError, Frame};

/// A capture device that yields one frame per call, blocking until it is ready.
///
/// Implementations are configured once (resolution, frame rate) when they are
/// constructed and must not carry partial data from one frame into the next.
pub trait FrameSource: Send {
    fn acquire(&mut self) -> Result<Frame, CaptureError>;

    /// Human-readable device description for logs.
    fn describe(&self) -> String;
}

/// Exclusive access to a single capture device.
///
/// Every session calls [`SharedSource::acquire`] independently; the lock
/// serialises them so the device buffer is only ever read by one caller.
pub struct SharedSource {
    inner: Mutex<Box<dyn FrameSource>>,
    label: String,
}

impl SharedSource {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        let label = source.describe();
        Self {
            inner: Mutex::new(source),
            label,
        }
    }

    pub fn acquire(&self) -> Result<Frame, CaptureError> {
        // A backend that panicked mid-acquire must not lock out later sessions.
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| {
            warn!(source = %self.label, "previous capture panicked; reusing device");
            self.inner.clear_poison();
            PoisonError::into_inner(poisoned)
        });
        let frame = guard.acquire()?;
        trace!(
            source = %self.label,
            width = frame.width,
            height = frame.height,
            "acquired frame"
        );
        Ok(frame)
    }

    pub fn describe(&self) -> &str {
        &self.label
    }
}

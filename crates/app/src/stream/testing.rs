//! Fakes shared by the stream tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use code_detect::{Detection, Detector};
use video_ingest::{CaptureError, Frame, FrameSource, SharedSource};

use crate::stream::{encoding::JpegFrameEncoder, pipeline::FramePipeline};

/// Replays queued frames, then reports the device as unavailable.
pub(crate) struct ScriptedSource {
    frames: VecDeque<Frame>,
    repeat: Option<Frame>,
    pub(crate) calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub(crate) fn frames(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            repeat: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Yields `frame` forever.
    pub(crate) fn endless(frame: Frame) -> Self {
        Self {
            frames: VecDeque::new(),
            repeat: Some(frame),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }
        match &self.repeat {
            Some(frame) => Ok(frame.clone()),
            None => Err(CaptureError::Unavailable("script exhausted".into())),
        }
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}

/// Returns the same detections for every frame.
pub(crate) struct FixedDetector(Vec<Detection>);

impl FixedDetector {
    pub(crate) fn new(detections: Vec<Detection>) -> Self {
        Self(detections)
    }

    pub(crate) fn empty() -> Self {
        Self(Vec::new())
    }
}

impl Detector for FixedDetector {
    fn detect(&self, _frame: &Frame) -> Vec<Detection> {
        self.0.clone()
    }
}

pub(crate) fn pipeline_with(source: ScriptedSource, detector: FixedDetector) -> FramePipeline {
    FramePipeline::new(
        Arc::new(SharedSource::new(Box::new(source))),
        Arc::new(detector),
        JpegFrameEncoder::new(90),
    )
}

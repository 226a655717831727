//! Per-frame pipeline (acquire, detect, annotate, encode) and process bootstrap.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use code_detect::{Detection, Detector, QrDetector};
use thiserror::Error;
use tracing::{debug, info};
use video_ingest::{CaptureError, FfmpegSource, FrameSource, SharedSource};

use crate::stream::{
    StreamConfig,
    annotation::{LabelKind, annotate},
    config::CaptureBackend,
    encoding::{EncodeError, EncodedFrame, JpegFrameEncoder},
    server, telemetry,
};

#[derive(Debug, Error)]
pub(crate) enum PipelineError {
    /// The camera could not produce a frame; ends the session.
    #[error("frame acquisition failed: {0}")]
    Acquisition(#[from] CaptureError),
    /// The codec rejected a frame; only that frame is lost.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Stateless frame producer shared by every stream session.
pub(crate) struct FramePipeline {
    source: Arc<SharedSource>,
    detector: Arc<dyn Detector>,
    encoder: JpegFrameEncoder,
}

impl FramePipeline {
    pub(crate) fn new(
        source: Arc<SharedSource>,
        detector: Arc<dyn Detector>,
        encoder: JpegFrameEncoder,
    ) -> Self {
        Self {
            source,
            detector,
            encoder,
        }
    }

    /// Run one iteration and return the encoded, annotated frame.
    pub(crate) fn next_frame(&self) -> Result<EncodedFrame, PipelineError> {
        let mut frame = tracing::info_span!("capture.acquire").in_scope(|| self.source.acquire())?;

        let detections =
            tracing::info_span!("detect.frame").in_scope(|| self.detector.detect(&frame));
        log_detections(&detections);

        let plan = tracing::info_span!("annotate.frame", detections = detections.len())
            .in_scope(|| annotate(&mut frame, &detections));
        if let Some(counter) = plan.labels(LabelKind::Count).next() {
            debug!(boxes = plan.rect_count(), "{counter}");
        }

        let encoded = tracing::info_span!("encode.jpeg", quality = self.encoder.quality())
            .in_scope(|| self.encoder.encode(&frame))?;
        Ok(encoded)
    }
}

fn log_detections(detections: &[Detection]) {
    for detection in detections {
        let timestamp = Local::now().format("%H:%M:%S%.6f");
        info!(
            "{timestamp} type={} data={}",
            detection.symbology,
            detection.payload_text()
        );
    }
}

/// Open the camera, build the pipeline and serve `/stream` until the server exits.
pub fn run(config: StreamConfig) -> Result<()> {
    let _telemetry_guard = telemetry::init(&config.telemetry);
    let run_span = tracing::info_span!(
        "codecam",
        source = %config.capture.uri,
        width = config.capture.width,
        height = config.capture.height,
        framerate = config.capture.framerate,
        backend = ?config.backend,
        codec = "mjpeg"
    );
    let _run_guard = run_span.enter();

    let source = open_source(&config).context("Failed to open capture device")?;
    let source = Arc::new(SharedSource::new(source));
    info!("Capture device ready: {}", source.describe());

    let pipeline = Arc::new(FramePipeline::new(
        source,
        Arc::new(QrDetector::new()),
        JpegFrameEncoder::new(config.jpeg_quality),
    ));

    info!(
        "Annotated stream available at http://{}:{}/stream",
        config.bind_host, config.port
    );
    server::serve(pipeline, &config)
}

fn open_source(config: &StreamConfig) -> Result<Box<dyn FrameSource>> {
    match config.backend {
        CaptureBackend::Ffmpeg => Ok(Box::new(FfmpegSource::open(config.capture.clone())?)),
        #[cfg(feature = "with-opencv")]
        CaptureBackend::Opencv => Ok(Box::new(video_ingest::OpenCvSource::open(
            config.capture.clone(),
        )?)),
        #[cfg(not(feature = "with-opencv"))]
        CaptureBackend::Opencv => {
            anyhow::bail!("OpenCV capture requires the `with-opencv` feature")
        }
    }
}

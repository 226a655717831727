//! Configuration parsing for the stream server.
//!
//! CLI arguments are validated once into a `StreamConfig`; nothing is
//! reconfigured after startup.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use video_ingest::CaptureSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
/// Capture implementation used to read the camera.
pub enum CaptureBackend {
    /// `ffmpeg` child process emitting raw BGR frames.
    Ffmpeg,
    /// OpenCV `VideoCapture` (requires the `with-opencv` feature).
    Opencv,
}

#[derive(Clone, Debug)]
/// Canonical configuration shared by the pipeline and the HTTP server.
pub struct StreamConfig {
    /// Device, resolution and frame rate applied when the camera is opened.
    pub capture: CaptureSettings,
    pub backend: CaptureBackend,
    /// JPEG quality used by the encoder.
    pub jpeg_quality: u8,
    pub bind_host: String,
    pub port: u16,
    /// Actix worker count; `None` keeps the actix default.
    pub workers: Option<usize>,
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
}

/// CLI arguments accepted by the `stream` subcommand.
#[derive(Debug, Args)]
pub struct StreamCliArgs {
    /// Camera device index, `/dev/videoN` node or any URI the backend can open.
    #[arg(long = "source", value_name = "URI", default_value = "/dev/video0")]
    pub source: String,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX", default_value_t = 640)]
    pub width: u32,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX", default_value_t = 480)]
    pub height: u32,
    /// Target capture frame rate.
    #[arg(long = "framerate", value_name = "FPS", default_value_t = 32)]
    pub framerate: u32,
    /// JPEG quality used by the encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 90)]
    pub jpeg_quality: i32,
    /// Interface to listen on.
    #[arg(long = "bind", value_name = "HOST", default_value = "0.0.0.0")]
    pub bind: String,
    /// Port to listen on.
    #[arg(long = "port", value_name = "PORT", default_value_t = 5000)]
    pub port: u16,
    /// Capture backend.
    #[arg(long = "backend", value_enum, default_value_t = CaptureBackend::Ffmpeg)]
    pub backend: CaptureBackend,
    /// Number of HTTP worker threads.
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

impl TryFrom<StreamCliArgs> for StreamConfig {
    type Error = anyhow::Error;

    fn try_from(args: StreamCliArgs) -> Result<Self> {
        if args.source.trim().is_empty() {
            bail!("--source must not be empty");
        }
        if args.width == 0 || args.height == 0 {
            bail!("Capture width and height must be positive integers");
        }
        if args.framerate == 0 {
            bail!("--framerate must be at least 1");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.workers == Some(0) {
            bail!("--workers must be at least 1");
        }
        if args.backend == CaptureBackend::Opencv && !cfg!(feature = "with-opencv") {
            bail!("--backend opencv requires a build with the `with-opencv` feature");
        }

        Ok(Self {
            capture: CaptureSettings {
                uri: args.source,
                width: args.width,
                height: args.height,
                framerate: args.framerate,
            },
            backend: args.backend,
            jpeg_quality: args.jpeg_quality as u8,
            bind_host: args.bind,
            port: args.port,
            workers: args.workers,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

//! Live camera stream with QR code annotations.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `pipeline`: The acquire → detect → annotate → encode iteration and process bootstrap.
//! - `annotation`: Box, label and counter overlays drawn in place.
//! - `glyphs`: Bitmap font backing the overlay labels.
//! - `encoding`: JPEG encoding of annotated frames.
//! - `session`: Per-client publishing loop and multipart framing.
//! - `server`: Actix Web `/stream` endpoint.
//! - `telemetry`: Tracing subscriber setup.

/// Re-export stream settings so callers can configure runs without reaching
/// into submodules.
pub use config::{StreamCliArgs, StreamConfig};
/// Launch the stream server with a ready-made configuration.
pub use pipeline::run;

mod annotation;
mod config;
mod encoding;
mod glyphs;
mod pipeline;
mod server;
mod session;
mod telemetry;
#[cfg(test)]
mod testing;

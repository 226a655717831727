//! Code detection for captured frames.

pub mod detection;
pub mod detector;

pub use detection::{Detection, Region, Symbology};
pub use detector::{Detector, QrDetector};

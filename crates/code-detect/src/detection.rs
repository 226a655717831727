use std::fmt;

/// Axis-aligned bounding box in frame pixels, origin at the top-left corner.
///
/// Nothing guarantees the box lies inside the frame; consumers clamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Smallest region containing every point. Empty input gives a zero region.
    pub fn bounding(points: impl IntoIterator<Item = (i32, i32)>) -> Self {
        let mut iter = points.into_iter();
        let Some((x0, y0)) = iter.next() else {
            return Self::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for (x, y) in iter {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn right(&self) -> i32 {
        self.left.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.top.saturating_add(self.height)
    }
}

/// Barcode family tag reported alongside each payload (e.g. `QRCODE`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbology(String);

impl Symbology {
    pub const QRCODE: &'static str = "QRCODE";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn qr_code() -> Self {
        Self::new(Self::QRCODE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded code found in a frame.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Detection {
    pub payload: Vec<u8>,
    pub symbology: Symbology,
    pub region: Region,
}

impl Detection {
    pub fn new(payload: impl Into<Vec<u8>>, symbology: Symbology, region: Region) -> Self {
        Self {
            payload: payload.into(),
            symbology,
            region,
        }
    }

    /// Printable rendering of the payload: lossy UTF-8 with control characters
    /// replaced by `?`.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload)
            .chars()
            .map(|c| if c.is_control() { '?' } else { c })
            .collect()
    }
}

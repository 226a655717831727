//! Overlay drawing: bounding boxes, decoded-text labels and the detection counter.
//!
//! Annotation is split into planning (no side effects) and rendering
//! (mutates the frame in place). Regions are used as-is in frame pixels;
//! every pixel write is clamped to the frame so boxes that spill past the
//! edge are cut off rather than rejected.

use code_detect::Detection;
use image::{ImageBuffer, Rgb};
use tracing::warn;
use video_ingest::Frame;

use crate::stream::glyphs::{GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH, glyph};

/// Frame buffers are packed B, G, R; colours below use the same order.
type BgrCanvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

pub(crate) const BOX_COLOR: Rgb<u8> = Rgb([122, 197, 197]);
pub(crate) const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub(crate) const BOX_THICKNESS: i32 = 4;
pub(crate) const TEXT_SCALE: i32 = 2;
/// Detection labels sit this far below the region's top edge.
pub(crate) const LABEL_OFFSET_Y: i32 = 50;
/// Baseline of the counter label.
pub(crate) const COUNT_LABEL_Y: i32 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Overlay {
    Rect {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },
    /// Text whose bottom-left corner is at `(x, y)`.
    Label {
        x: i32,
        y: i32,
        text: String,
        kind: LabelKind,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LabelKind {
    Detection,
    Count,
}

/// Everything drawn onto one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct AnnotationPlan {
    pub(crate) overlays: Vec<Overlay>,
}

impl AnnotationPlan {
    pub(crate) fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub(crate) fn rect_count(&self) -> usize {
        self.overlays
            .iter()
            .filter(|o| matches!(o, Overlay::Rect { .. }))
            .count()
    }

    pub(crate) fn labels(&self, wanted: LabelKind) -> impl Iterator<Item = &str> {
        self.overlays.iter().filter_map(move |o| match o {
            Overlay::Label { text, kind, .. } if *kind == wanted => Some(text.as_str()),
            _ => None,
        })
    }
}

pub(crate) fn count_label(count: usize) -> String {
    format!("Detected QR codes: {count}")
}

pub(crate) fn detection_label(detection: &Detection) -> String {
    format!("{}: {}", detection.symbology, detection.payload_text())
}

/// Work out the overlays for a frame `frame_width` pixels wide.
pub(crate) fn plan_overlays(frame_width: u32, detections: &[Detection]) -> AnnotationPlan {
    let mut overlays = Vec::with_capacity(detections.len() * 2 + 1);

    for detection in detections {
        let region = detection.region;
        overlays.push(Overlay::Rect {
            left: region.left,
            top: region.top,
            right: region.right(),
            bottom: region.bottom(),
        });
    }

    for detection in detections {
        overlays.push(Overlay::Label {
            x: detection.region.left,
            y: detection.region.top.saturating_add(LABEL_OFFSET_Y),
            text: detection_label(detection),
            kind: LabelKind::Detection,
        });
    }

    if !detections.is_empty() {
        overlays.push(Overlay::Label {
            x: (frame_width / 2) as i32,
            y: COUNT_LABEL_Y,
            text: count_label(detections.len()),
            kind: LabelKind::Count,
        });
    }

    AnnotationPlan { overlays }
}

/// Draw `plan` onto the frame's pixel buffer.
pub(crate) fn render(frame: &mut Frame, plan: &AnnotationPlan) {
    if plan.is_empty() {
        return;
    }
    let (width, height) = (frame.width, frame.height);
    let Some(mut canvas) = BgrCanvas::from_raw(width, height, frame.data.as_mut_slice()) else {
        warn!("frame buffer too small for {width}x{height}; skipping annotation");
        return;
    };

    for overlay in &plan.overlays {
        match overlay {
            Overlay::Rect {
                left,
                top,
                right,
                bottom,
            } => draw_rectangle(&mut canvas, *left, *top, *right, *bottom, BOX_COLOR),
            Overlay::Label { x, y, text, .. } => {
                draw_label(&mut canvas, *x, *y, text, TEXT_SCALE, TEXT_COLOR)
            }
        }
    }
}

/// Plan and render in one step. Returns what was drawn.
pub(crate) fn annotate(frame: &mut Frame, detections: &[Detection]) -> AnnotationPlan {
    let plan = plan_overlays(frame.width, detections);
    render(frame, &plan);
    plan
}

/// Unfilled rectangle with its stroke centred on the given edges.
fn draw_rectangle(
    canvas: &mut BgrCanvas<'_>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    let (left, right) = (left.min(right), left.max(right));
    let (top, bottom) = (top.min(bottom), top.max(bottom));
    let inner = BOX_THICKNESS / 2;
    let outer = BOX_THICKNESS - inner - 1;

    let expand = |v: i32| v.saturating_sub(inner);
    let shrink = |v: i32| v.saturating_add(outer);

    fill_rect(canvas, expand(left), expand(top), shrink(right), shrink(top), color);
    fill_rect(canvas, expand(left), expand(bottom), shrink(right), shrink(bottom), color);
    fill_rect(canvas, expand(left), expand(top), shrink(left), shrink(bottom), color);
    fill_rect(canvas, expand(right), expand(top), shrink(right), shrink(bottom), color);
}

/// Fill the inclusive box `[left, right] x [top, bottom]`, clipped to the canvas.
fn fill_rect(
    canvas: &mut BgrCanvas<'_>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    let width = canvas.width() as i32;
    let height = canvas.height() as i32;
    if right < 0 || bottom < 0 || left >= width || top >= height || left > right || top > bottom {
        return;
    }
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(width - 1);
    let bottom = bottom.min(height - 1);

    for y in top..=bottom {
        for x in left..=right {
            canvas.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_label(
    canvas: &mut BgrCanvas<'_>,
    mut x: i32,
    baseline: i32,
    text: &str,
    scale: i32,
    color: Rgb<u8>,
) {
    let top = baseline.saturating_sub(GLYPH_HEIGHT * scale);
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if x >= canvas.width() as i32 {
            break;
        }
        for (row, pattern) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                    let px = x.saturating_add(col * scale);
                    let py = top.saturating_add(row as i32 * scale);
                    fill_rect(
                        canvas,
                        px,
                        py,
                        px.saturating_add(scale - 1),
                        py.saturating_add(scale - 1),
                        color,
                    );
                }
            }
        }
        x = x.saturating_add(GLYPH_ADVANCE * scale);
    }
}

#[cfg(test)]
mod tests {
    use code_detect::{Region, Symbology};

    use super::*;

    const WHITE: [u8; 3] = [255, 255, 255];

    fn qr(payload: &str, region: Region) -> Detection {
        Detection::new(payload.as_bytes(), Symbology::qr_code(), region)
    }

    fn changed_pixels(before: &Frame, after: &Frame) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for y in 0..before.height {
            for x in 0..before.width {
                if before.pixel(x, y) != after.pixel(x, y) {
                    out.push((x, y));
                }
            }
        }
        out
    }

    #[test]
    fn no_detections_leaves_frame_untouched() {
        let mut frame = Frame::filled(64, 48, WHITE);
        let before = frame.clone();
        let plan = annotate(&mut frame, &[]);
        assert!(plan.is_empty());
        assert_eq!(plan.labels(LabelKind::Count).count(), 0);
        assert_eq!(frame.data, before.data);
    }

    #[test]
    fn single_code_draws_box_label_and_counter() {
        let mut frame = Frame::filled(640, 480, WHITE);
        let detections = [qr("HELLO", Region::new(10, 10, 50, 50))];

        let plan = annotate(&mut frame, &detections);

        assert_eq!(plan.rect_count(), 1);
        assert!(plan.overlays.contains(&Overlay::Rect {
            left: 10,
            top: 10,
            right: 60,
            bottom: 60
        }));
        let labels: Vec<_> = plan.labels(LabelKind::Detection).collect();
        assert_eq!(labels.len(), 1);
        assert!(labels[0].contains("QRCODE") && labels[0].contains("HELLO"));
        let counts: Vec<_> = plan.labels(LabelKind::Count).collect();
        assert_eq!(counts, vec!["Detected QR codes: 1"]);

        let box_bgr = BOX_COLOR.0;
        assert_eq!(frame.pixel(10, 10), Some(box_bgr));
        assert_eq!(frame.pixel(35, 10), Some(box_bgr));
        assert_eq!(frame.pixel(60, 35), Some(box_bgr));
        assert_eq!(frame.pixel(35, 60), Some(box_bgr));
        assert_eq!(frame.pixel(35, 30), Some(WHITE));
    }

    #[test]
    fn n_detections_give_n_boxes_and_one_counter() {
        let mut frame = Frame::filled(320, 240, WHITE);
        let detections = [
            qr("A", Region::new(5, 5, 20, 20)),
            qr("B", Region::new(100, 40, 30, 30)),
            qr("C", Region::new(104, 44, 30, 30)),
        ];
        let plan = annotate(&mut frame, &detections);
        assert_eq!(plan.rect_count(), 3);
        assert_eq!(plan.labels(LabelKind::Detection).count(), 3);
        assert_eq!(
            plan.labels(LabelKind::Count).collect::<Vec<_>>(),
            vec!["Detected QR codes: 3"]
        );
    }

    #[test]
    fn counter_is_drawn_at_fixed_position() {
        let mut frame = Frame::filled(640, 480, WHITE);
        let before = frame.clone();
        // Far from the counter so only the counter touches the top band.
        let detections = [qr("X", Region::new(20, 300, 40, 40))];
        annotate(&mut frame, &detections);

        let counter_top = COUNT_LABEL_Y - GLYPH_HEIGHT * TEXT_SCALE;
        let in_counter: Vec<_> = changed_pixels(&before, &frame)
            .into_iter()
            .filter(|&(_, y)| (y as i32) < COUNT_LABEL_Y && (y as i32) >= counter_top)
            .collect();
        assert!(!in_counter.is_empty());
        assert!(in_counter.iter().all(|&(x, _)| x >= 320));
        assert_eq!(frame.pixel(320 + 1, (counter_top + 1) as u32), Some(TEXT_COLOR.0));
    }

    #[test]
    fn out_of_bounds_regions_are_clipped() {
        let mut frame = Frame::filled(64, 48, WHITE);
        let detections = [
            qr("EDGE", Region::new(50, 40, 100, 100)),
            qr("GONE", Region::new(-500, -500, 10, 10)),
            qr("HUGE", Region::new(i32::MAX - 5, i32::MAX - 5, 100, 100)),
            qr("NEG", Region::new(30, 30, -20, -20)),
        ];
        let plan = annotate(&mut frame, &detections);

        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(frame.data.len(), 64 * 48 * 3);
        assert_eq!(plan.rect_count(), 4);
        assert_eq!(frame.pixel(50, 42), Some(BOX_COLOR.0));
        assert_eq!(frame.pixel(63, 39), Some(BOX_COLOR.0));
    }

    #[test]
    fn label_text_uses_symbology_and_printable_payload() {
        let det = Detection::new(
            b"line\nbreak".to_vec(),
            Symbology::qr_code(),
            Region::default(),
        );
        assert_eq!(detection_label(&det), "QRCODE: line?break");
    }
}

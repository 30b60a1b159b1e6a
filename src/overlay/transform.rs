/// Native-to-display letterbox transform.
///
/// Detection boxes are authored in the video's intrinsic pixel space. The
/// player scales the picture "contain"-style: uniformly, until one axis fills
/// the rendered rectangle, centered on the other axis. Boxes have to follow
/// the same mapping to line up with the picture.
use crate::overlay::types::{DetectionRecord, Rect, VideoMetrics};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f64,
    pub actual_width: f64,
    pub actual_height: f64,
    pub x_offset: f64,
    pub y_offset: f64,
    native_width: f64,
    native_height: f64,
}

impl LetterboxTransform {
    /// Returns `None` when any dimension is zero or non-finite, i.e. the video
    /// has not loaded its metadata yet or is hidden.
    pub fn compute(metrics: &VideoMetrics) -> Option<Self> {
        let display_w = metrics.rendered.width;
        let display_h = metrics.rendered.height;
        let native_w = metrics.native_width;
        let native_h = metrics.native_height;

        let usable = |v: f64| v.is_finite() && v > 0.0;
        if !(usable(display_w) && usable(display_h) && usable(native_w) && usable(native_h)) {
            return None;
        }

        let scale = (display_w / native_w).min(display_h / native_h);
        let actual_width = native_w * scale;
        let actual_height = native_h * scale;

        Some(Self {
            scale,
            actual_width,
            actual_height,
            x_offset: (display_w - actual_width) / 2.0,
            y_offset: (display_h - actual_height) / 2.0,
            native_width: native_w,
            native_height: native_h,
        })
    }

    /// Map a native-space `[x_min, y_min, x_max, y_max]` box into overlay space.
    pub fn project(&self, bbox: &[f64; 4]) -> Rect {
        let [x0, y0, x1, y1] = *bbox;
        let x = self.x_offset + (x0 / self.native_width) * self.actual_width;
        let y = self.y_offset + (y0 / self.native_height) * self.actual_height;
        let width = ((x1 - x0) / self.native_width) * self.actual_width;
        let height = ((y1 - y0) / self.native_height) * self.actual_height;

        Rect {
            x: finite_or_zero(x),
            y: finite_or_zero(y),
            width: finite_or_zero(width).max(0.0),
            height: finite_or_zero(height).max(0.0),
        }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Stroke opacity for a detection: confidence lifted by `floor`, capped at 1.
pub fn box_opacity(confidence: f64, floor: f64) -> f64 {
    if !confidence.is_finite() {
        return floor;
    }
    (confidence + floor).min(1.0).max(floor)
}

/// `"{class} {id} ({pct}%)"`, with a non-finite confidence shown as 0%.
pub fn label_text(record: &DetectionRecord) -> String {
    let pct = if record.confidence.is_finite() {
        (record.confidence * 100.0).round()
    } else {
        0.0
    };
    format!("{} {} ({}%)", record.class, record.id, pct as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(dw: f64, dh: f64, nw: f64, nh: f64) -> VideoMetrics {
        VideoMetrics {
            rendered: Rect::new(0.0, 0.0, dw, dh),
            native_width: nw,
            native_height: nh,
        }
    }

    fn record(confidence: f64, bbox: [f64; 4]) -> DetectionRecord {
        DetectionRecord {
            frame: Some(3),
            id: "1".into(),
            class: "car".into(),
            confidence,
            bbox,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.05
    }

    #[test]
    fn full_hd_into_four_by_three_letterboxes_vertically() {
        let t = LetterboxTransform::compute(&metrics(800.0, 600.0, 1920.0, 1080.0)).unwrap();
        assert!((t.scale - 800.0 / 1920.0).abs() < 1e-9);
        assert!(close(t.actual_width, 800.0));
        assert!(close(t.actual_height, 450.0));
        assert!(close(t.x_offset, 0.0));
        assert!(close(t.y_offset, 75.0));
    }

    #[test]
    fn car_box_lands_inside_the_picture() {
        let t = LetterboxTransform::compute(&metrics(800.0, 600.0, 1920.0, 1080.0)).unwrap();
        let r = t.project(&[100.0, 100.0, 300.0, 200.0]);
        assert!(close(r.x, 41.7));
        assert!(close(r.y, 75.0 + 41.7));
        assert!(close(r.width, 83.3));
        assert!(close(r.height, 41.7));
        assert_eq!(box_opacity(0.9, 0.3), 1.0);
    }

    #[test]
    fn aspect_fit_never_overflows_and_fills_one_axis() {
        let natives = [
            (1920.0, 1080.0),
            (640.0, 480.0),
            (1080.0, 1920.0),
            (333.0, 777.0),
            (1.0, 1.0),
        ];
        let displays = [
            (800.0, 600.0),
            (1280.0, 720.0),
            (300.0, 900.0),
            (1.0, 1000.0),
            (517.0, 517.0),
        ];
        for &(nw, nh) in &natives {
            for &(dw, dh) in &displays {
                let t = LetterboxTransform::compute(&metrics(dw, dh, nw, nh)).unwrap();
                assert!(t.actual_width <= dw + 1e-9, "{nw}x{nh} in {dw}x{dh}");
                assert!(t.actual_height <= dh + 1e-9, "{nw}x{nh} in {dw}x{dh}");
                let fills_w = (t.actual_width - dw).abs() < 1e-9;
                let fills_h = (t.actual_height - dh).abs() < 1e-9;
                assert!(fills_w || fills_h, "{nw}x{nh} in {dw}x{dh}");
                assert!(t.x_offset >= -1e-9 && t.y_offset >= -1e-9);
            }
        }
    }

    #[test]
    fn unloaded_or_hidden_video_has_no_transform() {
        assert!(LetterboxTransform::compute(&metrics(800.0, 600.0, 0.0, 1080.0)).is_none());
        assert!(LetterboxTransform::compute(&metrics(800.0, 600.0, 1920.0, 0.0)).is_none());
        assert!(LetterboxTransform::compute(&metrics(0.0, 600.0, 1920.0, 1080.0)).is_none());
        assert!(LetterboxTransform::compute(&metrics(800.0, 0.0, 1920.0, 1080.0)).is_none());
        assert!(LetterboxTransform::compute(&metrics(f64::NAN, 600.0, 1920.0, 1080.0)).is_none());
    }

    #[test]
    fn non_finite_bbox_components_clamp_to_zero() {
        let t = LetterboxTransform::compute(&metrics(800.0, 600.0, 1920.0, 1080.0)).unwrap();
        let r = t.project(&[f64::NAN, f64::INFINITY, 300.0, f64::NAN]);
        assert_eq!(r.x, 0.0);
        assert_eq!(r.y, 0.0);
        assert_eq!(r.width, 0.0);
        assert_eq!(r.height, 0.0);
        for v in [r.x, r.y, r.width, r.height] {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn inverted_box_collapses_to_zero_extent() {
        let t = LetterboxTransform::compute(&metrics(800.0, 600.0, 1920.0, 1080.0)).unwrap();
        let r = t.project(&[300.0, 200.0, 100.0, 100.0]);
        assert_eq!(r.width, 0.0);
        assert_eq!(r.height, 0.0);
        assert!(r.x > 0.0);
    }

    #[test]
    fn opacity_stays_within_floor_and_one() {
        for step in 0..=100 {
            let c = step as f64 / 100.0;
            let o = box_opacity(c, 0.3);
            assert!((0.3..=1.0).contains(&o), "confidence {c} gave {o}");
        }
        assert_eq!(box_opacity(0.0, 0.3), 0.3);
        assert_eq!(box_opacity(f64::NAN, 0.3), 0.3);
        assert_eq!(box_opacity(-4.0, 0.3), 0.3);
    }

    #[test]
    fn label_rounds_confidence_to_percent() {
        assert_eq!(label_text(&record(0.876, [0.0; 4])), "car 1 (88%)");
        assert_eq!(label_text(&record(f64::NAN, [0.0; 4])), "car 1 (0%)");
    }
}

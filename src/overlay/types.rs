use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One detected class instance on a single video frame.
///
/// Decoding is lenient per field: a record is never rejected because one of
/// its fields is missing or has the wrong type. Numeric fields that cannot be
/// read become NaN and are clamped when drawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// `None` when the document has no usable integer frame; such a record
    /// never matches any frame.
    #[serde(default, deserialize_with = "lenient_frame")]
    pub frame: Option<u64>,
    /// Key of the drawn primitive, unique within a frame.
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub class: String,
    #[serde(default = "nan", deserialize_with = "lenient_number")]
    pub confidence: f64,
    /// `[x_min, y_min, x_max, y_max]` in native video pixels.
    #[serde(default = "nan_bbox", deserialize_with = "lenient_bbox")]
    pub bbox: [f64; 4],
}

impl DetectionRecord {
    pub fn is_on_frame(&self, frame: u64) -> bool {
        self.frame == Some(frame)
    }
}

/// Axis-aligned rectangle in overlay (display) units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// Geometry of a video element as measured by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoMetrics {
    /// Rendered rectangle relative to the containing element.
    pub rendered: Rect,
    /// Intrinsic pixel size; zero while the video has not loaded.
    pub native_width: f64,
    pub native_height: f64,
}

fn nan() -> f64 {
    f64::NAN
}

fn nan_bbox() -> [f64; 4] {
    [f64::NAN; 4]
}

fn number_of(value: &Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

fn lenient_frame<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Some(n) = value.as_u64() {
        return Ok(Some(n));
    }
    // Producers occasionally write frames as floats (`3.0`).
    Ok(value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
        .map(|f| f as u64))
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => number_key(&n),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// `1` and `1.0` name the same detection.
fn number_key(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        // Below 2^53 every integral f64 converts to i64 exactly.
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string).unwrap_or_default())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_of(&value))
}

fn lenient_bbox<'de, D>(deserializer: D) -> Result<[f64; 4], D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let mut bbox = nan_bbox();
    if let Some(items) = value.as_array() {
        for (slot, item) in bbox.iter_mut().zip(items.iter()) {
            *slot = number_of(item);
        }
    }
    Ok(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_record_decodes() {
        let rec: DetectionRecord = serde_json::from_str(
            r#"{"frame":3,"id":7,"class":"car","confidence":0.9,"bbox":[100,100,300,200]}"#,
        )
        .unwrap();
        assert_eq!(rec.frame, Some(3));
        assert_eq!(rec.id, "7");
        assert_eq!(rec.class, "car");
        assert_eq!(rec.confidence, 0.9);
        assert_eq!(rec.bbox, [100.0, 100.0, 300.0, 200.0]);
        assert!(rec.is_on_frame(3));
        assert!(!rec.is_on_frame(4));
    }

    #[test]
    fn malformed_fields_degrade_per_field() {
        let rec: DetectionRecord = serde_json::from_str(
            r#"{"frame":"x","id":"a-1","class":5,"confidence":"high","bbox":[10,"y",null]}"#,
        )
        .unwrap();
        assert_eq!(rec.frame, None);
        assert_eq!(rec.id, "a-1");
        assert_eq!(rec.class, "");
        assert!(rec.confidence.is_nan());
        assert_eq!(rec.bbox[0], 10.0);
        assert!(rec.bbox[1].is_nan());
        assert!(rec.bbox[2].is_nan());
        assert!(rec.bbox[3].is_nan());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let rec: DetectionRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(rec.frame, None);
        assert_eq!(rec.id, "");
        assert!(rec.confidence.is_nan());
        assert!(rec.bbox.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn integral_float_frame_is_accepted() {
        let rec: DetectionRecord = serde_json::from_str(r#"{"frame":12.0}"#).unwrap();
        assert_eq!(rec.frame, Some(12));
        let rec: DetectionRecord = serde_json::from_str(r#"{"frame":12.5}"#).unwrap();
        assert_eq!(rec.frame, None);
        let rec: DetectionRecord = serde_json::from_str(r#"{"frame":-1}"#).unwrap();
        assert_eq!(rec.frame, None);
    }

    #[test]
    fn integral_float_id_matches_integer_id() {
        let key = |doc: &str| serde_json::from_str::<DetectionRecord>(doc).unwrap().id;
        assert_eq!(key(r#"{"id":1}"#), "1");
        assert_eq!(key(r#"{"id":1.0}"#), "1");
        assert_eq!(key(r#"{"id":-3.0}"#), "-3");
        assert_eq!(key(r#"{"id":1.5}"#), "1.5");
        assert_eq!(key(r#"{"id":"1.0"}"#), "1.0");
    }
}

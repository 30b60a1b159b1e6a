/// Retained overlay surface.
///
/// The surface mirrors what a host draws over the video: a legend group and a
/// box layer holding one rectangle + label per detection id. Redraws are
/// applied as keyed updates so a host can patch its own drawing incrementally
/// instead of rebuilding it.
use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::overlay::legend::LegendEntry;
use crate::overlay::types::Rect;

/// Desired state of one box for the frame being drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpec {
    pub key: String,
    pub class: String,
    pub rect: Rect,
    pub stroke: String,
    pub opacity: f64,
    pub label: LabelPrimitive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPrimitive {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub fill: String,
}

/// A box that lives on the surface. `node_id` is assigned once, when the key
/// first appears, and survives every redraw that keeps the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxPrimitive {
    pub node_id: u64,
    #[serde(flatten)]
    pub spec: BoxSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDiff {
    pub added: Vec<BoxPrimitive>,
    pub updated: Vec<BoxPrimitive>,
    pub removed: Vec<String>,
    pub unchanged: usize,
}

impl SceneDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceStyle {
    pub stroke_width: f64,
    pub font_size: f64,
}

#[derive(Debug, Clone)]
pub struct OverlaySurface {
    id: Uuid,
    container_id: String,
    rect: Rect,
    style: SurfaceStyle,
    legend: Vec<LegendEntry>,
    boxes: Vec<BoxPrimitive>,
    next_node_id: u64,
}

impl OverlaySurface {
    /// New surface covering `rect`, with an empty box layer.
    pub fn new(
        container_id: &str,
        rect: Rect,
        style: SurfaceStyle,
        legend: Vec<LegendEntry>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            container_id: container_id.to_string(),
            rect,
            style,
            legend,
            boxes: Vec::new(),
            next_node_id: 1,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn legend(&self) -> &[LegendEntry] {
        &self.legend
    }

    pub fn boxes(&self) -> &[BoxPrimitive] {
        &self.boxes
    }

    pub fn get(&self, key: &str) -> Option<&BoxPrimitive> {
        self.boxes.iter().find(|b| b.spec.key == key)
    }

    /// Reposition/resize to a new video rectangle. Returns whether it moved.
    pub fn move_to(&mut self, rect: Rect) -> bool {
        if self.rect == rect {
            return false;
        }
        self.rect = rect;
        true
    }

    /// Keyed update of the box layer.
    ///
    /// Persisting keys are patched in place, vanished keys are dropped and new
    /// keys are appended after the survivors. When `specs` repeats a key the
    /// last occurrence wins.
    pub fn apply(&mut self, specs: Vec<BoxSpec>) -> SceneDiff {
        let mut order: Vec<String> = Vec::with_capacity(specs.len());
        let mut wanted: HashMap<String, BoxSpec> = HashMap::with_capacity(specs.len());
        for spec in specs {
            if !wanted.contains_key(&spec.key) {
                order.push(spec.key.clone());
            }
            wanted.insert(spec.key.clone(), spec);
        }

        let mut diff = SceneDiff::default();
        let mut kept = Vec::with_capacity(order.len());

        for mut prim in std::mem::take(&mut self.boxes) {
            match wanted.remove(&prim.spec.key) {
                Some(spec) if spec == prim.spec => {
                    diff.unchanged += 1;
                    kept.push(prim);
                }
                Some(spec) => {
                    prim.spec = spec;
                    diff.updated.push(prim.clone());
                    kept.push(prim);
                }
                None => diff.removed.push(prim.spec.key),
            }
        }

        for key in order {
            if let Some(spec) = wanted.remove(&key) {
                let prim = BoxPrimitive {
                    node_id: self.next_node_id,
                    spec,
                };
                self.next_node_id += 1;
                diff.added.push(prim.clone());
                kept.push(prim);
            }
        }

        self.boxes = kept;
        diff
    }

    /// Standalone SVG document for the surface's current contents.
    pub fn to_svg(&self) -> String {
        let Rect { x, y, width, height } = self.rect;
        let mut out = String::new();
        let _ = writeln!(
            out,
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" class="bbox-overlay" "#,
                r#"data-surface="{}" width="{}" height="{}" viewBox="0 0 {} {}" "#,
                r#"style="position:absolute;left:{}px;top:{}px;pointer-events:none">"#,
            ),
            self.id,
            num(width),
            num(height),
            num(width),
            num(height),
            num(x),
            num(y),
        );

        out.push_str("  <g class=\"legend\">\n");
        for entry in &self.legend {
            let color = escape(&entry.color);
            let _ = writeln!(
                out,
                r#"    <rect x="{}" y="{}" width="{}" height="{}" fill="{color}"/>"#,
                num(entry.swatch.x),
                num(entry.swatch.y),
                num(entry.swatch.width),
                num(entry.swatch.height),
            );
            let _ = writeln!(
                out,
                r#"    <text x="{}" y="{}" fill="{color}" font-size="{}">{}</text>"#,
                num(entry.text_x),
                num(entry.text_y),
                num(self.style.font_size),
                escape(&entry.class),
            );
        }
        out.push_str("  </g>\n");

        out.push_str("  <g class=\"boxes\">\n");
        for prim in &self.boxes {
            let spec = &prim.spec;
            let key = escape(&spec.key);
            let _ = writeln!(
                out,
                concat!(
                    r#"    <rect data-id="{key}" x="{}" y="{}" width="{}" height="{}" "#,
                    r#"fill="none" stroke="{}" stroke-width="{}" opacity="{}"/>"#,
                ),
                num(spec.rect.x),
                num(spec.rect.y),
                num(spec.rect.width),
                num(spec.rect.height),
                escape(&spec.stroke),
                num(self.style.stroke_width),
                num(spec.opacity),
                key = key,
            );
            let _ = writeln!(
                out,
                r#"    <text data-id="{key}" x="{}" y="{}" fill="{}" font-size="{}">{}</text>"#,
                num(spec.label.x),
                num(spec.label.y),
                escape(&spec.label.fill),
                num(self.style.font_size),
                escape(&spec.label.text),
            );
        }
        out.push_str("  </g>\n</svg>\n");
        out
    }
}

fn num(v: f64) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

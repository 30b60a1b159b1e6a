use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::LegendConfig;
use crate::overlay::types::Rect;

/// One legend row: a colored swatch followed by the class label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub class: String,
    pub color: String,
    pub swatch: Rect,
    /// Baseline anchor of the label text.
    pub text_x: f64,
    pub text_y: f64,
}

/// Stack one entry per mapped class vertically, starting at the legend origin.
pub fn build_legend(classes: &BTreeMap<String, String>, layout: &LegendConfig) -> Vec<LegendEntry> {
    classes
        .iter()
        .enumerate()
        .map(|(row, (class, color))| {
            let top = layout.y + row as f64 * layout.row_height;
            LegendEntry {
                class: class.clone(),
                color: color.clone(),
                swatch: Rect::new(layout.x, top, layout.swatch_size, layout.swatch_size),
                text_x: layout.x + layout.swatch_size + 6.0,
                // vertically centre the text on the swatch
                text_y: top + layout.swatch_size * 0.85,
            }
        })
        .collect()
}

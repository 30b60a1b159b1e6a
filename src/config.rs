use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{OverlayError, OverlayResult};

const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV: &str = "OVERLAY_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub data: DataConfig,
    /// Class label → CSS color. Legend entries follow the map's (sorted) order.
    #[serde(default)]
    pub classes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Stroke/fill used when a record's class has no entry in `[classes]`.
    #[serde(default = "default_fallback_color")]
    pub fallback_color: String,
    /// Distance the label baseline sits above the box's top edge.
    #[serde(default = "default_label_offset")]
    pub label_offset: f64,
    /// Minimum opacity a box is drawn with, added to its confidence.
    #[serde(default = "default_opacity_floor")]
    pub opacity_floor: f64,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    #[serde(default)]
    pub legend: LegendConfig,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            fallback_color: default_fallback_color(),
            label_offset: default_label_offset(),
            opacity_floor: default_opacity_floor(),
            stroke_width: default_stroke_width(),
            font_size: default_font_size(),
            legend: LegendConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegendConfig {
    #[serde(default = "default_legend_origin")]
    pub x: f64,
    #[serde(default = "default_legend_origin")]
    pub y: f64,
    #[serde(default = "default_row_height")]
    pub row_height: f64,
    #[serde(default = "default_swatch_size")]
    pub swatch_size: f64,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self {
            x: default_legend_origin(),
            y: default_legend_origin(),
            row_height: default_row_height(),
            swatch_size: default_swatch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Detection document loaded once the engine starts, if set.
    #[serde(default)]
    pub default_source: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            default_source: None,
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_fallback_color() -> String {
    "#ffffff".to_string()
}

fn default_label_offset() -> f64 {
    5.0
}

fn default_opacity_floor() -> f64 {
    0.3
}

fn default_stroke_width() -> f64 {
    2.0
}

fn default_font_size() -> f64 {
    12.0
}

fn default_legend_origin() -> f64 {
    10.0
}

fn default_row_height() -> f64 {
    20.0
}

fn default_swatch_size() -> f64 {
    12.0
}

fn default_http_timeout() -> u64 {
    30
}

fn resolve_config_path() -> OverlayResult<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config path taken from {CONFIG_ENV}");
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_ENV} points at a missing file");
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("detection-overlay").join(CONFIG_FILE);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(OverlayError::Config(
        "config.toml not found via OVERLAY_CONFIG, next to executable, \
         in working directory or user config dir"
            .into(),
    ))
}

pub fn parse_config(content: &str) -> OverlayResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if !(0.0..=1.0).contains(&config.overlay.opacity_floor) {
        return Err(OverlayError::Config(format!(
            "overlay.opacity_floor must lie in [0, 1], got {}",
            config.overlay.opacity_floor
        )));
    }
    Ok(config)
}

pub fn load_config_from(path: &Path) -> OverlayResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), classes = config.classes.len(), "config loaded");
    Ok(config)
}

pub fn load_config() -> OverlayResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

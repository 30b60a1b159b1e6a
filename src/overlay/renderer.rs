use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AppConfig, OverlayConfig};
use crate::errors::{OverlayError, OverlayResult};
use crate::overlay::legend::build_legend;
use crate::overlay::loader;
use crate::overlay::scene::{BoxSpec, LabelPrimitive, OverlaySurface, SceneDiff, SurfaceStyle};
use crate::overlay::traits::{DataSource, GeometryObserver, VideoContainer, VideoElement};
use crate::overlay::transform::{box_opacity, label_text, LetterboxTransform};
use crate::overlay::types::{DetectionRecord, Rect};

/// Handle for an in-flight data load. Only the most recently issued ticket
/// can still change the renderer's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub seq: u64,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Applied { records: usize },
    Failed { error: String },
    /// A newer load was issued while this one was in flight.
    Stale,
}

/// Result of a geometry change: where the surface moved (if it did) and the
/// redraw that followed.
#[derive(Debug, Clone, Default)]
pub struct GeometryUpdate {
    pub moved_to: Option<Rect>,
    pub diff: Option<SceneDiff>,
}

/// Draws per-frame detection boxes over one video container.
pub struct OverlayRenderer {
    classes: BTreeMap<String, String>,
    style: OverlayConfig,
    source: Arc<dyn DataSource>,
    observer: Option<GeometryObserver>,

    records: Vec<DetectionRecord>,
    surface: Option<OverlaySurface>,
    video: Option<Arc<dyn VideoElement>>,
    active_frame: u64,
    load_seq: u64,
}

impl OverlayRenderer {
    pub fn new(config: &AppConfig, source: Arc<dyn DataSource>) -> Self {
        Self {
            classes: config.classes.clone(),
            style: config.overlay.clone(),
            source,
            observer: None,
            records: Vec::new(),
            surface: None,
            video: None,
            active_frame: 0,
            load_seq: 0,
        }
    }

    /// Observer handed to every video element this renderer initializes on.
    pub fn with_geometry_observer(mut self, observer: GeometryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn surface(&self) -> Option<&OverlaySurface> {
        self.surface.as_ref()
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    pub fn active_frame(&self) -> u64 {
        self.active_frame
    }

    pub fn source(&self) -> Arc<dyn DataSource> {
        self.source.clone()
    }

    // ── Initialize ──────────────────────────────────────────────────────────

    /// Replace any existing surface with a fresh one covering the container's
    /// video. On failure no surface is left behind.
    pub fn initialize(&mut self, container: &dyn VideoContainer) -> OverlayResult<&OverlaySurface> {
        self.teardown();

        let video = container.video().ok_or_else(|| {
            OverlayError::Surface(format!("container '{}' has no video element", container.id()))
        })?;
        let metrics = video.measure()?;

        let legend = build_legend(&self.classes, &self.style.legend);
        let style = SurfaceStyle {
            stroke_width: self.style.stroke_width,
            font_size: self.style.font_size,
        };
        let surface = OverlaySurface::new(container.id(), metrics.rendered, style, legend);

        if let Some(observer) = &self.observer {
            video.observe_geometry(observer.clone());
        }

        tracing::info!(
            container = %container.id(),
            surface = %surface.id(),
            width = metrics.rendered.width,
            height = metrics.rendered.height,
            legend = surface.legend().len(),
            "overlay surface created"
        );

        self.video = Some(video);
        Ok(&*self.surface.insert(surface))
    }

    /// Remove the current surface, returning its id.
    pub fn teardown(&mut self) -> Option<Uuid> {
        if let Some(video) = self.video.take() {
            video.unobserve_geometry();
        }
        let old = self.surface.take()?;
        tracing::debug!(surface = %old.id(), "overlay surface removed");
        Some(old.id())
    }

    // ── LoadData ────────────────────────────────────────────────────────────

    pub fn begin_load(&mut self, location: &str) -> LoadTicket {
        self.load_seq += 1;
        tracing::debug!(location = %location, seq = self.load_seq, "detection load started");
        LoadTicket {
            seq: self.load_seq,
            location: location.to_string(),
        }
    }

    /// Apply a finished load. Success replaces the records wholesale and
    /// rewinds to frame 0; failure clears them. Results of superseded tickets
    /// are dropped.
    pub fn finish_load(
        &mut self,
        ticket: &LoadTicket,
        result: OverlayResult<Vec<DetectionRecord>>,
    ) -> LoadOutcome {
        if ticket.seq != self.load_seq {
            tracing::debug!(
                location = %ticket.location,
                seq = ticket.seq,
                latest = self.load_seq,
                "discarding superseded detection load"
            );
            return LoadOutcome::Stale;
        }

        match result {
            Ok(records) => {
                let count = records.len();
                self.records = records;
                self.active_frame = 0;
                tracing::info!(
                    location = %ticket.location,
                    records = count,
                    "detection data loaded"
                );
                LoadOutcome::Applied { records: count }
            }
            Err(e) => {
                self.records.clear();
                tracing::error!(
                    location = %ticket.location,
                    error = %e,
                    "failed to load detection data"
                );
                LoadOutcome::Failed { error: e.to_string() }
            }
        }
    }

    /// Fetch, parse and apply a detection document in one call.
    pub async fn load_data(&mut self, location: &str) -> LoadOutcome {
        let ticket = self.begin_load(location);
        let result = loader::load_records(self.source.as_ref(), location).await;
        self.finish_load(&ticket, result)
    }

    // ── Redraw ──────────────────────────────────────────────────────────────

    /// Draw `frame`'s detections. Returns `None` without touching any state
    /// when there is no surface or no data.
    pub fn redraw(&mut self, frame: u64) -> Option<SceneDiff> {
        if self.surface.is_none() || self.records.is_empty() {
            return None;
        }
        self.active_frame = frame;

        let metrics = match self.video.as_ref().map(|v| v.measure()) {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                tracing::warn!(frame, error = %e, "video measurement failed; skipping redraw");
                return None;
            }
            None => return None,
        };
        let Some(transform) = LetterboxTransform::compute(&metrics) else {
            tracing::debug!(frame, "video geometry not ready; skipping redraw");
            return None;
        };

        let specs: Vec<BoxSpec> = self
            .records
            .iter()
            .filter(|r| r.is_on_frame(frame))
            .map(|r| self.box_spec(r, &transform))
            .collect();

        let surface = self.surface.as_mut()?;
        let diff = surface.apply(specs);
        tracing::debug!(
            frame,
            added = diff.added.len(),
            updated = diff.updated.len(),
            removed = diff.removed.len(),
            unchanged = diff.unchanged,
            "overlay redrawn"
        );
        Some(diff)
    }

    /// Window-level resize: redraw the active frame against current geometry.
    pub fn handle_resize(&mut self) -> Option<SceneDiff> {
        self.redraw(self.active_frame)
    }

    /// Video size/position change: follow the video with the surface, then redraw.
    pub fn handle_geometry_change(&mut self) -> GeometryUpdate {
        let mut update = GeometryUpdate::default();
        let (Some(video), Some(surface)) = (self.video.as_ref(), self.surface.as_mut()) else {
            return update;
        };

        match video.measure() {
            Ok(metrics) => {
                if surface.move_to(metrics.rendered) {
                    tracing::debug!(
                        surface = %surface.id(),
                        rect = ?metrics.rendered,
                        "overlay surface moved"
                    );
                    update.moved_to = Some(metrics.rendered);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "video measurement failed on geometry change");
                return update;
            }
        }

        update.diff = self.redraw(self.active_frame);
        update
    }

    fn box_spec(&self, record: &DetectionRecord, transform: &LetterboxTransform) -> BoxSpec {
        let rect = transform.project(&record.bbox);
        let color = self
            .classes
            .get(&record.class)
            .unwrap_or(&self.style.fallback_color)
            .clone();

        BoxSpec {
            key: record.id.clone(),
            class: record.class.clone(),
            rect,
            stroke: color.clone(),
            opacity: box_opacity(record.confidence, self.style.opacity_floor),
            label: LabelPrimitive {
                x: rect.x,
                y: rect.y - self.style.label_offset,
                text: label_text(record),
                fill: color,
            },
        }
    }
}

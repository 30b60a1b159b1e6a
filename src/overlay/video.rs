use std::sync::{Arc, Mutex};

use crate::errors::{OverlayError, OverlayResult};
use crate::overlay::traits::{GeometryObserver, VideoContainer, VideoElement};
use crate::overlay::types::VideoMetrics;

/// Video element whose geometry is pushed in by the host (e.g. measured in a
/// webview and forwarded over the host protocol).
#[derive(Debug, Default)]
pub struct MeasuredVideo {
    metrics: Mutex<Option<VideoMetrics>>,
    observer: Mutex<Option<GeometryObserver>>,
}

impl MeasuredVideo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: VideoMetrics) -> Self {
        Self {
            metrics: Mutex::new(Some(metrics)),
            observer: Mutex::new(None),
        }
    }

    /// Store new geometry and notify the registered observer if it changed.
    pub fn set_metrics(&self, metrics: VideoMetrics) {
        let changed = match self.metrics.lock() {
            Ok(mut guard) => {
                let changed = guard.as_ref() != Some(&metrics);
                *guard = Some(metrics);
                changed
            }
            Err(e) => {
                tracing::error!(error = %e, "video metrics lock poisoned");
                return;
            }
        };
        if !changed {
            return;
        }
        let observer = self.observer.lock().ok().and_then(|g| g.clone());
        if let Some(observer) = observer {
            observer.notify();
        }
    }

    pub fn has_observer(&self) -> bool {
        self.observer.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

impl VideoElement for MeasuredVideo {
    fn measure(&self) -> OverlayResult<VideoMetrics> {
        let guard = self
            .metrics
            .lock()
            .map_err(|e| OverlayError::Surface(format!("video metrics lock: {e}")))?;
        (*guard).ok_or_else(|| OverlayError::Surface("video has not been measured yet".into()))
    }

    fn observe_geometry(&self, observer: GeometryObserver) {
        if let Ok(mut guard) = self.observer.lock() {
            *guard = Some(observer);
        }
    }

    fn unobserve_geometry(&self) {
        if let Ok(mut guard) = self.observer.lock() {
            guard.take();
        }
    }
}

/// Container identified by an id, holding at most one video element.
pub struct StaticContainer {
    id: String,
    video: Option<Arc<MeasuredVideo>>,
}

impl StaticContainer {
    pub fn new(id: impl Into<String>, video: Option<Arc<MeasuredVideo>>) -> Self {
        Self { id: id.into(), video }
    }
}

impl VideoContainer for StaticContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn video(&self) -> Option<Arc<dyn VideoElement>> {
        self.video.clone().map(|v| v as Arc<dyn VideoElement>)
    }
}

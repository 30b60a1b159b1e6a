use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::OverlayResult;
use crate::overlay::types::VideoMetrics;

/// Callback a video element fires whenever its rendered size or position changes.
#[derive(Clone)]
pub struct GeometryObserver {
    notify: Arc<dyn Fn() + Send + Sync>,
}

impl GeometryObserver {
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            notify: Arc::new(notify),
        }
    }

    pub fn notify(&self) {
        (self.notify)()
    }
}

impl std::fmt::Debug for GeometryObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GeometryObserver")
    }
}

/// The video being annotated, as seen by the overlay.
pub trait VideoElement: Send + Sync {
    /// Current rendered rectangle (relative to the container) and intrinsic size.
    fn measure(&self) -> OverlayResult<VideoMetrics>;

    /// Register for size/position changes. Hosts that push geometry changes
    /// into the engine themselves can keep the default.
    fn observe_geometry(&self, observer: GeometryObserver) {
        let _ = observer;
    }

    /// Drop any observer registered through `observe_geometry`.
    fn unobserve_geometry(&self) {}
}

/// Element that hosts the video and the overlay surface drawn over it.
pub trait VideoContainer: Send + Sync {
    fn id(&self) -> &str;

    /// The contained video element, if there is one.
    fn video(&self) -> Option<Arc<dyn VideoElement>>;
}

/// Fetches raw detection documents by location (path or URL).
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, location: &str) -> OverlayResult<Vec<u8>>;
}

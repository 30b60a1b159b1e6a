use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::{OverlayError, OverlayResult};
use crate::overlay::legend::LegendEntry;
use crate::overlay::loader;
use crate::overlay::renderer::{LoadOutcome, LoadTicket, OverlayRenderer};
use crate::overlay::scene::SceneDiff;
use crate::overlay::traits::{DataSource, GeometryObserver, VideoContainer};
use crate::overlay::types::{DetectionRecord, Rect};

const EVENT_BUFFER: usize = 64;

/// Notifications the host pushes into the overlay.
pub enum OverlayEvent {
    /// (Re)build the surface over this container's video.
    Initialize(Arc<dyn VideoContainer>),
    DataFileChanged { location: String },
    FrameChanged { frame: u64 },
    WindowResized,
    /// The video's rendered rectangle moved or changed size.
    GeometryChanged,
    ExportSvg,
    Shutdown,
    /// Posted back by the fetch task spawned for `DataFileChanged`.
    DataLoaded {
        ticket: LoadTicket,
        result: OverlayResult<Vec<DetectionRecord>>,
    },
}

/// What the overlay reports back to the host after handling an event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayUpdate {
    SurfaceCreated {
        surface_id: Uuid,
        container: String,
        rect: Rect,
        legend: Vec<LegendEntry>,
    },
    SurfaceRemoved {
        surface_id: Uuid,
    },
    InitializeFailed {
        container: String,
        error: String,
    },
    SurfaceMoved {
        surface_id: Uuid,
        rect: Rect,
    },
    FrameRendered {
        surface_id: Uuid,
        frame: u64,
        diff: SceneDiff,
    },
    DataLoaded {
        location: String,
        records: usize,
    },
    DataLoadFailed {
        location: String,
        error: String,
    },
    SvgExported {
        surface_id: Uuid,
        svg: String,
    },
}

/// Pending geometry change, set by the video observer outside the event queue.
///
/// Repeated changes coalesce into one flag, so a burst of notifications costs
/// a single re-measure and none is lost while the queue is full.
#[derive(Debug, Default)]
struct GeometrySignal {
    dirty: AtomicBool,
    wake: Notify,
}

impl GeometrySignal {
    fn raise(&self) {
        self.dirty.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    fn take(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}

/// Cloneable sender for pushing events into a running engine.
#[derive(Clone)]
pub struct OverlayHandle {
    tx: mpsc::Sender<OverlayEvent>,
}

impl OverlayHandle {
    pub async fn send(&self, event: OverlayEvent) -> OverlayResult<()> {
        self.tx.send(event).await.map_err(|_| OverlayError::ChannelClosed)
    }

    pub async fn initialize(&self, container: Arc<dyn VideoContainer>) -> OverlayResult<()> {
        self.send(OverlayEvent::Initialize(container)).await
    }

    pub async fn load(&self, location: impl Into<String>) -> OverlayResult<()> {
        self.send(OverlayEvent::DataFileChanged {
            location: location.into(),
        })
        .await
    }

    pub async fn frame(&self, frame: u64) -> OverlayResult<()> {
        self.send(OverlayEvent::FrameChanged { frame }).await
    }

    pub async fn shutdown(&self) -> OverlayResult<()> {
        self.send(OverlayEvent::Shutdown).await
    }
}

/// Owns the renderer and processes overlay events one at a time.
///
/// Data fetches run on their own tasks and report back through the event
/// channel, so frames keep drawing against the previous records while a load
/// is pending.
pub struct OverlayEngine {
    renderer: OverlayRenderer,
    event_rx: mpsc::Receiver<OverlayEvent>,
    self_tx: mpsc::WeakSender<OverlayEvent>,
    update_tx: mpsc::Sender<OverlayUpdate>,
    geometry: Arc<GeometrySignal>,
}

impl OverlayEngine {
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn DataSource>,
        update_tx: mpsc::Sender<OverlayUpdate>,
    ) -> (Self, OverlayHandle) {
        let (tx, event_rx) = mpsc::channel::<OverlayEvent>(EVENT_BUFFER);
        let self_tx = tx.downgrade();

        let geometry = Arc::new(GeometrySignal::default());
        let signal = geometry.clone();
        let observer = GeometryObserver::new(move || signal.raise());

        let renderer = OverlayRenderer::new(config, source).with_geometry_observer(observer);
        let engine = Self {
            renderer,
            event_rx,
            self_tx,
            update_tx,
            geometry,
        };
        (engine, OverlayHandle { tx })
    }

    /// Run until `Shutdown` arrives or every handle has been dropped.
    pub async fn run_loop(&mut self) {
        tracing::info!("overlay engine started");
        loop {
            let event = tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(event) => Some(event),
                    None => break,
                },
                _ = self.geometry.wake.notified() => None,
            };

            if let Some(event) = event {
                if !self.handle_event(event).await {
                    break;
                }
            }
            if self.geometry.take() {
                self.on_geometry_changed().await;
            }
        }
        self.renderer.teardown();
        tracing::info!("overlay engine exited");
    }

    /// Returns `false` when the engine should stop.
    async fn handle_event(&mut self, event: OverlayEvent) -> bool {
        match event {
            OverlayEvent::Shutdown => {
                tracing::info!("overlay engine shutdown requested");
                return false;
            }
            OverlayEvent::Initialize(container) => self.on_initialize(container.as_ref()).await,
            OverlayEvent::DataFileChanged { location } => {
                self.on_data_file_changed(location).await
            }
            OverlayEvent::DataLoaded { ticket, result } => {
                self.on_data_loaded(ticket, result).await
            }
            OverlayEvent::FrameChanged { frame } => {
                let diff = self.renderer.redraw(frame);
                self.emit_frame(diff).await;
            }
            OverlayEvent::WindowResized => {
                let diff = self.renderer.handle_resize();
                self.emit_frame(diff).await;
            }
            OverlayEvent::GeometryChanged => {
                // Any pending observer signal is covered by this re-measure.
                self.geometry.take();
                self.on_geometry_changed().await;
            }
            OverlayEvent::ExportSvg => {
                if let Some(surface) = self.renderer.surface() {
                    let update = OverlayUpdate::SvgExported {
                        surface_id: surface.id(),
                        svg: surface.to_svg(),
                    };
                    self.emit(update).await;
                }
            }
        }
        true
    }

    async fn on_geometry_changed(&mut self) {
        let update = self.renderer.handle_geometry_change();
        if let (Some(rect), Some(surface)) = (update.moved_to, self.renderer.surface()) {
            let surface_id = surface.id();
            self.emit(OverlayUpdate::SurfaceMoved { surface_id, rect }).await;
        }
        self.emit_frame(update.diff).await;
    }

    async fn on_initialize(&mut self, container: &dyn VideoContainer) {
        let previous = self.renderer.surface().map(|s| s.id());
        let result = self
            .renderer
            .initialize(container)
            .map(|s| (s.id(), s.rect(), s.legend().to_vec()));

        if let Some(surface_id) = previous {
            self.emit(OverlayUpdate::SurfaceRemoved { surface_id }).await;
        }

        match result {
            Ok((surface_id, rect, legend)) => {
                self.emit(OverlayUpdate::SurfaceCreated {
                    surface_id,
                    container: container.id().to_string(),
                    rect,
                    legend,
                })
                .await;
            }
            Err(e) => {
                tracing::error!(
                    container = %container.id(),
                    error = %e,
                    "overlay initialization failed"
                );
                self.emit(OverlayUpdate::InitializeFailed {
                    container: container.id().to_string(),
                    error: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn on_data_file_changed(&mut self, location: String) {
        let ticket = self.renderer.begin_load(&location);
        let source = self.renderer.source();

        match self.self_tx.upgrade() {
            Some(tx) => {
                tokio::spawn(async move {
                    let result = loader::load_records(source.as_ref(), &ticket.location).await;
                    if tx.send(OverlayEvent::DataLoaded { ticket, result }).await.is_err() {
                        tracing::debug!("engine gone before detection load finished");
                    }
                });
            }
            None => {
                // No handle left to post back through; finish inline.
                let result = loader::load_records(source.as_ref(), &location).await;
                self.on_data_loaded(ticket, result).await;
            }
        }
    }

    async fn on_data_loaded(
        &mut self,
        ticket: LoadTicket,
        result: OverlayResult<Vec<DetectionRecord>>,
    ) {
        match self.renderer.finish_load(&ticket, result) {
            LoadOutcome::Applied { records } => {
                self.emit(OverlayUpdate::DataLoaded {
                    location: ticket.location,
                    records,
                })
                .await;
            }
            LoadOutcome::Failed { error } => {
                self.emit(OverlayUpdate::DataLoadFailed {
                    location: ticket.location,
                    error,
                })
                .await;
            }
            LoadOutcome::Stale => {}
        }
    }

    async fn emit_frame(&self, diff: Option<SceneDiff>) {
        let (Some(diff), Some(surface)) = (diff, self.renderer.surface()) else {
            return;
        };
        if diff.is_empty() {
            return;
        }
        let update = OverlayUpdate::FrameRendered {
            surface_id: surface.id(),
            frame: self.renderer.active_frame(),
            diff,
        };
        self.emit(update).await;
    }

    async fn emit(&self, update: OverlayUpdate) {
        if let Err(e) = self.update_tx.send(update).await {
            tracing::warn!("overlay update dropped: {e}");
        }
    }
}

//! Fit/resize coordination for the active session
//!
//! Every layout-affecting trigger funnels into one debounced
//! [`FitCoordinator::recompute_and_sync`]. Only the active session is
//! measured; hidden sessions keep their last geometry until shown again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use stackdeck_protocol::{Geometry, SessionId};

use crate::config::FitConfig;
use crate::controller::{ResizeOutcome, SessionController};
use crate::tabs::TabView;

/// Why a fit was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitTrigger {
    WindowResized,
    ContainerResized,
    TabActivated,
    PanelToggled,
}

/// Pixel size of a terminal surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub width_px: f32,
    pub height_px: f32,
}

impl SurfaceSize {
    pub fn new(width_px: f32, height_px: f32) -> Self {
        Self { width_px, height_px }
    }
}

/// Measures the visible surface of a session
pub trait SurfaceMeasure: Send + Sync {
    /// `None` when the surface is hidden or collapsed
    fn surface_size(&self, session_id: SessionId) -> Option<SurfaceSize>;
}

/// Character cell dimensions used to convert pixels to a grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub width_px: f32,
    pub height_px: f32,
    pub padding_px: f32,
}

impl From<&FitConfig> for CellMetrics {
    fn from(config: &FitConfig) -> Self {
        Self {
            width_px: config.cell_width_px,
            height_px: config.cell_height_px,
            padding_px: config.padding_px,
        }
    }
}

/// Grid size that fits in `size`, at least 1x1
pub fn compute_geometry(size: SurfaceSize, metrics: CellMetrics) -> Geometry {
    let usable_w = (size.width_px - 2.0 * metrics.padding_px).max(0.0);
    let usable_h = (size.height_px - 2.0 * metrics.padding_px).max(0.0);
    let cols = (usable_w / metrics.width_px).floor();
    let rows = (usable_h / metrics.height_px).floor();
    Geometry::new(
        cols.min(u16::MAX as f32) as u16,
        rows.min(u16::MAX as f32) as u16,
    )
}

struct FitInner {
    controller: SessionController,
    view: TabView,
    measure: Arc<dyn SurfaceMeasure>,
    metrics: CellMetrics,
    settle_delay: Duration,
    /// Bumped by every `schedule`; a sleeping fit only runs if still latest
    generation: AtomicU64,
}

/// Recomputes and pushes the active session's geometry
#[derive(Clone)]
pub struct FitCoordinator {
    inner: Arc<FitInner>,
}

impl FitCoordinator {
    pub fn new(
        controller: SessionController,
        view: TabView,
        measure: Arc<dyn SurfaceMeasure>,
        config: &FitConfig,
    ) -> Self {
        Self {
            inner: Arc::new(FitInner {
                controller,
                view,
                measure,
                metrics: CellMetrics::from(config),
                settle_delay: config.settle_delay(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Run a fit after the settle delay
    ///
    /// A newer trigger supersedes one that is still waiting.
    pub fn schedule(&self, trigger: FitTrigger) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(?trigger, "No async runtime; fit skipped");
            return;
        };

        trace!(?trigger, generation, "Fit scheduled");
        let this = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(this.inner.settle_delay).await;
            if this.inner.generation.load(Ordering::SeqCst) != generation {
                trace!(?trigger, generation, "Fit superseded");
                return;
            }
            this.recompute_and_sync().await;
        });
    }

    /// Measure the active session and resize it if its grid changed
    ///
    /// Idempotent: returns `None` when there is nothing to measure and
    /// `Unchanged` without calling the host when the grid matches the last
    /// one sent.
    pub async fn recompute_and_sync(&self) -> Option<ResizeOutcome> {
        let inner = &self.inner;
        let active = inner.view.active()?;
        let Some(size) = inner.measure.surface_size(active) else {
            trace!(session_id = %active, "Active surface hidden; fit skipped");
            return None;
        };

        let geometry = compute_geometry(size, inner.metrics);
        if inner.controller.geometry(active) == Some(geometry) {
            trace!(session_id = %active, geometry = %geometry, "Geometry unchanged");
            return Some(ResizeOutcome::Unchanged);
        }

        let outcome = inner.controller.resize(active, geometry).await;
        debug!(session_id = %active, geometry = %geometry, ?outcome, "Fit applied");
        Some(outcome)
    }
}

impl std::fmt::Debug for FitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitCoordinator")
            .field("metrics", &self.inner.metrics)
            .field("settle_delay", &self.inner.settle_delay)
            .finish()
    }
}

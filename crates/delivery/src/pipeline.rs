//! The assembled page-side delivery pipeline.
//!
//! One `MediaPipeline` is constructed at page start and owns the whole
//! chain: visibility events feed the scheduler, the scheduler admits loads
//! into the image loader under the monitor's policy, and settled loads are
//! marked back onto their slots. Everything is injected through the
//! constructor; nothing here is a process-wide singleton.

use std::sync::Arc;

use aula_core::{CourseCategory, Fetch, MediaKind};
use tokio::sync::mpsc;
use url::Url;

use crate::loader::{ImageLoader, LoadEvent, LoadOutcome, LoaderConfig};
use crate::policy::{ConnectionSignal, NetworkConditionMonitor, QualityPolicy};
use crate::scheduler::{LoadHandle, Priority, RequestScheduler, SchedulerStats};
use crate::visibility::{
    MediaSlot, Relevance, SlotId, SlotMark, Viewport, VisibilityTracker,
};

/// The page-context pipeline, wired once at startup
pub struct MediaPipeline {
    monitor: Arc<NetworkConditionMonitor>,
    tracker: Arc<VisibilityTracker>,
    scheduler: Arc<RequestScheduler>,
}

impl MediaPipeline {
    /// Build and start the pipeline.
    ///
    /// Returns the pipeline and the telemetry stream of settled loads.
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        initial_signal: ConnectionSignal,
        viewport: Viewport,
        config: LoaderConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LoadEvent>) {
        let monitor = Arc::new(NetworkConditionMonitor::new(initial_signal));
        let (loader, mut load_events) = ImageLoader::new(fetcher, monitor.subscribe(), config);
        let scheduler = RequestScheduler::new(monitor.subscribe(), Arc::new(loader));
        let (tracker, mut visibility_events) = VisibilityTracker::new(viewport);
        let tracker = Arc::new(tracker);

        // Visibility → scheduler: imminent slots preload, visible slots
        // load at normal priority. Critical is reserved for explicit
        // enqueues (the hero image the page cannot paint without).
        {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                while let Some(event) = visibility_events.recv().await {
                    let priority = match event.relevance {
                        Relevance::Imminent => Priority::Preload,
                        Relevance::Immediate => Priority::Normal,
                    };
                    scheduler.enqueue(event.resource, event.kind, event.category, priority);
                }
            });
        }

        // Loader telemetry → slot marks, then outward to the caller.
        let (outward_tx, outward_rx) = mpsc::unbounded_channel();
        {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                while let Some(event) = load_events.recv().await {
                    let mark = match event.outcome {
                        LoadOutcome::Loaded => SlotMark::Loaded,
                        LoadOutcome::Degraded => SlotMark::Degraded,
                        LoadOutcome::Failed => SlotMark::Unavailable,
                    };
                    tracker.mark_resource(&event.resource, mark);
                    let _ = outward_tx.send(event);
                }
            });
        }

        (
            Self {
                monitor,
                tracker,
                scheduler,
            },
            outward_rx,
        )
    }

    /// Register a media placeholder
    pub fn observe(&self, slot: MediaSlot) {
        self.tracker.observe(slot);
    }

    /// Drop a placeholder that left the document, abandoning its queued
    /// load unless another slot still wants the same resource
    pub fn unobserve(&self, id: SlotId) {
        if let Some(resource) = self.tracker.unobserve(id) {
            if !self.tracker.is_wanted(&resource) {
                self.scheduler.cancel(&resource);
            }
        }
    }

    /// Update the scroll window
    pub fn set_viewport(&self, viewport: Viewport) {
        self.tracker.set_viewport(viewport);
    }

    /// Feed a fresh connection signal
    pub fn update_signal(&self, signal: ConnectionSignal) {
        self.monitor.update(signal);
    }

    /// Load something the page cannot paint without, ahead of everything
    pub fn enqueue_critical(
        &self,
        resource: Url,
        kind: MediaKind,
        category: Option<CourseCategory>,
    ) -> LoadHandle {
        self.scheduler
            .enqueue(resource, kind, category, Priority::Critical)
    }

    /// Manual retry for a slot whose load exhausted its chain.
    ///
    /// Terminal loads leave no scheduler entry behind, so this re-enters
    /// the queue with a fresh attempt budget.
    pub fn retry(
        &self,
        resource: Url,
        kind: MediaKind,
        category: Option<CourseCategory>,
    ) -> LoadHandle {
        self.scheduler
            .enqueue(resource, kind, category, Priority::Normal)
    }

    pub fn current_policy(&self) -> QualityPolicy {
        self.monitor.current_policy()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn mark_of(&self, id: SlotId) -> Option<SlotMark> {
        self.tracker.mark_of(id)
    }
}

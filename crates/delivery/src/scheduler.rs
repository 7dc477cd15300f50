//! Priority queue and admission control for media loads.
//!
//! Three sub-queues (critical, normal, preload) drain in strict priority
//! order, one item per dispatch cycle, gated by the live concurrency cap
//! from the network monitor. Completion of any in-flight load immediately
//! refills the freed slot from the highest-priority non-empty queue.
//!
//! Queue length is unbounded on purpose: it is bounded by the number of
//! media placeholders in the document, and an artificial cap would only
//! trade a visible image for an invisible drop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use aula_core::{CourseCategory, MediaKind};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use url::Url;
use uuid::Uuid;

use crate::error::LoadError;
use crate::loader::LoadedImage;
use crate::policy::QualityPolicy;

/// Load priority, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Needed for what the user is looking at right now
    Critical = 0,
    /// Visible or about to be
    Normal = 1,
    /// Speculative, load when nothing better is waiting
    Preload = 2,
}

const PRIORITIES: [Priority; 3] = [Priority::Critical, Priority::Normal, Priority::Preload];

/// Externally visible state of one scheduled load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Queued,
    Loading,
    Loaded,
    Failed,
    Cancelled,
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoadState::Loaded | LoadState::Failed | LoadState::Cancelled
        )
    }
}

/// Executes one admitted load; implemented by the image loader
#[async_trait]
pub trait LoadExecutor: Send + Sync {
    async fn execute(
        &self,
        resource: &Url,
        kind: MediaKind,
        category: Option<CourseCategory>,
    ) -> Result<LoadedImage, LoadError>;
}

/// Caller's view of a scheduled load
#[derive(Debug, Clone)]
pub struct LoadHandle {
    id: Uuid,
    resource: Url,
    state_rx: watch::Receiver<LoadState>,
}

impl LoadHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn resource(&self) -> &Url {
        &self.resource
    }

    pub fn state(&self) -> LoadState {
        *self.state_rx.borrow()
    }

    /// Wait until the load reaches a terminal state
    pub async fn wait_terminal(&self) -> LoadState {
        let mut rx = self.state_rx.clone();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}

/// Scheduler counters, exposed by snapshot
#[derive(Debug, Default, Clone, Serialize)]
pub struct SchedulerStats {
    pub enqueued: usize,
    pub deduplicated: usize,
    pub dispatched: usize,
    pub loaded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct QueuedLoad {
    resource: Url,
    kind: MediaKind,
    category: Option<CourseCategory>,
    enqueued_at: Instant,
}

struct PendingEntry {
    state_tx: watch::Sender<LoadState>,
    handle: LoadHandle,
    cancelled: bool,
}

struct Inner {
    queues: [VecDeque<QueuedLoad>; 3],
    index: HashMap<Url, PendingEntry>,
    active: usize,
    stats: SchedulerStats,
}

/// Priority queue plus concurrency limiter in front of the image loader
pub struct RequestScheduler {
    inner: Mutex<Inner>,
    policy_rx: watch::Receiver<QualityPolicy>,
    executor: Arc<dyn LoadExecutor>,
}

impl RequestScheduler {
    pub fn new(
        policy_rx: watch::Receiver<QualityPolicy>,
        executor: Arc<dyn LoadExecutor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                index: HashMap::new(),
                active: 0,
                stats: SchedulerStats::default(),
            }),
            policy_rx,
            executor,
        })
    }

    /// Queue a load, or return the handle of the one already in flight.
    ///
    /// A resource has at most one non-terminal load outstanding; a second
    /// enqueue while the first is pending is a deduplicated no-op. Once a
    /// load settles, the same resource may be enqueued again (this is how
    /// manual retry re-enters the pipeline).
    pub fn enqueue(
        self: &Arc<Self>,
        resource: Url,
        kind: MediaKind,
        category: Option<CourseCategory>,
        priority: Priority,
    ) -> LoadHandle {
        let handle = {
            let mut inner = self.inner.lock();

            if let Some(entry) = inner.index.get_mut(&resource) {
                if !entry.state_tx.borrow().is_terminal() {
                    // A cancelled-but-undispatched load that is wanted
                    // again simply resumes its place in the queue.
                    entry.cancelled = false;
                    let handle = entry.handle.clone();
                    inner.stats.deduplicated += 1;
                    return handle;
                }
            }

            let (state_tx, state_rx) = watch::channel(LoadState::Queued);
            let handle = LoadHandle {
                id: Uuid::new_v4(),
                resource: resource.clone(),
                state_rx,
            };

            inner.index.insert(
                resource.clone(),
                PendingEntry {
                    state_tx,
                    handle: handle.clone(),
                    cancelled: false,
                },
            );
            inner.queues[priority as usize].push_back(QueuedLoad {
                resource,
                kind,
                category,
                enqueued_at: Instant::now(),
            });
            inner.stats.enqueued += 1;
            handle
        };

        // Dispatch on a fresh task so a burst of enqueues settles into the
        // queues before the first admission decision.
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.pump();
        });

        handle
    }

    /// Abandon a queued load whose placeholder left the document.
    ///
    /// Checked immediately before dispatch: an already in-flight load is
    /// left to finish, since the request is cheap and idempotent.
    pub fn cancel(&self, resource: &Url) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.index.get_mut(resource) {
            if *entry.state_tx.borrow() == LoadState::Queued {
                entry.cancelled = true;
            }
        }
    }

    /// Current counters
    pub fn stats(&self) -> SchedulerStats {
        self.inner.lock().stats.clone()
    }

    /// Items waiting per priority, highest first
    pub fn queue_depths(&self) -> [usize; 3] {
        let inner = self.inner.lock();
        [
            inner.queues[0].len(),
            inner.queues[1].len(),
            inner.queues[2].len(),
        ]
    }

    /// Admit as many queued loads as the current policy allows
    fn pump(self: &Arc<Self>) {
        loop {
            let job = {
                let mut inner = self.inner.lock();
                let cap = self.policy_rx.borrow().max_concurrent;
                if inner.active >= cap {
                    break;
                }
                match self.next_dispatchable(&mut inner) {
                    Some(job) => {
                        inner.active += 1;
                        inner.stats.dispatched += 1;
                        job
                    }
                    None => break,
                }
            };

            log::debug!(
                "dispatching {} after {:?} queued",
                job.resource,
                job.enqueued_at.elapsed()
            );

            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                let result = scheduler
                    .executor
                    .execute(&job.resource, job.kind, job.category)
                    .await;
                scheduler.finish(&job.resource, result.is_ok());
            });
        }
    }

    /// Pop the next live item in strict priority order, retiring any
    /// cancelled entries encountered on the way.
    fn next_dispatchable(&self, inner: &mut Inner) -> Option<QueuedLoad> {
        for priority in PRIORITIES {
            while let Some(job) = inner.queues[priority as usize].pop_front() {
                let Some(entry) = inner.index.get(&job.resource) else {
                    continue;
                };

                if entry.cancelled {
                    let entry = inner.index.remove(&job.resource).unwrap();
                    let _ = entry.state_tx.send(LoadState::Cancelled);
                    inner.stats.cancelled += 1;
                    log::debug!("abandoned queued load for {}", job.resource);
                    continue;
                }

                let _ = entry.state_tx.send(LoadState::Loading);
                return Some(job);
            }
        }
        None
    }

    /// Record a settled load and refill the freed slot
    fn finish(self: &Arc<Self>, resource: &Url, loaded: bool) {
        {
            let mut inner = self.inner.lock();
            inner.active -= 1;
            if let Some(entry) = inner.index.remove(resource) {
                let state = if loaded {
                    inner.stats.loaded += 1;
                    LoadState::Loaded
                } else {
                    inner.stats.failed += 1;
                    LoadState::Failed
                };
                let _ = entry.state_tx.send(state);
            }
        }
        self.pump();
    }
}

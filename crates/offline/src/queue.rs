//! Durable replay queue for writes attempted while offline.
//!
//! `submit` is fire-and-forget: a write that cannot be delivered right now
//! is persisted and reported as accepted. Flush passes run on the
//! reconnect signal and on a periodic wake, delete an entry only after the
//! endpoint acknowledges it, and stop at the first failure so entries
//! replay in enqueue order. Delivery is at-least-once; the endpoints
//! receiving these payloads treat them as idempotent.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use url::Url;

use aula_core::{Fetch, Method, Request};

use crate::error::OfflineError;

/// The logical queues the client writes into
pub const COURSE_PROGRESS_QUEUE: &str = "course-progress";
pub const ANALYTICS_QUEUE: &str = "analytics";

/// One persisted write awaiting delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedWrite {
    pub id: u64,
    pub endpoint: Url,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
}

/// Durable storage seam for queued writes.
///
/// Ids are assigned by the store, strictly increasing per queue, and
/// `entries` returns them in id order.
#[async_trait]
pub trait WriteStore: Send + Sync {
    async fn append(
        &self,
        queue: &str,
        endpoint: &Url,
        payload: &Value,
        enqueued_at: DateTime<Utc>,
    ) -> Result<QueuedWrite, OfflineError>;

    async fn entries(&self, queue: &str) -> Result<Vec<QueuedWrite>, OfflineError>;

    async fn remove(&self, queue: &str, id: u64) -> Result<(), OfflineError>;

    async fn queues(&self) -> Result<Vec<String>, OfflineError>;
}

#[derive(Default)]
struct MemoryQueue {
    next_id: u64,
    entries: BTreeMap<u64, QueuedWrite>,
}

/// In-memory store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryWriteStore {
    queues: Mutex<HashMap<String, MemoryQueue>>,
}

impl MemoryWriteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WriteStore for MemoryWriteStore {
    async fn append(
        &self,
        queue: &str,
        endpoint: &Url,
        payload: &Value,
        enqueued_at: DateTime<Utc>,
    ) -> Result<QueuedWrite, OfflineError> {
        let mut queues = self.queues.lock();
        let state = queues.entry(queue.to_string()).or_default();
        state.next_id += 1;
        let entry = QueuedWrite {
            id: state.next_id,
            endpoint: endpoint.clone(),
            payload: payload.clone(),
            enqueued_at,
        };
        state.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn entries(&self, queue: &str) -> Result<Vec<QueuedWrite>, OfflineError> {
        let queues = self.queues.lock();
        Ok(queues
            .get(queue)
            .map(|state| state.entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove(&self, queue: &str, id: u64) -> Result<(), OfflineError> {
        let mut queues = self.queues.lock();
        if let Some(state) = queues.get_mut(queue) {
            state.entries.remove(&id);
        }
        Ok(())
    }

    async fn queues(&self) -> Result<Vec<String>, OfflineError> {
        Ok(self.queues.lock().keys().cloned().collect())
    }
}

/// JSON-lines file store, one file per logical queue.
///
/// Appends go straight to the file; removal rewrites it. All access runs
/// under one async mutex, so a flush pass cannot race a submit.
pub struct FileWriteStore {
    dir: PathBuf,
    guard: tokio::sync::Mutex<()>,
}

impl FileWriteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            guard: tokio::sync::Mutex::new(()),
        }
    }

    fn path_for(&self, queue: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", queue))
    }

    async fn load(&self, queue: &str) -> Result<Vec<QueuedWrite>, OfflineError> {
        let path = self.path_for(queue);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(OfflineError::IoError(error)),
        };

        let mut entries = Vec::new();
        for line in raw.lines().filter(|line| !line.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    async fn rewrite(&self, queue: &str, entries: &[QueuedWrite]) -> Result<(), OfflineError> {
        let mut contents = String::new();
        for entry in entries {
            contents.push_str(&serde_json::to_string(entry)?);
            contents.push('\n');
        }
        tokio::fs::write(self.path_for(queue), contents).await?;
        Ok(())
    }
}

#[async_trait]
impl WriteStore for FileWriteStore {
    async fn append(
        &self,
        queue: &str,
        endpoint: &Url,
        payload: &Value,
        enqueued_at: DateTime<Utc>,
    ) -> Result<QueuedWrite, OfflineError> {
        let _guard = self.guard.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;

        let existing = self.load(queue).await?;
        let next_id = existing.last().map(|entry| entry.id + 1).unwrap_or(1);
        let entry = QueuedWrite {
            id: next_id,
            endpoint: endpoint.clone(),
            payload: payload.clone(),
            enqueued_at,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(queue))
            .await?;
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(entry)
    }

    async fn entries(&self, queue: &str) -> Result<Vec<QueuedWrite>, OfflineError> {
        let _guard = self.guard.lock().await;
        self.load(queue).await
    }

    async fn remove(&self, queue: &str, id: u64) -> Result<(), OfflineError> {
        let _guard = self.guard.lock().await;
        let mut entries = self.load(queue).await?;
        entries.retain(|entry| entry.id != id);
        self.rewrite(queue, &entries).await
    }

    async fn queues(&self) -> Result<Vec<String>, OfflineError> {
        let _guard = self.guard.lock().await;
        let mut names = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(error) => return Err(OfflineError::IoError(error)),
        };
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".jsonl") {
                names.push(stem.to_string());
            }
        }
        Ok(names)
    }
}

/// Queue counters, exposed by snapshot
#[derive(Debug, Default, Clone, Serialize)]
pub struct QueueStats {
    pub submitted: usize,
    pub delivered_immediately: usize,
    pub deferred: usize,
    pub replayed: usize,
    pub flush_failures: usize,
    pub purged: usize,
}

/// Outcome of one flush pass over one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub attempted: usize,
    pub delivered: usize,
    pub remaining: usize,
}

/// Accepts writes unconditionally and replays the deferred ones
pub struct DeferredWriteQueue {
    fetch: Arc<dyn Fetch>,
    store: Arc<dyn WriteStore>,
    stats: Mutex<QueueStats>,
}

impl DeferredWriteQueue {
    pub fn new(fetch: Arc<dyn Fetch>, store: Arc<dyn WriteStore>) -> Self {
        Self {
            fetch,
            store,
            stats: Mutex::new(QueueStats::default()),
        }
    }

    /// Submit a write. Succeeds as long as the write is delivered or
    /// durably persisted; only a store failure surfaces as an error.
    pub async fn submit(
        &self,
        queue: &str,
        endpoint: Url,
        payload: Value,
    ) -> Result<(), OfflineError> {
        self.stats.lock().submitted += 1;

        if self.deliver(&endpoint, &payload).await {
            self.stats.lock().delivered_immediately += 1;
            return Ok(());
        }

        let entry = self
            .store
            .append(queue, &endpoint, &payload, Utc::now())
            .await?;
        self.stats.lock().deferred += 1;
        log::info!("deferred write {} queued on '{}'", entry.id, queue);
        Ok(())
    }

    /// Replay one queue in enqueue order.
    ///
    /// Stops at the first delivery failure so a dead endpoint cannot
    /// reorder the writes behind it; whatever remains is picked up by the
    /// next trigger.
    pub async fn flush(&self, queue: &str) -> Result<FlushReport, OfflineError> {
        let entries = self.store.entries(queue).await?;
        let mut report = FlushReport {
            attempted: 0,
            delivered: 0,
            remaining: entries.len(),
        };

        for entry in entries {
            report.attempted += 1;
            if self.deliver(&entry.endpoint, &entry.payload).await {
                self.store.remove(queue, entry.id).await?;
                report.delivered += 1;
                report.remaining -= 1;
                self.stats.lock().replayed += 1;
            } else {
                self.stats.lock().flush_failures += 1;
                log::debug!(
                    "flush of '{}' stopped at entry {}; {} left",
                    queue,
                    entry.id,
                    report.remaining
                );
                break;
            }
        }

        Ok(report)
    }

    /// Replay every known queue; queues are independent, so the passes
    /// run concurrently
    pub async fn flush_all(&self) -> Result<(), OfflineError> {
        let queues = self.store.queues().await?;
        let passes = futures::future::join_all(queues.iter().map(|queue| self.flush(queue))).await;
        for (queue, result) in queues.iter().zip(passes) {
            if let Err(error) = result {
                log::warn!("flush of '{}' failed: {}", queue, error);
            }
        }
        Ok(())
    }

    /// Drop every entry in a queue without delivering it
    pub async fn purge(&self, queue: &str) -> Result<usize, OfflineError> {
        let entries = self.store.entries(queue).await?;
        let count = entries.len();
        for entry in entries {
            self.store.remove(queue, entry.id).await?;
        }
        self.stats.lock().purged += count;
        Ok(count)
    }

    /// Entries currently awaiting delivery
    pub async fn pending(&self, queue: &str) -> Result<usize, OfflineError> {
        Ok(self.store.entries(queue).await?.len())
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.lock().clone()
    }

    /// Run the background flusher: wakes on the connectivity signal
    /// turning online and on a periodic timer.
    pub fn spawn_flusher(
        self: &Arc<Self>,
        mut online_rx: watch::Receiver<bool>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let writes = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup does
            // not race the caller's own initial flush.
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *online_rx.borrow() {
                            log::debug!("connectivity restored, flushing queues");
                            let _ = writes.flush_all().await;
                        }
                    }
                    _ = ticker.tick() => {
                        let _ = writes.flush_all().await;
                    }
                }
            }
        })
    }

    async fn deliver(&self, endpoint: &Url, payload: &Value) -> bool {
        let request = match Request::from_url(Method::POST, endpoint.clone())
            .with_json_body(payload)
        {
            Ok(request) => request,
            Err(error) => {
                log::warn!("unserializable write payload for {}: {}", endpoint, error);
                return false;
            }
        };

        match self.fetch.fetch(request).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                log::debug!("write to {} got status {}", endpoint, response.status());
                false
            }
            Err(error) => {
                log::debug!("write to {} failed: {}", endpoint, error);
                false
            }
        }
    }
}

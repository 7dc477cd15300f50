//! Network condition classification and the quality policy it produces.
//!
//! The monitor turns a raw connection signal (link class plus data-saver
//! flag) into a `QualityPolicy` snapshot. Consumers either read the latest
//! snapshot or subscribe to changes; a long-running queue adapts mid-flight
//! because the loader re-reads the snapshot at the top of every attempt.

use std::time::Duration;

use aula_core::QualityHint;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Coarse link quality as reported by the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClass {
    /// 2G-class link
    Cellular2G,
    /// 3G-class link
    Cellular3G,
    /// 4G-class or better
    Cellular4G,
    /// No information available
    Unknown,
}

/// Raw environment signal the monitor classifies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSignal {
    pub link: LinkClass,
    /// Explicit user preference for reduced data usage
    pub data_saver: bool,
}

impl Default for ConnectionSignal {
    fn default() -> Self {
        Self {
            link: LinkClass::Unknown,
            data_saver: false,
        }
    }
}

/// Classification bands the pipeline adapts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionClass {
    /// 2G-class link or explicit data-saver
    Constrained,
    /// 3G-class link
    Reduced,
    /// 4G-class link or unknown
    Unconstrained,
}

impl ConnectionClass {
    /// Band for a raw signal. Data-saver always wins.
    pub fn classify(signal: ConnectionSignal) -> Self {
        if signal.data_saver {
            return ConnectionClass::Constrained;
        }
        match signal.link {
            LinkClass::Cellular2G => ConnectionClass::Constrained,
            LinkClass::Cellular3G => ConnectionClass::Reduced,
            LinkClass::Cellular4G | LinkClass::Unknown => ConnectionClass::Unconstrained,
        }
    }
}

/// Read-only policy snapshot consumed by the scheduler and loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPolicy {
    /// Concurrent in-flight load cap
    pub max_concurrent: usize,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Variant size requested from the media service
    pub quality_hint: QualityHint,
}

impl QualityPolicy {
    /// The policy for a classification band
    pub fn for_class(class: ConnectionClass) -> Self {
        match class {
            ConnectionClass::Constrained => Self {
                max_concurrent: 1,
                timeout: Duration::from_millis(15_000),
                quality_hint: QualityHint::Low,
            },
            ConnectionClass::Reduced => Self {
                max_concurrent: 2,
                timeout: Duration::from_millis(10_000),
                quality_hint: QualityHint::Medium,
            },
            ConnectionClass::Unconstrained => Self {
                max_concurrent: 3,
                timeout: Duration::from_millis(5_000),
                quality_hint: QualityHint::Auto,
            },
        }
    }
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self::for_class(ConnectionClass::Unconstrained)
    }
}

/// Tracks the connection signal and publishes policy snapshots
pub struct NetworkConditionMonitor {
    signal: Mutex<ConnectionSignal>,
    tx: watch::Sender<QualityPolicy>,
}

impl NetworkConditionMonitor {
    pub fn new(initial: ConnectionSignal) -> Self {
        let policy = QualityPolicy::for_class(ConnectionClass::classify(initial));
        let (tx, _) = watch::channel(policy);

        Self {
            signal: Mutex::new(initial),
            tx,
        }
    }

    /// Feed a fresh connection signal; subscribers wake only on change
    pub fn update(&self, signal: ConnectionSignal) {
        let mut current = self.signal.lock();
        if *current == signal {
            return;
        }
        *current = signal;

        let policy = QualityPolicy::for_class(ConnectionClass::classify(signal));
        self.tx.send_if_modified(|existing| {
            if *existing == policy {
                false
            } else {
                log::debug!(
                    "network policy changed: concurrency {} timeout {:?}",
                    policy.max_concurrent,
                    policy.timeout
                );
                *existing = policy;
                true
            }
        });
    }

    /// Latest policy snapshot
    pub fn current_policy(&self) -> QualityPolicy {
        *self.tx.borrow()
    }

    /// Subscribe to policy changes
    pub fn subscribe(&self) -> watch::Receiver<QualityPolicy> {
        self.tx.subscribe()
    }
}

impl Default for NetworkConditionMonitor {
    fn default() -> Self {
        Self::new(ConnectionSignal::default())
    }
}

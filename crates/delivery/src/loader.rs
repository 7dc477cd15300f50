//! Resilient single-image loading.
//!
//! One load walks the resource's fallback chain: the primary variant gets
//! three attempts with scaled backoff, every fallback candidate gets one
//! opportunistic shot, and the quality hint is re-read from the live
//! policy at the top of each attempt so a long queue adapts mid-flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aula_core::{
    CourseCategory, FallbackChain, FallbackStage, Fetch, MediaKind, Method, Request,
};
use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use url::Url;

use crate::error::LoadError;
use crate::policy::QualityPolicy;
use crate::scheduler::LoadExecutor;
use crate::state::{phase_of, plan_after_failure, Step};

/// How faithful the delivered image is to what was asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fidelity {
    /// The primary variant (possibly quality-adjusted) loaded
    Full,
    /// A fallback candidate loaded; callers may offer a retry affordance
    Degraded(FallbackStage),
}

/// A successfully delivered image
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The resource that was asked for
    pub resource: Url,
    /// The candidate that actually produced the payload
    pub source: Url,
    pub payload: Bytes,
    pub content_type: Option<String>,
    pub fidelity: Fidelity,
    /// Fetch attempts spent across the whole chain
    pub attempts: u32,
}

/// Telemetry outcome of one load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Degraded,
    Failed,
}

/// Telemetry event emitted when a load settles
#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub resource: Url,
    pub outcome: LoadOutcome,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Origin the app-local placeholder paths resolve against
    pub app_origin: Url,
    /// Backoff unit; retry n waits `base_delay * n`
    pub base_delay: Duration,
}

impl LoaderConfig {
    pub fn new(app_origin: Url) -> Self {
        Self {
            app_origin,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Loads one image at a time, degrading through its fallback chain
pub struct ImageLoader {
    fetcher: Arc<dyn Fetch>,
    policy_rx: watch::Receiver<QualityPolicy>,
    config: LoaderConfig,
    events_tx: mpsc::UnboundedSender<LoadEvent>,
}

impl ImageLoader {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        policy_rx: watch::Receiver<QualityPolicy>,
        config: LoaderConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LoadEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                fetcher,
                policy_rx,
                config,
                events_tx,
            },
            events_rx,
        )
    }

    /// Load a resource, walking its fallback chain until something renders.
    ///
    /// Returns `LoadError::Exhausted` only after the generic placeholder
    /// itself failed; callers surface that with a manual-retry affordance
    /// and may simply call `load` again.
    pub async fn load(
        &self,
        resource: &Url,
        kind: MediaKind,
        category: Option<CourseCategory>,
    ) -> Result<LoadedImage, LoadError> {
        let chain = FallbackChain::resolve(kind, resource, category, &self.config.app_origin);
        let started = Instant::now();

        let mut stage = 0usize;
        let mut attempt = 1u32;
        let mut total_attempts = 0u32;

        loop {
            let candidate = chain
                .get(stage)
                .expect("fallback chain always has a current candidate");

            // Policy may have changed since the last attempt.
            let policy = *self.policy_rx.borrow();
            let target = match candidate.stage {
                FallbackStage::Primary => policy.quality_hint.apply(&candidate.url),
                _ => candidate.url.clone(),
            };

            log::debug!(
                "loading {} ({:?}, phase {:?})",
                target,
                candidate.stage,
                phase_of(stage, attempt)
            );
            total_attempts += 1;

            match self.attempt(&target, policy).await {
                Ok(response) => {
                    let fidelity = match candidate.stage {
                        FallbackStage::Primary => Fidelity::Full,
                        other => Fidelity::Degraded(other),
                    };
                    let outcome = match fidelity {
                        Fidelity::Full => LoadOutcome::Loaded,
                        Fidelity::Degraded(_) => LoadOutcome::Degraded,
                    };
                    self.emit(resource, outcome, total_attempts, started.elapsed());

                    return Ok(LoadedImage {
                        resource: resource.clone(),
                        source: target,
                        content_type: response.content_type().cloned(),
                        payload: response.body().clone(),
                        fidelity,
                        attempts: total_attempts,
                    });
                }
                Err(AttemptFailure { error, transient }) => {
                    log::debug!("attempt {} at {} failed: {}", attempt, target, error);

                    let step = if transient {
                        plan_after_failure(stage, attempt, chain.len(), self.config.base_delay)
                    } else if stage + 1 < chain.len() {
                        // Retrying a structurally broken candidate is
                        // pointless; move down the chain at once.
                        Step::Advance { stage: stage + 1 }
                    } else {
                        Step::GiveUp
                    };

                    match step {
                        Step::Retry {
                            attempt: next,
                            delay,
                        } => {
                            sleep(delay).await;
                            attempt = next;
                        }
                        Step::Advance { stage: next } => {
                            stage = next;
                            attempt = 1;
                        }
                        Step::GiveUp => {
                            self.emit(
                                resource,
                                LoadOutcome::Failed,
                                total_attempts,
                                started.elapsed(),
                            );
                            return Err(LoadError::Exhausted {
                                resource: resource.clone(),
                                attempts: total_attempts,
                            });
                        }
                    }
                }
            }
        }
    }

    /// One fetch raced against the policy timeout
    async fn attempt(
        &self,
        target: &Url,
        policy: QualityPolicy,
    ) -> Result<aula_core::Response, AttemptFailure> {
        let request = Request::from_url(Method::GET, target.clone())
            .with_header("Accept", "image/*")
            .with_timeout(policy.timeout);

        match timeout(policy.timeout, self.fetcher.fetch(request)).await {
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => Err(AttemptFailure {
                transient: true,
                error: aula_core::FetchError::StatusError(response.status()),
            }),
            Ok(Err(error)) => Err(AttemptFailure {
                transient: error.is_transient(),
                error,
            }),
            Err(_) => Err(AttemptFailure {
                transient: true,
                error: aula_core::FetchError::TimeoutError(policy.timeout),
            }),
        }
    }

    fn emit(&self, resource: &Url, outcome: LoadOutcome, attempts: u32, elapsed: Duration) {
        let _ = self.events_tx.send(LoadEvent {
            resource: resource.clone(),
            outcome,
            attempts,
            elapsed,
        });
    }
}

struct AttemptFailure {
    error: aula_core::FetchError,
    transient: bool,
}

#[async_trait]
impl LoadExecutor for ImageLoader {
    async fn execute(
        &self,
        resource: &Url,
        kind: MediaKind,
        category: Option<CourseCategory>,
    ) -> Result<LoadedImage, LoadError> {
        self.load(resource, kind, category).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ConnectionSignal, LinkClass, NetworkConditionMonitor};
    use aula_core::{FetchError, Response};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Fetcher that answers from a script keyed by URL path
    struct ScriptedFetch {
        /// Paths that succeed; everything else fails with a connection error
        ok_paths: Vec<&'static str>,
        requests: Mutex<Vec<Request>>,
    }

    impl ScriptedFetch {
        fn new(ok_paths: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                ok_paths,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requested_urls(&self) -> Vec<Url> {
            self.requests.lock().iter().map(|r| r.url().clone()).collect()
        }

        fn requested_timeouts(&self) -> Vec<Option<Duration>> {
            self.requests.lock().iter().map(|r| r.timeout()).collect()
        }
    }

    #[async_trait]
    impl Fetch for ScriptedFetch {
        async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
            let url = request.url().clone();
            self.requests.lock().push(request);

            if self.ok_paths.iter().any(|p| url.path() == *p) {
                let mut headers = HashMap::new();
                headers.insert("content-type".to_string(), "image/webp".to_string());
                Ok(Response::new(
                    200,
                    headers,
                    Bytes::from_static(b"img"),
                    url,
                    Method::GET,
                ))
            } else {
                Err(FetchError::ConnectionError("unreachable".to_string()))
            }
        }
    }

    fn monitor(link: LinkClass) -> NetworkConditionMonitor {
        NetworkConditionMonitor::new(ConnectionSignal {
            link,
            data_saver: false,
        })
    }

    fn loader_with(
        fetcher: Arc<ScriptedFetch>,
        monitor: &NetworkConditionMonitor,
    ) -> (ImageLoader, mpsc::UnboundedReceiver<LoadEvent>) {
        let config = LoaderConfig::new(Url::parse("https://app.aula.dev/").unwrap());
        ImageLoader::new(fetcher, monitor.subscribe(), config)
    }

    fn cover() -> Url {
        Url::parse("https://img.aulacdn.net/covers/rust101.webp").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_primary_load() {
        let fetcher = ScriptedFetch::new(vec!["/covers/rust101.webp"]);
        let m = monitor(LinkClass::Cellular4G);
        let (loader, mut events) = loader_with(fetcher.clone(), &m);

        let image = loader
            .load(&cover(), MediaKind::Course, None)
            .await
            .unwrap();

        assert_eq!(image.fidelity, Fidelity::Full);
        assert_eq!(image.attempts, 1);
        assert_eq!(events.try_recv().unwrap().outcome, LoadOutcome::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quality_hint_applied_per_policy() {
        let fetcher = ScriptedFetch::new(vec!["/covers/rust101.webp"]);
        let m = monitor(LinkClass::Cellular2G);
        let (loader, _events) = loader_with(fetcher.clone(), &m);

        loader
            .load(&cover(), MediaKind::Course, None)
            .await
            .unwrap();

        let requested = fetcher.requested_urls();
        assert_eq!(requested[0].query(), Some("quality=low"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_adapts_to_classification() {
        for (link, expected) in [
            (LinkClass::Cellular2G, Duration::from_millis(15_000)),
            (LinkClass::Cellular4G, Duration::from_millis(5_000)),
        ] {
            let fetcher = ScriptedFetch::new(vec!["/covers/rust101.webp"]);
            let m = monitor(link);
            let (loader, _events) = loader_with(fetcher.clone(), &m);

            loader
                .load(&cover(), MediaKind::Course, None)
                .await
                .unwrap();

            assert_eq!(fetcher.requested_timeouts(), vec![Some(expected)]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_walk_is_deterministic() {
        // Primary and degraded variants fail; the category placeholder is
        // reached before the generic one.
        let fetcher = ScriptedFetch::new(vec!["/assets/placeholders/course-programming.svg"]);
        let m = monitor(LinkClass::Cellular4G);
        let (loader, mut events) = loader_with(fetcher.clone(), &m);

        let image = loader
            .load(
                &cover(),
                MediaKind::Course,
                Some(CourseCategory::Programming),
            )
            .await
            .unwrap();

        assert_eq!(
            image.fidelity,
            Fidelity::Degraded(FallbackStage::KindPlaceholder)
        );
        assert!(image.source.path().contains("course-programming"));
        // 3 primary attempts, 1 degraded, 1 placeholder.
        assert_eq!(image.attempts, 5);
        assert_eq!(events.try_recv().unwrap().outcome, LoadOutcome::Degraded);

        let paths: Vec<String> = fetcher
            .requested_urls()
            .iter()
            .map(|u| u.path().to_string())
            .collect();
        assert_eq!(paths[0], "/covers/rust101.webp");
        assert_eq!(paths[3], "/covers/rust101.webp");
        assert_eq!(paths[4], "/assets/placeholders/course-programming.svg");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_terminal_not_a_loop() {
        let fetcher = ScriptedFetch::new(vec![]);
        let m = monitor(LinkClass::Cellular4G);
        let (loader, mut events) = loader_with(fetcher.clone(), &m);

        let error = loader
            .load(&cover(), MediaKind::Course, None)
            .await
            .unwrap_err();

        match error {
            LoadError::Exhausted { attempts, .. } => {
                // 3 primary + degraded + kind placeholder + generic.
                assert_eq!(attempts, 6);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(events.try_recv().unwrap().outcome, LoadOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_reread_between_attempts() {
        // First attempt under 4G asks for no quality param; after the
        // signal degrades, the retry asks for the low variant.
        let fetcher = ScriptedFetch::new(vec![]);
        let m = monitor(LinkClass::Cellular4G);
        let (loader, _events) = loader_with(fetcher.clone(), &m);

        let cover = cover();
        let load = loader.load(&cover, MediaKind::Course, None);
        let degrade = async {
            // Let the first attempt happen, then constrain the link.
            tokio::task::yield_now().await;
            m.update(ConnectionSignal {
                link: LinkClass::Cellular2G,
                data_saver: false,
            });
        };
        let (result, _) = tokio::join!(load, degrade);
        assert!(result.is_err());

        let requested = fetcher.requested_urls();
        assert_eq!(requested[0].query(), None);
        assert!(requested
            .iter()
            .skip(1)
            .take(2)
            .all(|u| u.query() == Some("quality=low")));
    }
}

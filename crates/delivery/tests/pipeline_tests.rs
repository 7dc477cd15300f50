use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aula_core::{Fetch, FetchError, MediaKind, Method, Request, Response};
use aula_delivery::{
    ConnectionSignal, LinkClass, LoadOutcome, LoaderConfig, MediaPipeline, MediaSlot, SlotId,
    SlotMark, Viewport,
};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::timeout;
use url::Url;

/// Fetcher whose set of reachable paths can change mid-test
struct MutableFetch {
    ok_paths: Mutex<HashSet<String>>,
}

impl MutableFetch {
    fn new(paths: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            ok_paths: Mutex::new(paths.iter().map(|p| p.to_string()).collect()),
        })
    }

    fn allow(&self, path: &str) {
        self.ok_paths.lock().insert(path.to_string());
    }
}

#[async_trait]
impl Fetch for MutableFetch {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        let url = request.url().clone();
        if self.ok_paths.lock().contains(url.path()) {
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
            Err(FetchError::ConnectionError("offline".to_string()))
        }
    }
}

fn pipeline_with(
    fetcher: Arc<MutableFetch>,
) -> (
    MediaPipeline,
    tokio::sync::mpsc::UnboundedReceiver<aula_delivery::LoadEvent>,
) {
    MediaPipeline::new(
        fetcher,
        ConnectionSignal {
            link: LinkClass::Cellular4G,
            data_saver: false,
        },
        Viewport {
            scroll_top: 0,
            height: 800,
        },
        LoaderConfig::new(Url::parse("https://app.aula.dev/").unwrap()),
    )
}

fn cover_slot(id: u64, name: &str, top: i64) -> MediaSlot {
    MediaSlot {
        id: SlotId(id),
        resource: Url::parse(&format!("https://img.aulacdn.net/covers/{}.webp", name)).unwrap(),
        kind: MediaKind::Course,
        category: None,
        top,
        height: 200,
    }
}

#[tokio::test(start_paused = true)]
async fn test_visible_slot_loads_and_is_marked() {
    let fetcher = MutableFetch::new(&["/covers/rust101.webp"]);
    let (pipeline, mut events) = pipeline_with(fetcher);

    pipeline.observe(cover_slot(1, "rust101", 100));

    let event = timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("pipeline settled")
        .unwrap();
    assert_eq!(event.outcome, LoadOutcome::Loaded);
    assert_eq!(pipeline.mark_of(SlotId(1)), Some(SlotMark::Loaded));
    assert_eq!(pipeline.stats().loaded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_marks_slot_degraded() {
    // Only the placeholder assets resolve.
    let fetcher = MutableFetch::new(&[
        "/assets/placeholders/course.svg",
        "/assets/placeholders/generic.svg",
    ]);
    let (pipeline, mut events) = pipeline_with(fetcher);

    pipeline.observe(cover_slot(1, "rust101", 100));

    let event = timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("pipeline settled")
        .unwrap();
    assert_eq!(event.outcome, LoadOutcome::Degraded);
    assert_eq!(pipeline.mark_of(SlotId(1)), Some(SlotMark::Degraded));
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_then_manual_retry_recovers() {
    let fetcher = MutableFetch::new(&[]);
    let (pipeline, mut events) = pipeline_with(fetcher.clone());

    let slot = cover_slot(1, "rust101", 100);
    let resource = slot.resource.clone();
    pipeline.observe(slot);

    let event = timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("pipeline settled")
        .unwrap();
    assert_eq!(event.outcome, LoadOutcome::Failed);
    assert_eq!(pipeline.mark_of(SlotId(1)), Some(SlotMark::Unavailable));

    // Connectivity returns; the user taps retry.
    fetcher.allow("/covers/rust101.webp");
    let handle = pipeline.retry(resource, MediaKind::Course, None);
    handle.wait_terminal().await;

    let event = timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("pipeline settled")
        .unwrap();
    assert_eq!(event.outcome, LoadOutcome::Loaded);
    assert_eq!(pipeline.mark_of(SlotId(1)), Some(SlotMark::Loaded));
}

#[tokio::test(start_paused = true)]
async fn test_offscreen_slot_stays_idle_until_scrolled_near() {
    let fetcher = MutableFetch::new(&["/covers/deep.webp"]);
    let (pipeline, mut events) = pipeline_with(fetcher);

    // Far below the fold: neither visible nor imminent.
    pipeline.observe(cover_slot(1, "deep", 5000));
    tokio::task::yield_now().await;
    assert_eq!(pipeline.stats().enqueued, 0);

    // Scrolling close enough makes it imminent and the preload fires.
    pipeline.set_viewport(Viewport {
        scroll_top: 4000,
        height: 800,
    });

    let event = timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("pipeline settled")
        .unwrap();
    assert_eq!(event.outcome, LoadOutcome::Loaded);
}

#[tokio::test(start_paused = true)]
async fn test_policy_snapshot_follows_signal() {
    let fetcher = MutableFetch::new(&[]);
    let (pipeline, _events) = pipeline_with(fetcher);

    assert_eq!(
        pipeline.current_policy().timeout,
        Duration::from_millis(5_000)
    );

    pipeline.update_signal(ConnectionSignal {
        link: LinkClass::Cellular2G,
        data_saver: false,
    });
    assert_eq!(
        pipeline.current_policy().timeout,
        Duration::from_millis(15_000)
    );
    assert_eq!(pipeline.current_policy().max_concurrent, 1);
}

//! Drives the delivery pipeline against a canned fetcher and prints what
//! the scheduler did. Run with `RUST_LOG=debug` to watch the dispatch and
//! retry decisions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aula_core::{Fetch, FetchError, MediaKind, Method, Request, Response};
use aula_delivery::{
    ConnectionSignal, LinkClass, LoaderConfig, MediaPipeline, MediaSlot, SlotId, Viewport,
};
use bytes::Bytes;
use url::Url;

/// Serves covers instantly, except one asset that is always unreachable
struct CannedFetch;

#[async_trait]
impl Fetch for CannedFetch {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        let url = request.url().clone();
        if url.path().contains("broken") {
            return Err(FetchError::ConnectionError("no route to host".into()));
        }
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "image/webp".to_string());
        Ok(Response::new(
            200,
            headers,
            Bytes::from_static(b"\x52\x49\x46\x46"),
            url,
            Method::GET,
        ))
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let (pipeline, mut events) = MediaPipeline::new(
        Arc::new(CannedFetch),
        ConnectionSignal {
            link: LinkClass::Cellular3G,
            data_saver: false,
        },
        Viewport {
            scroll_top: 0,
            height: 800,
        },
        LoaderConfig::new(Url::parse("https://app.aula.dev/").unwrap()),
    );

    for (i, name) in ["rust101", "broken-cover", "tokio201"].iter().enumerate() {
        pipeline.observe(MediaSlot {
            id: SlotId(i as u64),
            resource: Url::parse(&format!("https://img.aulacdn.net/covers/{}.webp", name))
                .unwrap(),
            kind: MediaKind::Course,
            category: None,
            top: i as i64 * 300,
            height: 200,
        });
    }

    for _ in 0..3 {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(30), events.recv()).await
        {
            println!(
                "{} -> {:?} after {} attempts in {:?}",
                event.resource, event.outcome, event.attempts, event.elapsed
            );
        }
    }

    println!("scheduler stats: {:?}", pipeline.stats());
}

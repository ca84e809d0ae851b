// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Scraper behaviour against a mock origin.

use hls_swarm_config::ScraperConfig;
use hls_swarm_scraper::Scraper;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(listing_url: String) -> ScraperConfig {
    ScraperConfig {
        listing_url,
        interval: Duration::from_millis(50),
        jitter: Duration::from_millis(1),
        window: 5,
        request_timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn scrape_populates_and_windows_the_cache() {
    let server = MockServer::start().await;
    let listing = json!([
        {"name": "stream.m3u8", "type": "file", "size": 512, "mtime": "Mon, 01 Mar 2026 12:00:00 GMT"},
        {"name": "seg00001.ts", "type": "file", "size": 100},
        {"name": "seg00002.ts", "type": "file", "size": 200},
        {"name": "seg00003.ts", "type": "file", "size": 300},
        {"name": "seg00004.ts", "type": "file", "size": 400},
        {"name": "seg00005.ts", "type": "file", "size": 500},
        {"name": "seg00006.ts", "type": "file", "size": 600},
        {"name": "seg00007.ts", "type": "file", "size": 700},
        {"name": "seg00008.ts", "type": "file", "size": 800},
        {"name": "archive", "type": "directory"}
    ]);
    Mock::given(method("GET"))
        .and(path("/hls/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .mount(&server)
        .await;

    let scraper = Scraper::new(config(format!("{}/hls/", server.uri()))).unwrap();
    let _ = scraper.scrape_once().await.unwrap();

    let cache = scraper.cache();
    assert_eq!(cache.len(), 6);
    assert_eq!(cache.highest(), Some(8));
    assert_eq!(cache.get("seg00008.ts"), Some(800));
    assert_eq!(cache.get("seg00004.ts"), Some(400));
    assert_eq!(cache.get("seg00003.ts"), None);
    assert_eq!(cache.get("stream.m3u8"), Some(512));
}

#[tokio::test]
async fn non_2xx_leaves_cache_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hls/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let scraper = Scraper::new(config(format!("{}/hls/", server.uri()))).unwrap();
    assert!(scraper.scrape_once().await.is_err());
    assert!(scraper.cache().is_empty());
}

#[tokio::test]
async fn malformed_body_leaves_cache_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hls/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let scraper = Scraper::new(config(format!("{}/hls/", server.uri()))).unwrap();
    assert!(scraper.scrape_once().await.is_err());
    assert!(scraper.cache().is_empty());
}

#[tokio::test]
async fn run_counts_cycles_and_errors_and_stops_on_cancel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hls/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "seg1.ts", "type": "file", "size": 1}
        ])))
        .mount(&server)
        .await;

    let scraper = std::sync::Arc::new(
        Scraper::new(config(format!("{}/hls/", server.uri()))).unwrap(),
    );
    let cancel = tokio_util::sync::CancellationToken::new();
    let task = tokio::spawn({
        let scraper = scraper.clone();
        let cancel = cancel.clone();
        async move { scraper.run(cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(120)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("run should stop on cancel")
        .unwrap();

    assert!(scraper.scrape_cycles() >= 2);
    assert_eq!(scraper.scrape_errors(), 0);
    assert_eq!(scraper.cache().get("seg1.ts"), Some(1));
}

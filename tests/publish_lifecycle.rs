//! Integration tests for the publisher: handler loops, the first-cycle
//! barrier, the discovery feed, and shutdown.
//!
//! Each test publishes into its own temporary directory and inspects the
//! written tree.

use gbfs_sync::feed::{DiscoveryData, Feed, FeedName};
use gbfs_sync::server::{FeedHandler, Server, ServerError, ServerOptions, UpdateEvent};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BASE_URL: &str = "https://bikes.example.com";

fn options(root: &Path) -> ServerOptions {
    ServerOptions::new("bikes", root, BASE_URL)
        .with_base_path("v2")
        .with_version("2.3")
}

fn info(lang: &str) -> Feed {
    Feed::new(FeedName::SystemInformation, json!({"system_id": "bikes", "name": "Bikes"}))
        .with_language(lang)
}

fn station_feeds(lang: &str) -> Vec<Feed> {
    vec![
        Feed::new(FeedName::StationStatus, json!({"stations": []})).with_language(lang),
        Feed::new(FeedName::StationInformation, json!({"stations": []})).with_language(lang),
    ]
}

async fn wait_for_file(path: &Path) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(bytes) = std::fs::read(path) {
                return bytes;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} was never written", path.display()))
}

fn discovery_path(root: &Path) -> PathBuf {
    root.join("v2").join("gbfs.json")
}

fn read_discovery(bytes: &[u8]) -> DiscoveryData {
    let feed = Feed::from_json(FeedName::Gbfs, None, bytes).unwrap();
    feed.discovery_data().unwrap().clone()
}

fn listed_names(data: &DiscoveryData, lang: Option<&str>) -> Vec<String> {
    data.feeds_for(lang)
        .unwrap_or_default()
        .iter()
        .map(|e| e.name.clone())
        .collect()
}

// ============================================================================
// Publishing
// ============================================================================

#[tokio::test]
async fn test_publish_writes_feeds_and_sorted_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(
        options(dir.path())
            .with_handler(FeedHandler::new(|_| Ok(station_feeds("en"))))
            .with_handler(FeedHandler::new(|_| Ok(vec![info("en")]))),
    )
    .unwrap();
    let running = server.start().unwrap();

    let discovery = read_discovery(&wait_for_file(&discovery_path(dir.path())).await);
    assert_eq!(
        listed_names(&discovery, Some("en")),
        vec!["system_information", "station_information", "station_status"]
    );
    assert_eq!(
        discovery.resolve(FeedName::StationStatus, Some("en"), None),
        Ok("https://bikes.example.com/v2/en/station_status.json")
    );

    let bytes = std::fs::read(dir.path().join("v2/en/system_information.json")).unwrap();
    let published = Feed::from_json(FeedName::SystemInformation, Some("en"), &bytes).unwrap();
    assert_eq!(published.ttl(), 60);
    assert_eq!(published.version(), Some("2.3"));
    assert!(!published.is_expired());

    running.shutdown().await;
}

#[tokio::test]
async fn test_unlabelled_feeds_produce_flat_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(
        ServerOptions::new("bikes", dir.path(), BASE_URL).with_handler(FeedHandler::new(|_| {
            Ok(vec![Feed::new(FeedName::SystemAlerts, json!({"alerts": []}))])
        })),
    )
    .unwrap();
    let running = server.start().unwrap();

    let bytes = wait_for_file(&dir.path().join("gbfs.json")).await;
    let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        doc["data"],
        json!({"feeds": [{"name": "system_alerts", "url": "https://bikes.example.com/system_alerts.json"}]})
    );
    assert_eq!(doc["ttl"], json!(60));

    running.shutdown().await;
}

#[tokio::test]
async fn test_handler_path_overrides_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(
        options(dir.path())
            .with_handler(FeedHandler::new(|_| Ok(vec![info("sk")])).with_path("/about.json")),
    )
    .unwrap();
    let running = server.start().unwrap();

    let discovery = read_discovery(&wait_for_file(&discovery_path(dir.path())).await);
    assert_eq!(
        discovery.resolve(FeedName::SystemInformation, Some("sk"), None),
        Ok("https://bikes.example.com/v2/sk/about.json")
    );
    assert!(dir.path().join("v2/sk/about.json").is_file());

    running.shutdown().await;
}

// ============================================================================
// Barrier and failure isolation
// ============================================================================

#[tokio::test]
async fn test_failing_handler_still_releases_barrier() {
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);

    let server = Server::new(
        options(dir.path())
            .with_handler(FeedHandler::new(|_| anyhow::bail!("upstream unavailable")))
            .with_handler(FeedHandler::new(|_| Ok(vec![info("en")])))
            .with_update_handler(move |_, event| {
                let label = match event {
                    UpdateEvent::Published { path, .. } => format!("published {path}"),
                    UpdateEvent::WriteFailed { path, .. } => format!("failed {path}"),
                    UpdateEvent::HandlerFailed { error } => format!("handler {error}"),
                };
                seen.lock().unwrap().push(label);
            }),
    )
    .unwrap();
    let running = server.start().unwrap();

    let discovery = read_discovery(&wait_for_file(&discovery_path(dir.path())).await);
    assert_eq!(listed_names(&discovery, Some("en")), vec!["system_information"]);
    running.shutdown().await;

    let events = events.lock().unwrap();
    assert!(events.contains(&"handler upstream unavailable".to_owned()));
    assert!(events.contains(&"published /v2/en/system_information.json".to_owned()));
    assert!(events.contains(&"published /v2/gbfs.json".to_owned()));
}

#[tokio::test]
async fn test_discovery_waits_for_slow_first_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);

    let server = Server::new(
        options(dir.path())
            .with_handler(FeedHandler::new(|_| Ok(vec![info("en")])))
            .with_handler(FeedHandler::new(|_| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(station_feeds("en"))
            }))
            .with_update_handler(move |_, event| {
                if let UpdateEvent::Published { path, .. } = event {
                    seen.lock().unwrap().push(path.to_owned());
                }
            }),
    )
    .unwrap();
    let running = server.start().unwrap();

    let discovery = read_discovery(&wait_for_file(&discovery_path(dir.path())).await);
    assert_eq!(
        listed_names(&discovery, Some("en")),
        vec!["system_information", "station_information", "station_status"]
    );
    running.shutdown().await;

    let events = events.lock().unwrap();
    let position = |path: &str| events.iter().position(|p| p == path).unwrap();
    let gbfs = position("/v2/gbfs.json");
    assert!(position("/v2/en/system_information.json") < gbfs);
    assert!(position("/v2/en/station_status.json") < gbfs);
    assert!(position("/v2/en/station_information.json") < gbfs);
}

#[tokio::test]
async fn test_last_updated_advances_on_later_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(
        options(dir.path())
            .with_default_ttl(1)
            .with_handler(FeedHandler::new(|_| Ok(vec![info("en")]))),
    )
    .unwrap();
    let running = server.start().unwrap();

    let feed_path = dir.path().join("v2/en/system_information.json");
    let last_updated = |path: &Path| {
        let bytes = std::fs::read(path).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        doc["last_updated"].as_i64().unwrap()
    };

    wait_for_file(&discovery_path(dir.path())).await;
    let first_feed = last_updated(&feed_path);
    let first_discovery = last_updated(&discovery_path(dir.path()));

    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert!(last_updated(&feed_path) > first_feed);
    assert!(last_updated(&discovery_path(dir.path())) > first_discovery);

    running.shutdown().await;
}

#[tokio::test]
async fn test_one_shot_handler_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let cycles = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cycles);

    let server = Server::new(
        options(dir.path())
            .with_default_ttl(1)
            .with_handler(
                FeedHandler::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![info("en")])
                })
                .with_ttl(0),
            ),
    )
    .unwrap();
    let running = server.start().unwrap();

    wait_for_file(&discovery_path(dir.path())).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(cycles.load(Ordering::SeqCst), 1);

    let bytes = std::fs::read(dir.path().join("v2/en/system_information.json")).unwrap();
    let published = Feed::from_json(FeedName::SystemInformation, Some("en"), &bytes).unwrap();
    assert_eq!(published.ttl(), 0);
    assert!(!published.is_expired());

    running.shutdown().await;
}

#[tokio::test]
async fn test_discovery_is_frozen_after_first_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let cycles = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cycles);

    let server = Server::new(options(dir.path()).with_default_ttl(1).with_handler(
        FeedHandler::new(move |_| {
            let mut feeds = vec![info("en")];
            if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                feeds.extend(station_feeds("en"));
            }
            Ok(feeds)
        }),
    ))
    .unwrap();
    let running = server.start().unwrap();

    wait_for_file(&dir.path().join("v2/en/station_status.json")).await;
    // Let the discovery loop rewrite gbfs.json at least once more
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let discovery = read_discovery(&std::fs::read(discovery_path(dir.path())).unwrap());
    assert_eq!(listed_names(&discovery, Some("en")), vec!["system_information"]);

    running.shutdown().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_without_handlers_fails() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(options(dir.path())).unwrap();
    let err = server
        .run(tokio_util::sync::CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::MissingFeedHandlers));
}

#[tokio::test]
async fn test_run_returns_after_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(
        options(dir.path()).with_handler(FeedHandler::new(|_| Ok(vec![info("en")]))),
    )
    .unwrap();

    let cancel = tokio_util::sync::CancellationToken::new();
    let run = tokio::spawn({
        let server = server.clone();
        let cancel = cancel.clone();
        async move { server.run(cancel).await }
    });

    wait_for_file(&discovery_path(dir.path())).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("publisher did not stop")
        .unwrap();
    assert!(result.is_ok());
}

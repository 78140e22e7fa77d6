use super::discovery::{BarrierPermit, DiscoveryBarrier, DiscoveryIndex};
use super::writer::write_atomic;
use super::{FeedHandler, Server, ServerError, UpdateEvent};
use crate::feed::{DiscoveryEntry, Feed, FeedName, Timestamp};
use crate::util::{join_url, relative_feed_path};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Spawns one loop per handler plus the discovery loop.
pub(super) fn spawn_all(
    server: &Server,
    handlers: &[FeedHandler],
    cancel: &CancellationToken,
) -> JoinSet<()> {
    let index = Arc::new(DiscoveryIndex::new());
    let (barrier, permits) = DiscoveryBarrier::new(handlers.len());

    let mut tasks = JoinSet::new();
    for (handler, permit) in handlers.iter().cloned().zip(permits) {
        tasks.spawn(run_handler(
            server.clone(),
            handler,
            permit,
            Arc::clone(&index),
            cancel.clone(),
        ));
    }
    tasks.spawn(run_discovery(server.clone(), barrier, index, cancel.clone()));
    tasks
}

async fn run_handler(
    server: Server,
    handler: FeedHandler,
    mut permit: BarrierPermit,
    index: Arc<DiscoveryIndex>,
    cancel: CancellationToken,
) {
    let ttl = handler.ttl.unwrap_or_else(|| server.default_ttl());

    loop {
        let produced = tokio::select! {
            _ = cancel.cancelled() => break,
            produced = produce(&server, &handler) => produced,
        };

        let feeds = match produced {
            Ok(feeds) => feeds,
            Err(error) => {
                server.report(UpdateEvent::HandlerFailed { error: &error });
                break;
            }
        };

        for mut feed in feeds {
            let first_cycle = !permit.is_released();
            let published = publish(&server, &mut feed, handler.path.as_deref(), ttl).await;
            if let (true, Some(rel)) = (first_cycle, published) {
                if !feed.name().is_discovery() {
                    let url = join_url(server.base_url(), &rel);
                    index.add(feed.language(), DiscoveryEntry::new(feed.name(), url));
                }
            }
        }

        permit.release();
        if ttl == 0 {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(ttl)) => {}
        }
    }
}

async fn run_discovery(
    server: Server,
    barrier: DiscoveryBarrier,
    index: Arc<DiscoveryIndex>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = barrier.wait() => {}
    }

    let data = index.freeze();
    tracing::info!(
        system = %server.system_id(),
        feeds = data.len(),
        "Discovery barrier released"
    );

    let ttl = server.default_ttl();
    let mut feed = Feed::discovery(data);
    loop {
        publish(&server, &mut feed, None, ttl).await;
        if ttl == 0 {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(ttl)) => {}
        }
    }
}

async fn produce(server: &Server, handler: &FeedHandler) -> anyhow::Result<Vec<Feed>> {
    let produce = Arc::clone(&handler.produce);
    let server = server.clone();
    tokio::task::spawn_blocking(move || produce(&server))
        .await
        .unwrap_or_else(|e| Err(anyhow::anyhow!("feed handler panicked: {e}")))
}

/// Stamps and writes one feed, reporting the outcome. Returns the relative
/// path on success.
async fn publish(
    server: &Server,
    feed: &mut Feed,
    handler_path: Option<&str>,
    ttl: u64,
) -> Option<String> {
    feed.set_last_updated(Timestamp::now());
    if feed.ttl() == 0 {
        feed.set_ttl(ttl);
    }
    if let Some(version) = server.version() {
        feed.set_version(Some(version.to_owned()));
    }

    let file = match handler_path.map(|p| p.trim_matches('/')) {
        Some(path) if !path.is_empty() && !feed.name().is_discovery() => path.to_owned(),
        _ => feed.name().file_name(),
    };
    let rel = relative_feed_path(server.base_path(), feed.language(), &file);
    let display_path = format!("/{rel}");

    match write_feed(server, feed, &rel).await {
        Ok(()) => {
            server.report(UpdateEvent::Published {
                feed,
                path: &display_path,
            });
            Some(rel)
        }
        Err(error) => {
            server.report(UpdateEvent::WriteFailed {
                feed,
                path: &display_path,
                error: &error,
            });
            None
        }
    }
}

async fn write_feed(server: &Server, feed: &Feed, rel: &str) -> Result<(), ServerError> {
    let bytes = feed.to_json().map_err(|source| ServerError::Serialize {
        feed: feed.name().to_string(),
        source,
    })?;
    write_atomic(&server.root_dir().join(rel), &bytes).await
}

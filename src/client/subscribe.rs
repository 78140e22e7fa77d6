use super::{Client, ClientError};
use crate::feed::{Feed, FeedName};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Buffered events between the poll loops and the dispatcher.
const EVENT_BUFFER: usize = 32;
/// Feeds fetched concurrently while bootstrapping a subscription.
const BOOTSTRAP_CONCURRENCY: usize = 8;

/// One delivery to a subscription handler.
#[derive(Debug)]
pub enum FeedEvent {
    /// A feed was fetched (or served fresh from cache).
    Updated(Feed),
    /// Fetching a feed failed; its poll loop keeps running.
    Failed {
        feed: FeedName,
        language: Option<String>,
        error: ClientError,
    },
}

impl FeedEvent {
    pub fn feed_name(&self) -> FeedName {
        match self {
            FeedEvent::Updated(feed) => feed.name(),
            FeedEvent::Failed { feed, .. } => *feed,
        }
    }

    pub fn into_result(self) -> Result<Feed, ClientError> {
        match self {
            FeedEvent::Updated(feed) => Ok(feed),
            FeedEvent::Failed { error, .. } => Err(error),
        }
    }
}

/// Callback receiving every subscription event, in delivery order.
pub type SubscribeHandler = Box<dyn FnMut(&Client, FeedEvent) + Send>;

/// What to follow and where to deliver it.
///
/// `None` filters allow everything. The language filter applies to
/// language-keyed listings only; a flat listing has no languages to filter.
#[derive(Default)]
pub struct SubscribeOptions {
    pub languages: Option<Vec<String>>,
    pub feed_names: Option<Vec<FeedName>>,
    pub handler: Option<SubscribeHandler>,
}

impl SubscribeOptions {
    pub fn new(handler: impl FnMut(&Client, FeedEvent) + Send + 'static) -> Self {
        Self {
            languages: None,
            feed_names: None,
            handler: Some(Box::new(handler)),
        }
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = Some(languages.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_feed_names(mut self, names: impl IntoIterator<Item = FeedName>) -> Self {
        self.feed_names = Some(names.into_iter().collect());
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("languages", &self.languages)
            .field("feed_names", &self.feed_names)
            .field("handler", &self.handler.as_ref().map(|_| "set"))
            .finish()
    }
}

/// Allow-lists of a subscription, split from the handler so the bootstrap
/// can borrow them across awaits.
#[derive(Debug, Default)]
struct Filter {
    languages: Option<Vec<String>>,
    feed_names: Option<Vec<FeedName>>,
}

impl Filter {
    fn allows_feed(&self, name: FeedName) -> bool {
        self.feed_names
            .as_ref()
            .map_or(true, |names| names.contains(&name))
    }

    fn allows_language(&self, language: Option<&str>) -> bool {
        match (&self.languages, language) {
            (Some(allowed), Some(lang)) => allowed.iter().any(|l| l == lang),
            _ => true,
        }
    }
}

/// Re-fetch schedule for one subscribed feed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PollLoop {
    name: FeedName,
    language: Option<String>,
    ttl: u64,
}

impl Client {
    /// Follows every feed of the system until `cancel` fires.
    ///
    /// The discovery feed is fetched first and delivered; a failure there
    /// aborts the subscription with [`ClientError::DiscoveryUnavailable`] and
    /// no polling starts. Every listed feed passing the filters is then
    /// fetched once and delivered as [`FeedEvent::Updated`] or
    /// [`FeedEvent::Failed`], and gets its own poll loop that sleeps for the
    /// feed's TTL (the discovery TTL if the first fetch failed), re-fetches
    /// and delivers again. A TTL of `0` re-fetches once, bypassing the cache,
    /// and stops.
    ///
    /// Re-fetched values that are already expired are not delivered: they
    /// mean the publisher has not refreshed the document yet.
    ///
    /// All loops and the handler run under `cancel`; cancelling stops every
    /// loop and returns `Ok(())`.
    pub async fn subscribe(
        &self,
        options: SubscribeOptions,
        cancel: CancellationToken,
    ) -> Result<(), ClientError> {
        let SubscribeOptions {
            languages,
            feed_names,
            handler,
        } = options;
        let mut handler = handler.ok_or(ClientError::MissingSubscribeHandler)?;
        let filter = Filter {
            languages,
            feed_names,
        };

        let (tx, mut rx) = mpsc::channel::<FeedEvent>(EVENT_BUFFER);
        let mut pollers = JoinSet::new();

        let bootstrap = bootstrap(self, &filter, tx.clone());
        tokio::pin!(bootstrap);
        let mut bootstrapping = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Subscription cancelled");
                    break;
                }
                Some(event) = rx.recv() => handler(self, event),
                outcome = &mut bootstrap, if bootstrapping => {
                    bootstrapping = false;
                    match outcome {
                        Ok(loops) => {
                            tracing::info!(loops = loops.len(), "Subscription polling started");
                            for poll in loops {
                                pollers.spawn(run_poll_loop(
                                    self.clone(),
                                    poll,
                                    tx.clone(),
                                    cancel.clone(),
                                ));
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "Subscription bootstrap failed");
                            return Err(ClientError::DiscoveryUnavailable(Box::new(err)));
                        }
                    }
                }
                Some(joined) = pollers.join_next(), if !pollers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!(error = %e, "Poll loop ended abnormally");
                    }
                }
            }
        }

        pollers.shutdown().await;
        Ok(())
    }
}

/// Fetches the discovery feed and every selected feed once, delivering each
/// outcome, and returns the poll loops to start.
async fn bootstrap(
    client: &Client,
    filter: &Filter,
    tx: mpsc::Sender<FeedEvent>,
) -> Result<Vec<PollLoop>, ClientError> {
    let discovery = client.get(FeedName::Gbfs, None).await?;
    let fallback_ttl = discovery.ttl();

    let mut loops = Vec::new();
    if filter.allows_feed(FeedName::Gbfs) {
        loops.push(PollLoop {
            name: FeedName::Gbfs,
            language: None,
            ttl: fallback_ttl,
        });
    }

    let mut targets = Vec::new();
    if let Some(listing) = discovery.discovery_data() {
        for (language, entries) in listing.languages() {
            if !filter.allows_language(language) {
                continue;
            }
            for entry in entries {
                let Some(name) = entry.feed_name() else {
                    tracing::debug!(feed = %entry.name, "Skipping unknown feed type");
                    continue;
                };
                if name.is_discovery() || !filter.allows_feed(name) {
                    continue;
                }
                targets.push((name, language.map(str::to_owned)));
            }
        }
    }

    if tx.send(FeedEvent::Updated(discovery)).await.is_err() {
        return Ok(loops);
    }

    let mut fetches = stream::iter(targets)
        .map(|(name, language)| async move {
            let result = client.get(name, language.as_deref()).await;
            (name, language, result)
        })
        .buffer_unordered(BOOTSTRAP_CONCURRENCY);

    while let Some((name, language, result)) = fetches.next().await {
        let ttl = match &result {
            Ok(feed) => feed.ttl(),
            Err(_) => fallback_ttl,
        };
        loops.push(PollLoop {
            name,
            language: language.clone(),
            ttl,
        });

        let event = match result {
            Ok(feed) => FeedEvent::Updated(feed),
            Err(error) => {
                tracing::debug!(feed = %name, error = %error, "Initial fetch failed");
                FeedEvent::Failed {
                    feed: name,
                    language,
                    error,
                }
            }
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }

    Ok(loops)
}

async fn run_poll_loop(
    client: Client,
    poll: PollLoop,
    tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
) {
    tracing::debug!(
        feed = %poll.name,
        language = poll.language.as_deref().unwrap_or(""),
        ttl = poll.ttl,
        "Poll loop started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(poll.ttl)) => {}
        }

        let fetch = async {
            let language = poll.language.as_deref();
            if poll.ttl == 0 {
                // Never expires, so the cached copy would always be served
                client.refresh(poll.name, language).await
            } else {
                client.get(poll.name, language).await
            }
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = fetch => result,
        };

        let event = match result {
            // The publisher has not refreshed this document yet
            Ok(feed) if feed.is_expired() => {
                tracing::debug!(feed = %poll.name, "Suppressing stale feed");
                None
            }
            Ok(feed) => Some(FeedEvent::Updated(feed)),
            Err(error) => Some(FeedEvent::Failed {
                feed: poll.name,
                language: poll.language.clone(),
                error,
            }),
        };

        if let Some(event) = event {
            if tx.send(event).await.is_err() {
                break;
            }
        }

        if poll.ttl == 0 {
            break;
        }
    }

    tracing::debug!(feed = %poll.name, "Poll loop stopped");
}

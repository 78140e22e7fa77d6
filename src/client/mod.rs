//! Feed consumer.
//!
//! Resolves feed locations through the discovery feed, fetches them over
//! HTTP, keeps the results in a [`Cache`] until they expire, and offers
//! continuous delivery through [`Client::subscribe`].
//!
//! # Example
//!
//! ```ignore
//! use gbfs_sync::client::{Client, ClientOptions};
//! use gbfs_sync::feed::FeedName;
//!
//! let client = Client::new(ClientOptions::new("https://example.com/gbfs.json"))?;
//! let info = client.get(FeedName::SystemInformation, Some("en")).await?;
//! ```

mod error;
mod fetcher;
mod subscribe;

pub use error::ClientError;
pub use subscribe::{FeedEvent, SubscribeHandler, SubscribeOptions};

use crate::cache::{cache_key, Cache, InMemoryCache};
use crate::feed::{Feed, FeedName, ResolveError};
use crate::util::validate_feed_url;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "gbfs-client/1.0";
/// Per-request deadline of the default HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Largest accepted response body.
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Client construction options.
#[derive(Clone)]
pub struct ClientOptions {
    /// URL of the discovery feed (`gbfs.json`). Required.
    pub auto_discovery_url: String,
    /// Language bucket tried when the one a request names (or the unlabelled
    /// bucket, when it names none) is not listed.
    pub default_language: Option<String>,
    /// `User-Agent` header; [`DEFAULT_USER_AGENT`] when unset.
    pub user_agent: Option<String>,
    /// Deadline applied to the HTTP client built by [`Client::new`].
    /// Ignored when `http_client` is supplied.
    pub timeout: Duration,
    pub max_feed_size: usize,
    /// Feed store; an [`InMemoryCache`] when unset.
    pub cache: Option<Arc<dyn Cache>>,
    /// Pre-configured HTTP client (proxies, TLS roots, ...).
    pub http_client: Option<reqwest::Client>,
}

impl ClientOptions {
    pub fn new(auto_discovery_url: impl Into<String>) -> Self {
        Self {
            auto_discovery_url: auto_discovery_url.into(),
            default_language: None,
            user_agent: None,
            timeout: DEFAULT_TIMEOUT,
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
            cache: None,
            http_client: None,
        }
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = Some(language.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("auto_discovery_url", &self.auto_discovery_url)
            .field("default_language", &self.default_language)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .field("max_feed_size", &self.max_feed_size)
            .field("cache", &self.cache.as_ref().map(|_| "custom"))
            .field("http_client", &self.http_client.as_ref().map(|_| "custom"))
            .finish()
    }
}

struct ClientInner {
    http: reqwest::Client,
    cache: Arc<dyn Cache>,
    auto_discovery_url: String,
    default_language: Option<String>,
    user_agent: String,
    max_feed_size: usize,
    // Serializes discovery refreshes so concurrent gets share one fetch.
    discovery_refresh: tokio::sync::Mutex<()>,
}

/// GBFS consumer. Cloning is cheap and clones share the cache.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("auto_discovery_url", &self.inner.auto_discovery_url)
            .field("default_language", &self.inner.default_language)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// - [`ClientError::MissingAutoDiscoveryUrl`] if the URL is empty
    /// - [`ClientError::InvalidUrl`] if it is not an absolute http(s) URL
    /// - [`ClientError::HttpClient`] if the default HTTP client cannot be built
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        if options.auto_discovery_url.trim().is_empty() {
            return Err(ClientError::MissingAutoDiscoveryUrl);
        }
        validate_feed_url(&options.auto_discovery_url)?;

        let http = match options.http_client {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(options.timeout)
                .build()
                .map_err(ClientError::HttpClient)?,
        };

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                cache: options
                    .cache
                    .unwrap_or_else(|| Arc::new(InMemoryCache::new())),
                auto_discovery_url: options.auto_discovery_url,
                default_language: options.default_language.filter(|l| !l.is_empty()),
                user_agent: options
                    .user_agent
                    .filter(|ua| !ua.is_empty())
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
                max_feed_size: options.max_feed_size,
                discovery_refresh: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn auto_discovery_url(&self) -> &str {
        &self.inner.auto_discovery_url
    }

    pub fn default_language(&self) -> Option<&str> {
        self.inner.default_language.as_deref()
    }

    /// Returns the feed `name` in `language`, from cache while it is fresh.
    ///
    /// On a miss the discovery feed is consulted (and fetched first if it is
    /// missing or expired), the URL is resolved with default-language
    /// fallback, the document is fetched, and the result is cached under
    /// `name:language`. The returned feed is a copy the caller owns.
    ///
    /// # Errors
    ///
    /// - [`ClientError::DiscoveryUnavailable`] if the discovery feed cannot be fetched
    /// - [`ClientError::Language`] if neither `language` nor the default is listed
    /// - [`ClientError::NotFound`] if the feed is not listed or the server answers 404
    /// - [`ClientError::Status`], [`ClientError::Network`], [`ClientError::Timeout`],
    ///   [`ClientError::ResponseTooLarge`] for transport failures
    /// - [`ClientError::Decode`] if the body is not a valid feed document
    pub async fn get(&self, name: FeedName, language: Option<&str>) -> Result<Feed, ClientError> {
        if name.is_discovery() {
            return self.discovery().await;
        }

        let language = language.filter(|l| !l.is_empty());
        if let Some(feed) = self.fresh(&cache_key(name, language)) {
            return Ok(feed);
        }
        self.refresh(name, language).await
    }

    /// Like [`Client::get`], but skips the cache read and always fetches,
    /// replacing the cached copy. A feed with a TTL of `0` never expires, so
    /// this is the only way to see a newer revision of it.
    pub async fn refresh(
        &self,
        name: FeedName,
        language: Option<&str>,
    ) -> Result<Feed, ClientError> {
        if name.is_discovery() {
            let _refresh = self.inner.discovery_refresh.lock().await;
            return self.fetch_discovery().await;
        }

        let language = language.filter(|l| !l.is_empty());
        let discovery = self
            .discovery()
            .await
            .map_err(|e| ClientError::DiscoveryUnavailable(Box::new(e)))?;
        let url = self.resolve(&discovery, name, language)?;

        let feed = self.get_url(&url, name, language).await?;
        self.inner.cache.set(&cache_key(name, language), feed.clone());
        Ok(feed)
    }

    /// Fetches and decodes one document without consulting or filling the cache.
    pub async fn get_url(
        &self,
        url: &str,
        name: FeedName,
        language: Option<&str>,
    ) -> Result<Feed, ClientError> {
        let bytes = fetcher::fetch_document(
            &self.inner.http,
            url,
            &self.inner.user_agent,
            self.inner.max_feed_size,
            name,
        )
        .await?;

        let feed = Feed::from_json(name, language, &bytes)
            .map_err(|source| ClientError::Decode { feed: name, source })?;
        tracing::debug!(
            feed = %name,
            language = language.unwrap_or(""),
            url = %url,
            ttl = feed.ttl(),
            last_updated = feed.last_updated().as_secs(),
            "Fetched feed"
        );
        Ok(feed)
    }

    fn fresh(&self, key: &str) -> Option<Feed> {
        self.inner.cache.get(key).filter(|feed| !feed.is_expired())
    }

    async fn discovery(&self) -> Result<Feed, ClientError> {
        let key = cache_key(FeedName::Gbfs, None);
        if let Some(feed) = self.fresh(&key) {
            return Ok(feed);
        }

        let _refresh = self.inner.discovery_refresh.lock().await;
        // Another task may have refreshed it while we waited for the lock
        if let Some(feed) = self.fresh(&key) {
            return Ok(feed);
        }

        self.fetch_discovery().await
    }

    async fn fetch_discovery(&self) -> Result<Feed, ClientError> {
        let feed = self
            .get_url(&self.inner.auto_discovery_url, FeedName::Gbfs, None)
            .await?;
        self.inner
            .cache
            .set(&cache_key(FeedName::Gbfs, None), feed.clone());
        Ok(feed)
    }

    fn resolve(
        &self,
        discovery: &Feed,
        name: FeedName,
        language: Option<&str>,
    ) -> Result<String, ClientError> {
        let listing = discovery
            .discovery_data()
            .ok_or(ClientError::NotFound(name))?;
        listing
            .resolve(name, language, self.default_language())
            .map(str::to_owned)
            .map_err(|e| match e {
                ResolveError::Language { requested, default } => ClientError::Language {
                    feed: name,
                    requested,
                    default,
                },
                ResolveError::NotFound(feed) => ClientError::NotFound(feed),
            })
    }
}

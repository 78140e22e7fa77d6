//! Feed publisher.
//!
//! Runs one refresh loop per [`FeedHandler`], writes every produced feed
//! under the publish root, and maintains the discovery feed (`gbfs.json`)
//! listing what the handlers published during their first cycle.
//!
//! # Example
//!
//! ```ignore
//! use gbfs_sync::server::{FeedHandler, Server, ServerOptions};
//!
//! let options = ServerOptions::new("bikes", "public", "https://example.com")
//!     .with_handler(FeedHandler::new(|_| Ok(vec![system_information()])));
//! Server::new(options)?.run(cancel).await?;
//! ```

mod discovery;
mod error;
mod publish;
mod source;
mod writer;

pub use error::ServerError;
pub use source::static_handlers;

use crate::feed::Feed;
use crate::util::validate_feed_url;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// TTL used by [`ServerOptions::new`].
pub const DEFAULT_TTL: u64 = 60;

/// Produces the feeds of one handler for one cycle.
pub type Producer = Arc<dyn Fn(&Server) -> anyhow::Result<Vec<Feed>> + Send + Sync>;

/// Observer of every publish attempt.
pub type UpdateHandler = Arc<dyn Fn(&Server, UpdateEvent<'_>) + Send + Sync>;

/// One source of feeds, refreshed on its own schedule.
#[derive(Clone)]
pub struct FeedHandler {
    /// Refresh interval in seconds. `None` inherits the server default;
    /// `Some(0)` publishes once and stops.
    pub ttl: Option<u64>,
    /// File name relative to the language directory. Defaults to
    /// `{feed_name}.json`.
    pub path: Option<String>,
    produce: Producer,
}

impl FeedHandler {
    /// `produce` runs on the blocking pool once per cycle. Returning an error
    /// stops this handler for good.
    pub fn new<F>(produce: F) -> Self
    where
        F: Fn(&Server) -> anyhow::Result<Vec<Feed>> + Send + Sync + 'static,
    {
        Self {
            ttl: None,
            path: None,
            produce: Arc::new(produce),
        }
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Debug for FeedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedHandler")
            .field("ttl", &self.ttl)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Outcome of one publish attempt.
#[derive(Debug)]
pub enum UpdateEvent<'a> {
    /// The feed was written to `path` (relative to the publish root, with a
    /// leading slash).
    Published { feed: &'a Feed, path: &'a str },
    /// Writing the feed failed; the handler keeps its schedule.
    WriteFailed {
        feed: &'a Feed,
        path: &'a str,
        error: &'a ServerError,
    },
    /// The production function failed; its handler has stopped.
    HandlerFailed { error: &'a anyhow::Error },
}

/// Publisher configuration.
#[derive(Clone)]
pub struct ServerOptions {
    pub system_id: String,
    /// Directory the feed tree is written into.
    pub root_dir: PathBuf,
    /// Public URL the publish root is served under.
    pub base_url: String,
    /// Sub-directory of the publish root (and URL path) for this system.
    pub base_path: String,
    /// Stamped into every published feed when set.
    pub version: Option<String>,
    /// TTL of the discovery feed and of handlers without their own.
    pub default_ttl: u64,
    pub feed_handlers: Vec<FeedHandler>,
    /// Receives every publish outcome; outcomes are logged when unset.
    pub update_handler: Option<UpdateHandler>,
}

impl ServerOptions {
    pub fn new(
        system_id: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            system_id: system_id.into(),
            root_dir: root_dir.into(),
            base_url: base_url.into(),
            base_path: String::new(),
            version: None,
            default_ttl: DEFAULT_TTL,
            feed_handlers: Vec::new(),
            update_handler: None,
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_default_ttl(mut self, ttl: u64) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_handler(mut self, handler: FeedHandler) -> Self {
        self.feed_handlers.push(handler);
        self
    }

    pub fn with_update_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Server, UpdateEvent<'_>) + Send + Sync + 'static,
    {
        self.update_handler = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("system_id", &self.system_id)
            .field("root_dir", &self.root_dir)
            .field("base_url", &self.base_url)
            .field("base_path", &self.base_path)
            .field("version", &self.version)
            .field("default_ttl", &self.default_ttl)
            .field("feed_handlers", &self.feed_handlers)
            .field("update_handler", &self.update_handler.as_ref().map(|_| "set"))
            .finish()
    }
}

struct ServerInner {
    options: ServerOptions,
}

/// GBFS publisher. Cloning is cheap.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("system_id", &self.system_id())
            .field("root_dir", &self.root_dir())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// One distinct error per missing or invalid field, checked in the order
    /// system id, root directory, base URL, default TTL.
    pub fn new(options: ServerOptions) -> Result<Self, ServerError> {
        if options.system_id.trim().is_empty() {
            return Err(ServerError::MissingSystemId);
        }
        if options.root_dir.as_os_str().is_empty() {
            return Err(ServerError::MissingRootDir);
        }
        if options.base_url.trim().is_empty() {
            return Err(ServerError::MissingBaseUrl);
        }
        validate_feed_url(&options.base_url).map_err(ServerError::InvalidBaseUrl)?;
        if options.default_ttl == 0 {
            return Err(ServerError::InvalidDefaultTtl);
        }

        Ok(Self {
            inner: Arc::new(ServerInner { options }),
        })
    }

    pub fn system_id(&self) -> &str {
        &self.inner.options.system_id
    }

    pub fn root_dir(&self) -> &Path {
        &self.inner.options.root_dir
    }

    pub fn base_url(&self) -> &str {
        &self.inner.options.base_url
    }

    pub fn base_path(&self) -> &str {
        &self.inner.options.base_path
    }

    pub fn version(&self) -> Option<&str> {
        self.inner.options.version.as_deref()
    }

    pub fn default_ttl(&self) -> u64 {
        self.inner.options.default_ttl
    }

    /// Starts every handler loop and the discovery loop on the current
    /// runtime.
    ///
    /// # Errors
    ///
    /// [`ServerError::MissingFeedHandlers`] if no handler is registered.
    pub fn start(&self) -> Result<RunningServer, ServerError> {
        self.start_with(CancellationToken::new())
    }

    /// Publishes until `cancel` fires or every loop has finished.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        self.start_with(cancel)?.wait().await;
        Ok(())
    }

    fn start_with(&self, cancel: CancellationToken) -> Result<RunningServer, ServerError> {
        let handlers = &self.inner.options.feed_handlers;
        if handlers.is_empty() {
            return Err(ServerError::MissingFeedHandlers);
        }

        let tasks = publish::spawn_all(self, handlers, &cancel);
        tracing::info!(
            system = %self.system_id(),
            handlers = handlers.len(),
            root = %self.root_dir().display(),
            "Publisher started"
        );

        Ok(RunningServer { cancel, tasks })
    }

    fn report(&self, event: UpdateEvent<'_>) {
        match &self.inner.options.update_handler {
            Some(handler) => handler(self, event),
            None => log_update(self, &event),
        }
    }
}

fn log_update(server: &Server, event: &UpdateEvent<'_>) {
    match event {
        UpdateEvent::Published { feed, path } => tracing::info!(
            system = %server.system_id(),
            ttl = feed.ttl(),
            path = %path,
            "Feed published"
        ),
        UpdateEvent::WriteFailed { feed, path, error } => tracing::warn!(
            system = %server.system_id(),
            feed = %feed.name(),
            path = %path,
            error = %error,
            "Feed write failed"
        ),
        UpdateEvent::HandlerFailed { error } => tracing::error!(
            system = %server.system_id(),
            error = %error,
            "Feed handler failed, stopping it"
        ),
    }
}

/// Supervisor handle of a started publisher.
#[derive(Debug)]
pub struct RunningServer {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl RunningServer {
    /// Token cancelling every loop of this publisher.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops every loop and waits for in-flight writes to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.wait().await;
    }

    /// Waits until every loop has stopped. Loops with a non-zero TTL only
    /// stop on cancellation.
    pub async fn wait(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Publish loop ended abnormally");
            }
        }
        tracing::debug!("Publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ServerOptions {
        ServerOptions::new("bikes", "/srv/gbfs", "https://example.com")
    }

    #[test]
    fn test_new_validates_fields_in_order() {
        let err = Server::new(ServerOptions::new("", "", "")).unwrap_err();
        assert!(matches!(err, ServerError::MissingSystemId));

        let err = Server::new(ServerOptions::new("bikes", "", "")).unwrap_err();
        assert!(matches!(err, ServerError::MissingRootDir));

        let err = Server::new(ServerOptions::new("bikes", "/srv", "")).unwrap_err();
        assert!(matches!(err, ServerError::MissingBaseUrl));

        let err = Server::new(ServerOptions::new("bikes", "/srv", "ftp://x")).unwrap_err();
        assert!(matches!(err, ServerError::InvalidBaseUrl(_)));

        let err = Server::new(options().with_default_ttl(0)).unwrap_err();
        assert!(matches!(err, ServerError::InvalidDefaultTtl));
    }

    #[test]
    fn test_accessors() {
        let server = Server::new(options().with_base_path("v2").with_version("2.3")).unwrap();
        assert_eq!(server.system_id(), "bikes");
        assert_eq!(server.base_path(), "v2");
        assert_eq!(server.version(), Some("2.3"));
        assert_eq!(server.default_ttl(), DEFAULT_TTL);
    }

    #[tokio::test]
    async fn test_start_requires_handlers() {
        let server = Server::new(options()).unwrap();
        assert!(matches!(
            server.start(),
            Err(ServerError::MissingFeedHandlers)
        ));
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gbfs_sync::client::{Client, FeedEvent, SubscribeOptions};
use gbfs_sync::config::Config;
use gbfs_sync::feed::FeedName;
use gbfs_sync::server::{static_handlers, Server};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "gbfs-sync", about = "Publish and follow GBFS feeds")]
struct Args {
    /// Config file (default: ~/.config/gbfs-sync/config.toml)
    #[arg(long, short, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Discovery URL, overriding `client.auto_discovery_url`
    #[arg(long, value_name = "URL", global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one feed as JSON
    Fetch {
        /// Feed name, e.g. `station_status`
        feed: FeedName,
        #[arg(long, short)]
        language: Option<String>,
    },
    /// Follow every feed of a system and log updates until Ctrl-C
    Watch {
        /// Only follow these feeds (repeatable)
        #[arg(long = "feed", value_name = "FEED")]
        feeds: Vec<FeedName>,
        /// Only follow these languages (repeatable)
        #[arg(long = "language", value_name = "LANG")]
        languages: Vec<String>,
    },
    /// Publish the payload files of `server.source_dir` until Ctrl-C
    Publish {
        /// Overrides `server.source_dir`
        #[arg(long, value_name = "DIR")]
        source: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries `fetch` output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Fetch { feed, language } => {
            let client = build_client(&config, args.url)?;
            let feed = client
                .get(feed, language.as_deref())
                .await
                .with_context(|| format!("Failed to fetch {feed}"))?;
            let json = serde_json::to_string_pretty(&feed).context("Failed to encode feed")?;
            println!("{json}");
        }
        Command::Watch { feeds, languages } => {
            let client = build_client(&config, args.url)?;
            let mut options = SubscribeOptions::new(log_event);
            if !feeds.is_empty() {
                options = options.with_feed_names(feeds);
            }
            if !languages.is_empty() {
                options = options.with_languages(languages);
            }

            let cancel = shutdown_on_ctrl_c();
            client
                .subscribe(options, cancel)
                .await
                .context("Subscription failed")?;
        }
        Command::Publish { source } => {
            let source_dir = source
                .or_else(|| config.server.source_dir.clone())
                .context("No source directory: pass --source or set server.source_dir")?;

            let handlers = static_handlers(&source_dir).with_context(|| {
                format!("Failed to read source directory {}", source_dir.display())
            })?;
            if handlers.is_empty() {
                anyhow::bail!("No feed payloads found in {}", source_dir.display());
            }

            let mut options = config.server.to_options();
            options.feed_handlers = handlers;
            let server = Server::new(options).context("Invalid [server] configuration")?;

            server
                .run(shutdown_on_ctrl_c())
                .await
                .context("Publisher failed")?;
        }
    }

    Ok(())
}

fn build_client(config: &Config, url: Option<String>) -> Result<Client> {
    let mut options = config
        .client
        .to_options()
        .context("Invalid [client] configuration")?;
    if let Some(url) = url {
        options.auto_discovery_url = url;
    }
    Client::new(options).context("Failed to create client")
}

fn log_event(_: &Client, event: FeedEvent) {
    match event {
        FeedEvent::Updated(feed) => tracing::info!(
            feed = %feed.name(),
            language = feed.language().unwrap_or(""),
            last_updated = feed.last_updated().as_secs(),
            ttl = feed.ttl(),
            "Feed updated"
        ),
        FeedEvent::Failed {
            feed,
            language,
            error,
        } if error.is_transient() => tracing::warn!(
            feed = %feed,
            language = language.as_deref().unwrap_or(""),
            error = %error,
            "Feed fetch failed, retrying on next poll"
        ),
        FeedEvent::Failed {
            feed,
            language,
            error,
        } => tracing::error!(
            feed = %feed,
            language = language.as_deref().unwrap_or(""),
            error = %error,
            "Feed fetch failed"
        ),
    }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutting down");
                trigger.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
    cancel
}

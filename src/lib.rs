//! Publish and consume GBFS feeds.
//!
//! The [`server`] side refreshes feeds from handler functions on their TTL and
//! writes them, plus the `gbfs.json` discovery feed, into a static file tree.
//! The [`client`] side discovers feeds through `gbfs.json`, caches them until
//! they expire, and can follow a whole system with [`client::Client::subscribe`].

pub mod cache;
pub mod client;
pub mod config;
pub mod feed;
pub mod server;
pub mod util;

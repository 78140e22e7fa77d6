//! Feed contract shared by the publisher and the consumer.
//!
//! - `name`: the registry of known feed types and their canonical order
//! - `model`: [`Feed`], its JSON document shape and the expiry rule
//! - `discovery`: the `gbfs.json` listing and language resolution
//!
//! Payloads other than the discovery listing are opaque `serde_json::Value`s;
//! nothing in this crate looks inside them.

mod discovery;
mod model;
mod name;

pub use discovery::{DiscoveryData, DiscoveryEntry, DiscoveryFeeds, ResolveError};
pub use model::{Feed, FeedData, Timestamp};
pub use name::{FeedName, UnknownFeedName};

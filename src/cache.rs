//! Key → [`Feed`] stores used by the client.
//!
//! A cache never judges freshness itself: it hands back whatever was last
//! stored and the caller asks the feed whether it [`Feed::is_expired`].
//! Both implementations return owned copies, so a caller mutating the feed it
//! got back can never corrupt the stored entry.

use crate::feed::{Feed, FeedName};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, RwLock};
use thiserror::Error;

/// Storage contract for fetched feeds.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Feed>;
    fn set(&self, key: &str, feed: Feed);
}

/// Cache key for a feed: the bare name for the discovery feed and for feeds
/// without a language, `name:language` otherwise.
pub fn cache_key(name: FeedName, language: Option<&str>) -> String {
    match language {
        Some(lang) if !name.is_discovery() && !lang.is_empty() => {
            format!("{}:{}", name.as_str(), lang)
        }
        _ => name.as_str().to_owned(),
    }
}

/// Unbounded in-memory cache guarded by a read/write lock.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    feeds: RwLock<HashMap<String, Feed>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.feeds.read().map(|m| m.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Option<Feed> {
        let feeds = self.feeds.read().unwrap_or_else(|e| e.into_inner());
        feeds.get(key).cloned()
    }

    fn set(&self, key: &str, feed: Feed) {
        let mut feeds = self.feeds.write().unwrap_or_else(|e| e.into_inner());
        feeds.insert(key.to_owned(), feed);
    }
}

#[derive(Debug, Error)]
#[error("cache capacity must be greater than zero")]
pub struct ZeroCapacity;

/// Capacity-bounded cache evicting the least recently used feed.
///
/// Meant for consumers that follow many systems at once; a single system
/// never has more than a few dozen keys.
pub struct LruFeedCache {
    feeds: Mutex<LruCache<String, Feed>>,
}

impl LruFeedCache {
    pub fn new(capacity: usize) -> Result<Self, ZeroCapacity> {
        let capacity = NonZeroUsize::new(capacity).ok_or(ZeroCapacity)?;
        Ok(Self {
            feeds: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn len(&self) -> usize {
        self.feeds.lock().map(|c| c.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for LruFeedCache {
    fn get(&self, key: &str) -> Option<Feed> {
        // LRU lookups reorder the list, so even reads take the exclusive lock.
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        feeds.get(key).cloned()
    }

    fn set(&self, key: &str, feed: Feed) {
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        feeds.put(key.to_owned(), feed);
    }
}

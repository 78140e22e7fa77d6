use super::name::FeedName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One `{name, url}` row of the discovery listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEntry {
    pub name: String,
    pub url: String,
}

impl DiscoveryEntry {
    pub fn new(name: FeedName, url: impl Into<String>) -> Self {
        Self {
            name: name.as_str().to_owned(),
            url: url.into(),
        }
    }

    /// Registry lookup of the listed name; `None` for feeds this crate does not know.
    pub fn feed_name(&self) -> Option<FeedName> {
        self.name.parse().ok()
    }
}

/// The `{"feeds": [...]}` object listed per language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryFeeds {
    pub feeds: Vec<DiscoveryEntry>,
}

/// Payload of the discovery feed (`gbfs.json`).
///
/// Older revisions key the listing by language; later revisions publish a
/// single flat `feeds` list. Both shapes are accepted on decode. `Flat` is
/// tried first: a language-keyed object never has a top-level `feeds` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiscoveryData {
    Flat(DiscoveryFeeds),
    ByLanguage(BTreeMap<String, DiscoveryFeeds>),
}

impl Default for DiscoveryData {
    fn default() -> Self {
        DiscoveryData::ByLanguage(BTreeMap::new())
    }
}

/// Why a feed URL could not be resolved from the listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Neither the requested nor the default language has a listing.
    #[error("no listing for language {requested:?} or default language {default:?}")]
    Language {
        requested: Option<String>,
        default: Option<String>,
    },
    /// The language listing exists but does not name the feed.
    #[error("feed {0} is not listed")]
    NotFound(FeedName),
}

impl DiscoveryData {
    /// Build the listing from language buckets. Feeds without a language are
    /// bucketed under `""`; when that is the only bucket the flat shape is used.
    pub fn from_buckets(buckets: BTreeMap<String, Vec<DiscoveryEntry>>) -> Self {
        if buckets.len() == 1 && buckets.contains_key("") {
            let feeds = buckets.into_values().next().unwrap_or_default();
            return DiscoveryData::Flat(DiscoveryFeeds { feeds });
        }
        DiscoveryData::ByLanguage(
            buckets
                .into_iter()
                .map(|(lang, feeds)| (lang, DiscoveryFeeds { feeds }))
                .collect(),
        )
    }

    /// Every `(language, feeds)` bucket. The flat shape, and the `""` bucket,
    /// report no language.
    pub fn languages(&self) -> Vec<(Option<&str>, &[DiscoveryEntry])> {
        match self {
            DiscoveryData::Flat(listing) => vec![(None, listing.feeds.as_slice())],
            DiscoveryData::ByLanguage(map) => map
                .iter()
                .map(|(lang, listing)| {
                    let lang = (!lang.is_empty()).then_some(lang.as_str());
                    (lang, listing.feeds.as_slice())
                })
                .collect(),
        }
    }

    /// The bucket listed for `language`. The flat shape answers every language.
    pub fn feeds_for(&self, language: Option<&str>) -> Option<&[DiscoveryEntry]> {
        match self {
            DiscoveryData::Flat(listing) => Some(listing.feeds.as_slice()),
            DiscoveryData::ByLanguage(map) => map
                .get(language.unwrap_or(""))
                .map(|listing| listing.feeds.as_slice()),
        }
    }

    /// Total number of listed feeds across all languages.
    pub fn len(&self) -> usize {
        self.languages().iter().map(|(_, feeds)| feeds.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the URL of `name`.
    ///
    /// The feed's own language bucket is tried first (`""` when unlabelled),
    /// then the default language. The flat shape ignores languages entirely.
    pub fn resolve(
        &self,
        name: FeedName,
        language: Option<&str>,
        default_language: Option<&str>,
    ) -> Result<&str, ResolveError> {
        let feeds = match self {
            DiscoveryData::Flat(listing) => &listing.feeds,
            DiscoveryData::ByLanguage(map) => {
                let listing = map
                    .get(language.unwrap_or(""))
                    .or_else(|| map.get(default_language.unwrap_or("")))
                    .ok_or_else(|| ResolveError::Language {
                        requested: language.map(str::to_owned),
                        default: default_language.map(str::to_owned),
                    })?;
                &listing.feeds
            }
        };
        feeds
            .iter()
            .find(|entry| entry.name == name.as_str())
            .map(|entry| entry.url.as_str())
            .ok_or(ResolveError::NotFound(name))
    }

    /// Sort every bucket into canonical feed order. Names outside the
    /// registry keep their relative order after the known ones.
    pub fn sort_canonical(&mut self) {
        let key = |entry: &DiscoveryEntry| {
            entry
                .feed_name()
                .map(FeedName::canonical_index)
                .unwrap_or(usize::MAX)
        };
        match self {
            DiscoveryData::Flat(listing) => listing.feeds.sort_by_key(key),
            DiscoveryData::ByLanguage(map) => {
                for listing in map.values_mut() {
                    listing.feeds.sort_by_key(key);
                }
            }
        }
    }
}

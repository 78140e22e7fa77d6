use super::discovery::DiscoveryData;
use super::name::FeedName;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Seconds since the Unix epoch.
///
/// Always written as an integer. On read, integers, floats, numeric strings
/// and RFC 3339 strings are accepted since publishers disagree on the format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp())
    }

    pub fn as_secs(self) -> i64 {
        self.0
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a unix timestamp or an RFC 3339 date-time")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
                Ok(Timestamp(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
                i64::try_from(v)
                    .map(Timestamp)
                    .map_err(|_| E::custom("timestamp out of range"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timestamp, E> {
                Ok(Timestamp(v as i64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
                if let Ok(secs) = v.trim().parse::<f64>() {
                    return Ok(Timestamp(secs as i64));
                }
                DateTime::parse_from_rfc3339(v)
                    .map(|dt| Timestamp(dt.timestamp()))
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// Feed payload.
///
/// The discovery feed carries a typed listing; every other feed carries an
/// opaque JSON value the engine never inspects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeedData {
    Discovery(DiscoveryData),
    Payload(serde_json::Value),
}

/// One GBFS document plus the metadata the engine stamps on it.
///
/// `name` is fixed at construction. `language` is a routing label only and is
/// never part of the JSON document. `Clone` is a full deep copy, which is what
/// the client hands out so callers can never mutate a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    name: FeedName,
    language: Option<String>,
    last_updated: Timestamp,
    ttl: u64,
    version: Option<String>,
    data: FeedData,
}

#[derive(Serialize)]
struct FeedDocumentRef<'a> {
    last_updated: Timestamp,
    ttl: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    data: &'a FeedData,
}

#[derive(Deserialize)]
struct FeedDocument<D> {
    #[serde(default)]
    last_updated: Timestamp,
    #[serde(default)]
    ttl: u64,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    data: D,
}

impl Feed {
    /// A feed with an opaque payload. Use [`Feed::discovery`] for `gbfs`.
    pub fn new(name: FeedName, payload: serde_json::Value) -> Self {
        Self::with_data(name, FeedData::Payload(payload))
    }

    /// The discovery feed with the given listing.
    pub fn discovery(data: DiscoveryData) -> Self {
        Self::with_data(FeedName::Gbfs, FeedData::Discovery(data))
    }

    /// Registry constructor: a blank instance of the variant selected by `name`.
    pub fn empty(name: FeedName) -> Self {
        match name {
            FeedName::Gbfs => Self::discovery(DiscoveryData::default()),
            other => Self::new(other, serde_json::Value::Null),
        }
    }

    fn with_data(name: FeedName, data: FeedData) -> Self {
        Self {
            name,
            language: None,
            last_updated: Timestamp::default(),
            ttl: 0,
            version: None,
            data,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.set_language(Some(language.into()));
        self
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn name(&self) -> FeedName {
        self.name
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Empty strings are normalised to "no language".
    pub fn set_language(&mut self, language: Option<String>) {
        self.language = language.filter(|l| !l.is_empty());
    }

    pub fn last_updated(&self) -> Timestamp {
        self.last_updated
    }

    pub fn set_last_updated(&mut self, ts: Timestamp) {
        self.last_updated = ts;
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub fn set_ttl(&mut self, ttl: u64) {
        self.ttl = ttl;
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: Option<String>) {
        self.version = version.filter(|v| !v.is_empty());
    }

    pub fn data(&self) -> &FeedData {
        &self.data
    }

    pub fn discovery_data(&self) -> Option<&DiscoveryData> {
        match &self.data {
            FeedData::Discovery(data) => Some(data),
            FeedData::Payload(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match &self.data {
            FeedData::Payload(value) => Some(value),
            FeedData::Discovery(_) => None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Timestamp::now())
    }

    /// A feed with `ttl == 0` never expires. Otherwise it is expired strictly
    /// after `last_updated + ttl`; the boundary second itself is still fresh.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        if self.ttl == 0 {
            return false;
        }
        let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        now.0 > self.last_updated.0.saturating_add(ttl)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode a document whose variant is already known from its name.
    pub fn from_json(
        name: FeedName,
        language: Option<&str>,
        bytes: &[u8],
    ) -> serde_json::Result<Self> {
        let mut feed = match name {
            FeedName::Gbfs => {
                let doc: FeedDocument<DiscoveryData> = serde_json::from_slice(bytes)?;
                Self::from_document(name, doc, FeedData::Discovery)
            }
            other => {
                let doc: FeedDocument<serde_json::Value> = serde_json::from_slice(bytes)?;
                Self::from_document(other, doc, FeedData::Payload)
            }
        };
        feed.set_language(language.map(str::to_owned));
        Ok(feed)
    }

    fn from_document<D>(name: FeedName, doc: FeedDocument<D>, wrap: fn(D) -> FeedData) -> Self {
        let mut feed = Self::with_data(name, wrap(doc.data));
        feed.last_updated = doc.last_updated;
        feed.ttl = doc.ttl;
        feed.set_version(doc.version);
        feed
    }
}

impl Serialize for Feed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FeedDocumentRef {
            last_updated: self.last_updated,
            ttl: self.ttl,
            version: self.version.as_deref(),
            data: &self.data,
        }
        .serialize(serializer)
    }
}

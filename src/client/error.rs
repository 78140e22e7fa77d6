use crate::feed::FeedName;
use crate::util::UrlValidationError;
use thiserror::Error;

/// Errors produced by [`Client`](super::Client).
///
/// Per-feed variants carry the feed name so a subscriber receiving them out
/// of a shared event stream can tell which feed failed.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `auto_discovery_url` was empty.
    #[error("missing auto discovery url")]
    MissingAutoDiscoveryUrl,
    /// `auto_discovery_url` is not an absolute http(s) URL.
    #[error("invalid auto discovery url: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// The underlying HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// `subscribe` was called without an event handler.
    #[error("invalid subscribe handler")]
    MissingSubscribeHandler,
    /// The discovery feed could not be fetched while resolving another feed.
    #[error("failed to get auto discovery feed: {0}")]
    DiscoveryUnavailable(#[source] Box<ClientError>),
    /// Neither the requested nor the default language is listed.
    #[error("{feed}: invalid language (requested {requested:?}, default {default:?})")]
    Language {
        feed: FeedName,
        requested: Option<String>,
        default: Option<String>,
    },
    /// The feed is absent from the listing or the server answered 404.
    #[error("{0}: feed not found")]
    NotFound(FeedName),
    /// Any other non-200 response.
    #[error("{feed}: invalid response status: {status}")]
    Status { feed: FeedName, status: u16 },
    /// Connection, TLS or protocol failure.
    #[error("{feed}: request failed: {source}")]
    Network {
        feed: FeedName,
        #[source]
        source: reqwest::Error,
    },
    /// The request exceeded the client timeout.
    #[error("{0}: request timed out")]
    Timeout(FeedName),
    /// The response body exceeded the configured size limit.
    #[error("{0}: response too large")]
    ResponseTooLarge(FeedName),
    /// The body was not a valid feed document.
    #[error("{feed}: invalid json: {source}")]
    Decode {
        feed: FeedName,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    pub(crate) fn from_reqwest(feed: FeedName, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(feed)
        } else {
            ClientError::Network { feed, source: err }
        }
    }

    /// True when the feed does not exist, as opposed to a transport failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// True for failures that the next scheduled poll may not repeat.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network { .. } | ClientError::Timeout(_) => true,
            ClientError::Status { status, .. } => *status >= 500,
            ClientError::DiscoveryUnavailable(inner) => inner.is_transient(),
            ClientError::MissingAutoDiscoveryUrl
            | ClientError::InvalidUrl(_)
            | ClientError::HttpClient(_)
            | ClientError::MissingSubscribeHandler
            | ClientError::Language { .. }
            | ClientError::NotFound(_)
            | ClientError::ResponseTooLarge(_)
            | ClientError::Decode { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_feed_name() {
        let err = ClientError::NotFound(FeedName::StationStatus);
        assert_eq!(err.to_string(), "station_status: feed not found");

        let err = ClientError::Status {
            feed: FeedName::Gbfs,
            status: 503,
        };
        assert!(err.to_string().contains("gbfs"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_classification() {
        assert!(ClientError::NotFound(FeedName::Gbfs).is_not_found());
        assert!(!ClientError::Timeout(FeedName::Gbfs).is_not_found());
        assert!(ClientError::Timeout(FeedName::Gbfs).is_transient());
        assert!(!ClientError::Status {
            feed: FeedName::Gbfs,
            status: 403
        }
        .is_transient());
        assert!(ClientError::DiscoveryUnavailable(Box::new(ClientError::Status {
            feed: FeedName::Gbfs,
            status: 502
        }))
        .is_transient());
    }
}

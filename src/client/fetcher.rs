use super::error::ClientError;
use crate::feed::FeedName;
use futures::StreamExt;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;

/// Fetches one feed document.
///
/// No retries: the next scheduled poll is the retry. 404 is reported as
/// [`ClientError::NotFound`] so callers can special-case absent feeds, every
/// other non-200 status as [`ClientError::Status`].
pub(super) async fn fetch_document(
    http: &reqwest::Client,
    url: &str,
    user_agent: &str,
    limit: usize,
    feed: FeedName,
) -> Result<Vec<u8>, ClientError> {
    let response = http
        .get(url)
        .header(USER_AGENT, user_agent)
        .send()
        .await
        .map_err(|e| ClientError::from_reqwest(feed, e))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(feed));
    }
    if status != StatusCode::OK {
        tracing::debug!(feed = %feed, url = %url, status = %status, "Unexpected response status");
        return Err(ClientError::Status {
            feed,
            status: status.as_u16(),
        });
    }

    read_limited_bytes(response, limit, feed).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
    feed: FeedName,
) -> Result<Vec<u8>, ClientError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(ClientError::ResponseTooLarge(feed));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ClientError::from_reqwest(feed, e))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ClientError::ResponseTooLarge(feed));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

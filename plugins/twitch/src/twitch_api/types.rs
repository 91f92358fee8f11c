//! Response envelopes and pagination shared by every Helix endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tokio_stream::Stream;

/// The outcome of a Helix call that reached Twitch: the decoded success shape, or the error
/// envelope Twitch sent back.
pub type Helix<T> = Result<T, ApiError>;

/// Twitch's error envelope, `{"error": "...", "status": 400, "message": "..."}`.
///
/// `body` keeps the raw response so that warnings can show exactly what came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(skip)]
    pub body: String,
}

impl ApiError {
    /// Decodes an error response, falling back to the raw text when it is not the usual envelope.
    pub fn from_body(status: u16, body: &str) -> Self {
        let mut error = serde_json::from_str::<ApiError>(body).unwrap_or_else(|_| ApiError {
            status,
            error: None,
            message: body.trim().to_string(),
            body: String::new(),
        });
        if error.status == 0 {
            error.status = status;
        }
        error.body = body.to_string();
        error
    }

    /// A 2xx whose body did not have the expected shape.
    pub fn unexpected(status: u16, body: &str, e: serde_json::Error) -> Self {
        Self {
            status,
            error: Some("unexpected response".to_string()),
            message: e.to_string(),
            body: body.to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{} {}: {}", self.status, error, self.message),
            None => write!(f, "{}: {}", self.status, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Success envelope of list-shaped endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub points: Option<u64>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<T> DataEnvelope<T> {
    pub fn first(self) -> Option<T> {
        self.data.into_iter().next()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Streams every item of a cursor-paginated endpoint.
///
/// `fetch` is called with `None` for the first page and with each returned cursor after that.
/// A remote error ends the stream after yielding it.
pub fn paged<'a, T, F, Fut>(fetch: F) -> impl Stream<Item = eyre::Result<T>> + Send + 'a
where
    T: Send + 'a,
    F: Fn(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = eyre::Result<Helix<DataEnvelope<T>>>> + Send + 'a,
{
    async_stream::try_stream! {
        let mut cursor = None;
        loop {
            let page = fetch(cursor.take()).await??;
            for item in page.data {
                yield item;
            }
            match page.pagination.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
    }
}

/// Accepts a JSON string or number as a string; Twitch is not consistent about ids.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio_stream::StreamExt;

    #[test]
    fn error_envelope() {
        let error = ApiError::from_body(
            401,
            r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#,
        );
        assert_eq!(error.status, 401);
        assert_eq!(error.error.as_deref(), Some("Unauthorized"));
        assert_eq!(error.to_string(), "401 Unauthorized: Invalid OAuth token");
        assert!(error.body.contains("Invalid OAuth token"));
    }

    #[test]
    fn error_from_plain_text() {
        let error = ApiError::from_body(502, "Bad Gateway\n");
        assert_eq!(error.status, 502);
        assert_eq!(error.message, "Bad Gateway");
    }

    #[test]
    fn data_envelope_defaults() {
        let envelope: DataEnvelope<u32> =
            serde_json::from_value(serde_json::json!({ "data": [1, 2] })).unwrap();
        assert_eq!(envelope.data, vec![1, 2]);
        assert_eq!(envelope.total, None);
        assert_eq!(envelope.pagination.cursor, None);
    }

    #[tokio::test]
    async fn paged_follows_cursors() {
        let items: Vec<u32> = paged(|cursor| async move {
            let page = match cursor.as_deref() {
                None => serde_json::json!({ "data": [1, 2], "pagination": { "cursor": "a" } }),
                Some("a") => serde_json::json!({ "data": [3], "pagination": {} }),
                Some(other) => panic!("unexpected cursor {other}"),
            };
            Ok(Ok(serde_json::from_value::<DataEnvelope<u32>>(page)?))
        })
        .collect::<eyre::Result<_>>()
        .await
        .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }
}

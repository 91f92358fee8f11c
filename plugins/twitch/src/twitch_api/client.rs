//! Authenticated access to the Helix REST API.

use crate::auth::tokens::TokenStore;
use crate::twitch_api::ratelimit::RateLimitTracker;
use crate::twitch_api::types::{ApiError, DataEnvelope, Helix};
use eyre::Context;
use http::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// A response from Twitch that has been read in full but not yet decoded.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decodes a `{"data": [...]}` success envelope, or the error envelope otherwise.
    pub fn data<T: DeserializeOwned>(&self) -> Helix<DataEnvelope<T>> {
        self.decode()
    }

    /// Decodes any success shape, or the error envelope otherwise.
    pub fn decode<T: DeserializeOwned>(&self) -> Helix<T> {
        if !self.status.is_success() {
            return Err(ApiError::from_body(self.status.as_u16(), &self.body));
        }
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::unexpected(self.status.as_u16(), &self.body, e))
    }

    /// For endpoints that answer success with an empty body (usually 204).
    pub fn empty(&self) -> Helix<()> {
        if self.status.is_success() {
            Ok(())
        } else {
            Err(ApiError::from_body(self.status.as_u16(), &self.body))
        }
    }
}

/// Client for the Twitch Helix API.
///
/// Every call goes through [`HelixClient::make_authenticated_request`], which attaches the
/// client id and the current bearer token and feeds the rate-limit headers of each response
/// into the shared [`RateLimitTracker`].
#[derive(Debug, Clone)]
pub struct HelixClient {
    base_url: Arc<str>,
    client_id: Arc<str>,
    tokens: TokenStore,
    client: reqwest::Client,
    rate_limits: Arc<Mutex<RateLimitTracker>>,
}

impl HelixClient {
    pub fn new(base_url: &str, client_id: &str, tokens: TokenStore) -> eyre::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').into(),
            client_id: client_id.into(),
            tokens,
            client,
            rate_limits: Arc::new(Mutex::new(RateLimitTracker::default())),
        })
    }

    pub async fn rate_limits(&self) -> RateLimitTracker {
        self.rate_limits.lock().await.clone()
    }

    /// Opens a new one-second bucket in the rate-limit window.
    pub async fn rotate_rate_limits(&self) {
        self.rate_limits.lock().await.rotate();
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Makes one authenticated HTTP request to Helix.
    ///
    /// # Arguments
    ///
    /// * `method` - The HTTP method to use
    /// * `path` - Path below the Helix base URL, e.g. `chat/settings`
    /// * `query_params` - Query parameters; keys may repeat (`user_id=1&user_id=2`)
    /// * `json_body` - Optional JSON body
    ///
    /// # Returns
    ///
    /// The fully read response, whatever its status. Only transport failures and a missing
    /// access token are errors here; remote errors are left for the decoding step.
    #[instrument(skip(self, json_body), level = tracing::Level::TRACE)]
    pub async fn make_authenticated_request(
        &self,
        method: Method,
        path: &str,
        query_params: &[(&str, &str)],
        json_body: Option<&(impl Serialize + Sync)>,
    ) -> eyre::Result<ApiResponse> {
        let Some(access_token) = self.tokens.access_token().await else {
            eyre::bail!("no access token available for {} {}", method, path);
        };
        let url = self.url(path);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Client-Id", &*self.client_id)
            .header("Authorization", format!("Bearer {}", access_token));
        if !query_params.is_empty() {
            request = request.query(query_params);
        }
        if let Some(body) = json_body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("send {} request to Helix: {}", method, url))?;

        self.rate_limits.lock().await.record(response.headers());

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("read Helix response body: {} {}", method, url))?;
        tracing::trace!(%status, %url, "helix response");

        Ok(ApiResponse { status, body })
    }

    pub(crate) async fn get(
        &self,
        path: &str,
        query_params: &[(&str, &str)],
    ) -> eyre::Result<ApiResponse> {
        self.make_authenticated_request(Method::GET, path, query_params, None::<&()>)
            .await
    }

    /// Arbitrary request for power users; `path_and_query` is appended to the Helix base URL.
    #[instrument(skip(self, json_body))]
    pub async fn custom_request(
        &self,
        method: Method,
        path_and_query: &str,
        json_body: Option<&serde_json::Value>,
    ) -> eyre::Result<ApiResponse> {
        self.make_authenticated_request(method, path_and_query, &[], json_body)
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn client_for(server: &MockServer) -> HelixClient {
        HelixClient::new(
            &server.uri(),
            "test-client",
            TokenStore::in_memory("token", "refresh"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sends_credentials_and_tracks_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("login", "foo"))
            .and(header("Client-Id", "test-client"))
            .and(header("Authorization", "Bearer token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Ratelimit-Limit", "800")
                    .insert_header("Ratelimit-Remaining", "799")
                    .set_body_json(serde_json::json!({ "data": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client.get("users", &[("login", "foo")]).await.unwrap();
        let envelope = response.data::<serde_json::Value>().unwrap();
        assert!(envelope.data.is_empty());

        let limits = client.rate_limits().await;
        assert_eq!(limits.remaining, 799);
        client.rotate_rate_limits().await;
        assert_eq!(client.rate_limits().await.requests_per_minute, 1);
    }

    #[tokio::test]
    async fn remote_errors_are_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streams"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": "Too Many Requests",
                "status": 429,
                "message": "slow down"
            })))
            .mount(&server)
            .await;

        let response = client_for(&server).get("streams", &[]).await.unwrap();
        let error = response.data::<serde_json::Value>().unwrap_err();
        assert_eq!(error.status, 429);
        assert_eq!(error.message, "slow down");
    }

    #[tokio::test]
    async fn no_token_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client =
            HelixClient::new(&server.uri(), "id", TokenStore::in_memory("", "")).unwrap();
        assert!(client.get("users", &[]).await.is_err());
    }
}

use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use http::Method;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A live stream. Offline channels are absent from `streams` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub title: String,
    pub viewer_count: u64,
    pub started_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMarker {
    pub id: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub description: String,
    pub position_seconds: u64,
}

#[derive(Debug, Serialize)]
struct CreateMarkerRequest<'a> {
    user_id: &'a str,
    description: &'a str,
}

impl HelixClient {
    /// Fetches the streams of the given user ids that are currently live.
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-streams>
    #[instrument(skip(self), ret)]
    pub async fn get_streams(&self, user_ids: &[String]) -> eyre::Result<Helix<Vec<LiveStream>>> {
        let mut query_params: Vec<(&str, &str)> =
            user_ids.iter().map(|id| ("user_id", id.as_str())).collect();
        query_params.push(("first", "100"));
        let response = self.get("streams", &query_params).await?;
        Ok(response.data().map(|envelope| envelope.data))
    }

    /// # Required Scopes
    ///
    /// * `channel:manage:broadcast`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#create-stream-marker>
    #[instrument(skip(self), ret)]
    pub async fn create_stream_marker(
        &self,
        user_id: &str,
        description: &str,
    ) -> eyre::Result<Helix<Option<StreamMarker>>> {
        let body = CreateMarkerRequest {
            user_id,
            description,
        };
        let response = self
            .make_authenticated_request(Method::POST, "streams/markers", &[], Some(&body))
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }
}

use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A clip that has just been created; Twitch is still processing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedClip {
    pub id: String,
    pub edit_url: String,
}

impl CreatedClip {
    pub fn url(&self) -> String {
        format!("https://clips.twitch.tv/{}", self.id)
    }
}

/// Parameters for clipping a past broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VodClipRequest {
    pub broadcaster_id: String,
    pub editor_id: String,
    pub vod_id: String,
    /// Offset into the VOD, in seconds, where the clip ends.
    pub vod_offset: u64,
    /// Clip length in seconds; Twitch defaults to 30.
    pub duration: Option<u32>,
    pub title: String,
}

impl HelixClient {
    /// Clips the last moments of a live stream.
    ///
    /// # Required Scopes
    ///
    /// * `clips:edit`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#create-clip>
    #[instrument(skip(self), ret)]
    pub async fn create_clip(
        &self,
        broadcaster_id: &str,
    ) -> eyre::Result<Helix<Option<CreatedClip>>> {
        let response = self
            .make_authenticated_request(
                Method::POST,
                "clips",
                &[("broadcaster_id", broadcaster_id)],
                None::<&()>,
            )
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }

    /// # Required Scopes
    ///
    /// * `channel:manage:clips`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#create-clip-from-vod>
    #[instrument(skip(self), ret)]
    pub async fn create_clip_from_vod(
        &self,
        request: &VodClipRequest,
    ) -> eyre::Result<Helix<Option<CreatedClip>>> {
        let vod_offset = request.vod_offset.to_string();
        let duration = request.duration.map(|d| d.to_string());
        let mut query_params = vec![
            ("broadcaster_id", request.broadcaster_id.as_str()),
            ("editor_id", request.editor_id.as_str()),
            ("title", request.title.as_str()),
            ("vod_id", request.vod_id.as_str()),
            ("vod_offset", vod_offset.as_str()),
        ];
        if let Some(duration) = duration.as_deref() {
            query_params.push(("duration", duration));
        }
        let response = self
            .make_authenticated_request(Method::POST, "videos/clips", &query_params, None::<&()>)
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }
}

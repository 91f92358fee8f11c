use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use http::Method;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raid {
    pub created_at: Timestamp,
    pub is_mature: bool,
}

impl HelixClient {
    /// # Required Scopes
    ///
    /// * `channel:manage:raids`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#start-a-raid>
    #[instrument(skip(self), ret)]
    pub async fn start_raid(
        &self,
        from_broadcaster_id: &str,
        to_broadcaster_id: &str,
    ) -> eyre::Result<Helix<Option<Raid>>> {
        let response = self
            .make_authenticated_request(
                Method::POST,
                "raids",
                &[
                    ("from_broadcaster_id", from_broadcaster_id),
                    ("to_broadcaster_id", to_broadcaster_id),
                ],
                None::<&()>,
            )
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }
}

use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorGoal {
    pub id: String,
    /// `follower`, `subscription`, `subscription_count`, `new_subscription`, ...
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub current_amount: i64,
    pub target_amount: i64,
}

impl HelixClient {
    /// # Required Scopes
    ///
    /// * `channel:read:goals`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-creator-goals>
    #[instrument(skip(self), ret)]
    pub async fn get_creator_goals(
        &self,
        broadcaster_id: &str,
    ) -> eyre::Result<Helix<Vec<CreatorGoal>>> {
        let response = self
            .get("goals", &[("broadcaster_id", broadcaster_id)])
            .await?;
        Ok(response.data().map(|envelope| envelope.data))
    }
}

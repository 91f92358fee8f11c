use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use serde::Serialize;
use serde::de::IgnoredAny;
use tracing::instrument;

/// Subscriber count and subscriber points of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionSummary {
    pub total: u64,
    pub points: u64,
}

impl HelixClient {
    /// Reads the totals Twitch attaches to the first page of the subscriber list.
    ///
    /// # Required Scopes
    ///
    /// * `channel:read:subscriptions`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-broadcaster-subscriptions>
    #[instrument(skip(self), ret)]
    pub async fn get_subscription_summary(
        &self,
        broadcaster_id: &str,
    ) -> eyre::Result<Helix<SubscriptionSummary>> {
        let response = self
            .get(
                "subscriptions",
                &[("broadcaster_id", broadcaster_id), ("first", "1")],
            )
            .await?;
        Ok(response
            .data::<IgnoredAny>()
            .map(|envelope| SubscriptionSummary {
                total: envelope.total.unwrap_or_default(),
                points: envelope.points.unwrap_or_default(),
            }))
    }
}

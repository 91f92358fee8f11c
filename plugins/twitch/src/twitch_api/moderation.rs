use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::{Helix, paged};
use http::Method;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use tracing::instrument;

/// A channel the authenticated user moderates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratedChannel {
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub broadcaster_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldModeStatus {
    pub is_active: bool,
    #[serde(default)]
    pub moderator_id: String,
    #[serde(default)]
    pub moderator_login: String,
    #[serde(default, deserialize_with = "empty_timestamp")]
    pub last_activated_at: Option<Timestamp>,
}

/// Twitch sends `""` rather than `null` for a shield that was never raised.
fn empty_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl HelixClient {
    /// Returns a paginated stream of every channel `user_id` moderates.
    ///
    /// # Required Scopes
    ///
    /// * `user:read:moderated_channels`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-moderated-channels>
    #[instrument(skip(self))]
    pub fn list_moderated_channels<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Stream<Item = eyre::Result<ModeratedChannel>> + Send + 'a {
        paged(move |cursor: Option<String>| async move {
            let mut query_params = vec![("user_id", user_id), ("first", "100")];
            if let Some(cursor) = cursor.as_deref() {
                query_params.push(("after", cursor));
            }
            let response = self.get("moderation/channels", &query_params).await?;
            Ok(response.data())
        })
    }

    /// # Required Scopes
    ///
    /// * `moderator:read:shield_mode` or `moderator:manage:shield_mode`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-shield-mode-status>
    #[instrument(skip(self), ret)]
    pub async fn get_shield_mode_status(
        &self,
        broadcaster_id: &str,
        moderator_id: &str,
    ) -> eyre::Result<Helix<Option<ShieldModeStatus>>> {
        let response = self
            .get(
                "moderation/shield_mode",
                &[
                    ("broadcaster_id", broadcaster_id),
                    ("moderator_id", moderator_id),
                ],
            )
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }

    /// Deletes one message, or clears the whole chat when `message_id` is `None`.
    ///
    /// # Required Scopes
    ///
    /// * `moderator:manage:chat_messages`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#delete-chat-messages>
    #[instrument(skip(self), ret)]
    pub async fn delete_chat_messages(
        &self,
        broadcaster_id: &str,
        moderator_id: &str,
        message_id: Option<&str>,
    ) -> eyre::Result<Helix<()>> {
        let mut query_params = vec![
            ("broadcaster_id", broadcaster_id),
            ("moderator_id", moderator_id),
        ];
        if let Some(message_id) = message_id {
            query_params.push(("message_id", message_id));
        }
        let response = self
            .make_authenticated_request(
                Method::DELETE,
                "moderation/chat",
                &query_params,
                None::<&()>,
            )
            .await?;
        Ok(response.empty())
    }
}

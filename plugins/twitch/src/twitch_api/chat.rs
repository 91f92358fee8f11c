use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use http::Method;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Chat settings as Helix reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub broadcaster_id: String,
    pub emote_mode: bool,
    pub follower_mode: bool,
    /// Minutes an account must have followed; `None` while follower mode is off.
    pub follower_mode_duration: Option<u32>,
    pub slow_mode: bool,
    /// Seconds between messages; `None` while slow mode is off.
    pub slow_mode_wait_time: Option<u32>,
    pub subscriber_mode: bool,
    pub unique_chat_mode: bool,
    /// Only present when the request carried a moderator id.
    #[serde(default)]
    pub non_moderator_chat_delay: Option<bool>,
    #[serde(default)]
    pub non_moderator_chat_delay_duration: Option<u32>,
}

/// A partial chat settings update; only the set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatSettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emote_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follower_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follower_mode_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_mode_wait_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_chat_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_moderator_chat_delay: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_moderator_chat_delay_duration: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementColor {
    Blue,
    Green,
    Orange,
    Purple,
    #[default]
    Primary,
}

#[derive(Debug, Serialize)]
struct AnnouncementRequest<'a> {
    message: &'a str,
    color: AnnouncementColor,
}

impl HelixClient {
    /// Fetches chat settings. Passing a moderator id also returns the non-moderator chat delay.
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-chat-settings>
    #[instrument(skip(self), ret)]
    pub async fn get_chat_settings(
        &self,
        broadcaster_id: &str,
        moderator_id: Option<&str>,
    ) -> eyre::Result<Helix<Option<ChatSettings>>> {
        let mut query_params = vec![("broadcaster_id", broadcaster_id)];
        if let Some(moderator_id) = moderator_id {
            query_params.push(("moderator_id", moderator_id));
        }
        let response = self.get("chat/settings", &query_params).await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }

    /// # Required Scopes
    ///
    /// * `moderator:manage:chat_settings`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#update-chat-settings>
    #[instrument(skip(self), ret)]
    pub async fn update_chat_settings(
        &self,
        broadcaster_id: &str,
        moderator_id: &str,
        update: &ChatSettingsUpdate,
    ) -> eyre::Result<Helix<Option<ChatSettings>>> {
        let response = self
            .make_authenticated_request(
                Method::PATCH,
                "chat/settings",
                &[
                    ("broadcaster_id", broadcaster_id),
                    ("moderator_id", moderator_id),
                ],
                Some(update),
            )
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }

    /// Returns how many users are connected to a channel's chat.
    ///
    /// # Required Scopes
    ///
    /// * `moderator:read:chatters`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-chatters>
    #[instrument(skip(self), ret)]
    pub async fn get_chatters_total(
        &self,
        broadcaster_id: &str,
        moderator_id: &str,
    ) -> eyre::Result<Helix<u64>> {
        let response = self
            .get(
                "chat/chatters",
                &[
                    ("broadcaster_id", broadcaster_id),
                    ("moderator_id", moderator_id),
                    ("first", "1000"),
                ],
            )
            .await?;
        Ok(response
            .data::<IgnoredAny>()
            .map(|envelope| envelope.total.unwrap_or(envelope.data.len() as u64)))
    }

    /// # Required Scopes
    ///
    /// * `moderator:manage:announcements`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#send-chat-announcement>
    #[instrument(skip(self), ret)]
    pub async fn send_chat_announcement(
        &self,
        broadcaster_id: &str,
        moderator_id: &str,
        message: &str,
        color: AnnouncementColor,
    ) -> eyre::Result<Helix<()>> {
        let body = AnnouncementRequest { message, color };
        let response = self
            .make_authenticated_request(
                Method::POST,
                "chat/announcements",
                &[
                    ("broadcaster_id", broadcaster_id),
                    ("moderator_id", moderator_id),
                ],
                Some(&body),
            )
            .await?;
        Ok(response.empty())
    }
}

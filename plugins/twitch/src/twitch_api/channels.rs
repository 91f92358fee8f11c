use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use http::Method;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInformation {
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub broadcaster_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub delay: u32,
    #[serde(default)]
    pub content_classification_labels: Vec<String>,
    #[serde(default)]
    pub is_branded_content: bool,
}

/// Content classification labels a broadcaster can set themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationLabel {
    DebatedSocialIssuesAndPolitics,
    DrugsIntoxication,
    SexualThemes,
    ViolentGraphic,
    Gambling,
    ProfanityVulgarity,
}

impl fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationLabel::DebatedSocialIssuesAndPolitics => "DebatedSocialIssuesAndPolitics",
            ClassificationLabel::DrugsIntoxication => "DrugsIntoxication",
            ClassificationLabel::SexualThemes => "SexualThemes",
            ClassificationLabel::ViolentGraphic => "ViolentGraphic",
            ClassificationLabel::Gambling => "Gambling",
            ClassificationLabel::ProfanityVulgarity => "ProfanityVulgarity",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelSetting {
    pub id: ClassificationLabel,
    pub is_enabled: bool,
}

/// Body of a channel information update. Unset fields are left unchanged by Twitch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModifyChannelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_branded_content: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content_classification_labels: Vec<LabelSetting>,
}

impl ModifyChannelRequest {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl HelixClient {
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-channel-information>
    #[instrument(skip(self), ret)]
    pub async fn get_channel_information(
        &self,
        broadcaster_ids: &[String],
    ) -> eyre::Result<Helix<Vec<ChannelInformation>>> {
        let query_params: Vec<(&str, &str)> = broadcaster_ids
            .iter()
            .map(|id| ("broadcaster_id", id.as_str()))
            .collect();
        let response = self.get("channels", &query_params).await?;
        Ok(response.data().map(|envelope| envelope.data))
    }

    /// # Required Scopes
    ///
    /// * `channel:manage:broadcast`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#modify-channel-information>
    #[instrument(skip(self), ret)]
    pub async fn modify_channel_information(
        &self,
        broadcaster_id: &str,
        request: &ModifyChannelRequest,
    ) -> eyre::Result<Helix<()>> {
        let response = self
            .make_authenticated_request(
                Method::PATCH,
                "channels",
                &[("broadcaster_id", broadcaster_id)],
                Some(request),
            )
            .await?;
        Ok(response.empty())
    }

    /// Returns the total follower count of a channel.
    ///
    /// Without `moderator:read:followers` Twitch still reports the total, just not the list.
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-channel-followers>
    #[instrument(skip(self), ret)]
    pub async fn get_channel_followers_total(
        &self,
        broadcaster_id: &str,
    ) -> eyre::Result<Helix<u64>> {
        let response = self
            .get(
                "channels/followers",
                &[("broadcaster_id", broadcaster_id), ("first", "1")],
            )
            .await?;
        Ok(response
            .data::<IgnoredAny>()
            .map(|envelope| envelope.total.unwrap_or_default()))
    }
}

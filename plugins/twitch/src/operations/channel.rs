//! Channel identity, stream status, and broadcast information.

use super::{Operations, fan_out, settle};
use crate::twitch_api::ApiResponse;
use crate::twitch_api::channels::{ClassificationLabel, LabelSetting, ModifyChannelRequest};
use crate::twitch_api::games::{Game, GameQuery};
use crate::twitch_api::users::UserKey;
use http::Method;
use jiff::Timestamp;

/// Changes to the authenticated user's broadcast information. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelUpdate {
    pub title: Option<String>,
    /// Category name; resolved to an id before the update is sent.
    pub category: Option<String>,
    pub branded_content: Option<bool>,
    /// When set, every label not listed is turned off.
    pub classification_labels: Option<Vec<ClassificationLabel>>,
}

const ALL_LABELS: [ClassificationLabel; 6] = [
    ClassificationLabel::DebatedSocialIssuesAndPolitics,
    ClassificationLabel::DrugsIntoxication,
    ClassificationLabel::SexualThemes,
    ClassificationLabel::ViolentGraphic,
    ClassificationLabel::Gambling,
    ClassificationLabel::ProfanityVulgarity,
];

impl Operations {
    /// Resolves every configured username to its id and display name, then refreshes the
    /// broadcast information of every resolved channel.
    ///
    /// Everything else addresses channels by id, so this runs before the rest of a poll.
    pub async fn update_users(&self) {
        if !self.allowed("update_users", None).await {
            return;
        }
        let logins = self.channels.usernames().await;
        if logins.is_empty() {
            return;
        }

        let users = settle(
            "update_users",
            "users",
            self.api.get_users(UserKey::Login, &logins).await,
        );
        for user in users.unwrap_or_default() {
            self.channels
                .update_by_username(&user.login, |channel| {
                    channel.id = user.id;
                    channel.display_name = user.display_name;
                })
                .await;
        }

        let ids = self.channels.resolved_ids().await;
        if ids.is_empty() {
            return;
        }
        let infos = settle(
            "update_users",
            "channels",
            self.api.get_channel_information(&ids).await,
        );
        for info in infos.unwrap_or_default() {
            self.channels
                .update_by_id(&info.broadcaster_id, |channel| {
                    channel.category = info.game_name;
                    channel.category_id = info.game_id;
                    channel.title = info.title;
                    channel.content_classification_labels = info.content_classification_labels;
                    channel.delay = info.delay;
                    channel.branded_content = info.is_branded_content;
                })
                .await;
        }
    }

    pub async fn get_channel_followers(&self) {
        if !self.allowed("get_channel_followers", None).await {
            return;
        }
        let targets: Vec<_> = self
            .channels
            .snapshot()
            .await
            .into_iter()
            .filter(|c| !c.id.is_empty())
            .collect();

        let api = self.api.clone();
        let settled = fan_out(targets, |channel| {
            let api = api.clone();
            let id = channel.id.clone();
            async move { api.get_channel_followers_total(&id).await }
        })
        .await;

        for (channel, result) in settled {
            if let Some(total) = settle("get_channel_followers", &channel.username, result) {
                self.channels
                    .update_by_id(&channel.id, |c| c.followers_total = total)
                    .await;
            }
        }
    }

    /// Marks live channels with their stream details and resets the live fields of the rest.
    pub async fn get_streams(&self) {
        if !self.allowed("get_streams", None).await {
            return;
        }
        let ids = self.channels.resolved_ids().await;
        if ids.is_empty() {
            return;
        }
        let Some(streams) = settle("get_streams", "streams", self.api.get_streams(&ids).await)
        else {
            return;
        };

        self.channels
            .update_all(|channel| {
                if channel.id.is_empty() {
                    return;
                }
                match streams.iter().find(|s| s.user_id == channel.id) {
                    Some(stream) => {
                        channel.live_since = Some(stream.started_at);
                        channel.viewers = stream.viewer_count;
                        channel.category = stream.game_name.clone();
                        channel.category_id = stream.game_id.clone();
                        channel.title = stream.title.clone();
                    }
                    None => channel.set_offline(),
                }
            })
            .await;
    }

    /// Drops a stream marker on `username`'s live stream.
    pub async fn create_stream_marker(&self, username: &str) {
        if !self
            .allowed("create_stream_marker", Some("channel:manage:broadcast"))
            .await
        {
            return;
        }
        let Some(channel) = self.resolved_channel("create_stream_marker", username).await else {
            return;
        };

        let description = format!(
            "companion-{}-{}",
            self.auth.login().await,
            Timestamp::now().as_millisecond()
        );
        let result = self
            .api
            .create_stream_marker(&channel.id, &description)
            .await;
        if let Some(marker) = settle("create_stream_marker", &channel.username, result) {
            tracing::info!(
                channel = %channel.username,
                marker = %description,
                position = marker.map(|m| m.position_seconds),
                "created stream marker"
            );
        }
    }

    /// Updates the authenticated user's title, category, branded content flag and labels.
    pub async fn modify_channel_information(&self, update: &ChannelUpdate) {
        if !self
            .allowed("modify_channel_information", Some("channel:manage:broadcast"))
            .await
        {
            return;
        }
        let user_id = self.auth.user_id().await;

        let mut request = ModifyChannelRequest {
            title: update.title.clone(),
            is_branded_content: update.branded_content,
            ..ModifyChannelRequest::default()
        };
        if let Some(labels) = &update.classification_labels {
            request.content_classification_labels = ALL_LABELS
                .iter()
                .map(|&id| LabelSetting {
                    id,
                    is_enabled: labels.contains(&id),
                })
                .collect();
        }
        if let Some(category) = &update.category {
            // an unknown category clears it, like an empty id does
            let game_id = self
                .get_games(category)
                .await
                .into_iter()
                .next()
                .map(|game| game.id)
                .unwrap_or_default();
            request.game_id = Some(game_id);
        }
        if request.is_empty() {
            tracing::debug!("no channel information to change");
            return;
        }

        let result = self
            .api
            .modify_channel_information(&user_id, &request)
            .await;
        if settle("modify_channel_information", &user_id, result).is_some() {
            tracing::info!(?request, "modified channel information");
        }
    }

    /// Looks up categories by exact name.
    pub async fn get_games(&self, name: &str) -> Vec<Game> {
        if !self.allowed("get_games", None).await {
            return Vec::new();
        }
        let result = self
            .api
            .get_games(&GameQuery::Name(name.to_string()))
            .await;
        settle("get_games", name, result).unwrap_or_default()
    }

    /// Raids `target` (a login name) from the authenticated user's channel.
    pub async fn start_raid(&self, target: &str) {
        if !self.allowed("start_raid", Some("channel:manage:raids")).await {
            return;
        }
        let user_id = self.auth.user_id().await;
        let login = target.trim().trim_start_matches('#').to_lowercase();

        let users = settle(
            "start_raid",
            &login,
            self.api.get_users(UserKey::Login, &[login.clone()]).await,
        );
        let Some(target) = users.and_then(|users| users.into_iter().next()) else {
            tracing::warn!(target = %login, "cannot raid unknown user");
            return;
        };

        let result = self.api.start_raid(&user_id, &target.id).await;
        if settle("start_raid", &target.login, result).is_some() {
            tracing::info!(target = %target.display_name, "started raid");
        }
    }

    /// Sends an arbitrary Helix request and logs whatever comes back.
    ///
    /// `path` is relative to the Helix base URL (a full `https://api.twitch.tv/helix/...` URL is
    /// accepted too). `body`, if not blank, must be JSON.
    pub async fn custom_request(
        &self,
        method: Method,
        path: &str,
        body: &str,
    ) -> Option<ApiResponse> {
        if !self.allowed("custom_request", None).await {
            return None;
        }
        let path = path
            .trim()
            .trim_start_matches("https://api.twitch.tv/helix")
            .trim_start_matches('/');
        let body = match body.trim() {
            "" => None,
            text => match serde_json::from_str::<serde_json::Value>(text) {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::warn!(error = %e, "custom request body is not JSON");
                    return None;
                }
            },
        };

        match self.api.custom_request(method, path, body.as_ref()).await {
            Ok(response) => {
                tracing::info!(status = %response.status, body = %response.body, "custom request");
                Some(response)
            }
            Err(e) => {
                tracing::error!(error = ?e, "custom request failed");
                None
            }
        }
    }
}

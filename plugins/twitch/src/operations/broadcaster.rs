//! Broadcaster-only data (charity, goals, subscriptions, ads) and clips.

use super::{Operations, settle};
use crate::twitch_api::clips::{CreatedClip, VodClipRequest};

/// Parameters for clipping a past broadcast of a configured channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VodClip {
    pub channel: String,
    pub vod_id: String,
    pub title: String,
    /// Seconds into the VOD where the clip ends.
    pub offset: u64,
    pub duration: Option<u32>,
}

impl Operations {
    pub async fn get_charity_campaign(&self) {
        if !self
            .allowed("get_charity_campaign", Some("channel:read:charity"))
            .await
        {
            return;
        }
        let Some(channel) = self.own_channel().await else {
            return;
        };
        let result = self.api.get_charity_campaign(&channel.id).await;
        if let Some(campaign) = settle("get_charity_campaign", &channel.username, result) {
            self.channels
                .update_by_id(&channel.id, |c| c.broadcaster.charity = campaign)
                .await;
        }
    }

    pub async fn get_creator_goals(&self) {
        if !self
            .allowed("get_creator_goals", Some("channel:read:goals"))
            .await
        {
            return;
        }
        let Some(channel) = self.own_channel().await else {
            return;
        };
        let result = self.api.get_creator_goals(&channel.id).await;
        if let Some(goals) = settle("get_creator_goals", &channel.username, result) {
            self.channels
                .update_by_id(&channel.id, |c| c.broadcaster.goals = goals)
                .await;
        }
    }

    pub async fn get_broadcaster_subscriptions(&self) {
        if !self
            .allowed(
                "get_broadcaster_subscriptions",
                Some("channel:read:subscriptions"),
            )
            .await
        {
            return;
        }
        let Some(channel) = self.own_channel().await else {
            return;
        };
        let result = self.api.get_subscription_summary(&channel.id).await;
        if let Some(summary) = settle("get_broadcaster_subscriptions", &channel.username, result) {
            self.channels
                .update_by_id(&channel.id, |c| c.broadcaster.subscriptions = Some(summary))
                .await;
        }
    }

    pub async fn get_ad_schedule(&self) {
        if !self.allowed("get_ad_schedule", Some("channel:read:ads")).await {
            return;
        }
        let Some(channel) = self.own_channel().await else {
            return;
        };
        let result = self.api.get_ad_schedule(&channel.id).await;
        if let Some(schedule) = settle("get_ad_schedule", &channel.username, result) {
            self.channels
                .update_by_id(&channel.id, |c| c.broadcaster.ad_schedule = schedule)
                .await;
        }
    }

    /// Runs an ad break of `length` seconds on the own channel.
    pub async fn start_commercial(&self, length: u32) {
        if !self
            .allowed("start_commercial", Some("channel:edit:commercial"))
            .await
        {
            return;
        }
        let user_id = self.auth.user_id().await;
        let result = self.api.start_commercial(&user_id, length).await;
        if let Some(Some(commercial)) = settle("start_commercial", &user_id, result) {
            tracing::info!(
                length = commercial.length,
                retry_after = commercial.retry_after,
                message = %commercial.message,
                "started commercial"
            );
        }
    }

    /// Pushes the next scheduled ad break back, then refreshes the schedule.
    pub async fn snooze_next_ad(&self) {
        if !self
            .allowed("snooze_next_ad", Some("channel:manage:ads"))
            .await
        {
            return;
        }
        let user_id = self.auth.user_id().await;
        let result = self.api.snooze_next_ad(&user_id).await;
        if let Some(Some(snooze)) = settle("snooze_next_ad", &user_id, result) {
            tracing::info!(snoozes_left = snooze.snooze_count, "snoozed next ad");
            self.get_ad_schedule().await;
        }
    }

    /// Clips the live stream of `username` and remembers the clip on that channel.
    pub async fn create_clip(&self, username: &str) -> Option<CreatedClip> {
        if !self.allowed("create_clip", Some("clips:edit")).await {
            return None;
        }
        let channel = self.resolved_channel("create_clip", username).await?;
        let result = self.api.create_clip(&channel.id).await;
        self.remember_clip("create_clip", &channel.id, &channel.username, result)
            .await
    }

    pub async fn create_clip_from_vod(&self, clip: &VodClip) -> Option<CreatedClip> {
        if !self
            .allowed("create_clip_from_vod", Some("channel:manage:clips"))
            .await
        {
            return None;
        }
        let channel = self
            .resolved_channel("create_clip_from_vod", &clip.channel)
            .await?;
        let request = VodClipRequest {
            broadcaster_id: channel.id.clone(),
            editor_id: self.auth.user_id().await,
            vod_id: clip.vod_id.clone(),
            vod_offset: clip.offset,
            duration: clip.duration,
            title: clip.title.clone(),
        };
        let result = self.api.create_clip_from_vod(&request).await;
        self.remember_clip("create_clip_from_vod", &channel.id, &channel.username, result)
            .await
    }

    async fn remember_clip(
        &self,
        operation: &'static str,
        channel_id: &str,
        username: &str,
        result: eyre::Result<crate::twitch_api::Helix<Option<CreatedClip>>>,
    ) -> Option<CreatedClip> {
        let clip = settle(operation, username, result)??;
        tracing::info!(
            channel = %username,
            id = %clip.id,
            url = %clip.url(),
            edit_url = %clip.edit_url,
            "created clip"
        );
        let stored = clip.clone();
        self.channels
            .update_by_id(channel_id, |c| c.last_clip = Some(stored))
            .await;
        Some(clip)
    }
}

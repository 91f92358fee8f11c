use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use http::Method;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A point in time as the ads endpoints report it: Unix seconds, RFC 3339 text, or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdTime {
    Unix(i64),
    Text(String),
}

impl AdTime {
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            AdTime::Unix(0) => None,
            AdTime::Unix(seconds) => Timestamp::from_second(*seconds).ok(),
            AdTime::Text(text) if text.is_empty() => None,
            AdTime::Text(text) => text.parse().ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSchedule {
    pub next_ad_at: AdTime,
    pub last_ad_at: AdTime,
    /// Length in seconds of the next scheduled ad break.
    pub duration: u32,
    pub preroll_free_time: u32,
    pub snooze_count: u32,
    pub snooze_refresh_at: AdTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeResult {
    pub snooze_count: u32,
    pub snooze_refresh_at: AdTime,
    pub next_ad_at: AdTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commercial {
    pub length: u32,
    #[serde(default)]
    pub message: String,
    /// Seconds until another commercial may be started.
    pub retry_after: u32,
}

impl HelixClient {
    /// # Required Scopes
    ///
    /// * `channel:read:ads`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-ad-schedule>
    #[instrument(skip(self), ret)]
    pub async fn get_ad_schedule(
        &self,
        broadcaster_id: &str,
    ) -> eyre::Result<Helix<Option<AdSchedule>>> {
        let response = self
            .get("channels/ads", &[("broadcaster_id", broadcaster_id)])
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }

    /// # Required Scopes
    ///
    /// * `channel:manage:ads`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#snooze-next-ad>
    #[instrument(skip(self), ret)]
    pub async fn snooze_next_ad(
        &self,
        broadcaster_id: &str,
    ) -> eyre::Result<Helix<Option<SnoozeResult>>> {
        let response = self
            .make_authenticated_request(
                Method::POST,
                "channels/ads/schedule/snooze",
                &[("broadcaster_id", broadcaster_id)],
                None::<&()>,
            )
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }

    /// # Required Scopes
    ///
    /// * `channel:edit:commercial`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#start-commercial>
    #[instrument(skip(self), ret)]
    pub async fn start_commercial(
        &self,
        broadcaster_id: &str,
        length: u32,
    ) -> eyre::Result<Helix<Option<Commercial>>> {
        let length = length.to_string();
        let response = self
            .make_authenticated_request(
                Method::POST,
                "channels/commercial",
                &[("broadcaster_id", broadcaster_id), ("length", &length)],
                None::<&()>,
            )
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ad_times_in_either_shape() {
        let schedule: AdSchedule = serde_json::from_value(serde_json::json!({
            "next_ad_at": 1700000000,
            "last_ad_at": "",
            "duration": 60,
            "preroll_free_time": 90,
            "snooze_count": 1,
            "snooze_refresh_at": "2023-11-14T22:13:20Z"
        }))
        .unwrap();
        assert_eq!(
            schedule.next_ad_at.timestamp(),
            Some(Timestamp::from_second(1_700_000_000).unwrap())
        );
        assert_eq!(schedule.last_ad_at.timestamp(), None);
        assert_eq!(
            schedule.snooze_refresh_at.timestamp(),
            schedule.next_ad_at.timestamp()
        );
    }
}

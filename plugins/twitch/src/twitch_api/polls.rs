use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use http::Method;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollStatus {
    Active,
    Completed,
    Terminated,
    Archived,
    Moderated,
    Invalid,
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollStatus::Active => "ACTIVE",
            PollStatus::Completed => "COMPLETED",
            PollStatus::Terminated => "TERMINATED",
            PollStatus::Archived => "ARCHIVED",
            PollStatus::Moderated => "MODERATED",
            PollStatus::Invalid => "INVALID",
        };
        f.write_str(s)
    }
}

/// How to end a running poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndPollStatus {
    /// End the poll and keep showing the results.
    Terminated,
    /// End the poll and hide it.
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollChoice {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub votes: u64,
    #[serde(default)]
    pub channel_points_votes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub broadcaster_id: String,
    pub title: String,
    pub choices: Vec<PollChoice>,
    pub status: PollStatus,
    /// Seconds the poll runs for.
    pub duration: u32,
    pub started_at: Timestamp,
    #[serde(default)]
    pub ended_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceTitle {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePollRequest {
    pub broadcaster_id: String,
    pub title: String,
    pub choices: Vec<ChoiceTitle>,
    pub duration: u32,
    pub channel_points_voting_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_points_per_vote: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EndPollRequest<'a> {
    broadcaster_id: &'a str,
    id: &'a str,
    status: EndPollStatus,
}

impl HelixClient {
    /// Fetches the most recent polls, newest first.
    ///
    /// # Required Scopes
    ///
    /// * `channel:read:polls` or `channel:manage:polls`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-polls>
    #[instrument(skip(self), ret)]
    pub async fn get_polls(&self, broadcaster_id: &str) -> eyre::Result<Helix<Vec<Poll>>> {
        let response = self
            .get("polls", &[("broadcaster_id", broadcaster_id)])
            .await?;
        Ok(response.data().map(|envelope| envelope.data))
    }

    /// # Required Scopes
    ///
    /// * `channel:manage:polls`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#create-poll>
    #[instrument(skip(self), ret)]
    pub async fn create_poll(
        &self,
        request: &CreatePollRequest,
    ) -> eyre::Result<Helix<Option<Poll>>> {
        let response = self
            .make_authenticated_request(Method::POST, "polls", &[], Some(request))
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }

    /// # Required Scopes
    ///
    /// * `channel:manage:polls`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#end-poll>
    #[instrument(skip(self), ret)]
    pub async fn end_poll(
        &self,
        broadcaster_id: &str,
        poll_id: &str,
        status: EndPollStatus,
    ) -> eyre::Result<Helix<Option<Poll>>> {
        let body = EndPollRequest {
            broadcaster_id,
            id: poll_id,
            status,
        };
        let response = self
            .make_authenticated_request(Method::PATCH, "polls", &[], Some(&body))
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }
}

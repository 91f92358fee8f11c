use crate::twitch_api::client::HelixClient;
use crate::twitch_api::types::Helix;
use http::Method;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionStatus {
    Active,
    Resolved,
    Canceled,
    Locked,
}

impl PredictionStatus {
    /// Whether a prediction in this state can still be locked, resolved or canceled.
    pub fn is_open(self) -> bool {
        matches!(self, PredictionStatus::Active | PredictionStatus::Locked)
    }
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PredictionStatus::Active => "ACTIVE",
            PredictionStatus::Resolved => "RESOLVED",
            PredictionStatus::Canceled => "CANCELED",
            PredictionStatus::Locked => "LOCKED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub users: u64,
    #[serde(default)]
    pub channel_points: u64,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub broadcaster_id: String,
    pub title: String,
    #[serde(default)]
    pub winning_outcome_id: Option<String>,
    pub outcomes: Vec<PredictionOutcome>,
    /// Seconds the prediction accepts votes for.
    pub prediction_window: u32,
    pub status: PredictionStatus,
    pub created_at: Timestamp,
    #[serde(default)]
    pub ended_at: Option<Timestamp>,
    #[serde(default)]
    pub locked_at: Option<Timestamp>,
}

impl Prediction {
    pub fn outcome_titled(&self, title: &str) -> Option<&PredictionOutcome> {
        self.outcomes.iter().find(|o| o.title == title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeTitle {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePredictionRequest {
    pub broadcaster_id: String,
    pub title: String,
    pub outcomes: Vec<OutcomeTitle>,
    pub prediction_window: u32,
}

/// How to end (or pause) a prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndPrediction {
    /// Pay out to the outcome with this title.
    Resolve { outcome_title: String },
    Cancel,
    Lock,
}

#[derive(Debug, Serialize)]
struct EndPredictionRequest<'a> {
    broadcaster_id: &'a str,
    id: &'a str,
    status: PredictionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    winning_outcome_id: Option<&'a str>,
}

impl HelixClient {
    /// Fetches the most recent predictions, newest first.
    ///
    /// # Required Scopes
    ///
    /// * `channel:read:predictions` or `channel:manage:predictions`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#get-predictions>
    #[instrument(skip(self), ret)]
    pub async fn get_predictions(
        &self,
        broadcaster_id: &str,
    ) -> eyre::Result<Helix<Vec<Prediction>>> {
        let response = self
            .get(
                "predictions",
                &[("broadcaster_id", broadcaster_id), ("first", "25")],
            )
            .await?;
        Ok(response.data().map(|envelope| envelope.data))
    }

    /// # Required Scopes
    ///
    /// * `channel:manage:predictions`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#create-prediction>
    #[instrument(skip(self), ret)]
    pub async fn create_prediction(
        &self,
        request: &CreatePredictionRequest,
    ) -> eyre::Result<Helix<Option<Prediction>>> {
        let response = self
            .make_authenticated_request(Method::POST, "predictions", &[], Some(request))
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }

    /// # Required Scopes
    ///
    /// * `channel:manage:predictions`
    ///
    /// # API Reference
    ///
    /// <https://dev.twitch.tv/docs/api/reference/#end-prediction>
    #[instrument(skip(self), ret)]
    pub async fn end_prediction(
        &self,
        broadcaster_id: &str,
        prediction_id: &str,
        status: PredictionStatus,
        winning_outcome_id: Option<&str>,
    ) -> eyre::Result<Helix<Option<Prediction>>> {
        let body = EndPredictionRequest {
            broadcaster_id,
            id: prediction_id,
            status,
            winning_outcome_id,
        };
        let response = self
            .make_authenticated_request(Method::PATCH, "predictions", &[], Some(&body))
            .await?;
        Ok(response.data().map(|envelope| envelope.first()))
    }
}

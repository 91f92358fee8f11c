//! Polls and predictions on the authenticated user's own channel.

use super::{Operations, settle};
use crate::channels::Channel;
use crate::twitch_api::polls::{ChoiceTitle, CreatePollRequest, EndPollStatus, Poll, PollStatus};
use crate::twitch_api::predictions::{
    CreatePredictionRequest, EndPrediction, OutcomeTitle, Prediction, PredictionStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPoll {
    pub title: String,
    pub choices: Vec<String>,
    /// Seconds.
    pub duration: u32,
    /// Extra votes for this many channel points each; `None` disables point voting.
    pub channel_points_per_vote: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrediction {
    pub title: String,
    pub outcomes: Vec<String>,
    /// Seconds.
    pub prediction_window: u32,
}

impl Operations {
    async fn own_resolved(&self, operation: &'static str) -> Option<Channel> {
        let channel = self.own_channel().await;
        if channel.is_none() {
            tracing::debug!(operation, "own channel is not configured or not resolved");
        }
        channel
    }

    /// Refreshes the latest poll of the own channel and returns it.
    pub async fn get_polls(&self) -> Option<Poll> {
        if !self.allowed("get_polls", Some("channel:manage:polls")).await {
            return None;
        }
        let channel = self.own_resolved("get_polls").await?;
        let polls = settle(
            "get_polls",
            &channel.username,
            self.api.get_polls(&channel.id).await,
        )?;
        let latest = polls.into_iter().next();
        let stored = latest.clone();
        self.channels
            .update_by_id(&channel.id, |c| c.broadcaster.poll = stored)
            .await;
        latest
    }

    pub async fn create_poll(&self, poll: &NewPoll) {
        if !self.allowed("create_poll", Some("channel:manage:polls")).await {
            return;
        }
        let Some(channel) = self.own_resolved("create_poll").await else {
            return;
        };
        let request = CreatePollRequest {
            broadcaster_id: channel.id.clone(),
            title: poll.title.clone(),
            choices: poll
                .choices
                .iter()
                .filter(|c| !c.trim().is_empty())
                .map(|c| ChoiceTitle { title: c.clone() })
                .collect(),
            duration: poll.duration,
            channel_points_voting_enabled: poll.channel_points_per_vote.is_some(),
            channel_points_per_vote: poll.channel_points_per_vote,
        };

        let result = self.api.create_poll(&request).await;
        if let Some(created) = settle("create_poll", &channel.username, result) {
            tracing::info!(channel = %channel.username, title = %request.title, "created poll");
            self.channels
                .update_by_id(&channel.id, |c| c.broadcaster.poll = created)
                .await;
        }
    }

    /// Ends the running poll. Does nothing unless the latest poll is active.
    pub async fn end_poll(&self, status: EndPollStatus) {
        if !self.allowed("end_poll", Some("channel:manage:polls")).await {
            return;
        }
        let Some(channel) = self.own_resolved("end_poll").await else {
            return;
        };
        let Some(poll) = self.get_polls().await else {
            tracing::warn!(channel = %channel.username, "cannot end poll, no poll found");
            return;
        };
        if poll.status != PollStatus::Active {
            tracing::warn!(
                channel = %channel.username,
                status = %poll.status,
                "cannot end poll, latest poll is not active"
            );
            return;
        }

        let result = self.api.end_poll(&channel.id, &poll.id, status).await;
        if let Some(ended) = settle("end_poll", &channel.username, result) {
            tracing::info!(channel = %channel.username, ?status, "ended poll");
            self.channels
                .update_by_id(&channel.id, |c| c.broadcaster.poll = ended)
                .await;
        }
    }

    /// Refreshes the latest prediction of the own channel and returns it.
    pub async fn get_predictions(&self) -> Option<Prediction> {
        if !self
            .allowed("get_predictions", Some("channel:manage:predictions"))
            .await
        {
            return None;
        }
        let channel = self.own_resolved("get_predictions").await?;
        let predictions = settle(
            "get_predictions",
            &channel.username,
            self.api.get_predictions(&channel.id).await,
        )?;
        let latest = predictions.into_iter().next();
        let stored = latest.clone();
        self.channels
            .update_by_id(&channel.id, |c| c.broadcaster.prediction = stored)
            .await;
        latest
    }

    pub async fn create_prediction(&self, prediction: &NewPrediction) {
        if !self
            .allowed("create_prediction", Some("channel:manage:predictions"))
            .await
        {
            return;
        }
        let Some(channel) = self.own_resolved("create_prediction").await else {
            return;
        };
        let request = CreatePredictionRequest {
            broadcaster_id: channel.id.clone(),
            title: prediction.title.clone(),
            outcomes: prediction
                .outcomes
                .iter()
                .filter(|o| !o.trim().is_empty())
                .map(|o| OutcomeTitle { title: o.clone() })
                .collect(),
            prediction_window: prediction.prediction_window,
        };

        let result = self.api.create_prediction(&request).await;
        if let Some(created) = settle("create_prediction", &channel.username, result) {
            tracing::info!(
                channel = %channel.username,
                title = %request.title,
                "created prediction"
            );
            self.channels
                .update_by_id(&channel.id, |c| c.broadcaster.prediction = created)
                .await;
        }
    }

    /// Locks, cancels, or resolves the latest prediction, which must be active or locked.
    pub async fn end_prediction(&self, end: &EndPrediction) {
        if !self
            .allowed("end_prediction", Some("channel:manage:predictions"))
            .await
        {
            return;
        }
        let Some(channel) = self.own_resolved("end_prediction").await else {
            return;
        };
        let Some(prediction) = self.get_predictions().await else {
            tracing::warn!(channel = %channel.username, "cannot end prediction, none found");
            return;
        };
        if !prediction.status.is_open() {
            tracing::warn!(
                channel = %channel.username,
                status = %prediction.status,
                "cannot end prediction, it is neither active nor locked"
            );
            return;
        }

        let (status, winning_outcome_id) = match end {
            EndPrediction::Resolve { outcome_title } => {
                let Some(outcome) = prediction.outcome_titled(outcome_title) else {
                    tracing::warn!(
                        channel = %channel.username,
                        outcome = %outcome_title,
                        "cannot resolve prediction, no outcome with that title"
                    );
                    return;
                };
                (PredictionStatus::Resolved, Some(outcome.id.as_str()))
            }
            EndPrediction::Cancel => (PredictionStatus::Canceled, None),
            EndPrediction::Lock => (PredictionStatus::Locked, None),
        };

        let result = self
            .api
            .end_prediction(&channel.id, &prediction.id, status, winning_outcome_id)
            .await;
        if let Some(ended) = settle("end_prediction", &channel.username, result) {
            tracing::info!(channel = %channel.username, %status, "prediction status changed");
            self.channels
                .update_by_id(&channel.id, |c| c.broadcaster.prediction = ended)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::tests::{operations_for, resolve};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn poll(status: &str) -> serde_json::Value {
        serde_json::json!({
            "data": [{
                "id": "p1",
                "broadcaster_id": "1",
                "title": "Best?",
                "choices": [
                    { "id": "c1", "title": "yes", "votes": 3 },
                    { "id": "c2", "title": "no", "votes": 1 }
                ],
                "status": status,
                "duration": 60,
                "started_at": "2024-05-01T12:00:00Z",
                "ended_at": null
            }]
        })
    }

    fn prediction(status: &str) -> serde_json::Value {
        serde_json::json!({
            "data": [{
                "id": "pr1",
                "broadcaster_id": "1",
                "title": "Win?",
                "winning_outcome_id": null,
                "outcomes": [
                    { "id": "o1", "title": "yes", "users": 2, "channel_points": 200, "color": "BLUE" },
                    { "id": "o2", "title": "no", "users": 1, "channel_points": 50, "color": "PINK" }
                ],
                "prediction_window": 120,
                "status": status,
                "created_at": "2024-05-01T12:00:00Z"
            }]
        })
    }

    #[tokio::test]
    async fn ending_inactive_poll_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/polls"))
            .and(query_param("broadcaster_id", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(poll("COMPLETED")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/polls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(poll("TERMINATED")))
            .expect(0)
            .mount(&server)
            .await;

        let ops = operations_for(&server, &["channel:manage:polls"], "me").await;
        resolve(&ops, "me", "1").await;
        ops.end_poll(EndPollStatus::Terminated).await;

        let stored = ops.channels.find_by_id("1").await.unwrap().broadcaster.poll;
        assert_eq!(stored.map(|p| p.status), Some(PollStatus::Completed));
    }

    #[tokio::test]
    async fn ending_active_poll() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/polls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(poll("ACTIVE")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/polls"))
            .and(body_json(serde_json::json!({
                "broadcaster_id": "1",
                "id": "p1",
                "status": "ARCHIVED"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(poll("ARCHIVED")))
            .expect(1)
            .mount(&server)
            .await;

        let ops = operations_for(&server, &["channel:manage:polls"], "me").await;
        resolve(&ops, "me", "1").await;
        ops.end_poll(EndPollStatus::Archived).await;

        let stored = ops.channels.find_by_id("1").await.unwrap().broadcaster.poll;
        assert_eq!(stored.map(|p| p.status), Some(PollStatus::Archived));
    }

    #[tokio::test]
    async fn resolving_prediction_needs_matching_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/predictions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(prediction("LOCKED")))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/predictions"))
            .and(body_json(serde_json::json!({
                "broadcaster_id": "1",
                "id": "pr1",
                "status": "RESOLVED",
                "winning_outcome_id": "o2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(prediction("RESOLVED")))
            .expect(1)
            .mount(&server)
            .await;

        let ops = operations_for(&server, &["channel:manage:predictions"], "me").await;
        resolve(&ops, "me", "1").await;
        ops.end_prediction(&EndPrediction::Resolve {
            outcome_title: "maybe".into(),
        })
        .await;
        ops.end_prediction(&EndPrediction::Resolve {
            outcome_title: "no".into(),
        })
        .await;
    }

    #[tokio::test]
    async fn polls_need_scope() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ops = operations_for(&server, &["channel:manage:polls"], "me").await;
        resolve(&ops, "me", "1").await;
        assert_eq!(ops.get_predictions().await, None);
        ops.create_prediction(&NewPrediction {
            title: "t".into(),
            outcomes: vec!["a".into(), "b".into()],
            prediction_window: 60,
        })
        .await;
        ops.end_prediction(&EndPrediction::Cancel).await;
    }

    #[tokio::test]
    async fn poll_operations_need_scope() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ops = operations_for(&server, &[], "me").await;
        resolve(&ops, "me", "1").await;
        let before = serde_json::to_value(ops.channels.snapshot().await).unwrap();

        assert_eq!(ops.get_polls().await, None);
        ops.create_poll(&NewPoll {
            title: "Best?".into(),
            choices: vec!["yes".into(), "no".into()],
            duration: 60,
            channel_points_per_vote: None,
        })
        .await;
        ops.end_poll(EndPollStatus::Terminated).await;

        let after = serde_json::to_value(ops.channels.snapshot().await).unwrap();
        assert_eq!(before, after);
    }
}

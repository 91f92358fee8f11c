use crate::operations::Operations;
use jiff::Timestamp;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Once-a-second housekeeping: rate-limit buckets, and on each wall-clock minute boundary the
/// chat activity rings and a stream status refresh.
#[derive(Debug)]
pub struct Ticker {
    ops: Operations,
    last_minute: Option<i64>,
}

impl Ticker {
    pub fn new(ops: Operations) -> Self {
        Self {
            ops,
            last_minute: None,
        }
    }

    pub async fn tick(&mut self, now: Timestamp) {
        self.ops.api().rotate_rate_limits().await;

        let minute = now.as_second().div_euclid(60);
        let Some(last) = self.last_minute.replace(minute) else {
            return;
        };
        if last == minute {
            return;
        }

        tracing::trace!(minute, "new minute");
        self.ops
            .channels()
            .update_all(|channel| channel.activity.rotate())
            .await;
        self.ops.get_streams().await;
    }

    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.tick(Timestamp::now()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::tests::{operations_for, resolve};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn at(second: i64) -> Timestamp {
        Timestamp::from_second(second).unwrap()
    }

    #[tokio::test]
    async fn rotates_activity_on_minute_boundaries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .expect(2)
            .mount(&server)
            .await;

        let ops = operations_for(&server, &[], "friend").await;
        resolve(&ops, "friend", "5").await;
        ops.channels()
            .update_by_username("friend", |c| c.activity.record_message())
            .await;

        let mut ticker = Ticker::new(ops.clone());
        ticker.tick(at(60_000)).await;
        ticker.tick(at(60_001)).await;
        ticker.tick(at(60_059)).await;
        let friend = ops.channels().find_by_username("friend").await.unwrap();
        assert_eq!(friend.activity.last_minutes(1), 1);

        ticker.tick(at(60_060)).await;
        let friend = ops.channels().find_by_username("friend").await.unwrap();
        assert_eq!(friend.activity.last_minutes(1), 0);
        assert_eq!(friend.activity.last_minutes(2), 1);

        // a long stall still rotates only once
        ticker.tick(at(60_600)).await;
        let friend = ops.channels().find_by_username("friend").await.unwrap();
        assert_eq!(friend.activity.last_minutes(3), 1);
    }

    #[tokio::test]
    async fn rate_limit_window_rotates_every_tick() {
        let server = MockServer::start().await;
        let ops = operations_for(&server, &[], "").await;
        let mut ticker = Ticker::new(ops.clone());
        ticker.tick(at(0)).await;
        ticker.tick(at(1)).await;
        assert_eq!(ops.api().rate_limits().await.requests_per_minute, 0);
    }
}

use serde::Serialize;
use std::collections::VecDeque;

/// Number of one-minute buckets kept per channel.
pub const ACTIVITY_MINUTES: usize = 60;

/// Rolling per-minute chat message counts for one channel.
///
/// `recent[0]` is the minute in progress. The ring is aged by [`ChatActivity::rotate`] on each
/// wall-clock minute boundary, so aggregates are bucket-aligned rather than a true sliding
/// window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatActivity {
    recent: VecDeque<u32>,
    pub total: u64,
}

impl Default for ChatActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatActivity {
    pub fn new() -> Self {
        Self {
            recent: std::iter::repeat_n(0, ACTIVITY_MINUTES).collect(),
            total: 0,
        }
    }

    pub fn record_message(&mut self) {
        if let Some(current) = self.recent.front_mut() {
            *current = current.saturating_add(1);
        }
        self.total += 1;
    }

    /// Starts a new minute, dropping the oldest bucket.
    pub fn rotate(&mut self) {
        self.recent.push_front(0);
        self.recent.truncate(ACTIVITY_MINUTES);
    }

    /// Sum of the `minutes` most recent buckets, the current one included.
    pub fn last_minutes(&self, minutes: usize) -> u64 {
        self.recent
            .iter()
            .take(minutes)
            .map(|&count| u64::from(count))
            .sum()
    }

    pub fn reset_total(&mut self) {
        tracing::debug!(total = self.total, "resetting chat total");
        self.total = 0;
    }

    pub fn buckets(&self) -> impl Iterator<Item = u32> + '_ {
        self.recent.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn starts_empty() {
        let activity = ChatActivity::new();
        assert_eq!(activity.buckets().count(), ACTIVITY_MINUTES);
        assert_eq!(activity.last_minutes(ACTIVITY_MINUTES), 0);
        assert_eq!(activity.total, 0);
    }

    #[test]
    fn aggregates_after_a_full_hour_and_one() {
        let mut activity = ChatActivity::new();
        for minute in 0..61 {
            if minute > 0 {
                activity.rotate();
            }
            activity.record_message();
        }

        assert_eq!(activity.last_minutes(1), 1);
        assert_eq!(activity.last_minutes(5), 5);
        assert_eq!(activity.last_minutes(15), 15);
        assert_eq!(activity.last_minutes(60), 60);
        assert_eq!(activity.total, 61);
    }

    #[test]
    fn rotation_drops_old_messages() {
        let mut activity = ChatActivity::new();
        activity.record_message();
        activity.record_message();
        for _ in 0..5 {
            activity.rotate();
        }
        assert_eq!(activity.last_minutes(5), 0);
        assert_eq!(activity.last_minutes(6), 2);
        assert_eq!(activity.total, 2);

        activity.reset_total();
        assert_eq!(activity.total, 0);
        assert_eq!(activity.last_minutes(60), 2);
    }
}

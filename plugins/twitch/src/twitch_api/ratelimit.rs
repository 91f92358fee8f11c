use http::HeaderMap;
use serde::Serialize;
use std::collections::VecDeque;

const DEFAULT_LIMIT: u32 = 800;
const WINDOW_SECONDS: usize = 60;

/// Informational view of Helix rate limiting.
///
/// Nothing is throttled on the client side; an exhausted bucket surfaces as a 429 from Twitch.
/// `requests_per_minute` is the sum of the last 60 one-second buckets as of the most recent
/// [`RateLimitTracker::rotate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitTracker {
    pub limit: u32,
    pub remaining: u32,
    pub requests_per_minute: u32,
    #[serde(skip)]
    counts: VecDeque<u32>,
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            remaining: DEFAULT_LIMIT,
            requests_per_minute: 0,
            counts: VecDeque::from([0]),
        }
    }
}

impl RateLimitTracker {
    /// Records one response, picking up `Ratelimit-Limit` and `Ratelimit-Remaining` if present.
    pub fn record(&mut self, headers: &HeaderMap) {
        if let Some(limit) = header_number(headers, "ratelimit-limit") {
            self.limit = limit;
        }
        if let Some(remaining) = header_number(headers, "ratelimit-remaining") {
            self.remaining = remaining;
        }
        if let Some(current) = self.counts.front_mut() {
            *current += 1;
        }
    }

    /// Called once a second: recomputes the per-minute total and opens a new bucket.
    pub fn rotate(&mut self) {
        self.requests_per_minute = self.counts.iter().sum();
        self.counts.push_front(0);
        self.counts.truncate(WINDOW_SECONDS);
    }
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_to_eight_hundred() {
        let tracker = RateLimitTracker::default();
        assert_eq!(tracker.limit, 800);
        assert_eq!(tracker.remaining, 800);
    }

    #[test]
    fn records_headers_and_counts() {
        let mut tracker = RateLimitTracker::default();
        let mut headers = HeaderMap::new();
        headers.insert("Ratelimit-Limit", HeaderValue::from_static("1200"));
        headers.insert("Ratelimit-Remaining", HeaderValue::from_static("1187"));
        tracker.record(&headers);
        tracker.record(&HeaderMap::new());

        assert_eq!(tracker.limit, 1200);
        assert_eq!(tracker.remaining, 1187);
        tracker.rotate();
        assert_eq!(tracker.requests_per_minute, 2);
    }

    #[test]
    fn window_forgets_after_a_minute() {
        let mut tracker = RateLimitTracker::default();
        tracker.record(&HeaderMap::new());
        for _ in 0..WINDOW_SECONDS {
            tracker.rotate();
        }
        assert_eq!(tracker.requests_per_minute, 1);
        tracker.rotate();
        assert_eq!(tracker.requests_per_minute, 0);
    }
}

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::{ChatId, ThreadId, UserId};

// ============== Authorization ==============

/// An empty allow-list means the bot is public; otherwise the sender must be listed.
pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    if allowed_users.is_empty() {
        return true;
    }
    let Some(user_id) = user_id else {
        return false;
    };
    allowed_users.contains(&user_id.0)
}

// ============== Topic Restriction ==============

/// Restricts the bot to a single forum topic of its home chat.
///
/// Messages from other chats are not affected; the restriction only narrows
/// what the bot reacts to inside the home supergroup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopicFilter {
    pub chat_id: ChatId,
    pub thread_id: ThreadId,
}

impl TopicFilter {
    pub fn from_config(chat_id: Option<i64>, topic_id: Option<i32>) -> Option<Self> {
        Some(Self {
            chat_id: ChatId(chat_id?),
            thread_id: ThreadId(topic_id?),
        })
    }

    pub fn allows(&self, chat_id: ChatId, thread_id: Option<ThreadId>) -> bool {
        if chat_id != self.chat_id {
            return true;
        }
        thread_id == Some(self.thread_id)
    }
}

// ============== Rate Limiter ==============

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Token bucket: `level` tokens as of `at`.
#[derive(Clone, Copy, Debug)]
struct Bucket {
    level: f64,
    at: Instant,
}

impl Bucket {
    /// Refill up to `capacity`, then spend one token or report the wait for the next.
    fn take(&mut self, now: Instant, capacity: f64, per_sec: f64) -> RateDecision {
        let refill = now.saturating_duration_since(self.at).as_secs_f64() * per_sec;
        self.level = (self.level + refill).min(capacity);
        self.at = now;

        if self.level >= 1.0 {
            self.level -= 1.0;
            RateDecision::Allowed
        } else {
            RateDecision::Limited {
                retry_after: Duration::from_secs_f64((1.0 - self.level) / per_sec),
            }
        }
    }
}

/// Per-sender limit of `requests` per `window`, refilled continuously.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    enabled: bool,
    capacity: f64,
    per_sec: f64,
    buckets: HashMap<UserId, Bucket>,
}

impl RateLimiter {
    pub fn new(enabled: bool, requests: u32, window: Duration) -> Self {
        let capacity = f64::from(requests.max(1));
        Self {
            enabled,
            capacity,
            per_sec: capacity / window.as_secs_f64().max(0.001),
            buckets: HashMap::new(),
        }
    }

    pub fn check(&mut self, user_id: UserId) -> RateDecision {
        self.check_at(user_id, Instant::now())
    }

    pub fn check_at(&mut self, user_id: UserId, now: Instant) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed;
        }
        let capacity = self.capacity;
        self.buckets
            .entry(user_id)
            .or_insert(Bucket {
                level: capacity,
                at: now,
            })
            .take(now, capacity, self.per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_is_open() {
        assert!(is_authorized(Some(UserId(5)), &[]));
        assert!(is_authorized(None, &[]));
    }

    #[test]
    fn allow_list_requires_known_sender() {
        assert!(is_authorized(Some(UserId(5)), &[5, 6]));
        assert!(!is_authorized(Some(UserId(7)), &[5, 6]));
        assert!(!is_authorized(None, &[5]));
    }

    #[test]
    fn topic_filter_only_narrows_home_chat() {
        let f = TopicFilter::from_config(Some(-100), Some(3)).unwrap();
        assert!(f.allows(ChatId(-100), Some(ThreadId(3))));
        assert!(!f.allows(ChatId(-100), Some(ThreadId(4))));
        assert!(!f.allows(ChatId(-100), None));
        assert!(f.allows(ChatId(42), None));
    }

    #[test]
    fn topic_filter_needs_both_ids() {
        assert!(TopicFilter::from_config(Some(-100), None).is_none());
        assert!(TopicFilter::from_config(None, Some(3)).is_none());
    }

    #[test]
    fn burst_then_refill() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 2, Duration::from_secs(10));
        let u = UserId(1);

        assert_eq!(rl.check_at(u, start), RateDecision::Allowed);
        assert_eq!(rl.check_at(u, start), RateDecision::Allowed);
        match rl.check_at(u, start) {
            RateDecision::Limited { retry_after } => {
                assert!((retry_after.as_secs_f64() - 5.0).abs() < 0.01)
            }
            other => panic!("expected limit, got {other:?}"),
        }

        // 2 per 10s: one token back after 5s.
        assert_eq!(
            rl.check_at(u, start + Duration::from_secs(5)),
            RateDecision::Allowed
        );
    }

    #[test]
    fn senders_have_separate_buckets() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 1, Duration::from_secs(60));
        assert_eq!(rl.check_at(UserId(1), start), RateDecision::Allowed);
        assert!(matches!(
            rl.check_at(UserId(1), start),
            RateDecision::Limited { .. }
        ));
        assert_eq!(rl.check_at(UserId(2), start), RateDecision::Allowed);
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(false, 1, Duration::from_secs(60));
        for _ in 0..10 {
            assert_eq!(rl.check_at(UserId(1), start), RateDecision::Allowed);
        }
    }
}

//! Per-message checks that run before any handler: topic restriction,
//! allow-list, rate limit. In that order.

use std::time::Duration;

use tokio::sync::Mutex;

use tgkit_core::{
    config::Config,
    domain::{ChatId, ThreadId, UserId},
    security::{is_authorized, RateDecision, RateLimiter, TopicFilter},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Incoming {
    pub chat_id: ChatId,
    pub thread_id: Option<ThreadId>,
    pub user_id: Option<UserId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Pass,
    /// Outside the configured topic; dropped without a reply.
    Ignore,
    Unauthorized,
    Limited { retry_after: Duration },
}

pub struct Gatekeeper {
    topic: Option<TopicFilter>,
    allowed_users: Vec<i64>,
    limiter: Mutex<RateLimiter>,
}

impl Gatekeeper {
    pub fn new(topic: Option<TopicFilter>, allowed_users: Vec<i64>, limiter: RateLimiter) -> Self {
        Self {
            topic,
            allowed_users,
            limiter: Mutex::new(limiter),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            TopicFilter::from_config(cfg.telegram_chat_id, cfg.telegram_topic_id),
            cfg.telegram_allowed_users.clone(),
            RateLimiter::new(
                cfg.rate_limit_enabled,
                cfg.rate_limit_requests,
                cfg.rate_limit_window,
            ),
        )
    }

    pub async fn check(&self, incoming: Incoming) -> Gate {
        if let Some(topic) = &self.topic {
            if !topic.allows(incoming.chat_id, incoming.thread_id) {
                return Gate::Ignore;
            }
        }

        if !is_authorized(incoming.user_id, &self.allowed_users) {
            return Gate::Unauthorized;
        }

        // Anonymous senders (channel posts) share the chat's bucket.
        let bucket = incoming.user_id.unwrap_or(UserId(incoming.chat_id.0));
        match self.limiter.lock().await.check(bucket) {
            RateDecision::Allowed => Gate::Pass,
            RateDecision::Limited { retry_after } => Gate::Limited { retry_after },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming(chat: i64, thread: Option<i32>, user: Option<i64>) -> Incoming {
        Incoming {
            chat_id: ChatId(chat),
            thread_id: thread.map(ThreadId),
            user_id: user.map(UserId),
        }
    }

    #[tokio::test]
    async fn topic_filter_runs_before_auth() {
        let gate = Gatekeeper::new(
            TopicFilter::from_config(Some(-100), Some(7)),
            vec![1],
            RateLimiter::new(false, 1, Duration::from_secs(60)),
        );

        // Stranger outside the topic: silently ignored, not told off.
        assert_eq!(gate.check(incoming(-100, Some(8), Some(2))).await, Gate::Ignore);
        assert_eq!(
            gate.check(incoming(-100, Some(7), Some(2))).await,
            Gate::Unauthorized
        );
        assert_eq!(gate.check(incoming(-100, Some(7), Some(1))).await, Gate::Pass);
        // Other chats are not topic-restricted.
        assert_eq!(gate.check(incoming(5, None, Some(1))).await, Gate::Pass);
    }

    #[tokio::test]
    async fn open_bot_still_rate_limits() {
        let gate = Gatekeeper::new(
            None,
            vec![],
            RateLimiter::new(true, 1, Duration::from_secs(60)),
        );

        assert_eq!(gate.check(incoming(5, None, Some(9))).await, Gate::Pass);
        assert!(matches!(
            gate.check(incoming(5, None, Some(9))).await,
            Gate::Limited { .. }
        ));
        // Separate bucket per user.
        assert_eq!(gate.check(incoming(5, None, Some(10))).await, Gate::Pass);
    }
}

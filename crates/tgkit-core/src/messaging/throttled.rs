use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::{
    domain::{ChatId, Destination, MessageRef},
    messaging::{port::MessagingPort, types::ForumTopic},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Spacing between any two calls.
    pub global_min_interval: Duration,
    /// Spacing between calls into the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Next free slot, globally and per chat.
#[derive(Debug, Default)]
struct Schedule {
    global: Option<Instant>,
    chats: HashMap<ChatId, Instant>,
}

impl Schedule {
    /// Book the earliest slot both clocks allow and return it.
    fn book(&mut self, chat_id: ChatId, now: Instant, cfg: &ThrottleConfig) -> Instant {
        let mut at = now;
        if let Some(free) = self.global {
            at = at.max(free);
        }
        if let Some(free) = self.chats.get(&chat_id) {
            at = at.max(*free);
        }
        self.global = Some(at + cfg.global_min_interval);
        self.chats.insert(chat_id, at + cfg.per_chat_min_interval);
        at
    }
}

/// [`MessagingPort`] decorator that spaces outbound calls to stay clear of 429s.
///
/// Mostly matters for the chat log flusher, which can emit several batches back to back.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    schedule: Mutex<Schedule>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            schedule: Mutex::new(Schedule::default()),
        }
    }

    async fn pace(&self, chat_id: ChatId) {
        let slot = self
            .schedule
            .lock()
            .await
            .book(chat_id, Instant::now(), &self.cfg);
        sleep_until(slot).await;
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_html(&self, dest: Destination, html: &str) -> Result<MessageRef> {
        self.pace(dest.chat_id).await;
        self.inner.send_html(dest, html).await
    }

    async fn create_forum_topic(&self, chat_id: ChatId, name: &str) -> Result<ForumTopic> {
        self.pace(chat_id).await;
        self.inner.create_forum_topic(chat_id, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ThrottleConfig {
        ThrottleConfig {
            global_min_interval: Duration::from_millis(10),
            per_chat_min_interval: Duration::from_millis(100),
        }
    }

    #[test]
    fn same_chat_waits_for_its_own_interval() {
        let now = Instant::now();
        let mut s = Schedule::default();
        assert_eq!(s.book(ChatId(1), now, &cfg()), now);
        assert_eq!(
            s.book(ChatId(1), now, &cfg()),
            now + Duration::from_millis(100)
        );
    }

    #[test]
    fn other_chats_only_wait_for_the_global_interval() {
        let now = Instant::now();
        let mut s = Schedule::default();
        s.book(ChatId(1), now, &cfg());
        assert_eq!(
            s.book(ChatId(2), now, &cfg()),
            now + Duration::from_millis(10)
        );
    }

    #[test]
    fn idle_time_clears_the_backlog() {
        let now = Instant::now();
        let mut s = Schedule::default();
        s.book(ChatId(1), now, &cfg());
        s.book(ChatId(1), now, &cfg());
        let later = now + Duration::from_secs(1);
        assert_eq!(s.book(ChatId(1), later, &cfg()), later);
    }
}

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric). Ids from one peer grow monotonically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i32);

/// Forum topic id inside a supergroup (`message_thread_id` in the Bot API).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Where an outgoing message goes: a chat, optionally narrowed to one forum topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    pub chat_id: ChatId,
    pub thread_id: Option<ThreadId>,
}

impl Destination {
    pub fn chat(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            thread_id: None,
        }
    }

    pub fn topic(chat_id: ChatId, thread_id: ThreadId) -> Self {
        Self {
            chat_id,
            thread_id: Some(thread_id),
        }
    }
}

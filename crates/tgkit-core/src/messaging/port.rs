use async_trait::async_trait;

use crate::{
    domain::{ChatId, Destination, MessageRef},
    messaging::types::ForumTopic,
    Result,
};

/// What the bot runtime needs from the Bot API.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send an HTML-formatted message, into the destination's topic if it has one.
    async fn send_html(&self, dest: Destination, html: &str) -> Result<MessageRef>;

    /// Create a forum topic in a supergroup with topics enabled.
    async fn create_forum_topic(&self, chat_id: ChatId, name: &str) -> Result<ForumTopic>;
}

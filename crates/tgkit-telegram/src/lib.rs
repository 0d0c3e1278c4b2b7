//! Bot API adapter (teloxide): the production [`MessagingPort`] and the
//! long-polling runtime.

use std::future::IntoFuture;

use async_trait::async_trait;
use teloxide::{prelude::*, types::ParseMode, RequestError};
use tokio::time::sleep;
use tracing::debug;

pub mod handlers;
pub mod middleware;
pub mod router;

use tgkit_core::{
    domain::{ChatId, Destination, MessageId, MessageRef, ThreadId},
    errors::Error,
    messaging::{port::MessagingPort, types::ForumTopic},
    Result,
};

/// Icon color for topics created by the bot (one of the six Telegram accepts).
const TOPIC_ICON_COLOR: u32 = 0x6FB9F0;

/// Extra attempts after a `RetryAfter` (flood wait) answer.
const FLOOD_RETRIES: usize = 1;

fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

/// Run a request, honoring Telegram's flood-wait once before giving up.
async fn with_retry<T, Req>(mut request: impl FnMut() -> Req) -> Result<T>
where
    Req: IntoFuture<Output = std::result::Result<T, RequestError>>,
    Req::IntoFuture: Send,
{
    let mut retries = 0;
    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(RequestError::RetryAfter(wait)) if retries < FLOOD_RETRIES => {
                retries += 1;
                debug!("flood wait {wait:?}, retrying");
                sleep(wait).await;
            }
            Err(e) => return Err(Error::External(format!("telegram error: {e}"))),
        }
    }
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, dest: Destination, html: &str) -> Result<MessageRef> {
        let sent = with_retry(|| {
            let request = self
                .bot
                .send_message(tg_chat(dest.chat_id), html.to_string())
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true);
            match dest.thread_id {
                Some(ThreadId(thread)) => request.message_thread_id(thread),
                None => request,
            }
        })
        .await?;

        Ok(MessageRef {
            chat_id: dest.chat_id,
            message_id: MessageId(sent.id.0),
        })
    }

    async fn create_forum_topic(&self, chat_id: ChatId, name: &str) -> Result<ForumTopic> {
        let topic = with_retry(|| {
            self.bot.create_forum_topic(
                tg_chat(chat_id),
                name.to_string(),
                TOPIC_ICON_COLOR,
                String::new(),
            )
        })
        .await?;

        Ok(ForumTopic {
            thread_id: ThreadId(topic.message_thread_id),
            name: topic.name,
        })
    }
}

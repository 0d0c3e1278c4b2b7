//! Telegram update handlers.
//!
//! Every message goes through the [`Gatekeeper`](crate::middleware::Gatekeeper)
//! first; only commands get an answer beyond that.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{debug, warn};

use tgkit_core::{
    domain::{ChatId, Destination, ThreadId, UserId},
    messaging::port::MessagingPort,
};

use crate::{
    middleware::{Gate, Incoming},
    router::AppState,
};

mod commands;

pub use commands::CommandContext;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let ctx = CommandContext {
        chat_id: ChatId(msg.chat.id.0),
        thread_id: msg.thread_id.map(ThreadId),
        user_id: msg.from().map(|u| UserId(u.id.0 as i64)),
        is_private: msg.chat.is_private(),
    };
    let dest = ctx.reply_destination();

    match state
        .gate
        .check(Incoming {
            chat_id: ctx.chat_id,
            thread_id: ctx.thread_id,
            user_id: ctx.user_id,
        })
        .await
    {
        Gate::Pass => {}
        Gate::Ignore => return Ok(()),
        Gate::Unauthorized => {
            debug!("unauthorized sender {:?} in chat {}", ctx.user_id, ctx.chat_id.0);
            reply(
                state.messenger.as_ref(),
                dest,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await;
            return Ok(());
        }
        Gate::Limited { retry_after } => {
            let text = format!(
                "⏳ Rate limited. Please wait {:.1} seconds.",
                retry_after.as_secs_f64()
            );
            reply(state.messenger.as_ref(), dest, &text).await;
            return Ok(());
        }
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    let answer = if text.starts_with('/') {
        commands::respond(&state, &ctx, text).await
    } else if ctx.is_private {
        Some("Send /help to see what I can do.".to_string())
    } else {
        None
    };

    if let Some(html) = answer {
        reply(state.messenger.as_ref(), dest, &html).await;
    }
    Ok(())
}

/// Send a reply. Failures are logged and never reach the dispatcher.
pub(crate) async fn reply(messenger: &dyn MessagingPort, dest: Destination, html: &str) {
    if let Err(e) = messenger.send_html(dest, html).await {
        warn!("reply to chat {} failed: {e}", dest.chat_id.0);
    }
}

/// Replies go back into the topic the message came from.
pub(crate) fn reply_destination(chat_id: ChatId, thread_id: Option<ThreadId>) -> Destination {
    match thread_id {
        Some(thread) => Destination::topic(chat_id, thread),
        None => Destination::chat(chat_id),
    }
}

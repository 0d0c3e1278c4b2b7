use std::time::Duration;

use tracing::{info, warn};

use tgkit_core::{
    commands::{parse_command, BOT_COMMANDS},
    domain::{ChatId, Destination, ThreadId, UserId},
    formatting::escape_html,
};

use crate::router::AppState;

/// Where a command came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandContext {
    pub chat_id: ChatId,
    pub thread_id: Option<ThreadId>,
    pub user_id: Option<UserId>,
    pub is_private: bool,
}

impl CommandContext {
    pub fn reply_destination(&self) -> Destination {
        super::reply_destination(self.chat_id, self.thread_id)
    }
}

fn format_duration(d: Duration) -> String {
    let seconds = d.as_secs();
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        return format!("{days}d {hours}h {mins}m");
    }
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

fn help_text() -> String {
    let mut lines = vec!["<b>📋 Commands:</b>".to_string()];
    lines.extend(
        BOT_COMMANDS
            .iter()
            .map(|c| format!("/{} - {}", c.name, escape_html(c.description))),
    );
    lines.join("\n")
}

/// HTML reply for a command message, or `None` when nothing should be sent.
pub(crate) async fn respond(state: &AppState, ctx: &CommandContext, text: &str) -> Option<String> {
    let (cmd, arg) = parse_command(text);

    let reply = match cmd.as_str() {
        "start" => format!(
            "👋 <b>Hello!</b>\n\nThis bot is up and running.\n\n{}",
            help_text()
        ),

        "help" => help_text(),

        "ping" => "🏓 pong".to_string(),

        "id" => {
            let mut lines = vec![format!("Chat: <code>{}</code>", ctx.chat_id.0)];
            if let Some(user) = ctx.user_id {
                lines.push(format!("User: <code>{}</code>", user.0));
            }
            if let Some(thread) = ctx.thread_id {
                lines.push(format!("Topic: <code>{}</code>", thread.0));
            }
            lines.join("\n")
        }

        "status" => {
            let cfg = &state.cfg;
            let mut lines = vec![
                "📊 <b>Bot Status</b>\n".to_string(),
                format!("Uptime: {}", format_duration(state.started_at.elapsed())),
                format!("PID: <code>{}</code>", state.pid),
            ];
            if cfg.telegram_allowed_users.is_empty() {
                lines.push("Access: open".to_string());
            } else {
                lines.push(format!(
                    "Access: {} allowed user(s)",
                    cfg.telegram_allowed_users.len()
                ));
            }
            if cfg.rate_limit_enabled {
                lines.push(format!(
                    "Rate limit: {} per {}s",
                    cfg.rate_limit_requests,
                    cfg.rate_limit_window.as_secs()
                ));
            } else {
                lines.push("Rate limit: off".to_string());
            }
            if let (Some(chat_id), Some(topic_id)) = (cfg.telegram_chat_id, cfg.telegram_topic_id)
            {
                lines.push(format!(
                    "Topic lock: <code>{chat_id}</code> / <code>{topic_id}</code>"
                ));
            }
            if let Some(buffer) = &state.log_buffer {
                lines.push(format!(
                    "Chat log: {} pending, {} dropped",
                    buffer.len(),
                    buffer.dropped_total()
                ));
            }
            lines.join("\n")
        }

        "topic" => {
            let name = arg.trim();
            if name.is_empty() {
                return Some("Usage: <code>/topic &lt;name&gt;</code>".to_string());
            }
            if ctx.is_private {
                return Some("❌ Topics can only be created in a forum supergroup.".to_string());
            }
            match state.messenger.create_forum_topic(ctx.chat_id, name).await {
                Ok(topic) => {
                    info!(
                        "created topic {:?} ({}) in chat {}",
                        topic.name, topic.thread_id.0, ctx.chat_id.0
                    );
                    format!(
                        "✅ Topic <b>{}</b> created (id <code>{}</code>)",
                        escape_html(&topic.name),
                        topic.thread_id.0
                    )
                }
                Err(e) => {
                    warn!("topic creation failed in chat {}: {e}", ctx.chat_id.0);
                    format!(
                        "❌ Could not create topic: {}",
                        escape_html(&e.to_string())
                    )
                }
            }
        }

        "" => return None,

        other => format!(
            "Unknown command: /{}\nSend /help for the list.",
            escape_html(other)
        ),
    };

    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tgkit_core::{
        config::Config,
        domain::MessageRef,
        errors::Error,
        logging::ChatLogBuffer,
        messaging::{
            port::MessagingPort,
            types::ForumTopic,
        },
        Result,
    };

    #[derive(Default)]
    struct FakeMessenger {
        topics: Mutex<Vec<(ChatId, String)>>,
        fail_topics: bool,
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_html(&self, dest: Destination, _html: &str) -> Result<MessageRef> {
            Ok(MessageRef {
                chat_id: dest.chat_id,
                message_id: tgkit_core::domain::MessageId(1),
            })
        }

        async fn create_forum_topic(&self, chat_id: ChatId, name: &str) -> Result<ForumTopic> {
            if self.fail_topics {
                return Err(Error::External(
                    "telegram error: Bad Request: the chat is not a forum".to_string(),
                ));
            }
            let mut topics = self.topics.lock().unwrap();
            topics.push((chat_id, name.to_string()));
            Ok(ForumTopic {
                thread_id: ThreadId(100 + topics.len() as i32),
                name: name.to_string(),
            })
        }
    }

    fn state_with(messenger: Arc<FakeMessenger>, extra: &[(&str, &str)]) -> AppState {
        let mut vars = vec![("TELEGRAM_BOT_TOKEN", "1:abc")];
        vars.extend_from_slice(extra);
        let cfg = Config::from_vars(|k| {
            vars.iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.to_string())
        })
        .unwrap();
        AppState::new(Arc::new(cfg), messenger, Some(ChatLogBuffer::new(4)), 4242)
    }

    fn group_ctx() -> CommandContext {
        CommandContext {
            chat_id: ChatId(-100123),
            thread_id: Some(ThreadId(9)),
            user_id: Some(UserId(77)),
            is_private: false,
        }
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 61)), "3h 1m 1s");
        assert_eq!(format_duration(Duration::from_secs(2 * 86400 + 3600)), "2d 1h 0m");
    }

    #[test]
    fn replies_stay_in_the_topic() {
        assert_eq!(
            group_ctx().reply_destination(),
            Destination::topic(ChatId(-100123), ThreadId(9))
        );
    }

    #[tokio::test]
    async fn help_lists_every_command() {
        let state = state_with(Arc::new(FakeMessenger::default()), &[]);
        let reply = respond(&state, &group_ctx(), "/help").await.unwrap();
        for c in BOT_COMMANDS {
            assert!(reply.contains(&format!("/{}", c.name)), "missing /{}", c.name);
        }
    }

    #[tokio::test]
    async fn id_reports_chat_user_and_topic() {
        let state = state_with(Arc::new(FakeMessenger::default()), &[]);
        let reply = respond(&state, &group_ctx(), "/id@tgkit_bot").await.unwrap();
        assert!(reply.contains("<code>-100123</code>"));
        assert!(reply.contains("User: <code>77</code>"));
        assert!(reply.contains("Topic: <code>9</code>"));
    }

    #[tokio::test]
    async fn status_shows_runtime_details() {
        let state = state_with(
            Arc::new(FakeMessenger::default()),
            &[("TELEGRAM_ALLOWED_USERS", "1,2"), ("RATE_LIMIT_ENABLED", "false")],
        );
        let reply = respond(&state, &group_ctx(), "/status").await.unwrap();
        assert!(reply.contains("PID: <code>4242</code>"));
        assert!(reply.contains("2 allowed user(s)"));
        assert!(reply.contains("Rate limit: off"));
        assert!(reply.contains("0 dropped"));
    }

    #[tokio::test]
    async fn topic_creates_forum_topic_in_current_chat() {
        let messenger = Arc::new(FakeMessenger::default());
        let state = state_with(messenger.clone(), &[]);

        let reply = respond(&state, &group_ctx(), "/topic Release <notes>")
            .await
            .unwrap();
        assert!(reply.contains("Release &lt;notes&gt;"));
        assert!(reply.contains("<code>101</code>"));
        assert_eq!(
            *messenger.topics.lock().unwrap(),
            vec![(ChatId(-100123), "Release <notes>".to_string())]
        );
    }

    #[tokio::test]
    async fn topic_needs_a_name_and_a_group() {
        let messenger = Arc::new(FakeMessenger::default());
        let state = state_with(messenger.clone(), &[]);

        let usage = respond(&state, &group_ctx(), "/topic   ").await.unwrap();
        assert!(usage.starts_with("Usage:"));

        let private = CommandContext {
            is_private: true,
            thread_id: None,
            ..group_ctx()
        };
        let reply = respond(&state, &private, "/topic Notes").await.unwrap();
        assert!(reply.contains("forum supergroup"));
        assert!(messenger.topics.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn topic_failure_is_reported() {
        let messenger = Arc::new(FakeMessenger {
            fail_topics: true,
            ..Default::default()
        });
        let state = state_with(messenger, &[]);
        let reply = respond(&state, &group_ctx(), "/topic Notes").await.unwrap();
        assert!(reply.starts_with("❌ Could not create topic"));
        assert!(reply.contains("not a forum"));
    }

    #[tokio::test]
    async fn unknown_and_empty_commands() {
        let state = state_with(Arc::new(FakeMessenger::default()), &[]);
        let reply = respond(&state, &group_ctx(), "/frobnicate").await.unwrap();
        assert!(reply.contains("Unknown command: /frobnicate"));
        assert_eq!(respond(&state, &group_ctx(), "/").await, None);
    }
}

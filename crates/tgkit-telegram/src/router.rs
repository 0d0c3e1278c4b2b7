use std::{sync::Arc, time::Instant};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tgkit_core::{
    commands::BOT_COMMANDS,
    config::Config,
    domain::{ChatId, Destination, ThreadId},
    logging::{spawn_chat_log_flusher, ChatLogBuffer},
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
};

use crate::{handlers, middleware::Gatekeeper, TelegramMessenger};

pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub gate: Gatekeeper,
    pub started_at: Instant,
    pub pid: u32,
    /// Present when log lines are mirrored into a chat.
    pub log_buffer: Option<ChatLogBuffer>,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        log_buffer: Option<ChatLogBuffer>,
        pid: u32,
    ) -> Self {
        Self {
            gate: Gatekeeper::from_config(&cfg),
            cfg,
            messenger,
            started_at: Instant::now(),
            pid,
            log_buffer,
        }
    }
}

/// Run the bot until Ctrl-C.
pub async fn run_polling(
    cfg: Arc<Config>,
    log_buffer: Option<ChatLogBuffer>,
    pid: u32,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    info!("tgkit started: @{}", me.username());
    if cfg.telegram_allowed_users.is_empty() {
        info!("no allow-list configured, answering everyone");
    } else {
        info!("allowed users: {}", cfg.telegram_allowed_users.len());
    }

    // Throttle on top of the adapter's RetryAfter handling to stay clear of 429s.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let commands: Vec<BotCommand> = BOT_COMMANDS
        .iter()
        .map(|c| BotCommand::new(c.name, c.description))
        .collect();
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to publish command list: {e}");
    }

    let cancel = CancellationToken::new();
    let flusher = match (&log_buffer, cfg.log_chat_id) {
        (Some(buffer), Some(chat_id)) => {
            let dest = Destination {
                chat_id: ChatId(chat_id),
                thread_id: cfg.log_thread_id.map(ThreadId),
            };
            info!("mirroring {}+ logs to chat {chat_id}", cfg.log_chat_level);
            Some(spawn_chat_log_flusher(
                buffer.clone(),
                messenger.clone(),
                dest,
                cfg.log_flush_interval,
                cfg.telegram_safe_limit,
                cancel.clone(),
            ))
        }
        _ => None,
    };

    let state = Arc::new(AppState::new(cfg, messenger, log_buffer, pid));

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            if let Ok(done) = shutdown.shutdown() {
                done.await;
            }
        }
    });

    dispatcher.dispatch().await;

    cancel.cancel();
    if let Some(flusher) = flusher {
        let _ = flusher.await;
    }
    Ok(())
}

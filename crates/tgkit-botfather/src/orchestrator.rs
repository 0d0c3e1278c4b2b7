//! Scripted conversations with BotFather.
//!
//! Every step has the same shape: clear the buffer, send (or click), pause,
//! wait for the reply, then interpret it. A missing reply aborts the current
//! operation; nothing is retried.

use std::{collections::HashSet, sync::Arc, time::Duration};

use tgkit_core::config::MtprotoConfig;
use tracing::{debug, info, warn};

use crate::{
    buttons::{
        self, find_bot_button_data, find_button_data, find_pagination_data, has_menu_buttons,
        Direction, API_TOKEN, BACK_TO_BOT, BACK_TO_BOT_LIST,
    },
    channel::{MessageChannel, Transport},
    error::{StepError, StepResult},
    message::{CallbackData, InboundMessage, MessageId},
    parser::{
        extract_text, is_name_prompt, is_username_prompt, parse_bots_from_buttons,
        parse_bots_from_text, parse_token, validate_bot_username, BotRecord,
    },
    waiter::ResponseWaiter,
};

/// Hard ceiling on list pages, in case a "next" button never goes away.
pub const MAX_PAGES: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverTimings {
    /// Pause after subscribing, before the first send.
    pub settle: Duration,
    /// Pause after each send or click.
    pub step_delay: Duration,
    pub reply_timeout: Duration,
}

impl Default for DriverTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            step_delay: Duration::from_millis(1500),
            reply_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&MtprotoConfig> for DriverTimings {
    fn from(cfg: &MtprotoConfig) -> Self {
        Self {
            settle: cfg.settle_delay,
            step_delay: cfg.step_delay,
            reply_timeout: cfg.reply_timeout,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedBot {
    pub username: String,
    pub token: String,
}

/// Outcome of [`BotFatherDriver::fetch_all_tokens`].
#[derive(Clone, Debug, Default)]
pub struct TokenReport {
    /// Every bot seen, with `token` filled where it could be read.
    pub bots: Vec<BotRecord>,
    /// Bots whose token reply could not be parsed.
    pub failures: Vec<(String, StepError)>,
}

pub struct BotFatherDriver {
    channel: MessageChannel,
    waiter: ResponseWaiter,
    timings: DriverTimings,
    last_seen: Option<MessageId>,
}

impl BotFatherDriver {
    pub fn new(transport: Arc<dyn Transport>, timings: DriverTimings) -> Self {
        Self {
            channel: MessageChannel::new(transport),
            waiter: ResponseWaiter::new(),
            timings,
            last_seen: None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.channel.is_listening()
    }

    /// Stop listening. Safe to call repeatedly; the next operation re-subscribes.
    pub fn close(&mut self) {
        self.channel.remove_listener();
    }

    // ============== Operations ==============

    /// `/newbot` → name → username → token.
    pub async fn create_bot(&mut self, name: &str, username: &str) -> StepResult<CreatedBot> {
        let username = username.trim_start_matches('@');
        validate_bot_username(username)?;
        info!("creating bot @{username}");

        let reply = self.command("/newbot", "/newbot").await?;
        let text = extract_text(&reply);
        if !is_name_prompt(&text) {
            return Err(StepError::unexpected("a bot name prompt", &text));
        }

        let reply = self.command(name, "bot name").await?;
        let text = extract_text(&reply);
        if !is_username_prompt(&text) {
            return Err(StepError::unexpected("a bot username prompt", &text));
        }

        let reply = self.command(username, "bot username").await?;
        let parsed = parse_token(&extract_text(&reply)).map_err(|e| match e {
            StepError::UsernameTaken(_) => StepError::UsernameTaken(username.to_string()),
            StepError::InvalidUsername(_) => StepError::InvalidUsername(username.to_string()),
            other => other,
        })?;

        info!("bot @{username} created");
        Ok(CreatedBot {
            username: parsed.username.unwrap_or_else(|| username.to_string()),
            token: parsed.token,
        })
    }

    /// Every bot in `/mybots`, following "next" pages.
    pub async fn list_bots(&mut self) -> StepResult<Vec<BotRecord>> {
        let mut list = self.command("/mybots", "/mybots").await?;
        let mut seen = HashSet::new();
        let mut bots = Vec::new();
        let mut page = 1;

        loop {
            let mut found = parse_bots_from_buttons(&list);
            if found.is_empty() && page == 1 {
                found = parse_bots_from_text(&extract_text(&list));
            }
            debug!("page {page}: {} bots", found.len());
            for bot in found {
                if seen.insert(bot.username.to_lowercase()) {
                    bots.push(bot);
                }
            }

            let Some(next) = find_pagination_data(&list, Direction::Next) else {
                break;
            };
            if page >= MAX_PAGES {
                warn!("stopping bot list at the {MAX_PAGES}-page ceiling");
                break;
            }
            page += 1;
            list = self.press(&list, &next, &format!("bot list page {page}")).await?;
        }

        info!("found {} bots on {page} page(s)", bots.len());
        Ok(bots)
    }

    /// Token of one bot, found by paging through `/mybots`.
    pub async fn fetch_token(&mut self, username: &str) -> StepResult<BotRecord> {
        let username = username.trim_start_matches('@');
        let mut list = self.command("/mybots", "/mybots").await?;
        let mut page = 1;

        loop {
            if let Some(entry) = find_bot_button_data(&list, username) {
                let display_name = parse_bots_from_buttons(&list)
                    .into_iter()
                    .find(|b| b.username.eq_ignore_ascii_case(username))
                    .and_then(|b| b.display_name);

                let reply = self.open_token(&list, &entry, username).await?;
                let parsed = parse_token(&extract_text(&reply))?;
                return Ok(BotRecord {
                    username: username.to_string(),
                    display_name,
                    token: Some(parsed.token),
                });
            }

            let next = find_pagination_data(&list, Direction::Next)
                .filter(|_| page < MAX_PAGES)
                .ok_or_else(|| {
                    StepError::ButtonNotFound(format!("@{username} is not in the bot list"))
                })?;
            page += 1;
            list = self.press(&list, &next, &format!("bot list page {page}")).await?;
        }
    }

    /// Tokens of every bot. Unparseable token replies are collected in the
    /// report; any navigation failure aborts the whole walk.
    pub async fn fetch_all_tokens(&mut self) -> StepResult<TokenReport> {
        let mut list = self.command("/mybots", "/mybots").await?;
        let mut report = TokenReport::default();
        let mut seen = HashSet::new();
        let mut page = 1;

        loop {
            let page_bots: Vec<BotRecord> = parse_bots_from_buttons(&list)
                .into_iter()
                .filter(|b| seen.insert(b.username.to_lowercase()))
                .collect();
            debug!("page {page}: {} new bots", page_bots.len());

            for mut bot in page_bots {
                let entry = find_bot_button_data(&list, &bot.username).ok_or_else(|| {
                    StepError::ButtonNotFound(format!(
                        "@{} vanished from bot list page {page}",
                        bot.username
                    ))
                })?;

                let reply = self.open_token(&list, &entry, &bot.username).await?;
                match parse_token(&extract_text(&reply)) {
                    Ok(parsed) => bot.token = Some(parsed.token),
                    Err(e) => {
                        warn!("no token for @{}: {e}", bot.username);
                        report.failures.push((bot.username.clone(), e));
                    }
                }
                report.bots.push(bot);

                list = self.back_to_list(reply).await?;
                list = self.return_to_page(list, page).await?;
            }

            let Some(next) = find_pagination_data(&list, Direction::Next) else {
                break;
            };
            if page >= MAX_PAGES {
                warn!("stopping token walk at the {MAX_PAGES}-page ceiling");
                break;
            }
            page += 1;
            list = self.press(&list, &next, &format!("bot list page {page}")).await?;
        }

        info!(
            "read {} of {} tokens",
            report.bots.len() - report.failures.len(),
            report.bots.len()
        );
        Ok(report)
    }

    /// `/setcommands` for one bot. `commands` is BotFather's `name - description` list.
    pub async fn set_commands(&mut self, username: &str, commands: &str) -> StepResult<()> {
        let username = username.trim_start_matches('@');

        self.command("/setcommands", "/setcommands").await?;

        let reply = self.command(&format!("@{username}"), "bot selection").await?;
        let text = extract_text(&reply);
        if !text.to_lowercase().contains("commands") {
            return Err(StepError::unexpected("a command list prompt", &text));
        }

        let reply = self.command(commands, "command list").await?;
        let text = extract_text(&reply);
        if !text.to_lowercase().contains("success") {
            return Err(StepError::unexpected("a success confirmation", &text));
        }

        info!("command list updated for @{username}");
        Ok(())
    }

    // ============== Steps ==============

    async fn ensure_listening(&mut self) {
        if !self.channel.is_listening() {
            self.channel.listen();
            tokio::time::sleep(self.timings.settle).await;
        }
    }

    /// Send text and wait for a reply newer than anything seen so far.
    async fn command(&mut self, text: &str, step: &str) -> StepResult<InboundMessage> {
        self.ensure_listening().await;
        self.waiter.clear_buffer(&mut self.channel);

        let floor = self.last_seen;
        self.channel.send_message(text).await?;
        tokio::time::sleep(self.timings.step_delay).await;

        let reply = self
            .waiter
            .wait_for_next(&mut self.channel, self.timings.reply_timeout, floor)
            .await
            .ok_or_else(|| StepError::timeout(step))?;
        self.track(&reply);
        Ok(reply)
    }

    /// Click a button and wait for the result. BotFather usually answers by
    /// editing the clicked message, so the id floor does not apply here.
    async fn press(
        &mut self,
        msg: &InboundMessage,
        data: &CallbackData,
        step: &str,
    ) -> StepResult<InboundMessage> {
        self.ensure_listening().await;
        self.waiter.clear_buffer(&mut self.channel);

        if !buttons::click(&self.channel, msg, data).await {
            return Err(StepError::ClickFailed(step.to_string()));
        }
        tokio::time::sleep(self.timings.step_delay).await;

        let reply = self
            .waiter
            .wait_for_next(&mut self.channel, self.timings.reply_timeout, None)
            .await
            .ok_or_else(|| StepError::timeout(step))?;
        self.track(&reply);
        Ok(reply)
    }

    fn track(&mut self, msg: &InboundMessage) {
        self.last_seen = self.last_seen.max(Some(msg.id));
    }

    /// Open a bot's entry and get to the message that should carry its token,
    /// going through the "API Token" submenu when the entry shows a menu.
    async fn open_token(
        &mut self,
        list: &InboundMessage,
        entry: &CallbackData,
        username: &str,
    ) -> StepResult<InboundMessage> {
        let menu = self.press(list, entry, &format!("menu of @{username}")).await?;
        if !has_menu_buttons(&menu) {
            return Ok(menu);
        }
        let token_button = find_button_data(&menu, API_TOKEN)
            .ok_or_else(|| StepError::ButtonNotFound(format!("{API_TOKEN} for @{username}")))?;
        self.press(&menu, &token_button, &format!("token of @{username}"))
            .await
    }

    /// "« Back to Bot" (when shown), then "« Back to Bot List".
    async fn back_to_list(&mut self, mut current: InboundMessage) -> StepResult<InboundMessage> {
        if let Some(back) = find_button_data(&current, BACK_TO_BOT) {
            current = self.press(&current, &back, "back to bot").await?;
        }
        let back = find_button_data(&current, BACK_TO_BOT_LIST)
            .ok_or_else(|| StepError::ButtonNotFound(BACK_TO_BOT_LIST.to_string()))?;
        let list = self.press(&current, &back, "back to bot list").await?;

        if parse_bots_from_buttons(&list).is_empty() {
            return Err(StepError::unexpected(
                "the bot list",
                &extract_text(&list),
            ));
        }
        Ok(list)
    }

    /// "Back to list" lands on page 1. When there is no "previous" button we
    /// were reset, so walk forward again to `page`.
    // Depends on BotFather's current keyboard layout; re-check if it changes.
    async fn return_to_page(
        &mut self,
        mut list: InboundMessage,
        page: usize,
    ) -> StepResult<InboundMessage> {
        if page <= 1 || find_pagination_data(&list, Direction::Prev).is_some() {
            return Ok(list);
        }
        debug!("list reset to page 1, returning to page {page}");
        for target in 2..=page {
            let next = find_pagination_data(&list, Direction::Next).ok_or_else(|| {
                StepError::ButtonNotFound(format!("next page while returning to page {target}"))
            })?;
            list = self
                .press(&list, &next, &format!("bot list page {target}"))
                .await?;
        }
        if parse_bots_from_buttons(&list).is_empty() {
            return Err(StepError::unexpected(
                "the bot list",
                &extract_text(&list),
            ));
        }
        Ok(list)
    }
}

impl Drop for BotFatherDriver {
    fn drop(&mut self) {
        self.close();
    }
}

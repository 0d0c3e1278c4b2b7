//! Pure interpretation of BotFather replies. Nothing here panics or does I/O;
//! malformed input yields empty results and the orchestrator decides what
//! counts as a failure.

use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::{
    buttons::{is_back_label, is_menu_label, is_pagination_label},
    error::{excerpt, StepError, StepResult},
    message::{InboundMessage, MessageText},
};

/// A bot owned by the signed-in account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BotRecord {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl BotRecord {
    pub fn new(username: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            username: username.into(),
            display_name,
            token: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedToken {
    pub token: String,
    pub username: Option<String>,
}

// Most strict first: a typical token, then shorter ids, then anything token-shaped.
const TOKEN_PATTERNS: &[&str] = &[
    r"\b(\d{8,10}:[A-Za-z0-9_-]{35,})",
    r"\b(\d{6,}:[A-Za-z0-9_-]{30,})",
    r"\b(\d+:[A-Za-z0-9_-]{20,})",
];

const USERNAME_PATTERNS: &[&str] = &[
    r"(?i)t\.me/([A-Za-z0-9_]+bot)\b",
    r"(?i)@([A-Za-z0-9_]+bot)\b",
    r"(?i)username[^A-Za-z0-9@]*@?([A-Za-z0-9_]+bot)\b",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
}

fn token_regexes() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| compile(TOKEN_PATTERNS))
}

fn username_regexes() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| compile(USERNAME_PATTERNS))
}

fn named_button_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?)\s*\((@?[A-Za-z0-9_]+)\)$").expect("valid regex"))
}

fn bare_button_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@([A-Za-z0-9_]+)$").expect("valid regex"))
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)@([A-Za-z0-9_]*bot)\b").expect("valid regex"))
}

/// Plain text of a message; spans are concatenated. Empty when there is none.
pub fn extract_text(msg: &InboundMessage) -> String {
    match &msg.text {
        MessageText::None => String::new(),
        MessageText::Plain(s) => s.clone(),
        MessageText::Spans(spans) => spans.iter().map(|s| s.text.as_str()).collect(),
    }
}

/// "Alright, a new bot. How are we going to call it? Please choose a name..."
pub fn is_name_prompt(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("choose")
        || lower.contains("name")
        || lower.contains("title")
        || (lower.contains("please") && lower.contains("name"))
}

/// "Good. Now let's choose a username for your bot. It must end in `bot`..."
pub fn is_username_prompt(text: &str) -> bool {
    let lower = text.to_lowercase();
    (lower.contains("username") || lower.contains("user name"))
        && (lower.contains("bot") || lower.contains("must end"))
}

/// Pull a bot token (and, if present, the bot's username) out of a reply.
pub fn parse_token(text: &str) -> StepResult<ParsedToken> {
    let token = token_regexes()
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let Some(token) = token else {
        let lower = text.to_lowercase();
        if lower.contains("already taken") {
            return Err(StepError::UsernameTaken(excerpt(text)));
        }
        if lower.contains("invalid") {
            return Err(StepError::InvalidUsername(excerpt(text)));
        }
        return Err(StepError::ParseFailure(format!(
            "no bot token in reply: {}",
            excerpt(text)
        )));
    };

    let username = username_regexes()
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Ok(ParsedToken { token, username })
}

fn bot_from_label(label: &str) -> Option<BotRecord> {
    if let Some(c) = named_button_re().captures(label) {
        return Some(BotRecord::new(
            c[2].trim_start_matches('@'),
            Some(c[1].trim().to_string()),
        ));
    }
    bare_button_re()
        .captures(label)
        .map(|c| BotRecord::new(&c[1], None))
}

/// `Display Name (some_bot)` or `@some_bot`: a bot's list entry.
///
/// Display names are free text ("Next Level", "Back to School"), so this
/// check wins over every navigation heuristic.
pub fn is_bot_entry_label(label: &str) -> bool {
    bot_from_label(label.trim()).is_some_and(|b| b.username.to_lowercase().ends_with("bot"))
}

/// Bots listed as buttons, unique by username (case-insensitive), in encounter order.
///
/// Labels look like `Display Name (username)` or `@username`; pagination,
/// menu and back buttons are skipped unless they have that shape.
pub fn parse_bots_from_buttons(msg: &InboundMessage) -> Vec<BotRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for button in msg.buttons.iter() {
        let label = button.label.trim();
        if !is_bot_entry_label(label)
            && (label.is_empty()
                || is_pagination_label(label)
                || is_menu_label(label)
                || is_back_label(label))
        {
            continue;
        }
        let Some(record) = bot_from_label(label) else {
            continue;
        };

        if seen.insert(record.username.to_lowercase()) {
            out.push(record);
        }
    }
    out
}

/// `@...bot` mentions in free text, unique and in order.
pub fn parse_bots_from_text(text: &str) -> Vec<BotRecord> {
    let mut seen = HashSet::new();
    mention_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .filter(|u| u.len() > 3 && seen.insert(u.to_lowercase()))
        .map(|u| BotRecord::new(u, None))
        .collect()
}

/// Telegram's rules for bot usernames, checked before talking to BotFather.
pub fn validate_bot_username(username: &str) -> StepResult<()> {
    let name = username.trim_start_matches('@');
    let len = name.chars().count();
    if !(5..=32).contains(&len) {
        return Err(StepError::InvalidUsername(format!(
            "{name}: must be 5-32 characters long"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StepError::InvalidUsername(format!(
            "{name}: only latin letters, digits and underscores are allowed"
        )));
    }
    if !name.to_lowercase().ends_with("bot") {
        return Err(StepError::InvalidUsername(format!(
            "{name}: must end with \"bot\""
        )));
    }
    Ok(())
}

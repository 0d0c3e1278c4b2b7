//! Label heuristics over BotFather's inline keyboards.
//!
//! BotFather publishes no schema for its buttons, so the label text is the
//! only signal. The tables below are ordered: more specific patterns come
//! first so looser ones cannot shadow them.

use tracing::warn;

use crate::{
    channel::MessageChannel,
    message::{Button, CallbackData, InboundMessage},
    parser::is_bot_entry_label,
};

pub const API_TOKEN: &str = "API Token";
pub const BACK_TO_BOT: &str = "« Back to Bot";
pub const BACK_TO_BOT_LIST: &str = "« Back to Bot List";

/// Buttons of a single bot's management menu.
pub const MENU_LABELS: &[&str] = &[
    API_TOKEN,
    "Edit Bot",
    "Bot Settings",
    "Transfer Ownership",
    "Payments",
    "Delete Bot",
    BACK_TO_BOT_LIST,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

impl Direction {
    fn opposite(self) -> Self {
        match self {
            Direction::Next => Direction::Prev,
            Direction::Prev => Direction::Next,
        }
    }

    /// Lowercase words that name this direction explicitly.
    fn words(self) -> &'static [&'static str] {
        match self {
            Direction::Next => &["next"],
            Direction::Prev => &["prev"],
        }
    }
}

struct PaginationPattern {
    direction: Direction,
    pattern: &'static str,
}

const fn p(direction: Direction, pattern: &'static str) -> PaginationPattern {
    PaginationPattern { direction, pattern }
}

const PAGINATION_PATTERNS: &[PaginationPattern] = &[
    p(Direction::Next, "Next"),
    p(Direction::Next, "▶"),
    p(Direction::Next, "→"),
    p(Direction::Next, "›"),
    p(Direction::Next, "»"),
    p(Direction::Next, "››"),
    p(Direction::Next, "Next page"),
    p(Direction::Next, "Page"),
    p(Direction::Prev, "Prev"),
    p(Direction::Prev, "Previous"),
    p(Direction::Prev, "◀"),
    p(Direction::Prev, "←"),
    p(Direction::Prev, "‹"),
    p(Direction::Prev, "«"),
    p(Direction::Prev, "‹‹"),
    p(Direction::Prev, "Previous page"),
    p(Direction::Prev, "Page"),
];

/// "« Back ..." style labels; these never paginate.
pub fn is_back_label(label: &str) -> bool {
    let lower = label.to_lowercase();
    label.trim_start().starts_with("« Back") || lower.contains("back to")
}

pub fn is_menu_label(label: &str) -> bool {
    MENU_LABELS.contains(&label) || label == BACK_TO_BOT
}

fn matches_direction(label: &str, direction: Direction) -> bool {
    if is_bot_entry_label(label) || is_back_label(label) {
        return false;
    }
    let lower = label.to_lowercase();
    if direction.opposite().words().iter().any(|w| lower.contains(w)) {
        return false;
    }
    PAGINATION_PATTERNS
        .iter()
        .filter(|p| p.direction == direction)
        .any(|p| label == p.pattern || label.contains(p.pattern))
}

/// Whether a label pages the list in either direction.
pub fn is_pagination_label(label: &str) -> bool {
    matches_direction(label, Direction::Next) || matches_direction(label, Direction::Prev)
}

fn clickable(msg: &InboundMessage) -> impl Iterator<Item = (&Button, &CallbackData)> {
    msg.buttons
        .iter()
        .filter_map(|b| b.data.as_ref().map(|d| (b, d)))
}

/// Data of the first button whose label is exactly `label`.
pub fn find_button_data(msg: &InboundMessage, label: &str) -> Option<CallbackData> {
    clickable(msg)
        .find(|(b, _)| b.label == label)
        .map(|(_, d)| d.clone())
}

/// Data of the pagination button for `direction`.
///
/// Patterns are tried in table order; for each, every button is checked
/// (label equals or contains the pattern). The first hit wins.
pub fn find_pagination_data(msg: &InboundMessage, direction: Direction) -> Option<CallbackData> {
    for pattern in PAGINATION_PATTERNS.iter().filter(|p| p.direction == direction) {
        let hit = clickable(msg).find(|(b, _)| {
            (b.label == pattern.pattern || b.label.contains(pattern.pattern))
                && matches_direction(&b.label, direction)
        });
        if let Some((_, data)) = hit {
            return Some(data.clone());
        }
    }
    None
}

/// Data of the list entry for `username` (with or without `@`, case-insensitive).
pub fn find_bot_button_data(msg: &InboundMessage, username: &str) -> Option<CallbackData> {
    let bare = username.trim_start_matches('@').to_lowercase();
    if bare.is_empty() {
        return None;
    }
    let at = format!("@{bare}");
    clickable(msg)
        .filter(|(b, _)| {
            is_bot_entry_label(&b.label) || !(is_menu_label(&b.label) || is_back_label(&b.label))
        })
        .find(|(b, _)| {
            let lower = b.label.to_lowercase();
            lower.contains(&bare) || lower.contains(&at)
        })
        .map(|(_, d)| d.clone())
}

/// True when the message is a bot's management menu rather than a direct answer.
pub fn has_menu_buttons(msg: &InboundMessage) -> bool {
    msg.buttons
        .iter()
        .any(|b| MENU_LABELS.contains(&b.label.as_str()))
}

/// Press a button on `msg`. Transport failures are logged and reported as `false`.
pub async fn click(channel: &MessageChannel, msg: &InboundMessage, data: &CallbackData) -> bool {
    match channel.click(msg.id, data).await {
        Ok(()) => true,
        Err(e) => {
            warn!("button click on message {} failed: {e}", msg.id.0);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(labels: &[&str]) -> InboundMessage {
        InboundMessage::new(1).with_buttons(
            labels
                .iter()
                .map(|l| vec![Button::callback(*l, *l)])
                .collect(),
        )
    }

    fn data(s: &str) -> Option<CallbackData> {
        Some(CallbackData::from(s))
    }

    #[test]
    fn pagination_matches_exact_and_contained_labels_alike() {
        let exact = InboundMessage::new(1).with_buttons(vec![vec![Button::callback("Next", "n")]]);
        let glyph =
            InboundMessage::new(1).with_buttons(vec![vec![Button::callback("Next ▶", "n")]]);
        assert_eq!(find_pagination_data(&exact, Direction::Next), data("n"));
        assert_eq!(find_pagination_data(&glyph, Direction::Next), data("n"));
    }

    #[test]
    fn pagination_prefers_earlier_patterns() {
        let msg = grid(&["Page 2", "»"]);
        // "»" is listed before "Page".
        assert_eq!(find_pagination_data(&msg, Direction::Next), data("»"));
    }

    #[test]
    fn back_buttons_are_not_pagination() {
        let msg = grid(&["« Back to Bot List"]);
        assert_eq!(find_pagination_data(&msg, Direction::Prev), None);
        assert!(!is_pagination_label("« Back to Bot"));
    }

    #[test]
    fn directions_do_not_cross() {
        let msg = grid(&["« Prev page", "Next page »"]);
        assert_eq!(find_pagination_data(&msg, Direction::Next), data("Next page »"));
        assert_eq!(find_pagination_data(&msg, Direction::Prev), data("« Prev page"));
        assert_eq!(find_pagination_data(&grid(&["Next"]), Direction::Prev), None);
    }

    #[test]
    fn bot_entries_never_paginate() {
        let msg = grid(&[
            "Next Level (nextlevel_bot)",
            "PageWatcher (pagewatch_bot)",
            "Prevention (prevention_bot)",
            "Next »",
        ]);
        assert_eq!(find_pagination_data(&msg, Direction::Next), data("Next »"));
        assert_eq!(find_pagination_data(&msg, Direction::Prev), None);
        assert!(!is_pagination_label("Next Level (nextlevel_bot)"));

        let only_bots = grid(&["Next Level (nextlevel_bot)", "PageWatcher (pagewatch_bot)"]);
        assert_eq!(find_pagination_data(&only_bots, Direction::Next), None);
    }

    #[test]
    fn bot_named_like_a_back_button_is_found() {
        let msg = grid(&["Back to School (backtoschool_bot)", "« Back to Bot List"]);
        assert_eq!(
            find_bot_button_data(&msg, "backtoschool_bot"),
            data("Back to School (backtoschool_bot)")
        );
    }

    #[test]
    fn buttons_without_data_are_ignored() {
        let msg = InboundMessage::new(1).with_buttons(vec![vec![Button::plain("Next")]]);
        assert_eq!(find_pagination_data(&msg, Direction::Next), None);
        assert_eq!(find_button_data(&msg, "Next"), None);
    }

    #[test]
    fn exact_label_lookup() {
        let msg = grid(&["API Token", "Edit Bot"]);
        assert_eq!(find_button_data(&msg, API_TOKEN), data("API Token"));
        assert_eq!(find_button_data(&msg, "API"), None);
    }

    #[test]
    fn bot_lookup_accepts_bare_or_at_names() {
        let msg = grid(&["Shop (@shop_bot)", "Weather (weatherbot)"]);
        assert_eq!(find_bot_button_data(&msg, "shop_bot"), data("Shop (@shop_bot)"));
        assert_eq!(
            find_bot_button_data(&msg, "@WeatherBot"),
            data("Weather (weatherbot)")
        );
        assert_eq!(find_bot_button_data(&msg, "missing_bot"), None);
    }

    #[test]
    fn menu_detection_uses_exact_labels() {
        assert!(has_menu_buttons(&grid(&["API Token", "« Back to Bot List"])));
        assert!(!has_menu_buttons(&grid(&["api token", "MyBot (mybot)"])));
    }
}

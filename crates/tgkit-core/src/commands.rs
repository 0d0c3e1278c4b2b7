/// A bot command as published to Telegram (`setMyCommands` / BotFather `/setcommands`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Commands understood by the template bot.
pub const BOT_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "start",
        description: "Show the welcome message",
    },
    CommandSpec {
        name: "help",
        description: "List available commands",
    },
    CommandSpec {
        name: "ping",
        description: "Check that the bot is alive",
    },
    CommandSpec {
        name: "id",
        description: "Show chat, user and topic ids",
    },
    CommandSpec {
        name: "status",
        description: "Show uptime and runtime info",
    },
    CommandSpec {
        name: "topic",
        description: "Create a forum topic: /topic <name>",
    },
];

/// Render commands in BotFather's `/setcommands` format (`name - description` per line).
pub fn botfather_command_list(commands: &[CommandSpec]) -> String {
    commands
        .iter()
        .map(|c| format!("{} - {}", c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split `/cmd@botname rest` into (`cmd`, `rest`). Telegram appends the bot name in groups.
pub fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/Topic@my_bot Release notes"),
            ("topic".to_string(), "Release notes".to_string())
        );
        assert_eq!(parse_command("/ping"), ("ping".to_string(), String::new()));
    }

    #[test]
    fn botfather_list_format() {
        let list = botfather_command_list(&BOT_COMMANDS[..2]);
        assert_eq!(
            list,
            "start - Show the welcome message\nhelp - List available commands"
        );
    }
}

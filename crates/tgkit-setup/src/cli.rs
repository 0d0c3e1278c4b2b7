use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Bootstrap a tgkit bot: sign in as a user, drive @BotFather, create topics.
#[derive(Parser, Debug)]
#[command(name = "tgkit-setup", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with a user account and save the session file.
    Login,

    /// Create a new bot and publish the template command list.
    CreateBot {
        /// Display name.
        #[arg(long)]
        name: String,
        /// Username, must end in "bot".
        #[arg(long)]
        username: String,
        /// Write TELEGRAM_BOT_TOKEN into this dotenv file.
        #[arg(long)]
        env_file: Option<PathBuf>,
        /// Do not run /setcommands after creation.
        #[arg(long)]
        skip_commands: bool,
    },

    /// List the account's bots.
    ListBots {
        #[arg(long)]
        json: bool,
    },

    /// Print one bot's token.
    Token {
        #[arg(long)]
        username: String,
    },

    /// Print every bot's token.
    Tokens {
        #[arg(long)]
        json: bool,
    },

    /// Publish the template command list for an existing bot.
    SetCommands {
        #[arg(long)]
        username: String,
    },

    /// Create a forum topic with the bot token from TELEGRAM_BOT_TOKEN.
    CreateTopic {
        #[arg(long, allow_negative_numbers = true)]
        chat_id: i64,
        #[arg(long)]
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_create_bot() {
        let cli = Cli::try_parse_from([
            "tgkit-setup",
            "create-bot",
            "--name",
            "Shop Helper",
            "--username",
            "shop_helper_bot",
            "--env-file",
            ".env",
        ])
        .unwrap();
        match cli.command {
            Command::CreateBot {
                name,
                username,
                env_file,
                skip_commands,
            } => {
                assert_eq!(name, "Shop Helper");
                assert_eq!(username, "shop_helper_bot");
                assert_eq!(env_file, Some(PathBuf::from(".env")));
                assert!(!skip_commands);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn topic_chat_id_may_be_negative() {
        let cli = Cli::try_parse_from([
            "tgkit-setup",
            "create-topic",
            "--chat-id",
            "-1001234567890",
            "--name",
            "Logs",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::CreateTopic { chat_id: -1001234567890, .. }
        ));
    }
}

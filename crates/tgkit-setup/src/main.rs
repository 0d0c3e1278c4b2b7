//! `tgkit-setup`: one-off bootstrap tasks that need a user account.

use std::{process::ExitCode, sync::Arc};

use anyhow::{bail, Context};
use clap::Parser;
use teloxide::Bot;
use tracing::warn;

use tgkit_botfather::{BotFatherDriver, DriverTimings, MtprotoClient};
use tgkit_core::{
    commands::{botfather_command_list, BOT_COMMANDS},
    config::{bot_token_from_env, MtprotoConfig},
    domain::ChatId,
    logging,
    messaging::port::MessagingPort,
};
use tgkit_telegram::TelegramMessenger;

mod cli;
mod env_file;
mod prompt;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init("tgkit-setup", None) {
        eprintln!("{e}");
    }

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login => {
            let cfg = MtprotoConfig::load()?;
            let client = MtprotoClient::connect(&cfg).await?;
            client
                .login(cfg.phone.as_deref(), &prompt::StdinPrompt)
                .await?;
            println!("✅ Signed in. Session: {}", cfg.session_file.display());
        }

        Command::CreateBot {
            name,
            username,
            env_file,
            skip_commands,
        } => {
            let (client, mut driver) = botfather().await?;
            let created = driver.create_bot(&name, &username).await?;
            println!("✅ Created @{}", created.username);
            println!("TELEGRAM_BOT_TOKEN={}", created.token);

            if let Some(path) = env_file {
                env_file::upsert_env_var(&path, "TELEGRAM_BOT_TOKEN", &created.token)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Saved token to {}", path.display());
            }

            if !skip_commands {
                let commands = botfather_command_list(BOT_COMMANDS);
                match driver.set_commands(&created.username, &commands).await {
                    Ok(()) => println!("✅ Command list published"),
                    // The bot exists either way; `set-commands` can be re-run.
                    Err(e) => warn!("could not publish command list: {e}"),
                }
            }
            client.save_session()?;
        }

        Command::ListBots { json } => {
            let (client, mut driver) = botfather().await?;
            let bots = driver.list_bots().await?;
            client.save_session()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&bots)?);
            } else if bots.is_empty() {
                println!("No bots.");
            } else {
                for bot in &bots {
                    match &bot.display_name {
                        Some(name) => println!("@{}\t{name}", bot.username),
                        None => println!("@{}", bot.username),
                    }
                }
            }
        }

        Command::Token { username } => {
            let (client, mut driver) = botfather().await?;
            let bot = driver.fetch_token(&username).await?;
            client.save_session()?;
            println!("{}", bot.token.unwrap_or_default());
        }

        Command::Tokens { json } => {
            let (client, mut driver) = botfather().await?;
            let report = driver.fetch_all_tokens().await?;
            client.save_session()?;

            if json {
                let failures: Vec<_> = report
                    .failures
                    .iter()
                    .map(|(username, e)| {
                        serde_json::json!({ "username": username, "error": e.to_string() })
                    })
                    .collect();
                let out = serde_json::json!({ "bots": report.bots, "failures": failures });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for bot in &report.bots {
                    if let Some(token) = &bot.token {
                        println!("@{}\t{token}", bot.username);
                    }
                }
                for (username, e) in &report.failures {
                    eprintln!("@{username}: {e}");
                }
            }
        }

        Command::SetCommands { username } => {
            let (client, mut driver) = botfather().await?;
            driver
                .set_commands(&username, &botfather_command_list(BOT_COMMANDS))
                .await?;
            client.save_session()?;
            println!("✅ Command list published for @{}", username.trim_start_matches('@'));
        }

        Command::CreateTopic { chat_id, name } => {
            let messenger = TelegramMessenger::new(Bot::new(bot_token_from_env()?));
            let topic = messenger.create_forum_topic(ChatId(chat_id), &name).await?;
            println!("✅ Topic \"{}\" created", topic.name);
            println!("TELEGRAM_CHAT_ID={chat_id}");
            println!("TELEGRAM_TOPIC_ID={}", topic.thread_id.0);
        }
    }
    Ok(())
}

/// Signed-in client plus a driver bound to BotFather.
async fn botfather() -> anyhow::Result<(MtprotoClient, BotFatherDriver)> {
    let cfg = MtprotoConfig::load()?;
    let client = MtprotoClient::connect(&cfg).await?;
    if !client.is_authorized().await? {
        bail!("not signed in, run `tgkit-setup login` first");
    }
    let transport = client.transport_to(&cfg.botfather_username).await?;
    let driver = BotFatherDriver::new(Arc::new(transport), DriverTimings::from(&cfg));
    Ok((client, driver))
}

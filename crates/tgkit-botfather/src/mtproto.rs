//! User-account connection over MTProto (`grammers`), and the [`Transport`]
//! that talks to one peer through it.

use std::{fmt::Display, path::PathBuf};

use async_trait::async_trait;
use grammers_client::{
    types::{LoginToken, Message, PasswordToken},
    Client, Config, InitParams, SignInError, Update,
};
use grammers_session::{PackedChat, Session};
use grammers_tl_types as tl;
use tgkit_core::config::MtprotoConfig;
use tracing::{debug, info, warn};

use crate::{
    channel::{EventSink, Subscription, Transport, TransportError},
    message::{Button, ButtonGrid, CallbackData, InboundMessage, MessageId, MessageText},
};

fn err<E: Display>(context: &'static str) -> impl FnOnce(E) -> TransportError {
    move |e| TransportError(format!("{context}: {e}"))
}

/// Interactive input needed during sign-in.
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String, TransportError>;
}

/// A connected user account with its persisted session file.
#[derive(Clone)]
pub struct MtprotoClient {
    client: Client,
    session_file: PathBuf,
}

impl MtprotoClient {
    pub async fn connect(cfg: &MtprotoConfig) -> Result<Self, TransportError> {
        let session =
            Session::load_file_or_create(&cfg.session_file).map_err(err("load session"))?;
        let client = Client::connect(Config {
            session,
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(err("connect"))?;

        debug!("connected to Telegram (session {})", cfg.session_file.display());
        Ok(Self {
            client,
            session_file: cfg.session_file.clone(),
        })
    }

    pub async fn is_authorized(&self) -> Result<bool, TransportError> {
        self.client
            .is_authorized()
            .await
            .map_err(err("check authorization"))
    }

    /// Sign in interactively unless the session already is. Saves the session afterwards.
    pub async fn login(
        &self,
        phone: Option<&str>,
        prompt: &dyn LoginPrompt,
    ) -> Result<(), TransportError> {
        if self.is_authorized().await? {
            info!("session already authorized");
            return Ok(());
        }

        let phone = match phone {
            Some(p) => p.to_string(),
            None => prompt.ask("Phone number (international format): ").await?,
        };
        let token: LoginToken = self
            .client
            .request_login_code(phone.trim())
            .await
            .map_err(err("request login code"))?;
        let code = prompt.ask("Login code: ").await?;

        match self.client.sign_in(&token, code.trim()).await {
            Ok(_) => {}
            Err(SignInError::PasswordRequired(password_token)) => {
                self.check_password(password_token, prompt).await?;
            }
            Err(e) => return Err(err("sign in")(e)),
        }

        self.save_session()?;
        info!("signed in, session saved to {}", self.session_file.display());
        Ok(())
    }

    async fn check_password(
        &self,
        password_token: PasswordToken,
        prompt: &dyn LoginPrompt,
    ) -> Result<(), TransportError> {
        let question = match password_token.hint() {
            Some(hint) => format!("2FA password (hint: {hint}): "),
            None => "2FA password: ".to_string(),
        };
        let password = prompt.ask(&question).await?;
        self.client
            .check_password(password_token, password.trim())
            .await
            .map(|_| ())
            .map_err(err("check password"))
    }

    pub fn save_session(&self) -> Result<(), TransportError> {
        self.client
            .session()
            .save_to_file(&self.session_file)
            .map_err(err("save session"))
    }

    /// Resolve `@username` once and bind a transport to it.
    pub async fn transport_to(&self, username: &str) -> Result<MtprotoTransport, TransportError> {
        let username = username.trim_start_matches('@');
        let chat = self
            .client
            .resolve_username(username)
            .await
            .map_err(err("resolve username"))?
            .ok_or_else(|| TransportError(format!("@{username} could not be resolved")))?;

        debug!("resolved @{username} to {}", chat.id());
        Ok(MtprotoTransport {
            client: self.client.clone(),
            peer: chat.pack(),
            peer_id: chat.id(),
        })
    }
}

/// [`Transport`] bound to a single resolved peer.
pub struct MtprotoTransport {
    client: Client,
    peer: PackedChat,
    peer_id: i64,
}

#[async_trait]
impl Transport for MtprotoTransport {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.client
            .send_message(self.peer, text)
            .await
            .map(|_| ())
            .map_err(err("send message"))
    }

    async fn click_button(
        &self,
        message_id: MessageId,
        data: &CallbackData,
    ) -> Result<(), TransportError> {
        let request = tl::functions::messages::GetBotCallbackAnswer {
            game: false,
            peer: self.peer.to_input_peer(),
            msg_id: message_id.0,
            data: Some(data.0.clone()),
            password: None,
        };
        self.client
            .invoke(&request)
            .await
            .map(|_| ())
            .map_err(err("callback answer"))
    }

    fn subscribe(&self) -> Subscription {
        let (sink, sub) = Subscription::pair();
        tokio::spawn(pump_updates(self.client.clone(), self.peer_id, sink));
        sub
    }
}

/// Forward the peer's new and edited messages until the subscription closes.
async fn pump_updates(client: Client, peer_id: i64, sink: EventSink) {
    loop {
        let update = tokio::select! {
            _ = sink.closed() => break,
            update = client.next_update() => update,
        };
        let (msg, edited) = match update {
            Ok(Update::NewMessage(m)) => (m, false),
            Ok(Update::MessageEdited(m)) => (m, true),
            Ok(_) => continue,
            Err(e) => {
                warn!("update stream ended: {e}");
                break;
            }
        };
        if msg.outgoing() || msg.chat().id() != peer_id {
            continue;
        }
        if !sink.send(inbound_from_grammers(&msg, edited)) {
            break;
        }
    }
    debug!("update pump stopped");
}

fn inbound_from_grammers(msg: &Message, edited: bool) -> InboundMessage {
    let text = match msg.text() {
        "" => MessageText::None,
        t => MessageText::Plain(t.to_string()),
    };
    let buttons = msg
        .reply_markup()
        .map(|m| buttons_from_markup(&m))
        .unwrap_or_default();

    InboundMessage {
        id: MessageId(msg.id()),
        edited,
        text,
        buttons,
    }
}

fn buttons_from_markup(markup: &tl::enums::ReplyMarkup) -> ButtonGrid {
    let rows = match markup {
        tl::enums::ReplyMarkup::ReplyInlineMarkup(m) => &m.rows,
        tl::enums::ReplyMarkup::ReplyKeyboardMarkup(m) => &m.rows,
        _ => return ButtonGrid::default(),
    };
    ButtonGrid::new(
        rows.iter()
            .map(|row| match row {
                tl::enums::KeyboardButtonRow::Row(r) => {
                    r.buttons.iter().filter_map(button_from_tl).collect()
                }
            })
            .collect(),
    )
}

fn button_from_tl(button: &tl::enums::KeyboardButton) -> Option<Button> {
    match button {
        tl::enums::KeyboardButton::Callback(b) => Some(Button {
            label: b.text.clone(),
            data: Some(CallbackData(b.data.clone())),
        }),
        tl::enums::KeyboardButton::Button(b) => Some(Button::plain(b.text.clone())),
        tl::enums::KeyboardButton::Url(b) => Some(Button::plain(b.text.clone())),
        _ => None,
    }
}

//! Scripted conversations with @BotFather from a user account.
//!
//! Layers, leaf first: [`channel`] (send/click/subscribe), [`waiter`]
//! (correlate replies), [`buttons`] and [`parser`] (interpret them),
//! [`orchestrator`] (multi-step flows). [`mtproto`] provides the real
//! transport; tests use in-memory fakes.

pub mod buttons;
pub mod channel;
pub mod error;
pub mod message;
pub mod mtproto;
pub mod orchestrator;
pub mod parser;
pub mod waiter;

pub use channel::{MessageChannel, Transport, TransportError};
pub use error::{StepError, StepResult};
pub use message::InboundMessage;
pub use mtproto::{LoginPrompt, MtprotoClient, MtprotoTransport};
pub use orchestrator::{BotFatherDriver, CreatedBot, DriverTimings, TokenReport};
pub use parser::BotRecord;

//! Core building blocks for tgkit bots.
//!
//! This crate is intentionally framework-agnostic. Telegram (Bot API and MTProto)
//! lives behind ports (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod instance;
pub mod logging;
pub mod messaging;
pub mod security;

pub use errors::{Error, Result};

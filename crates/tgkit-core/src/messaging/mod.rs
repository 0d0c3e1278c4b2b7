//! Outbound Bot API messaging: the port and its pacing decorator.

pub mod port;
pub mod throttled;
pub mod types;

/// Core error type for the toolkit.
///
/// Adapter crates should map their specific errors into this type so the bot
/// runtime can handle failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("another instance is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

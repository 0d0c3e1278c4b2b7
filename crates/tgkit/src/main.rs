use std::sync::Arc;

use tgkit_core::{
    config::Config,
    instance::InstanceLock,
    logging::{self, ChatLogBuffer, ChatLogLayer},
};

#[tokio::main]
async fn main() -> Result<(), tgkit_core::Error> {
    let cfg = Arc::new(Config::load()?);

    let log_buffer = cfg
        .log_chat_id
        .map(|_| ChatLogBuffer::new(cfg.log_buffer_lines));
    let chat_layer = match &log_buffer {
        Some(buffer) => Some(ChatLogLayer::new(buffer.clone(), &cfg.log_chat_level)?),
        None => None,
    };
    logging::init("tgkit", chat_layer)?;

    // Held until main returns; a second poller would get 409 Conflict.
    let lock = InstanceLock::acquire(cfg.instance_lock_file.clone())?;

    tgkit_telegram::router::run_polling(cfg, log_buffer, lock.pid())
        .await
        .map_err(|e| tgkit_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}

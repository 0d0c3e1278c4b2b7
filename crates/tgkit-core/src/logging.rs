//! Tracing setup plus an optional sink that mirrors important log lines into a Telegram chat.

use std::{
    collections::VecDeque,
    fmt::{self, Write as _},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{
    field::{Field, Visit},
    warn, Event, Level, Subscriber,
};
use tracing_subscriber::{
    layer::{Context, Layer},
    prelude::*,
};

use crate::{
    domain::Destination, errors::Error, formatting::pre_chunks, messaging::port::MessagingPort,
    Result,
};

/// Events from this module are never mirrored, so a failing flush cannot feed itself.
const SELF_TARGET: &str = module_path!();

/// Initialize logging/tracing for a binary.
///
/// `RUST_LOG` overrides the default filter. When `chat` is given, events at or above
/// its level are additionally buffered for the chat log flusher.
pub fn init(service_name: &str, chat: Option<ChatLogLayer>) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let crate_name = service_name.replace('-', "_");
    // Default: info for our crates, warn for everything else.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,tgkit_core=info,tgkit_telegram=info,tgkit_botfather=info,{crate_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish()
        .with(chat)
        .try_init()
        .map_err(|e| Error::External(format!("logging init failed: {e}")))
}

// ============== Chat Log Buffer ==============

#[derive(Debug, Default)]
struct BufferState {
    lines: VecDeque<String>,
    capacity: usize,
    dropped_since_flush: u64,
    dropped_total: u64,
}

/// Lines waiting to be flushed, plus how many were lost to the capacity bound.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Drained {
    pub lines: Vec<String>,
    pub dropped: u64,
}

/// Bounded FIFO of formatted log lines; the oldest line is dropped when full.
#[derive(Clone, Debug)]
pub struct ChatLogBuffer {
    inner: Arc<Mutex<BufferState>>,
}

impl ChatLogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BufferState {
                capacity: capacity.max(1),
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, BufferState> {
        // A panic while holding the lock cannot leave the queue inconsistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, line: String) {
        let mut st = self.state();
        if st.lines.len() >= st.capacity {
            st.lines.pop_front();
            st.dropped_since_flush += 1;
            st.dropped_total += 1;
        }
        st.lines.push_back(line);
    }

    pub fn drain(&self) -> Drained {
        let mut st = self.state();
        let dropped = std::mem::take(&mut st.dropped_since_flush);
        Drained {
            lines: st.lines.drain(..).collect(),
            dropped,
        }
    }

    pub fn len(&self) -> usize {
        self.state().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_total(&self) -> u64 {
        self.state().dropped_total
    }
}

// ============== Chat Log Layer ==============

/// `tracing` layer that formats events into a [`ChatLogBuffer`].
#[derive(Clone, Debug)]
pub struct ChatLogLayer {
    buffer: ChatLogBuffer,
    min_level: Level,
}

impl ChatLogLayer {
    pub fn new(buffer: ChatLogBuffer, min_level: &str) -> Result<Self> {
        let min_level = Level::from_str(min_level)
            .map_err(|_| Error::Config(format!("invalid log level: {min_level}")))?;
        Ok(Self { buffer, min_level })
    }
}

impl<S: Subscriber> Layer<S> for ChatLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // More verbose levels compare greater.
        if *meta.level() > self.min_level {
            return;
        }
        if meta.target().starts_with(SELF_TARGET) {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let ts = chrono::Local::now().format("%H:%M:%S");
        self.buffer.push(format!(
            "{ts} {} {}{}",
            meta.level(),
            visitor.message,
            visitor.fields
        ));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

// ============== Flusher ==============

/// Send everything currently buffered to `dest`. Returns the number of messages sent.
pub async fn flush_once(
    buffer: &ChatLogBuffer,
    messenger: &dyn MessagingPort,
    dest: Destination,
    limit: usize,
) -> usize {
    let Drained { mut lines, dropped } = buffer.drain();
    if dropped > 0 {
        lines.insert(0, format!("... {dropped} earlier log lines dropped"));
    }
    if lines.is_empty() {
        return 0;
    }

    let mut sent = 0;
    for chunk in pre_chunks(&lines, limit) {
        if let Err(e) = messenger.send_html(dest, &chunk).await {
            warn!("chat log flush failed: {e}");
            break;
        }
        sent += 1;
    }
    sent
}

/// Periodically flush `buffer` into a chat until `cancel` fires (one last flush on the way out).
pub fn spawn_chat_log_flusher(
    buffer: ChatLogBuffer,
    messenger: Arc<dyn MessagingPort>,
    dest: Destination,
    every: Duration,
    limit: usize,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    flush_once(&buffer, messenger.as_ref(), dest, limit).await;
                    break;
                }
                _ = tick.tick() => {
                    flush_once(&buffer, messenger.as_ref(), dest, limit).await;
                }
            }
        }
    })
}

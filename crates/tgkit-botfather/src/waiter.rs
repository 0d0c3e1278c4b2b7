use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

use crate::{
    channel::MessageChannel,
    message::{InboundMessage, MessageId},
};

/// Correlates replies with requests.
///
/// Buffered messages are always considered before live ones. `&mut self` on
/// [`wait_for_next`](Self::wait_for_next) keeps at most one wait pending.
#[derive(Debug, Default)]
pub struct ResponseWaiter {
    buffer: VecDeque<InboundMessage>,
}

impl ResponseWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// First message with `id > since` (any message when `since` is `None`).
    ///
    /// Stale messages are discarded on the way. Returns `None` on timeout or
    /// when the channel is not listening; a reply arriving later stays queued
    /// for the next call.
    pub async fn wait_for_next(
        &mut self,
        channel: &mut MessageChannel,
        timeout: Duration,
        since: Option<MessageId>,
    ) -> Option<InboundMessage> {
        let deadline = Instant::now() + timeout;

        self.absorb(channel);
        while let Some(msg) = self.buffer.pop_front() {
            if qualifies(&msg, since) {
                return Some(msg);
            }
        }

        loop {
            match tokio::time::timeout_at(deadline, channel.recv()).await {
                Ok(Some(msg)) if qualifies(&msg, since) => return Some(msg),
                Ok(Some(_stale)) => continue,
                Ok(None) | Err(_) => return None,
            }
        }
    }

    /// Forget everything received so far, delivered or buffered.
    pub fn clear_buffer(&mut self, channel: &mut MessageChannel) {
        self.absorb(channel);
        self.buffer.clear();
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn absorb(&mut self, channel: &mut MessageChannel) {
        while let Some(msg) = channel.try_recv() {
            self.buffer.push_back(msg);
        }
    }
}

fn qualifies(msg: &InboundMessage, since: Option<MessageId>) -> bool {
    since.map_or(true, |floor| msg.id > floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{EventSink, Subscription, Transport, TransportError};
    use crate::message::CallbackData;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeTransport {
        sinks: Mutex<Vec<EventSink>>,
    }

    impl FakeTransport {
        fn emit(&self, msg: InboundMessage) {
            for s in self.sinks.lock().unwrap().iter() {
                s.send(msg.clone());
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send_text(&self, _text: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn click_button(
            &self,
            _message_id: MessageId,
            _data: &CallbackData,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        fn subscribe(&self) -> Subscription {
            let (sink, sub) = Subscription::pair();
            self.sinks.lock().unwrap().push(sink);
            sub
        }
    }

    fn listening() -> (Arc<FakeTransport>, MessageChannel) {
        let t = Arc::new(FakeTransport::default());
        let mut ch = MessageChannel::new(t.clone());
        ch.listen();
        (t, ch)
    }

    #[tokio::test]
    async fn floor_is_strict_and_later_messages_stay_buffered() {
        let (t, mut ch) = listening();
        for id in [5, 6, 7] {
            t.emit(InboundMessage::new(id));
        }

        let mut w = ResponseWaiter::new();
        let got = w
            .wait_for_next(&mut ch, Duration::from_millis(10), Some(MessageId(5)))
            .await
            .unwrap();
        assert_eq!(got.id, MessageId(6));
        assert_eq!(w.buffered(), 1);

        // 5 was discarded; 7 is next.
        let got = w
            .wait_for_next(&mut ch, Duration::from_millis(10), None)
            .await
            .unwrap();
        assert_eq!(got.id, MessageId(7));
    }

    #[tokio::test]
    async fn equal_id_is_a_repeat() {
        let (t, mut ch) = listening();
        t.emit(InboundMessage::new(5).edited());

        let mut w = ResponseWaiter::new();
        let got = w
            .wait_for_next(&mut ch, Duration::from_millis(20), Some(MessageId(5)))
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn timeout_returns_none_and_late_reply_is_kept() {
        let (t, mut ch) = listening();
        let mut w = ResponseWaiter::new();

        assert!(w
            .wait_for_next(&mut ch, Duration::from_millis(20), None)
            .await
            .is_none());

        t.emit(InboundMessage::new(9).with_text("late"));
        let got = w
            .wait_for_next(&mut ch, Duration::from_millis(20), None)
            .await
            .unwrap();
        assert_eq!(got.id, MessageId(9));
    }

    #[tokio::test]
    async fn live_event_resolves_pending_wait() {
        let (t, mut ch) = listening();
        let mut w = ResponseWaiter::new();

        let emitter = {
            let t = t.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                t.emit(InboundMessage::new(3));
                t.emit(InboundMessage::new(4));
            })
        };

        let got = w
            .wait_for_next(&mut ch, Duration::from_secs(2), Some(MessageId(3)))
            .await
            .unwrap();
        assert_eq!(got.id, MessageId(4));
        emitter.await.unwrap();
    }

    #[tokio::test]
    async fn clear_buffer_drops_delivered_messages() {
        let (t, mut ch) = listening();
        t.emit(InboundMessage::new(1));
        t.emit(InboundMessage::new(2));

        let mut w = ResponseWaiter::new();
        w.clear_buffer(&mut ch);
        assert_eq!(w.buffered(), 0);
        assert!(w
            .wait_for_next(&mut ch, Duration::from_millis(10), None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn not_listening_times_out_immediately() {
        let mut ch = MessageChannel::new(Arc::new(FakeTransport::default()));
        let mut w = ResponseWaiter::new();
        assert!(w
            .wait_for_next(&mut ch, Duration::from_secs(5), None)
            .await
            .is_none());
    }
}

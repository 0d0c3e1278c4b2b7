//! The conversation's link to the remote peer: send text, press buttons, and
//! receive new/edited messages as one ordered stream.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::message::{CallbackData, InboundMessage, MessageId};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Connection to one fixed peer.
///
/// `subscribe` registers for both new and edited messages; the returned
/// [`Subscription`] is the only handle, and dropping it removes both.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    async fn click_button(
        &self,
        message_id: MessageId,
        data: &CallbackData,
    ) -> Result<(), TransportError>;

    fn subscribe(&self) -> Subscription;
}

/// Producer half handed to a transport's update pump.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<InboundMessage>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Returns `false` once the subscription is gone; pumps should stop then.
    pub fn send(&self, msg: InboundMessage) -> bool {
        !self.cancel.is_cancelled() && self.tx.send(msg).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when the subscription is closed or dropped.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }
}

/// Consumer half: one unified, receipt-ordered stream of inbound messages.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn pair() -> (EventSink, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (
            EventSink {
                tx,
                cancel: cancel.clone(),
            },
            Subscription { rx, cancel },
        )
    }

    pub fn close(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Session object owned by one driver. At most one live subscription.
pub struct MessageChannel {
    transport: Arc<dyn Transport>,
    subscription: Option<Subscription>,
}

impl MessageChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            subscription: None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe to the peer. No-op when already listening.
    pub fn listen(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        debug!("subscribing to peer updates");
        self.subscription = Some(self.transport.subscribe());
    }

    /// Drop the subscription. Safe to call any number of times.
    pub fn remove_listener(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            debug!("removing peer listener");
            sub.close();
        }
    }

    pub async fn send_message(&self, text: &str) -> Result<(), TransportError> {
        self.transport.send_text(text).await
    }

    pub async fn click(
        &self,
        message_id: MessageId,
        data: &CallbackData,
    ) -> Result<(), TransportError> {
        self.transport.click_button(message_id, data).await
    }

    /// Next already-delivered event, without waiting.
    pub(crate) fn try_recv(&mut self) -> Option<InboundMessage> {
        let sub = self.subscription.as_mut()?;
        match sub.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Next event; `None` when not listening or the stream ended.
    pub(crate) async fn recv(&mut self) -> Option<InboundMessage> {
        self.subscription.as_mut()?.rx.recv().await
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.remove_listener();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        sinks: Mutex<Vec<EventSink>>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send_text(&self, text: &str) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn click_button(
            &self,
            _message_id: MessageId,
            _data: &CallbackData,
        ) -> Result<(), TransportError> {
            Err(TransportError("BOT_RESPONSE_TIMEOUT".into()))
        }

        fn subscribe(&self) -> Subscription {
            let (sink, sub) = Subscription::pair();
            self.sinks.lock().unwrap().push(sink);
            sub
        }
    }

    #[test]
    fn listen_subscribes_once() {
        let transport = Arc::new(FakeTransport::default());
        let mut ch = MessageChannel::new(transport.clone());
        assert!(!ch.is_listening());

        ch.listen();
        ch.listen();
        assert!(ch.is_listening());
        assert_eq!(transport.sinks.lock().unwrap().len(), 1);
    }

    #[test]
    fn remove_listener_twice_is_harmless() {
        let transport = Arc::new(FakeTransport::default());
        let mut ch = MessageChannel::new(transport.clone());
        ch.listen();

        ch.remove_listener();
        assert!(!ch.is_listening());
        ch.remove_listener();
        assert!(!ch.is_listening());

        // The pump side observes the teardown.
        let sink = transport.sinks.lock().unwrap()[0].clone();
        assert!(sink.is_closed());
        assert!(!sink.send(InboundMessage::new(1)));
    }

    #[test]
    fn remove_listener_without_listen_is_harmless() {
        let mut ch = MessageChannel::new(Arc::new(FakeTransport::default()));
        ch.remove_listener();
        assert!(!ch.is_listening());
    }

    #[tokio::test]
    async fn events_arrive_in_receipt_order() {
        let transport = Arc::new(FakeTransport::default());
        let mut ch = MessageChannel::new(transport.clone());
        ch.listen();

        let sink = transport.sinks.lock().unwrap()[0].clone();
        assert!(sink.send(InboundMessage::new(1)));
        assert!(sink.send(InboundMessage::new(1).edited()));
        assert!(sink.send(InboundMessage::new(2)));

        assert_eq!(ch.try_recv().map(|m| (m.id.0, m.edited)), Some((1, false)));
        assert_eq!(ch.recv().await.map(|m| (m.id.0, m.edited)), Some((1, true)));
        assert_eq!(ch.recv().await.map(|m| m.id.0), Some(2));
        assert!(ch.try_recv().is_none());
    }

    #[tokio::test]
    async fn not_listening_yields_nothing() {
        let mut ch = MessageChannel::new(Arc::new(FakeTransport::default()));
        assert!(ch.try_recv().is_none());
        assert!(ch.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_and_click_go_through_transport() {
        let transport = Arc::new(FakeTransport::default());
        let ch = MessageChannel::new(transport.clone());

        ch.send_message("/mybots").await.unwrap();
        assert_eq!(*transport.sent.lock().unwrap(), vec!["/mybots".to_string()]);

        let err = ch
            .click(MessageId(3), &CallbackData::from("x"))
            .await
            .unwrap_err();
        assert_eq!(err.0, "BOT_RESPONSE_TIMEOUT");
    }
}

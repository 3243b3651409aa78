//! Delivery of [`RadioMessage`]s to the application.
//!
//! A handle delivers each message to two places: the optional callback
//! installed with `set_message_callback`, and a broadcast channel that any
//! number of `subscribe` receivers can drain. With neither in place
//! messages are dropped.

use std::sync::{Arc, RwLock};

use fmradio_core::events::RadioMessage;
use tokio::sync::broadcast;
use tracing::trace;

/// Application callback for radio messages.
///
/// User context is whatever the closure captures.
pub type MessageCallback = Arc<dyn Fn(&RadioMessage) + Send + Sync>;

/// Capacity of the broadcast channel behind `subscribe`.
pub const MESSAGE_CHANNEL_CAPACITY: usize = 256;

pub(crate) struct MessageSink {
    callback: RwLock<Option<MessageCallback>>,
    tx: broadcast::Sender<RadioMessage>,
}

impl MessageSink {
    pub(crate) fn new(callback: Option<MessageCallback>) -> Self {
        let (tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        MessageSink {
            callback: RwLock::new(callback),
            tx,
        }
    }

    pub(crate) fn set_callback(&self, callback: Option<MessageCallback>) {
        *self.callback.write().unwrap_or_else(|p| p.into_inner()) = callback;
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RadioMessage> {
        self.tx.subscribe()
    }

    /// Deliver `msg`. Never blocks and never fails.
    pub(crate) fn post(&self, msg: RadioMessage) {
        trace!(?msg, "posting message");
        // Clone the callback out so that it runs without the lock held.
        let callback = self
            .callback
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(cb) = callback {
            cb(&msg);
        }
        let _ = self.tx.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn post_without_listeners_is_dropped() {
        let sink = MessageSink::new(None);
        sink.post(RadioMessage::ScanStart);
    }

    #[test]
    fn post_reaches_callback_and_subscribers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sink = MessageSink::new(Some(Arc::new(move |m: &RadioMessage| {
            s.lock().unwrap().push(m.clone());
        })));
        let mut rx = sink.subscribe();

        sink.post(RadioMessage::ScanInfo { frequency: 89_100 });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![RadioMessage::ScanInfo { frequency: 89_100 }]
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            RadioMessage::ScanInfo { frequency: 89_100 }
        );
    }

    #[test]
    fn callback_can_be_replaced_and_cleared() {
        let count = Arc::new(Mutex::new(0));
        let sink = MessageSink::new(None);

        let c = count.clone();
        sink.set_callback(Some(Arc::new(move |_: &RadioMessage| {
            *c.lock().unwrap() += 1;
        })));
        sink.post(RadioMessage::SeekStart);
        sink.set_callback(None);
        sink.post(RadioMessage::SeekStart);

        assert_eq!(*count.lock().unwrap(), 1);
    }
}

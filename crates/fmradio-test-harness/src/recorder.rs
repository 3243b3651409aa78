//! Message capture for assertions.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use fmradio_core::events::RadioMessage;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Collects every message delivered to the callback returned by
/// [`MessageRecorder::sink`].
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MessageRecorder {
    messages: Arc<Mutex<Vec<RadioMessage>>>,
}

impl MessageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RadioMessage>> {
        self.messages.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// A message callback that appends to this recorder.
    pub fn sink(&self) -> impl Fn(&RadioMessage) + Send + Sync + 'static {
        let recorder = self.clone();
        move |msg| recorder.record(msg.clone())
    }

    pub fn record(&self, msg: RadioMessage) {
        self.lock().push(msg);
    }

    /// Everything recorded so far, oldest first.
    pub fn messages(&self) -> Vec<RadioMessage> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of recorded messages matching `pred`.
    pub fn count(&self, pred: impl Fn(&RadioMessage) -> bool) -> usize {
        self.lock().iter().filter(|m| pred(m)).count()
    }

    /// Wait until a message matching `pred` has been recorded.
    ///
    /// Returns the first match, or `None` after `timeout`.
    pub async fn wait_for(
        &self,
        pred: impl Fn(&RadioMessage) -> bool,
        timeout: Duration,
    ) -> Option<RadioMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.lock().iter().find(|m| pred(m)).cloned() {
                return Some(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_records_in_order() {
        let recorder = MessageRecorder::new();
        let sink = recorder.sink();
        sink(&RadioMessage::ScanStart);
        sink(&RadioMessage::ScanInfo { frequency: 89_100 });

        assert_eq!(
            recorder.messages(),
            vec![
                RadioMessage::ScanStart,
                RadioMessage::ScanInfo { frequency: 89_100 },
            ]
        );
        assert_eq!(recorder.count(|m| matches!(m, RadioMessage::ScanInfo { .. })), 1);
    }

    #[tokio::test]
    async fn wait_for_sees_later_messages() {
        let recorder = MessageRecorder::new();
        let r = recorder.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            r.record(RadioMessage::ScanFinish);
        });
        let found = recorder
            .wait_for(|m| *m == RadioMessage::ScanFinish, Duration::from_secs(1))
            .await;
        assert_eq!(found, Some(RadioMessage::ScanFinish));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out() {
        let recorder = MessageRecorder::new();
        let found = recorder
            .wait_for(|m| *m == RadioMessage::ScanFinish, Duration::from_millis(50))
            .await;
        assert_eq!(found, None);
    }
}

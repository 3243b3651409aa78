//! Background workers and their cancellation.
//!
//! Seek, scan, and volume-fade all run as a tokio task paired with a
//! [`CancellationToken`]. Seek and scan additionally hold the shared seek
//! gate around every blocking device seek, which lets [`cancel_and_join`]
//! tell whether a device call is in flight: if the gate is busy the driver
//! is asked to abort the seek before the worker is joined.

use std::future::Future;
use std::time::Duration;

use fmradio_core::device::DeviceBackend;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A spawned background task and the token that stops it.
pub(crate) struct Worker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Worker {
    /// Spawn `body` with a fresh cancellation token.
    pub(crate) fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(body(cancel.clone()));
        Worker { cancel, task }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait, without the seek-abort probe.
    pub(crate) async fn stop(self, timeout: Duration) {
        self.cancel.cancel();
        join_bounded(self.task, timeout).await;
    }
}

/// Stop `worker` and wait until it has exited.
///
/// The worker's token is cancelled first. If the seek gate is held, a
/// blocking device seek is in flight and `backend.abort_seek` is asked to
/// cut it short; otherwise the worker will see the cancellation before its
/// next device call. The join is bounded by `timeout`, after which the task
/// is aborted. In every case the task has finished when this returns.
pub(crate) async fn cancel_and_join(
    worker: Worker,
    seek_gate: &Mutex<()>,
    backend: &dyn DeviceBackend,
    timeout: Duration,
) {
    worker.cancel.cancel();

    let in_flight = seek_gate.try_lock().is_err();
    if in_flight {
        debug!("device seek in flight, requesting abort");
        if let Err(e) = backend.abort_seek().await {
            warn!(?e, "seek abort request failed");
        }
    } else {
        debug!("no device seek in flight");
    }

    join_bounded(worker.task, timeout).await;
}

async fn join_bounded(mut task: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(?e, "worker task ended abnormally"),
        Err(_) => {
            warn!(?timeout, "worker did not exit in time, aborting it");
            task.abort();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use fmradio_test_harness::MockDevice;

    const JOIN: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn idle_worker_joins_without_abort() {
        let device = MockDevice::new();
        let gate = Mutex::new(());
        let exited = Arc::new(AtomicBool::new(false));
        let e = exited.clone();

        let worker = Worker::spawn(move |cancel| async move {
            cancel.cancelled().await;
            e.store(true, Ordering::SeqCst);
        });
        cancel_and_join(worker, &gate, &device, JOIN).await;

        assert!(exited.load(Ordering::SeqCst));
        assert_eq!(device.abort_count(), 0);
    }

    #[tokio::test]
    async fn busy_gate_triggers_abort() {
        let device = Arc::new(MockDevice::new());
        let gate = Arc::new(Mutex::new(()));

        let (g, d) = (gate.clone(), device.clone());
        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        let worker = Worker::spawn(move |cancel| async move {
            let _held = g.lock().await;
            let _ = locked_tx.send(());
            // Stands in for a blocking seek that only ends on abort.
            d.aborted().await;
            drop(cancel);
        });
        locked_rx.await.unwrap();

        cancel_and_join(worker, &gate, device.as_ref(), JOIN).await;
        assert_eq!(device.abort_count(), 1);
        assert!(gate.try_lock().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_worker_is_aborted_after_timeout() {
        let device = MockDevice::new();
        let gate = Mutex::new(());
        let worker = Worker::spawn(|_cancel| async {
            std::future::pending::<()>().await;
        });
        cancel_and_join(worker, &gate, &device, Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn stop_joins() {
        let worker = Worker::spawn(|cancel| async move { cancel.cancelled().await });
        assert!(!worker.is_finished());
        worker.stop(JOIN).await;
    }
}

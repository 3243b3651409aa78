//! Deferred-event worker.
//!
//! One task per handle drains device-teardown and async-frequency requests
//! so that they never run on the thread that asked for them. Each event
//! kind has its own lane; the loop uses `tokio::select! { biased; }` so a
//! destroy request always wins over pending work, and teardown runs ahead
//! of queued frequency changes. Within a lane events keep submission order.

use std::sync::Arc;

use fmradio_core::error::{Error, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::radio::Inner;

/// An event processed by the deferred-event worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeferredEvent {
    /// Discard everything still queued and exit.
    Destroy,
    /// Close the device and release the transport gate.
    DeviceTeardown,
    /// Run the synchronous frequency path and post the outcome.
    SetFrequency(u32),
}

/// Sending side of the queue, owned by the handle.
#[derive(Debug, Clone)]
pub(crate) struct EventQueue {
    destroy_tx: mpsc::UnboundedSender<()>,
    teardown_tx: mpsc::UnboundedSender<()>,
    frequency_tx: mpsc::UnboundedSender<u32>,
}

/// Receiving side, moved into the worker.
pub(crate) struct EventLanes {
    destroy_rx: mpsc::UnboundedReceiver<()>,
    teardown_rx: mpsc::UnboundedReceiver<()>,
    frequency_rx: mpsc::UnboundedReceiver<u32>,
}

pub(crate) fn channel() -> (EventQueue, EventLanes) {
    let (destroy_tx, destroy_rx) = mpsc::unbounded_channel();
    let (teardown_tx, teardown_rx) = mpsc::unbounded_channel();
    let (frequency_tx, frequency_rx) = mpsc::unbounded_channel();
    (
        EventQueue {
            destroy_tx,
            teardown_tx,
            frequency_tx,
        },
        EventLanes {
            destroy_rx,
            teardown_rx,
            frequency_rx,
        },
    )
}

impl EventQueue {
    /// Enqueue `event`. Fails only once the worker has exited.
    pub(crate) fn push(&self, event: DeferredEvent) -> Result<()> {
        debug!(?event, "enqueue deferred event");
        let sent = match event {
            DeferredEvent::Destroy => self.destroy_tx.send(()).is_ok(),
            DeferredEvent::DeviceTeardown => self.teardown_tx.send(()).is_ok(),
            DeferredEvent::SetFrequency(freq) => self.frequency_tx.send(freq).is_ok(),
        };
        if sent {
            Ok(())
        } else {
            Err(Error::Internal("event queue worker has exited".into()))
        }
    }
}

/// What the worker does with each event. Implemented by the handle.
pub(crate) trait EventHandler: Send + Sync + 'static {
    fn device_teardown(&self) -> impl std::future::Future<Output = ()> + Send;
    fn set_frequency_deferred(&self, freq: u32) -> impl std::future::Future<Output = ()> + Send;
}

impl EventHandler for Inner {
    async fn device_teardown(&self) {
        self.teardown_device().await;
    }

    async fn set_frequency_deferred(&self, freq: u32) {
        self.run_deferred_frequency(freq).await;
    }
}

pub(crate) fn spawn_event_worker<H: EventHandler>(
    handler: Arc<H>,
    lanes: EventLanes,
) -> JoinHandle<()> {
    tokio::spawn(event_loop(handler, lanes))
}

async fn event_loop<H: EventHandler>(handler: Arc<H>, mut lanes: EventLanes) {
    debug!("event queue worker started");
    loop {
        tokio::select! {
            biased;

            msg = lanes.destroy_rx.recv() => {
                if msg.is_none() {
                    debug!("event queue closed");
                    break;
                }
                let discarded = lanes.discard_pending();
                debug!(discarded, "destroy received, leaving event queue");
                break;
            }

            Some(()) = lanes.teardown_rx.recv() => {
                handler.device_teardown().await;
            }

            Some(freq) = lanes.frequency_rx.recv() => {
                handler.set_frequency_deferred(freq).await;
            }
        }
    }
}

impl EventLanes {
    fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.teardown_rx.try_recv().is_ok() {
            discarded += 1;
        }
        while self.frequency_rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

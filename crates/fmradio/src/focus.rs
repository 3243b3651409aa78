//! Audio-focus listener.
//!
//! The arbiter pushes [`FocusSignal`]s into an unbounded channel from its
//! own context; this task drains the channel and applies each signal to
//! the handle. Stop and pause run the stop path with the device left
//! open, then queue the teardown on the event worker.

use std::sync::Arc;

use fmradio_core::events::RadioMessage;
use fmradio_core::focus::{FocusEvent, FocusSignal};
use fmradio_core::types::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event_queue::DeferredEvent;
use crate::radio::Inner;

pub(crate) async fn listen(
    inner: Arc<Inner>,
    mut signals: mpsc::UnboundedReceiver<FocusSignal>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("focus listener cancelled");
                break;
            }

            signal = signals.recv() => match signal {
                Some(signal) => handle_focus_signal(&inner, signal).await,
                None => {
                    debug!("focus arbiter dropped the session");
                    break;
                }
            },
        }
    }
}

async fn handle_focus_signal(inner: &Inner, signal: FocusSignal) {
    let state = inner.state().await;
    let event = FocusEvent::classify(signal, state);
    debug!(?signal, %state, ?event, "focus signal");

    match event {
        FocusEvent::Stopped { cause, pause } => {
            info!(%cause, pause, "audio focus lost");
            let command = if pause { Command::Pause } else { Command::Stop };
            if let Err(e) = inner.stop_with(command, event.notify_mode(), false).await {
                warn!(?e, "stopping on focus loss failed");
            }
            if let Err(e) = inner.events.push(DeferredEvent::DeviceTeardown) {
                warn!(?e, "queueing device teardown failed");
            }
        }
        FocusEvent::Resumable(cause) => {
            info!(%cause, "audio focus available");
            inner.sink.post(RadioMessage::ReadyToResume { cause });
        }
        FocusEvent::Ignored => {}
    }
}

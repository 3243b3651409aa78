//! Seek worker.
//!
//! A seek runs one blocking hardware seek on a background task. The caller
//! returns as soon as the task is spawned; the outcome arrives as
//! `SeekStart` followed by exactly one `SeekFinish`.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use fmradio_core::device::SeekRequest;
use fmradio_core::error::{Error, Result};
use fmradio_core::events::RadioMessage;
use fmradio_core::types::{Command, SeekDirection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::radio::Inner;
use crate::worker::{Worker, cancel_and_join};

impl Inner {
    pub(crate) async fn seek(self: &Arc<Self>, direction: SeekDirection) -> Result<()> {
        self.admit(Command::Seek).await?;
        if self.seeking.swap(true, Ordering::SeqCst) {
            return Err(Error::Internal("seek already in progress".into()));
        }

        if !self.muted.load(Ordering::SeqCst) {
            if let Err(e) = self.routing.set_mute(true).await {
                self.seeking.store(false, Ordering::SeqCst);
                return Err(e);
            }
            self.seek_unmute.store(true, Ordering::SeqCst);
        }

        let mut slot = self.seek_worker.lock().await;
        if let Some(old) = slot.take() {
            old.stop(self.config.worker_join_timeout()).await;
        }
        let inner = self.clone();
        *slot = Some(Worker::spawn(move |cancel| async move {
            inner.run_seek(direction, cancel).await;
        }));
        debug!(?direction, "seek started");
        Ok(())
    }

    async fn run_seek(&self, direction: SeekDirection, cancel: CancellationToken) {
        self.sink.post(RadioMessage::SeekStart);

        let found = self.seek_once(direction, &cancel).await;

        if self.seek_unmute.swap(false, Ordering::SeqCst) && !self.muted.load(Ordering::SeqCst) {
            if let Err(e) = self.routing.set_mute(false).await {
                warn!(?e, "unmute after seek failed");
            }
        }
        match found {
            Some(freq) => info!(freq_khz = freq, "seek found station"),
            None => info!("seek found nothing"),
        }
        self.sink.post(RadioMessage::SeekFinish { frequency: found });

        self.seeking.store(false, Ordering::SeqCst);
        self.reapply_volume().await;
    }

    /// One hardware seek. `None` on failure, cancellation, or when the
    /// tuner reports the same frequency as the previous seek.
    async fn seek_once(&self, direction: SeekDirection, cancel: &CancellationToken) -> Option<u32> {
        let region = self.region().await;
        let request = SeekRequest {
            upward: direction.is_upward(),
            wrap_around: true,
            spacing_khz: region.channel_spacing_khz,
        };

        let result = {
            let _gate = self.seek_gate.lock().await;
            if cancel.is_cancelled() {
                debug!("seek cancelled before device call");
                return None;
            }
            self.backend.seek(request).await
        };
        if let Err(e) = result {
            debug!(?e, "device seek failed");
            return None;
        }
        if cancel.is_cancelled() {
            debug!("seek cancelled during device call");
            return None;
        }

        let freq = match self.backend.get_frequency().await {
            Ok(freq) => freq,
            Err(e) => {
                warn!(?e, "reading frequency after seek failed");
                return None;
            }
        };
        if self.prev_seek_frequency.swap(freq, Ordering::SeqCst) == freq {
            debug!(freq_khz = freq, "seek returned the previous frequency");
            return None;
        }

        if region.is_edge(freq) {
            self.frequency.store(freq, Ordering::SeqCst);
        } else if let Err(e) = self.set_frequency(freq).await {
            warn!(freq_khz = freq, ?e, "tuning seek result failed");
            return None;
        }
        Some(freq)
    }

    /// Stop an outstanding seek, aborting the device call if one is in
    /// flight, and wait for the worker.
    pub(crate) async fn seek_cancel(&self) {
        let worker = self.seek_worker.lock().await.take();
        if let Some(worker) = worker {
            cancel_and_join(
                worker,
                &self.seek_gate,
                self.backend.as_ref(),
                self.config.worker_join_timeout(),
            )
            .await;
        }
        self.seeking.store(false, Ordering::SeqCst);
    }
}

//! Band scan.
//!
//! A scan opens the device, tunes the bottom of the band, and steps upward
//! one hardware seek at a time, posting each station as `ScanInfo`. The
//! sweep ends when a seek fails, the tuner wraps or repeats, the top of
//! the band is reached, or `stop_scan` cancels it. Either the worker
//! (`ScanFinish`) or `stop_scan` (`ScanStop`) closes the session, never
//! both; the `closed` flag decides which.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fmradio_core::device::SeekRequest;
use fmradio_core::error::{Error, Result};
use fmradio_core::events::RadioMessage;
use fmradio_core::state::NotifyMode;
use fmradio_core::types::{Command, RadioState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::radio::Inner;
use crate::worker::{Worker, cancel_and_join};

/// A running or finished scan.
pub(crate) struct ScanSession {
    worker: Worker,
    /// Set by whichever side posted the terminal message.
    closed: Arc<AtomicBool>,
}

impl Inner {
    pub(crate) async fn start_scan(self: &Arc<Self>) -> Result<()> {
        let _life = self.lifecycle.lock().await;
        if !self.admit(Command::StartScan).await? {
            return Ok(());
        }
        if self.seeking.load(Ordering::SeqCst) {
            return Err(Error::Internal("cannot scan while a seek is in progress".into()));
        }

        let mut slot = self.scan.lock().await;
        if let Some(old) = slot.take() {
            debug!(finished = old.worker.is_finished(), "reaping previous scan");
            old.worker.stop(self.config.worker_join_timeout()).await;
        }

        self.set_pending(Some(RadioState::Scanning)).await;
        if let Err(e) = self.begin_scan().await {
            warn!(?e, "scan start failed, rolling back");
            self.set_pending(None).await;
            self.close_device().await;
            self.unprepare_device().await;
            return Err(e);
        }

        let closed = Arc::new(AtomicBool::new(false));
        let inner = self.clone();
        let flag = closed.clone();
        let worker = Worker::spawn(move |cancel| async move {
            inner.run_scan(cancel, flag).await;
        });
        *slot = Some(ScanSession { worker, closed });
        Ok(())
    }

    async fn begin_scan(&self) -> Result<()> {
        self.prepare_device().await?;
        let tuning = self.reload_tuning().await;
        self.open_device().await?;
        self.push_tuning(&tuning).await;
        self.routing.set_mute(true).await?;

        let (band_min, _) = self.region().await.range();
        self.set_frequency(band_min).await?;

        self.sink.post(RadioMessage::ScanStart);
        self.transition(RadioState::Scanning, NotifyMode::Post).await;
        info!(from_khz = band_min, "scan started");
        Ok(())
    }

    async fn run_scan(&self, cancel: CancellationToken, closed: Arc<AtomicBool>) {
        let found = self.scan_band(&cancel).await;

        if !cancel.is_cancelled() && !closed.swap(true, Ordering::SeqCst) {
            {
                let _life = self.lifecycle.lock().await;
                self.close_device().await;
            }
            self.transition(RadioState::Ready, NotifyMode::Post).await;
            self.restore_audio().await;
            info!(found, "scan finished");
            self.sink.post(RadioMessage::ScanFinish);
        } else {
            debug!(found, "scan worker stopped");
        }
    }

    /// Sweep upward. Returns the number of stations reported.
    async fn scan_band(&self, cancel: &CancellationToken) -> usize {
        let region = self.region().await;
        let request = SeekRequest {
            upward: true,
            wrap_around: false,
            spacing_khz: region.channel_spacing_khz,
        };
        let mut prev = 0;
        let mut found = 0;

        loop {
            let result = {
                let _gate = self.seek_gate.lock().await;
                if cancel.is_cancelled() {
                    break;
                }
                self.backend.seek(request).await
            };
            match result {
                Ok(()) => {}
                Err(Error::TryAgain) => continue,
                Err(e) => {
                    debug!(?e, "scan seek ended");
                    break;
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            let freq = match self.backend.get_frequency().await {
                Ok(freq) => freq,
                Err(e) => {
                    warn!(?e, "reading frequency during scan failed");
                    break;
                }
            };
            self.frequency.store(freq, Ordering::SeqCst);

            if freq <= prev {
                debug!(freq_khz = freq, prev_khz = prev, "tuner wrapped or repeated");
                break;
            }
            prev = freq;
            if freq == region.band_max_khz {
                break;
            }
            if cancel.is_cancelled() {
                break;
            }

            debug!(freq_khz = freq, "scan found station");
            self.sink.post(RadioMessage::ScanInfo { frequency: freq });
            found += 1;
        }
        found
    }

    pub(crate) async fn stop_scan(&self) -> Result<()> {
        if !self.admit(Command::StopScan).await? {
            return Ok(());
        }
        let session = {
            let _life = self.lifecycle.lock().await;
            self.scan.lock().await.take()
        };
        let Some(session) = session else {
            return Ok(());
        };

        cancel_and_join(
            session.worker,
            &self.seek_gate,
            self.backend.as_ref(),
            self.config.worker_join_timeout(),
        )
        .await;

        if !session.closed.swap(true, Ordering::SeqCst) {
            {
                let _life = self.lifecycle.lock().await;
                self.close_device().await;
            }
            self.transition(RadioState::Ready, NotifyMode::Post).await;
            self.restore_audio().await;
            info!("scan stopped");
            self.sink.post(RadioMessage::ScanStop);
        }
        Ok(())
    }
}

//! Device lifecycle helpers: transport gate, open with retry, initial
//! configuration, and close with status polling.
//!
//! Callers hold the lifecycle lock around everything here except
//! `teardown_device`, which takes it itself.

use std::sync::atomic::Ordering;

use fmradio_core::device::CloseStatus;
use fmradio_core::error::{Error, Result};
use fmradio_core::retry::{poll_until_or_timeout, retry_transient};
use fmradio_core::routing::GateState;
use fmradio_core::tuning::TuningParams;
use fmradio_core::types::RadioState;
use tracing::{debug, info, warn};

use crate::radio::Inner;

impl Inner {
    /// Bring the transport gate up and wait for it to report active.
    pub(crate) async fn prepare_device(&self) -> Result<()> {
        if !self.gate.required() || self.gate_ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.gate.enable().await.map_err(|e| {
            warn!(?e, "transport gate enable failed");
            Error::DeviceNotOpened
        })?;

        poll_until_or_timeout(self.config.gate_ready_policy(), "transport gate", || async {
            Ok::<_, Error>(self.gate.state().await? == GateState::Active)
        })
        .await
        .map_err(|e| {
            warn!(?e, "transport gate never became active");
            Error::DeviceNotOpened
        })?;
        self.gate_ready.store(true, Ordering::SeqCst);
        debug!("transport gate active");
        Ok(())
    }

    /// Turn the transport gate off once the device is closed.
    pub(crate) async fn unprepare_device(&self) {
        if !self.gate.required()
            || self.backend.is_open()
            || !self.gate_ready.load(Ordering::SeqCst)
        {
            return;
        }
        if let Err(e) = self.gate.disable().await {
            warn!(?e, "transport gate disable failed");
        }
        let off = poll_until_or_timeout(
            self.config.gate_disable_policy(),
            "transport gate off",
            || async { Ok::<_, Error>(self.gate.state().await? == GateState::Inactive) },
        )
        .await;
        match off {
            Ok(()) => debug!("transport gate inactive"),
            Err(e) => warn!(?e, "transport gate disable not confirmed"),
        }
        self.gate_ready.store(false, Ordering::SeqCst);
    }

    /// Open the device node, retrying transient failures, and configure it
    /// for the current region.
    pub(crate) async fn open_device(&self) -> Result<()> {
        if self.backend.is_open() {
            return Ok(());
        }
        retry_transient(self.config.open_policy(), "device open", || self.backend.open())
            .await
            .map_err(|e| match e {
                Error::TryAgain => Error::DeviceNotOpened,
                other => other,
            })?;

        if let Err(e) = self.configure_device().await {
            warn!(?e, "device initialisation failed, closing");
            if let Err(e) = self.backend.close().await {
                debug!(?e, "close after failed initialisation failed");
            }
            return Err(Error::Internal(format!("device initialisation failed: {e}")));
        }
        Ok(())
    }

    async fn configure_device(&self) -> Result<()> {
        let info = self.backend.init_tuner().await?;
        let region = self.region().await;
        self.backend
            .set_band_range(region.band_min_khz, region.band_max_khz)
            .await?;
        self.backend.set_deemphasis(region.deemphasis).await?;
        info!(
            driver = %info.driver,
            card = %info.card,
            stereo = info.stereo,
            region = %region.region,
            "device opened"
        );
        Ok(())
    }

    /// Push receiver thresholds. Only done when the store supplied them.
    pub(crate) async fn push_tuning(&self, params: &TuningParams) {
        if !params.enable {
            return;
        }
        if let Err(e) = self.backend.apply_tuning(params).await {
            warn!(?e, "applying tuning parameters failed");
        }
    }

    /// Close the device and wait for the driver to report it released.
    pub(crate) async fn close_device(&self) {
        let _volume = self.volume.lock().await;
        if !self.backend.is_open() {
            return;
        }
        if let Err(e) = self.backend.close().await {
            warn!(?e, "device close failed");
        }
        let closed = poll_until_or_timeout(self.config.close_policy(), "device close", || async {
            Ok::<_, Error>(matches!(
                self.backend.close_status().await?,
                None | Some(CloseStatus::Closed)
            ))
        })
        .await;
        match closed {
            Ok(()) => debug!("device closed"),
            Err(e) => warn!(?e, "device close not confirmed"),
        }
    }

    /// Deferred teardown after a focus revocation.
    ///
    /// Skipped if the application restarted playback or a scan in the
    /// meantime.
    pub(crate) async fn teardown_device(&self) {
        let _life = self.lifecycle.lock().await;
        match self.state().await {
            RadioState::Playing | RadioState::Scanning => {
                debug!("device in use again, skipping teardown");
            }
            _ => {
                self.close_device().await;
                self.unprepare_device().await;
            }
        }
    }
}

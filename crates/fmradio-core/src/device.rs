//! Tuner device trait.
//!
//! The [`DeviceBackend`] trait abstracts over the tuner hardware. The
//! `fmradio-device` crate provides a V4L2 implementation for real radio
//! nodes and a simulated one; `fmradio-test-harness` provides a
//! scriptable mock.
//!
//! Methods take `&self`: a backend is shared between the caller, the seek
//! or scan worker, and the event-queue worker, and `abort_seek` must be
//! callable while a `seek` is blocked inside the driver. Implementations
//! synchronise internally.

use async_trait::async_trait;

use crate::error::Result;
use crate::region::Deemphasis;
use crate::tuning::TuningParams;

/// Identity and audio capability reported when a tuner is initialised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub driver: String,
    pub card: String,
    /// Whether the tuner was put into stereo mode. Mono otherwise.
    pub stereo: bool,
}

/// Parameters of a single hardware seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    pub upward: bool,
    /// Continue from the opposite band edge after hitting one.
    pub wrap_around: bool,
    pub spacing_khz: u32,
}

/// Result of reading a device status indicator after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStatus {
    Closed,
    /// The driver is still releasing the tuner.
    Closing,
}

/// Asynchronous access to a tuner.
///
/// All frequencies are in kHz; unit conversion to the driver's native
/// format happens inside the implementation.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Frequency a fresh handle starts on, also used as the band-minimum
    /// snap target.
    fn default_frequency(&self) -> u32;

    /// Open the device node. A single attempt; transient failures come back
    /// as [`Error::TryAgain`](crate::Error::TryAgain).
    async fn open(&self) -> Result<()>;

    /// Query capabilities, choose mono or stereo, and select the tuner.
    async fn init_tuner(&self) -> Result<DeviceInfo>;

    /// Close the device node. Closing a closed device succeeds.
    async fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Read the driver's close-status indicator, or `None` when the device
    /// has none.
    async fn close_status(&self) -> Result<Option<CloseStatus>> {
        Ok(None)
    }

    async fn set_band_range(&self, min_khz: u32, max_khz: u32) -> Result<()>;

    async fn set_deemphasis(&self, deemphasis: Deemphasis) -> Result<()>;

    async fn set_frequency(&self, freq_khz: u32) -> Result<()>;

    /// Read the frequency the tuner is on now.
    async fn get_frequency(&self) -> Result<u32>;

    /// Run one blocking hardware seek. Returns when the tuner has locked
    /// onto a station, hit a band edge, or been aborted.
    async fn seek(&self, request: SeekRequest) -> Result<()>;

    /// Ask the driver, out of band, to abandon an in-flight [`seek`](Self::seek).
    async fn abort_seek(&self) -> Result<()>;

    /// Received signal strength in dBm.
    async fn signal_strength(&self) -> Result<i32>;

    /// Write a raw device volume value.
    async fn set_volume(&self, raw: u32) -> Result<()>;

    async fn get_volume(&self) -> Result<u32>;

    /// Push receiver thresholds to the tuner.
    async fn apply_tuning(&self, _params: &TuningParams) -> Result<()> {
        Ok(())
    }
}

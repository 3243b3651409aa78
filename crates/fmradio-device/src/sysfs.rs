//! Vendor sysfs attributes of the FM receiver.
//!
//! Some FM chips expose controls outside V4L2 under the video4linux class
//! directory: a close-status flag, a seek-abort trigger, and receiver
//! thresholds.

use std::io;
use std::path::{Path, PathBuf};

use fmradio_core::device::CloseStatus;
use fmradio_core::error::{Error, Result};
use fmradio_core::tuning::TuningParams;
use tracing::{debug, warn};

pub const STATUS: &str = "fmrx_status";
pub const SEARCH_ABORT: &str = "fmrx_search_abort";
pub const RSSI_LEVEL: &str = "fmrx_rssi_lvl";
pub const FREQ_OFFSET: &str = "fmrx_freq_offset";
pub const NOISE_POWER: &str = "fmrx_noise_power";
pub const PILOT_POWER: &str = "fmrx_pilot_power";
pub const START_MUTE: &str = "fmrx_start_mute";

/// Default attribute directory of the first radio node.
pub const DEFAULT_SYSFS_DIR: &str = "/sys/devices/virtual/video4linux/radio0";

/// Access to the receiver's sysfs attribute directory.
#[derive(Debug, Clone)]
pub struct SysfsAttributes {
    dir: PathBuf,
}

impl Default for SysfsAttributes {
    fn default() -> Self {
        SysfsAttributes::new(DEFAULT_SYSFS_DIR)
    }
}

impl SysfsAttributes {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SysfsAttributes { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read(&self, name: &str) -> io::Result<String> {
        let raw = tokio::fs::read_to_string(self.dir.join(name)).await?;
        Ok(raw.trim().to_string())
    }

    async fn write(&self, name: &str, value: impl ToString) -> io::Result<()> {
        tokio::fs::write(self.dir.join(name), value.to_string()).await
    }

    /// Read the close-status flag: `0` closed, `1` still closing.
    ///
    /// Returns `None` when the attribute does not exist.
    pub async fn close_status(&self) -> Result<Option<CloseStatus>> {
        match self.read(STATUS).await {
            Ok(v) => match v.as_str() {
                "0" => Ok(Some(CloseStatus::Closed)),
                "1" => Ok(Some(CloseStatus::Closing)),
                other => Err(Error::Internal(format!("unexpected {STATUS} value '{other}'"))),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ask the driver to abandon an in-flight hardware seek.
    pub async fn abort_search(&self) -> Result<()> {
        debug!(dir = %self.dir.display(), "aborting hardware seek");
        self.write(SEARCH_ABORT, 1).await?;
        Ok(())
    }

    /// Write receiver thresholds. Each attribute is written independently;
    /// failures are logged and skipped.
    pub async fn apply_tuning(&self, params: &TuningParams) {
        if !params.enable {
            debug!("tuning disabled, keeping driver defaults");
            return;
        }

        let writes = [
            (RSSI_LEVEL, params.rssi_threshold),
            (FREQ_OFFSET, params.frequency_offset),
            (NOISE_POWER, params.noise_power),
            (PILOT_POWER, params.pilot_power),
            (START_MUTE, i32::from(params.softmute_enable)),
        ];
        for (name, value) in writes {
            if let Err(e) = self.write(name, value).await {
                warn!(attribute = name, value, ?e, "failed to write tuning attribute");
            }
        }
    }
}

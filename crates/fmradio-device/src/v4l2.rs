//! V4L2 radio-node backend.
//!
//! [`V4l2Device`] drives a Linux radio node through the V4L2 tuner ioctls.
//! Every ioctl runs on the blocking pool so that a hardware seek, which can
//! block for seconds, never stalls the runtime. The file descriptor is held
//! behind an `Arc` so `close` can proceed while a seek is still parked in
//! the driver; the descriptor is released when the last user drops it.

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use fmradio_core::device::{CloseStatus, DeviceBackend, DeviceInfo, SeekRequest};
use fmradio_core::error::{Error, Result};
use fmradio_core::helpers::{device_units_to_khz, khz_to_device_units, scale_signal};
use fmradio_core::region::Deemphasis;
use fmradio_core::tuning::TuningParams;
use tracing::{debug, info};

use crate::ioctl::{self, V4l2Capability, V4l2Control, V4l2Frequency, V4l2HwFreqSeek, V4l2Tuner};
use crate::sysfs::{DEFAULT_SYSFS_DIR, SysfsAttributes};

/// Frequency a fresh handle starts on with this backend.
pub const DEFAULT_FREQUENCY_KHZ: u32 = 99_900;

/// Location of the radio node and its attribute directory.
#[derive(Debug, Clone)]
pub struct V4l2Config {
    pub device_path: PathBuf,
    pub sysfs_dir: PathBuf,
}

impl Default for V4l2Config {
    fn default() -> Self {
        V4l2Config {
            device_path: PathBuf::from("/dev/radio0"),
            sysfs_dir: PathBuf::from(DEFAULT_SYSFS_DIR),
        }
    }
}

/// A V4L2 radio tuner.
pub struct V4l2Device {
    config: V4l2Config,
    sysfs: SysfsAttributes,
    fd: Mutex<Option<Arc<OwnedFd>>>,
    /// Last tuner description written with `VIDIOC_S_TUNER`; band-range
    /// updates modify and rewrite it.
    tuner: Mutex<V4l2Tuner>,
}

fn errno(e: nix::errno::Errno) -> Error {
    Error::from_device_io(std::io::Error::from(e))
}

impl V4l2Device {
    pub fn new(config: V4l2Config) -> Self {
        let sysfs = SysfsAttributes::new(config.sysfs_dir.clone());
        V4l2Device {
            config,
            sysfs,
            fd: Mutex::new(None),
            tuner: Mutex::new(V4l2Tuner::default()),
        }
    }

    fn fd_slot(&self) -> MutexGuard<'_, Option<Arc<OwnedFd>>> {
        // A poisoned slot only means another thread panicked mid-swap;
        // the Option itself is always valid.
        self.fd.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn tuner_slot(&self) -> MutexGuard<'_, V4l2Tuner> {
        self.tuner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run `op` against the open descriptor on the blocking pool.
    async fn with_fd<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(RawFd) -> nix::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let fd = self.fd_slot().clone().ok_or(Error::DeviceNotOpened)?;
        tokio::task::spawn_blocking(move || op(fd.as_raw_fd()))
            .await
            .map_err(|e| Error::Internal(format!("ioctl task failed: {e}")))?
            .map_err(errno)
    }

    async fn get_tuner(&self) -> Result<V4l2Tuner> {
        self.with_fd(|fd| {
            let mut vt = V4l2Tuner {
                index: ioctl::TUNER_INDEX,
                ..Default::default()
            };
            // SAFETY: `vt` is a valid, exclusively borrowed v4l2_tuner.
            unsafe { ioctl::vidioc_g_tuner(fd, &mut vt) }?;
            Ok(vt)
        })
        .await
    }

    async fn set_tuner(&self, vt: V4l2Tuner) -> Result<()> {
        self.with_fd(move |fd| {
            // SAFETY: `vt` lives on this closure's stack for the call.
            unsafe { ioctl::vidioc_s_tuner(fd, &vt) }?;
            Ok(())
        })
        .await?;
        *self.tuner_slot() = vt;
        Ok(())
    }

    async fn set_control(&self, id: u32, value: i32) -> Result<()> {
        self.with_fd(move |fd| {
            let mut ctrl = V4l2Control { id, value };
            // SAFETY: `ctrl` is a valid, exclusively borrowed v4l2_control.
            unsafe { ioctl::vidioc_s_ctrl(fd, &mut ctrl) }?;
            Ok(())
        })
        .await
    }

    async fn get_control(&self, id: u32) -> Result<i32> {
        self.with_fd(move |fd| {
            let mut ctrl = V4l2Control { id, value: 0 };
            // SAFETY: `ctrl` is a valid, exclusively borrowed v4l2_control.
            unsafe { ioctl::vidioc_g_ctrl(fd, &mut ctrl) }?;
            Ok(ctrl.value)
        })
        .await
    }
}

#[async_trait]
impl DeviceBackend for V4l2Device {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn default_frequency(&self) -> u32 {
        DEFAULT_FREQUENCY_KHZ
    }

    async fn open(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let path = self.config.device_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().read(true).write(true).open(path)
        })
        .await
        .map_err(|e| Error::Internal(format!("open task failed: {e}")))?
        .map_err(Error::from_device_io)?;

        debug!(path = %self.config.device_path.display(), "radio device opened");
        *self.fd_slot() = Some(Arc::new(OwnedFd::from(file)));
        Ok(())
    }

    async fn init_tuner(&self) -> Result<DeviceInfo> {
        let cap = self
            .with_fd(|fd| {
                let mut cap = V4l2Capability::default();
                // SAFETY: `cap` is a valid, exclusively borrowed v4l2_capability.
                unsafe { ioctl::vidioc_querycap(fd, &mut cap) }?;
                Ok(cap)
            })
            .await?;

        if cap.capabilities & ioctl::V4L2_CAP_TUNER == 0 {
            return Err(Error::Internal("device has no tuner".into()));
        }

        let mut vt = self.get_tuner().await?;
        let stereo = vt.capability & ioctl::V4L2_TUNER_CAP_STEREO != 0;
        vt.audmode = if stereo {
            ioctl::V4L2_TUNER_MODE_STEREO
        } else {
            ioctl::V4L2_TUNER_MODE_MONO
        };
        vt.index = ioctl::TUNER_INDEX;
        self.set_tuner(vt).await?;

        let info = DeviceInfo {
            driver: ioctl::c_field(&cap.driver),
            card: ioctl::c_field(&cap.card),
            stereo,
        };
        info!(driver = %info.driver, card = %info.card, stereo, "tuner initialised");
        Ok(info)
    }

    async fn close(&self) -> Result<()> {
        if self.fd_slot().take().is_some() {
            debug!("radio device closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.fd_slot().is_some()
    }

    async fn close_status(&self) -> Result<Option<CloseStatus>> {
        self.sysfs.close_status().await
    }

    async fn set_band_range(&self, min_khz: u32, max_khz: u32) -> Result<()> {
        let mut vt = *self.tuner_slot();
        vt.index = ioctl::TUNER_INDEX;
        vt.rangelow = khz_to_device_units(min_khz);
        vt.rangehigh = khz_to_device_units(max_khz);
        self.set_tuner(vt).await
    }

    async fn set_deemphasis(&self, deemphasis: Deemphasis) -> Result<()> {
        let value = match deemphasis {
            Deemphasis::Micros50 => ioctl::V4L2_DEEMPHASIS_50_US,
            Deemphasis::Micros75 => ioctl::V4L2_DEEMPHASIS_75_US,
        };
        self.set_control(ioctl::V4L2_CID_TUNE_DEEMPHASIS, value).await
    }

    async fn set_frequency(&self, freq_khz: u32) -> Result<()> {
        let vf = V4l2Frequency {
            tuner: ioctl::TUNER_INDEX,
            kind: ioctl::V4L2_TUNER_RADIO,
            frequency: khz_to_device_units(freq_khz),
            ..Default::default()
        };
        self.with_fd(move |fd| {
            // SAFETY: `vf` lives on this closure's stack for the call.
            unsafe { ioctl::vidioc_s_frequency(fd, &vf) }?;
            Ok(())
        })
        .await
    }

    async fn get_frequency(&self) -> Result<u32> {
        self.with_fd(|fd| {
            let mut vf = V4l2Frequency {
                tuner: ioctl::TUNER_INDEX,
                kind: ioctl::V4L2_TUNER_RADIO,
                ..Default::default()
            };
            // SAFETY: `vf` is a valid, exclusively borrowed v4l2_frequency.
            unsafe { ioctl::vidioc_g_frequency(fd, &mut vf) }?;
            Ok(device_units_to_khz(vf.frequency))
        })
        .await
    }

    async fn seek(&self, request: SeekRequest) -> Result<()> {
        let vs = V4l2HwFreqSeek {
            tuner: ioctl::TUNER_INDEX,
            kind: ioctl::V4L2_TUNER_RADIO,
            seek_upward: u32::from(request.upward),
            wrap_around: u32::from(request.wrap_around),
            spacing: request.spacing_khz.saturating_mul(1_000),
            ..Default::default()
        };
        self.with_fd(move |fd| {
            // SAFETY: `vs` lives on this closure's stack for the call.
            unsafe { ioctl::vidioc_s_hw_freq_seek(fd, &vs) }?;
            Ok(())
        })
        .await
    }

    async fn abort_seek(&self) -> Result<()> {
        self.sysfs.abort_search().await
    }

    async fn signal_strength(&self) -> Result<i32> {
        let vt = self.get_tuner().await?;
        Ok(scale_signal(vt.signal))
    }

    async fn set_volume(&self, raw: u32) -> Result<()> {
        let value = i32::try_from(raw)
            .map_err(|_| Error::InvalidArgument(format!("volume {raw} too large")))?;
        self.set_control(ioctl::V4L2_CID_AUDIO_VOLUME, value).await
    }

    async fn get_volume(&self) -> Result<u32> {
        let value = self.get_control(ioctl::V4L2_CID_AUDIO_VOLUME).await?;
        u32::try_from(value).map_err(|_| Error::Internal(format!("negative volume {value}")))
    }

    async fn apply_tuning(&self, params: &TuningParams) -> Result<()> {
        self.sysfs.apply_tuning(params).await;
        Ok(())
    }
}

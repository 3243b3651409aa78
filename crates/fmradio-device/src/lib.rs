//! Tuner backends for fmradio.
//!
//! This crate provides concrete implementations of the
//! [`DeviceBackend`](fmradio_core::DeviceBackend) trait from `fmradio-core`:
//!
//! - [`V4l2Device`]: a Linux V4L2 radio node (`/dev/radio0`) driven by
//!   ioctls, with the vendor sysfs attributes for close status, seek abort,
//!   and receiver tuning (Linux only)
//! - [`SimulatedDevice`]: an in-memory tuner with a fixed station list,
//!   for emulators and demos
//!
//! # Example
//!
//! ```no_run
//! use fmradio_core::DeviceBackend;
//! use fmradio_device::{V4l2Config, V4l2Device};
//!
//! # async fn example() -> fmradio_core::Result<()> {
//! let device = V4l2Device::new(V4l2Config::default());
//! device.open().await?;
//! let info = device.init_tuner().await?;
//! println!("{} ({})", info.card, if info.stereo { "stereo" } else { "mono" });
//! device.set_frequency(99_900).await?;
//! # Ok(())
//! # }
//! ```

pub mod simulated;
pub mod sysfs;

#[cfg(target_os = "linux")]
mod ioctl;
#[cfg(target_os = "linux")]
pub mod v4l2;

pub use simulated::{DEFAULT_STATIONS, SimulatedDevice};
pub use sysfs::SysfsAttributes;

#[cfg(target_os = "linux")]
pub use v4l2::{V4l2Config, V4l2Device};

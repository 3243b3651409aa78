//! Async FM radio tuner control.
//!
//! This crate drives an FM tuner through its lifecycle on top of the
//! traits in `fmradio-core`. It provides:
//!
//! - **Radio handle** ([`Radio`]) -- command admission, the NULL / READY /
//!   PLAYING / SCANNING state machine, frequency and region control, mute,
//!   and volume.
//! - **Workers** -- seek, band scan, and volume fade run on background
//!   tasks and report through [`RadioMessage`]s.
//! - **Deferred events** -- device teardown after a focus loss and
//!   `set_frequency_async` run on a per-handle event worker, never on the
//!   caller's task.
//! - **Builder** ([`RadioBuilder`]) -- wires the device backend and the
//!   system services together.
//! - **Configuration** ([`RadioConfig`], [`TomlTuningStore`]) -- timing
//!   budgets, policy switches, and tuning parameters from TOML.
//!
//! Messages reach the application through a callback
//! ([`Radio::set_message_callback`]) and a broadcast channel
//! ([`Radio::subscribe`]).
//!
//! # Example
//!
//! ```no_run
//! use fmradio::{RadioBuilder, RadioMessage, SeekDirection};
//! # use fmradio_core::DeviceBackend;
//!
//! # async fn example(device: impl DeviceBackend + 'static) -> fmradio::Result<()> {
//! let radio = RadioBuilder::new(device).create().await?;
//! let mut messages = radio.subscribe();
//!
//! radio.realize().await?;
//! radio.set_frequency(99_900).await?;
//! radio.start().await?;
//!
//! radio.seek(SeekDirection::Up).await?;
//! while let Ok(msg) = messages.recv().await {
//!     if let RadioMessage::SeekFinish { frequency } = msg {
//!         println!("seek landed on {frequency:?}");
//!         break;
//!     }
//! }
//! radio.destroy().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
mod device;
mod event_queue;
mod focus;
pub mod radio;
mod scan;
mod seek;
mod sink;
mod volume;
mod worker;

pub use builder::RadioBuilder;
pub use config::{ConfigError, RadioConfig, TomlTuningStore};
pub use radio::Radio;
pub use sink::{MESSAGE_CHANNEL_CAPACITY, MessageCallback};

// Re-export the core vocabulary so applications need only this crate.
pub use fmradio_core::{
    AudioRouting, Command, DeviceBackend, Error, ErrorKind, FocusArbiter, InterruptSource,
    RadioMessage, RadioState, Region, Result, SeekDirection, TransportGate, TuningStore,
};

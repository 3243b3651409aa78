//! fmradio-core: Core traits, types, and error definitions for fmradio.
//!
//! This crate defines the hardware-agnostic pieces of the FM tuner control
//! core. The `fmradio` crate builds the radio handle on top of them; device
//! backends and test mocks implement the collaborator traits.
//!
//! # Key types
//!
//! - [`StateMachine`] / [`admit`] -- command admission and state transitions
//! - [`Region`] / [`RegionSetting`] -- regulatory band table
//! - [`DeviceBackend`] -- the tuner hardware
//! - [`FocusArbiter`], [`AudioRouting`], [`TransportGate`], [`TuningStore`]
//!   -- external services the handle depends on
//! - [`RadioMessage`] -- asynchronous notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod device;
pub mod error;
pub mod events;
pub mod focus;
pub mod helpers;
pub mod region;
pub mod retry;
pub mod routing;
pub mod state;
pub mod tuning;
pub mod types;

// Re-export key types at crate root for ergonomic `use fmradio_core::*`.
pub use device::{CloseStatus, DeviceBackend, DeviceInfo, SeekRequest};
pub use error::{Error, ErrorKind, Result};
pub use events::RadioMessage;
pub use focus::{
    FocusArbiter, FocusBinding, FocusCommand, FocusEvent, FocusSignal, InterruptSource,
    NullFocusArbiter,
};
pub use helpers::format_freq_mhz;
pub use region::{Deemphasis, ParseRegionError, Region, RegionSetting};
pub use retry::RetryPolicy;
pub use routing::{AudioRouting, GateState, NullAudioRouting, NullTransportGate, TransportGate};
pub use state::{Admission, NotifyMode, StateMachine, admit};
pub use tuning::{
    EmptyTuningStore, MAX_VOLUME_LEVEL, TuningParams, TuningStore, VOLUME_STEPS, VolumeTable,
};
pub use types::*;

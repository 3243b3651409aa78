//! fmradio-test-harness: Mock collaborators and message recorders for
//! fmradio.
//!
//! Every external service a radio handle talks to has a scriptable mock
//! here, so handle behaviour can be tested deterministically without a
//! tuner, a focus arbiter, or a mixer:
//!
//! - [`MockDevice`] -- a [`DeviceBackend`](fmradio_core::DeviceBackend)
//!   with scripted seek outcomes, injected failures, and a call log
//! - [`MockFocusArbiter`], [`MockAudioRouting`], [`MockTransportGate`]
//! - [`MemoryTuningStore`] -- an in-memory tuning-parameter store
//! - [`MessageRecorder`] -- collects posted messages for assertions

pub mod mock_device;
pub mod mock_services;
pub mod recorder;

pub use mock_device::{DeviceCall, DeviceOp, MockDevice, SeekOutcome, error_for};
pub use mock_services::{
    FocusCall, GateCall, MemoryTuningStore, MockAudioRouting, MockFocusArbiter, MockTransportGate,
};
pub use recorder::MessageRecorder;

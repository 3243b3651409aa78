//! Scriptable tuner for deterministic handle tests.
//!
//! [`MockDevice`] implements [`DeviceBackend`] with pre-loaded seek
//! outcomes and open failures. Seek outcomes are consumed in order; every
//! state-changing call is recorded so tests can assert on what the handle
//! sent to the device.
//!
//! # Example
//!
//! ```
//! use fmradio_test_harness::{MockDevice, SeekOutcome};
//!
//! let device = MockDevice::new();
//! device.queue_seek(SeekOutcome::Land(89_100));
//! device.queue_seek(SeekOutcome::Land(91_900));
//! assert_eq!(device.remaining_seeks(), 2);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use fmradio_core::device::{CloseStatus, DeviceBackend, DeviceInfo, SeekRequest};
use fmradio_core::error::{Error, ErrorKind, Result};
use fmradio_core::region::Deemphasis;
use fmradio_core::tuning::TuningParams;
use fmradio_core::types::{Command, RadioState};
use tokio::sync::Notify;

/// Default frequency reported by [`MockDevice::new`].
pub const MOCK_DEFAULT_FREQUENCY: u32 = 99_900;

/// What a single device seek does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Succeed, leaving the tuner on this frequency.
    Land(u32),
    /// Fail with this error.
    Fail(ErrorKind),
    /// Block until [`DeviceBackend::abort_seek`] is called, then fail.
    BlockUntilAbort,
}

/// A recorded state-changing device call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Open,
    InitTuner,
    Close,
    SetBandRange { min_khz: u32, max_khz: u32 },
    SetDeemphasis(Deemphasis),
    SetFrequency(u32),
    Seek(SeekRequest),
    AbortSeek,
    SetVolume(u32),
    ApplyTuning(TuningParams),
}

/// Device operations that can be made to fail with [`MockDevice::fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    InitTuner,
    Close,
    SetBandRange,
    SetDeemphasis,
    SetFrequency,
    GetFrequency,
    SetVolume,
    SignalStrength,
    ApplyTuning,
}

/// Build an [`Error`] of the given kind.
pub fn error_for(kind: ErrorKind) -> Error {
    match kind {
        ErrorKind::InvalidArgument => Error::InvalidArgument("mock".into()),
        ErrorKind::InvalidState => Error::InvalidState {
            command: Command::Create,
            state: RadioState::Null,
        },
        ErrorKind::DeviceNotFound => Error::DeviceNotFound,
        ErrorKind::PermissionDenied => Error::PermissionDenied,
        ErrorKind::DeviceBusy => Error::DeviceBusy,
        ErrorKind::DeviceNotOpened => Error::DeviceNotOpened,
        ErrorKind::TryAgain => Error::TryAgain,
        ErrorKind::Internal => Error::Internal("mock failure".into()),
        ErrorKind::NoFreeSpace => Error::NoFreeSpace("mock".into()),
        ErrorKind::NoAntenna => Error::NoAntenna,
        ErrorKind::Timeout => Error::Timeout("mock"),
    }
}

#[derive(Debug)]
struct State {
    open: bool,
    frequency: u32,
    volume: u32,
    signal: i32,
    open_errors: VecDeque<ErrorKind>,
    seeks: VecDeque<SeekOutcome>,
    close_statuses: VecDeque<CloseStatus>,
    failing: HashMap<DeviceOp, ErrorKind>,
    calls: Vec<DeviceCall>,
}

/// A mock [`DeviceBackend`].
#[derive(Debug)]
pub struct MockDevice {
    default_frequency: u32,
    seek_delay: Duration,
    state: Mutex<State>,
    abort: Notify,
    aborts: AtomicUsize,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A closed device with no scripted behaviour.
    pub fn new() -> Self {
        MockDevice {
            default_frequency: MOCK_DEFAULT_FREQUENCY,
            seek_delay: Duration::ZERO,
            state: Mutex::new(State {
                open: false,
                frequency: MOCK_DEFAULT_FREQUENCY,
                volume: 0,
                signal: -90,
                open_errors: VecDeque::new(),
                seeks: VecDeque::new(),
                close_statuses: VecDeque::new(),
                failing: HashMap::new(),
                calls: Vec::new(),
            }),
            abort: Notify::new(),
            aborts: AtomicUsize::new(0),
        }
    }

    /// Override the frequency reported by `default_frequency`.
    pub fn with_default_frequency(mut self, freq_khz: u32) -> Self {
        self.default_frequency = freq_khz;
        self
    }

    /// Make every landing seek take `delay`. Aborts still cut it short.
    pub fn with_seek_delay(mut self, delay: Duration) -> Self {
        self.seek_delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check(&self, op: DeviceOp) -> Result<MutexGuard<'_, State>> {
        let st = self.lock();
        if !st.open {
            return Err(Error::DeviceNotOpened);
        }
        if let Some(kind) = st.failing.get(&op) {
            return Err(error_for(*kind));
        }
        Ok(st)
    }

    /// Add a seek outcome to the end of the script.
    pub fn queue_seek(&self, outcome: SeekOutcome) {
        self.lock().seeks.push_back(outcome);
    }

    /// Number of scripted seeks not yet consumed.
    pub fn remaining_seeks(&self) -> usize {
        self.lock().seeks.len()
    }

    /// Make the next `open` calls fail, one error per call.
    pub fn queue_open_errors(&self, errors: impl IntoIterator<Item = ErrorKind>) {
        self.lock().open_errors.extend(errors);
    }

    /// Values returned by successive `close_status` polls. Once exhausted
    /// the device reports no status attribute.
    pub fn queue_close_statuses(&self, statuses: impl IntoIterator<Item = CloseStatus>) {
        self.lock().close_statuses.extend(statuses);
    }

    /// Make `op` fail with `kind` until [`MockDevice::clear_failure`].
    pub fn fail(&self, op: DeviceOp, kind: ErrorKind) {
        self.lock().failing.insert(op, kind);
    }

    pub fn clear_failure(&self, op: DeviceOp) {
        self.lock().failing.remove(&op);
    }

    pub fn set_signal(&self, dbm: i32) {
        self.lock().signal = dbm;
    }

    /// Frequency the tuner is on, regardless of open state.
    pub fn frequency(&self) -> u32 {
        self.lock().frequency
    }

    /// Last raw volume written.
    pub fn volume(&self) -> u32 {
        self.lock().volume
    }

    /// Every recorded call, oldest first.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &DeviceCall) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// How many times `abort_seek` was called.
    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    /// Resolves on the next `abort_seek`.
    pub async fn aborted(&self) {
        self.abort.notified().await;
    }

    async fn wait_or_abort(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.abort.notified() => Err(Error::Internal("seek aborted".into())),
        }
    }
}

#[async_trait]
impl DeviceBackend for MockDevice {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn default_frequency(&self) -> u32 {
        self.default_frequency
    }

    async fn open(&self) -> Result<()> {
        let mut st = self.lock();
        st.calls.push(DeviceCall::Open);
        if let Some(kind) = st.open_errors.pop_front() {
            return Err(error_for(kind));
        }
        st.open = true;
        Ok(())
    }

    async fn init_tuner(&self) -> Result<DeviceInfo> {
        let mut st = self.check(DeviceOp::InitTuner)?;
        st.calls.push(DeviceCall::InitTuner);
        Ok(DeviceInfo {
            driver: "mock".into(),
            card: "Mock FM tuner".into(),
            stereo: true,
        })
    }

    async fn close(&self) -> Result<()> {
        let mut st = self.lock();
        st.calls.push(DeviceCall::Close);
        st.open = false;
        match st.failing.get(&DeviceOp::Close) {
            Some(kind) => Err(error_for(*kind)),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    async fn close_status(&self) -> Result<Option<CloseStatus>> {
        Ok(self.lock().close_statuses.pop_front())
    }

    async fn set_band_range(&self, min_khz: u32, max_khz: u32) -> Result<()> {
        let mut st = self.check(DeviceOp::SetBandRange)?;
        st.calls.push(DeviceCall::SetBandRange { min_khz, max_khz });
        Ok(())
    }

    async fn set_deemphasis(&self, deemphasis: Deemphasis) -> Result<()> {
        let mut st = self.check(DeviceOp::SetDeemphasis)?;
        st.calls.push(DeviceCall::SetDeemphasis(deemphasis));
        Ok(())
    }

    async fn set_frequency(&self, freq_khz: u32) -> Result<()> {
        let mut st = self.check(DeviceOp::SetFrequency)?;
        st.calls.push(DeviceCall::SetFrequency(freq_khz));
        st.frequency = freq_khz;
        Ok(())
    }

    async fn get_frequency(&self) -> Result<u32> {
        Ok(self.check(DeviceOp::GetFrequency)?.frequency)
    }

    async fn seek(&self, request: SeekRequest) -> Result<()> {
        let outcome = {
            let mut st = self.lock();
            if !st.open {
                return Err(Error::DeviceNotOpened);
            }
            st.calls.push(DeviceCall::Seek(request));
            st.seeks.pop_front()
        };

        match outcome {
            Some(SeekOutcome::Land(freq)) => {
                self.wait_or_abort(self.seek_delay).await?;
                self.lock().frequency = freq;
                Ok(())
            }
            Some(SeekOutcome::Fail(kind)) => Err(error_for(kind)),
            Some(SeekOutcome::BlockUntilAbort) => {
                self.abort.notified().await;
                Err(Error::Internal("seek aborted".into()))
            }
            None => Err(Error::Internal("no scripted seek outcome".into())),
        }
    }

    async fn abort_seek(&self) -> Result<()> {
        self.lock().calls.push(DeviceCall::AbortSeek);
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.abort.notify_one();
        Ok(())
    }

    async fn signal_strength(&self) -> Result<i32> {
        Ok(self.check(DeviceOp::SignalStrength)?.signal)
    }

    async fn set_volume(&self, raw: u32) -> Result<()> {
        let mut st = self.check(DeviceOp::SetVolume)?;
        st.calls.push(DeviceCall::SetVolume(raw));
        st.volume = raw;
        Ok(())
    }

    async fn get_volume(&self) -> Result<u32> {
        Ok(self.check(DeviceOp::SetVolume)?.volume)
    }

    async fn apply_tuning(&self, params: &TuningParams) -> Result<()> {
        let mut st = self.check(DeviceOp::ApplyTuning)?;
        st.calls.push(DeviceCall::ApplyTuning(*params));
        Ok(())
    }
}

//! Mocks of the non-device collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fmradio_core::error::{Error, Result};
use fmradio_core::focus::{FocusArbiter, FocusBinding, FocusCommand, FocusSignal, InterruptSource};
use fmradio_core::routing::{AudioRouting, GateState, TransportGate};
use fmradio_core::tuning::TuningStore;
use fmradio_core::types::OutputKind;
use tokio::sync::mpsc;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ---------------------------------------------------------------------------
// MockFocusArbiter
// ---------------------------------------------------------------------------

/// A recorded focus-arbiter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusCall {
    Register(FocusBinding),
    Unregister(FocusBinding),
    Acquire(FocusBinding),
    Release { binding: FocusBinding, paused: bool },
}

/// A focus arbiter driven by the test.
///
/// [`MockFocusArbiter::fire`] delivers a signal to the registered session
/// the way the system arbiter would from its own thread.
#[derive(Debug, Default)]
pub struct MockFocusArbiter {
    next_binding: AtomicU64,
    sessions: Mutex<HashMap<FocusBinding, mpsc::UnboundedSender<FocusSignal>>>,
    calls: Mutex<Vec<FocusCall>>,
    deny: AtomicBool,
}

impl MockFocusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse subsequent `acquire` calls.
    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Send a signal to every registered session. Returns how many
    /// sessions received it.
    pub fn fire(&self, command: FocusCommand, source: InterruptSource) -> usize {
        let signal = FocusSignal { command, source };
        lock(&self.sessions)
            .values()
            .filter(|tx| tx.send(signal).is_ok())
            .count()
    }

    pub fn calls(&self) -> Vec<FocusCall> {
        lock(&self.calls).clone()
    }

    pub fn registered(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Whether the last acquire/release left the focus held.
    pub fn holds_focus(&self) -> bool {
        lock(&self.calls)
            .iter()
            .rev()
            .find_map(|c| match c {
                FocusCall::Acquire(_) => Some(true),
                FocusCall::Release { .. } => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl FocusArbiter for MockFocusArbiter {
    async fn register(&self, signals: mpsc::UnboundedSender<FocusSignal>) -> Result<FocusBinding> {
        let binding = FocusBinding(self.next_binding.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.sessions).insert(binding, signals);
        lock(&self.calls).push(FocusCall::Register(binding));
        Ok(binding)
    }

    async fn unregister(&self, binding: FocusBinding) -> Result<()> {
        lock(&self.sessions).remove(&binding);
        lock(&self.calls).push(FocusCall::Unregister(binding));
        Ok(())
    }

    async fn acquire(&self, binding: FocusBinding) -> Result<()> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(Error::Internal("focus denied".into()));
        }
        lock(&self.calls).push(FocusCall::Acquire(binding));
        Ok(())
    }

    async fn release(&self, binding: FocusBinding, paused: bool) -> Result<()> {
        lock(&self.calls).push(FocusCall::Release { binding, paused });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockAudioRouting
// ---------------------------------------------------------------------------

/// Mixer and jack-detection mock. The jack starts connected.
#[derive(Debug)]
pub struct MockAudioRouting {
    muted: AtomicBool,
    jack: AtomicBool,
    mute_log: Mutex<Vec<bool>>,
}

impl Default for MockAudioRouting {
    fn default() -> Self {
        MockAudioRouting {
            muted: AtomicBool::new(false),
            jack: AtomicBool::new(true),
            mute_log: Mutex::new(Vec::new()),
        }
    }
}

impl MockAudioRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_jack_connected(&self, connected: bool) {
        self.jack.store(connected, Ordering::SeqCst);
    }

    /// Current mixer mute.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Every `set_mute` argument, oldest first.
    pub fn mute_log(&self) -> Vec<bool> {
        lock(&self.mute_log).clone()
    }
}

#[async_trait]
impl AudioRouting for MockAudioRouting {
    async fn set_mute(&self, muted: bool) -> Result<()> {
        self.muted.store(muted, Ordering::SeqCst);
        lock(&self.mute_log).push(muted);
        Ok(())
    }

    async fn is_output_connected(&self, kind: OutputKind) -> Result<bool> {
        Ok(match kind {
            OutputKind::AudioJack => self.jack.load(Ordering::SeqCst),
            OutputKind::Speaker => true,
        })
    }
}

// ---------------------------------------------------------------------------
// MockTransportGate
// ---------------------------------------------------------------------------

/// A recorded transport-gate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateCall {
    Enable,
    Disable,
}

/// A transport gate that settles after a configurable number of polls.
#[derive(Debug)]
pub struct MockTransportGate {
    state: Mutex<GateState>,
    target: Mutex<Option<GateState>>,
    settle_polls: AtomicU32,
    remaining: AtomicU32,
    stuck: AtomicBool,
    calls: Mutex<Vec<GateCall>>,
}

impl Default for MockTransportGate {
    fn default() -> Self {
        MockTransportGate {
            state: Mutex::new(GateState::Inactive),
            target: Mutex::new(None),
            settle_polls: AtomicU32::new(0),
            remaining: AtomicU32::new(0),
            stuck: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockTransportGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the old state for `polls` polls after each enable/disable.
    pub fn with_settle_polls(self, polls: u32) -> Self {
        self.settle_polls.store(polls, Ordering::SeqCst);
        self
    }

    /// Never leave the current state.
    pub fn set_stuck(&self, stuck: bool) {
        self.stuck.store(stuck, Ordering::SeqCst);
    }

    pub fn current(&self) -> GateState {
        *lock(&self.state)
    }

    pub fn calls(&self) -> Vec<GateCall> {
        lock(&self.calls).clone()
    }

    fn request(&self, target: GateState, call: GateCall) {
        lock(&self.calls).push(call);
        *lock(&self.target) = Some(target);
        self.remaining
            .store(self.settle_polls.load(Ordering::SeqCst), Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportGate for MockTransportGate {
    async fn enable(&self) -> Result<()> {
        self.request(GateState::Active, GateCall::Enable);
        Ok(())
    }

    async fn disable(&self) -> Result<()> {
        self.request(GateState::Inactive, GateCall::Disable);
        Ok(())
    }

    async fn state(&self) -> Result<GateState> {
        if !self.stuck.load(Ordering::SeqCst) {
            let remaining = self.remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.remaining.store(remaining - 1, Ordering::SeqCst);
            } else if let Some(target) = lock(&self.target).take() {
                *lock(&self.state) = target;
            }
        }
        Ok(self.current())
    }
}

// ---------------------------------------------------------------------------
// MemoryTuningStore
// ---------------------------------------------------------------------------

/// A [`TuningStore`] filled by the test.
#[derive(Debug, Clone, Default)]
pub struct MemoryTuningStore {
    ints: HashMap<String, i64>,
    lists: HashMap<String, Vec<i64>>,
}

impl MemoryTuningStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.ints.insert(key.to_string(), value);
        self
    }

    pub fn with_list(mut self, key: &str, values: Vec<i64>) -> Self {
        self.lists.insert(key.to_string(), values);
        self
    }
}

impl TuningStore for MemoryTuningStore {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.ints.get(key).copied()
    }

    fn get_int_list(&self, key: &str) -> Option<Vec<i64>> {
        self.lists.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmradio_core::tuning::keys;

    #[tokio::test]
    async fn fire_reaches_registered_sessions() {
        let arbiter = MockFocusArbiter::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let binding = arbiter.register(tx).await.unwrap();

        assert_eq!(arbiter.fire(FocusCommand::Stop, InterruptSource::CallStart), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            FocusSignal {
                command: FocusCommand::Stop,
                source: InterruptSource::CallStart,
            }
        );

        arbiter.unregister(binding).await.unwrap();
        assert_eq!(arbiter.fire(FocusCommand::Stop, InterruptSource::CallStart), 0);
    }

    #[tokio::test]
    async fn focus_held_tracks_last_call() {
        let arbiter = MockFocusArbiter::new();
        let b = FocusBinding(1);
        assert!(!arbiter.holds_focus());
        arbiter.acquire(b).await.unwrap();
        assert!(arbiter.holds_focus());
        arbiter.release(b, true).await.unwrap();
        assert!(!arbiter.holds_focus());

        arbiter.set_deny(true);
        assert!(arbiter.acquire(b).await.is_err());
    }

    #[tokio::test]
    async fn routing_logs_mutes() {
        let routing = MockAudioRouting::new();
        routing.set_mute(true).await.unwrap();
        routing.set_mute(false).await.unwrap();
        assert_eq!(routing.mute_log(), vec![true, false]);
        assert!(!routing.is_muted());

        routing.set_jack_connected(false);
        assert!(!routing.is_output_connected(OutputKind::AudioJack).await.unwrap());
    }

    #[tokio::test]
    async fn gate_settles_after_polls() {
        let gate = MockTransportGate::new().with_settle_polls(2);
        gate.enable().await.unwrap();
        assert_eq!(gate.state().await.unwrap(), GateState::Inactive);
        assert_eq!(gate.state().await.unwrap(), GateState::Inactive);
        assert_eq!(gate.state().await.unwrap(), GateState::Active);
        assert!(gate.required());
    }

    #[tokio::test]
    async fn stuck_gate_never_settles() {
        let gate = MockTransportGate::new();
        gate.set_stuck(true);
        gate.enable().await.unwrap();
        for _ in 0..5 {
            assert_eq!(gate.state().await.unwrap(), GateState::Inactive);
        }
    }

    #[test]
    fn memory_store_lookup() {
        let store = MemoryTuningStore::new()
            .with_int(keys::ENABLE, 1)
            .with_list(keys::VOLUME_TABLE, vec![1, 2]);
        assert_eq!(store.get_int(keys::ENABLE), Some(1));
        assert_eq!(store.get_int(keys::NOISE_POWER), None);
        assert_eq!(store.get_int_list(keys::VOLUME_TABLE), Some(vec![1, 2]));
    }
}

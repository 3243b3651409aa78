//! The radio handle.
//!
//! [`Radio`] is the single owner of a tuner session. It gates every call
//! through the command-admission table, drives the device through its
//! open/close lifecycle, and owns the background tasks: the deferred-event
//! worker, the focus listener, and at most one seek, scan, or volume-fade
//! worker at a time.
//!
//! # Locks
//!
//! - `lifecycle`: device open/close and the start/stop/pause sequences.
//! - `control`: command admission, the state machine, and the region.
//! - `volume`: device volume writes and device close.
//! - `seek_gate`: held around each blocking device seek; probed by
//!   `cancel_and_join` to decide whether to abort the device call.
//!
//! Workers never take `lifecycle` while a caller that holds it waits for
//! them, and nobody joins a worker while holding `control`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use fmradio_core::device::DeviceBackend;
use fmradio_core::error::{Error, Result};
use fmradio_core::events::RadioMessage;
use fmradio_core::focus::{FocusArbiter, FocusBinding};
use fmradio_core::region::{Region, RegionSetting};
use fmradio_core::routing::{AudioRouting, TransportGate};
use fmradio_core::state::{Admission, NotifyMode, StateMachine};
use fmradio_core::tuning::{MAX_VOLUME_LEVEL, TuningParams, TuningStore, VolumeTable};
use fmradio_core::types::{Command, OutputKind, RadioState, SeekDirection};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RadioConfig;
use crate::event_queue::{self, DeferredEvent, EventQueue};
use crate::focus;
use crate::scan::ScanSession;
use crate::sink::{MessageCallback, MessageSink};
use crate::worker::Worker;

/// Bottom of the 87.5-108 MHz band, where the boundary snap applies.
pub(crate) const SNAP_BAND_MIN_KHZ: u32 = 87_500;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State guarded by the command/region lock.
pub(crate) struct Control {
    pub(crate) machine: StateMachine,
    pub(crate) region: RegionSetting,
    /// Whether a region has been applied since creation.
    pub(crate) region_configured: bool,
    pub(crate) tuning: TuningParams,
}

/// State guarded by the volume lock.
pub(crate) struct VolumeState {
    pub(crate) level: u8,
    pub(crate) table: VolumeTable,
}

/// The external services a handle is wired to.
pub(crate) struct Collaborators {
    pub(crate) backend: Arc<dyn DeviceBackend>,
    pub(crate) focus: Arc<dyn FocusArbiter>,
    pub(crate) routing: Arc<dyn AudioRouting>,
    pub(crate) gate: Arc<dyn TransportGate>,
    pub(crate) store: Arc<dyn TuningStore>,
}

/// Everything shared between the handle and its background tasks.
pub(crate) struct Inner {
    pub(crate) config: RadioConfig,
    pub(crate) backend: Arc<dyn DeviceBackend>,
    pub(crate) focus: Arc<dyn FocusArbiter>,
    pub(crate) routing: Arc<dyn AudioRouting>,
    pub(crate) gate: Arc<dyn TransportGate>,
    pub(crate) store: Arc<dyn TuningStore>,
    pub(crate) sink: MessageSink,
    pub(crate) events: EventQueue,
    pub(crate) binding: FocusBinding,

    pub(crate) lifecycle: Mutex<()>,
    pub(crate) control: Mutex<Control>,
    pub(crate) volume: Mutex<VolumeState>,
    pub(crate) seek_gate: Mutex<()>,

    pub(crate) seek_worker: Mutex<Option<Worker>>,
    pub(crate) scan: Mutex<Option<ScanSession>>,
    pub(crate) fade: Mutex<Option<Worker>>,

    /// Cached frequency in kHz. Authoritative for `get_frequency`.
    pub(crate) frequency: AtomicU32,
    /// Application mute. Internal mutes do not touch it.
    pub(crate) muted: AtomicBool,
    pub(crate) seeking: AtomicBool,
    /// The running seek muted the output and must unmute it.
    pub(crate) seek_unmute: AtomicBool,
    /// Last frequency a seek reported, 0 before the first.
    pub(crate) prev_seek_frequency: AtomicU32,
    pub(crate) gate_ready: AtomicBool,
}

impl Inner {
    /// Admit `command`. `Ok(false)` means it is a no-op in this state.
    pub(crate) async fn admit(&self, command: Command) -> Result<bool> {
        let mut control = self.control.lock().await;
        Ok(control.machine.check(command)? == Admission::Proceed)
    }

    /// Move the state machine and post whatever the move produces.
    pub(crate) async fn transition(&self, state: RadioState, mode: NotifyMode) {
        let msg = self.control.lock().await.machine.set_state(state, mode);
        if let Some(msg) = msg {
            self.sink.post(msg);
        }
    }

    /// Record the state an in-progress sequence is heading for. Cleared
    /// by the next transition.
    pub(crate) async fn set_pending(&self, state: Option<RadioState>) {
        self.control.lock().await.machine.set_pending(state);
    }

    pub(crate) async fn state(&self) -> RadioState {
        self.control.lock().await.machine.current()
    }

    pub(crate) async fn region(&self) -> RegionSetting {
        self.control.lock().await.region
    }

    pub(crate) fn cached_frequency(&self) -> u32 {
        self.frequency.load(Ordering::SeqCst)
    }

    /// Reload tuning parameters and the volume table from the store.
    pub(crate) async fn reload_tuning(&self) -> TuningParams {
        let params = TuningParams::load(self.store.as_ref());
        let table = VolumeTable::load(self.store.as_ref());
        self.control.lock().await.tuning = params;
        self.volume.lock().await.table = table;
        params
    }

    // -- region ------------------------------------------------------------

    /// Make `region` current. The device is only touched when it is open;
    /// a closed device picks the region up on the next open.
    async fn apply_region(&self, control: &mut Control, region: Region) -> Result<()> {
        let setting = region.setting();
        control.region = setting;
        control.region_configured = true;
        debug!(
            %region,
            deemphasis = %setting.deemphasis,
            band_min = setting.band_min_khz,
            band_max = setting.band_max_khz,
            "region applied"
        );
        if self.backend.is_open() {
            self.backend.set_deemphasis(setting.deemphasis).await?;
            self.backend
                .set_band_range(setting.band_min_khz, setting.band_max_khz)
                .await?;
            let freq = self.cached_frequency();
            if !setting.contains(freq) {
                debug!(
                    freq_khz = freq,
                    band_min = setting.band_min_khz,
                    "frequency outside new band, retuning"
                );
                self.backend.set_frequency(setting.band_min_khz).await?;
                self.frequency.store(setting.band_min_khz, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    pub(crate) async fn set_region(&self, region: Region) -> Result<()> {
        let mut control = self.control.lock().await;
        control.machine.check(Command::SetRegion)?;
        self.apply_region(&mut control, region).await
    }

    pub(crate) async fn get_region(&self) -> Result<Region> {
        let mut control = self.control.lock().await;
        control.machine.check(Command::GetRegion)?;
        Ok(control.region.region)
    }

    // -- realize / unrealize -------------------------------------------------

    pub(crate) async fn realize(&self) -> Result<()> {
        let msg = {
            let mut control = self.control.lock().await;
            if control.machine.check(Command::Realize)? == Admission::NoOp {
                return Ok(());
            }
            if !control.region_configured {
                let region = self.config.default_region;
                self.apply_region(&mut control, region).await?;
            }
            control.machine.set_state(RadioState::Ready, NotifyMode::Post)
        };
        self.reload_tuning().await;
        if let Some(msg) = msg {
            self.sink.post(msg);
        }
        info!("radio realized");
        Ok(())
    }

    pub(crate) async fn unrealize(&self) -> Result<()> {
        if !self.admit(Command::Unrealize).await? {
            return Ok(());
        }
        match self.state().await {
            RadioState::Scanning => {
                if let Err(e) = self.stop_scan().await {
                    warn!(?e, "stopping scan during unrealize failed");
                }
            }
            RadioState::Playing => {
                if let Err(e) = self.stop().await {
                    warn!(?e, "stopping playback during unrealize failed");
                }
            }
            _ => {}
        }
        self.seek_cancel().await;
        self.cancel_fade().await;

        {
            let _life = self.lifecycle.lock().await;
            self.close_device().await;
            self.unprepare_device().await;
        }
        self.transition(RadioState::Null, NotifyMode::Post).await;
        info!("radio unrealized");
        Ok(())
    }

    // -- start / stop / pause ------------------------------------------------

    pub(crate) async fn start(&self) -> Result<()> {
        let _life = self.lifecycle.lock().await;
        if !self.admit(Command::Start).await? {
            return Ok(());
        }
        self.set_pending(Some(RadioState::Playing)).await;
        match self.start_locked().await {
            Ok(freq) => {
                info!(freq_khz = freq, backend = self.backend.name(), "radio playing");
                Ok(())
            }
            Err(e) => {
                warn!(?e, "start failed, rolling back");
                self.set_pending(None).await;
                if let Err(e) = self.focus.release(self.binding, false).await {
                    debug!(?e, "focus release during rollback failed");
                }
                self.close_device().await;
                self.unprepare_device().await;
                Err(e)
            }
        }
    }

    async fn start_locked(&self) -> Result<u32> {
        self.prepare_device().await?;
        let tuning = self.reload_tuning().await;
        self.open_device().await?;
        self.push_tuning(&tuning).await;
        self.reapply_volume().await;
        let freq = self.retune_cached().await?;

        tokio::time::sleep(self.config.settle_after_start()).await;
        if self.config.require_antenna
            && !self
                .routing
                .is_output_connected(OutputKind::AudioJack)
                .await?
        {
            warn!("no antenna connected");
            return Err(Error::NoAntenna);
        }

        self.focus.acquire(self.binding).await?;
        self.routing.set_mute(self.muted.load(Ordering::SeqCst)).await?;
        self.transition(RadioState::Playing, NotifyMode::Post).await;
        Ok(freq)
    }

    /// Tune the device to the cached frequency, first pulling the cache
    /// into the current band if a region change left it outside.
    async fn retune_cached(&self) -> Result<u32> {
        let control = self.control.lock().await;
        let region = control.region;
        let mut freq = self.cached_frequency();
        if !region.contains(freq) {
            debug!(
                freq_khz = freq,
                band_min = region.band_min_khz,
                "cached frequency outside band, clamping"
            );
            freq = region.band_min_khz;
        }
        self.backend.set_frequency(freq).await?;
        self.frequency.store(freq, Ordering::SeqCst);
        Ok(freq)
    }

    pub(crate) async fn stop(&self) -> Result<()> {
        self.stop_with(Command::Stop, NotifyMode::Post, true).await
    }

    pub(crate) async fn pause(&self) -> Result<()> {
        self.stop_with(Command::Pause, NotifyMode::Post, true).await
    }

    /// Shared body of stop and pause.
    ///
    /// `close` is false on the focus path, which leaves the device open
    /// and queues a deferred teardown instead.
    pub(crate) async fn stop_with(&self, command: Command, mode: NotifyMode, close: bool) -> Result<()> {
        let _life = self.lifecycle.lock().await;
        if !self.admit(command).await? {
            return Ok(());
        }
        let paused = command == Command::Pause;

        self.seek_unmute.store(false, Ordering::SeqCst);
        self.seek_cancel().await;
        self.cancel_fade().await;
        if let Err(e) = self.routing.set_mute(true).await {
            warn!(?e, "mute on stop failed");
        }

        self.transition(RadioState::Ready, mode).await;

        if let Err(e) = self.focus.release(self.binding, paused).await {
            warn!(?e, "focus release failed");
        }
        if close {
            self.close_device().await;
        }
        info!(%command, "radio stopped");
        Ok(())
    }

    // -- frequency -----------------------------------------------------------

    pub(crate) async fn set_frequency(&self, freq: u32) -> Result<()> {
        let mut control = self.control.lock().await;
        control.machine.check(Command::SetFrequency)?;
        let region = control.region;
        check_in_band(&region, freq)?;

        if !self.backend.is_open() {
            let cached = if self.config.boundary_snap
                && freq == region.band_min_khz
                && region.band_min_khz == SNAP_BAND_MIN_KHZ
            {
                let snapped = self.backend.default_frequency();
                debug!(freq_khz = freq, snapped, "band minimum requested on closed device");
                snapped
            } else {
                freq
            };
            self.frequency.store(cached, Ordering::SeqCst);
            return Ok(());
        }

        self.backend.set_frequency(freq).await?;
        self.frequency.store(freq, Ordering::SeqCst);
        debug!(freq_khz = freq, "tuned");
        Ok(())
    }

    pub(crate) async fn set_frequency_async(&self, freq: u32) -> Result<()> {
        {
            let mut control = self.control.lock().await;
            control.machine.check(Command::SetFrequency)?;
            check_in_band(&control.region, freq)?;
        }
        self.events.push(DeferredEvent::SetFrequency(freq))
    }

    /// Deferred half of `set_frequency_async`, run by the event worker.
    pub(crate) async fn run_deferred_frequency(&self, freq: u32) {
        let result = self
            .set_frequency(freq)
            .await
            .map(|()| self.cached_frequency())
            .map_err(|e| {
                warn!(freq_khz = freq, ?e, "deferred frequency change failed");
                e.kind()
            });
        self.sink.post(RadioMessage::FrequencySet { result });
    }

    pub(crate) async fn get_frequency(&self) -> Result<u32> {
        self.admit(Command::GetFrequency).await?;
        Ok(self.cached_frequency())
    }

    // -- mute ----------------------------------------------------------------

    pub(crate) async fn set_mute(&self, muted: bool) -> Result<()> {
        let command = if muted { Command::Mute } else { Command::Unmute };
        self.admit(command).await?;
        self.routing.set_mute(muted).await?;
        self.muted.store(muted, Ordering::SeqCst);
        debug!(muted, "mute changed");
        Ok(())
    }

    /// Undo the internal mute of seek or scan unless the application muted.
    pub(crate) async fn restore_audio(&self) {
        if !self.muted.load(Ordering::SeqCst) {
            if let Err(e) = self.routing.set_mute(false).await {
                warn!(?e, "unmute failed");
            }
        }
        self.reapply_volume().await;
    }
}

fn check_in_band(region: &RegionSetting, freq: u32) -> Result<()> {
    if region.contains(freq) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "frequency {freq} kHz outside {}..={} kHz",
            region.band_min_khz, region.band_max_khz
        )))
    }
}

// ---------------------------------------------------------------------------
// Radio
// ---------------------------------------------------------------------------

struct BackgroundTasks {
    event_task: JoinHandle<()>,
    focus_cancel: CancellationToken,
    focus_task: JoinHandle<()>,
}

/// An FM radio session.
///
/// Created with [`RadioBuilder`](crate::RadioBuilder). Call
/// [`Radio::destroy`] to release it; dropping a handle without destroying
/// it stops the background tasks but leaves the device as it was.
pub struct Radio {
    inner: Arc<Inner>,
    tasks: Option<BackgroundTasks>,
}

impl std::fmt::Debug for Radio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Radio")
            .field("backend", &self.inner.backend.name())
            .field("binding", &self.inner.binding)
            .finish_non_exhaustive()
    }
}

impl Radio {
    /// Register with the focus arbiter, start the background tasks, and
    /// enter NULL.
    pub(crate) async fn create(
        config: RadioConfig,
        parts: Collaborators,
        callback: Option<MessageCallback>,
    ) -> Result<Radio> {
        let mut machine = StateMachine::new();
        machine.check(Command::Create)?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let binding = parts.focus.register(signal_tx).await?;
        let (events, lanes) = event_queue::channel();

        let region = config.default_region.setting();
        let inner = Arc::new(Inner {
            frequency: AtomicU32::new(parts.backend.default_frequency()),
            config,
            backend: parts.backend,
            focus: parts.focus,
            routing: parts.routing,
            gate: parts.gate,
            store: parts.store,
            sink: MessageSink::new(callback),
            events,
            binding,
            lifecycle: Mutex::new(()),
            control: Mutex::new(Control {
                machine,
                region,
                region_configured: false,
                tuning: TuningParams::default(),
            }),
            volume: Mutex::new(VolumeState {
                level: MAX_VOLUME_LEVEL,
                table: VolumeTable::default(),
            }),
            seek_gate: Mutex::new(()),
            seek_worker: Mutex::new(None),
            scan: Mutex::new(None),
            fade: Mutex::new(None),
            muted: AtomicBool::new(false),
            seeking: AtomicBool::new(false),
            seek_unmute: AtomicBool::new(false),
            prev_seek_frequency: AtomicU32::new(0),
            gate_ready: AtomicBool::new(false),
        });

        let event_task = event_queue::spawn_event_worker(inner.clone(), lanes);
        let focus_cancel = CancellationToken::new();
        let focus_task = tokio::spawn(focus::listen(
            inner.clone(),
            signal_rx,
            focus_cancel.clone(),
        ));

        inner.transition(RadioState::Null, NotifyMode::Post).await;
        info!(
            backend = inner.backend.name(),
            binding = binding.0,
            "radio created"
        );

        Ok(Radio {
            inner,
            tasks: Some(BackgroundTasks {
                event_task,
                focus_cancel,
                focus_task,
            }),
        })
    }

    /// Tear the session down: unrealize, leave the focus arbiter, and wait
    /// for the event worker to exit. Pending deferred events are dropped.
    pub async fn destroy(mut self) -> Result<()> {
        let inner = self.inner.clone();
        inner.admit(Command::Destroy).await?;

        if let Err(e) = inner.unrealize().await {
            warn!(?e, "unrealize during destroy failed");
        }
        inner.cancel_fade().await;
        if let Err(e) = inner.focus.unregister(inner.binding).await {
            warn!(?e, "focus unregister failed");
        }

        if let Some(tasks) = self.tasks.take() {
            tasks.focus_cancel.cancel();
            if let Err(e) = tasks.focus_task.await {
                warn!(?e, "focus listener ended abnormally");
            }
            inner.events.push(DeferredEvent::Destroy)?;
            tasks
                .event_task
                .await
                .map_err(|e| Error::Internal(format!("event queue worker failed: {e}")))?;
        }
        info!("radio destroyed");
        Ok(())
    }

    /// Apply the default region unless one was set, and enter READY.
    pub async fn realize(&self) -> Result<()> {
        self.inner.realize().await
    }

    /// Stop any scan or playback, close the device, and return to NULL.
    pub async fn unrealize(&self) -> Result<()> {
        self.inner.unrealize().await
    }

    /// Open the device, tune the cached frequency, take the audio focus,
    /// and enter PLAYING.
    pub async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    /// Cancel any seek, mute, release the focus, close the device, and
    /// enter READY.
    pub async fn stop(&self) -> Result<()> {
        self.inner.stop().await
    }

    /// Like [`Radio::stop`], but the focus session is released as paused
    /// so the arbiter may offer it back.
    pub async fn pause(&self) -> Result<()> {
        self.inner.pause().await
    }

    /// Tune to `freq_khz`, or cache it while the device is closed.
    pub async fn set_frequency(&self, freq_khz: u32) -> Result<()> {
        self.inner.set_frequency(freq_khz).await
    }

    /// Range-check `freq_khz` now and tune it from the event worker. The
    /// outcome arrives as [`RadioMessage::FrequencySet`].
    pub async fn set_frequency_async(&self, freq_khz: u32) -> Result<()> {
        self.inner.set_frequency_async(freq_khz).await
    }

    /// The cached frequency. Never touches the device.
    pub async fn get_frequency(&self) -> Result<u32> {
        self.inner.get_frequency().await
    }

    /// Search for the next station. Returns once the search has started;
    /// the result arrives as [`RadioMessage::SeekFinish`].
    pub async fn seek(&self, direction: SeekDirection) -> Result<()> {
        self.inner.seek(direction).await
    }

    /// Stop an outstanding seek and wait for its worker to exit.
    pub async fn seek_cancel(&self) -> Result<()> {
        self.inner.seek_cancel().await;
        Ok(())
    }

    /// Sweep the band from the bottom, reporting each station as
    /// [`RadioMessage::ScanInfo`].
    pub async fn start_scan(&self) -> Result<()> {
        self.inner.start_scan().await
    }

    /// Stop a running scan and wait for its worker to exit.
    pub async fn stop_scan(&self) -> Result<()> {
        self.inner.stop_scan().await
    }

    pub async fn set_region(&self, region: Region) -> Result<()> {
        self.inner.set_region(region).await
    }

    pub async fn get_region(&self) -> Result<Region> {
        self.inner.get_region().await
    }

    /// `(band_min, band_max)` of the current region in kHz.
    pub async fn get_region_frequency_range(&self) -> (u32, u32) {
        self.inner.region().await.range()
    }

    pub async fn get_channel_spacing(&self) -> u32 {
        self.inner.region().await.channel_spacing_khz
    }

    /// Received signal strength in dBm.
    pub async fn get_signal_strength(&self) -> Result<i32> {
        self.inner.backend.signal_strength().await
    }

    pub async fn set_mute(&self, muted: bool) -> Result<()> {
        self.inner.set_mute(muted).await
    }

    pub async fn get_mute(&self) -> bool {
        self.inner.muted.load(Ordering::SeqCst)
    }

    /// Set the output volume, `0..=15`.
    pub async fn set_volume(&self, level: u8) -> Result<()> {
        self.inner.set_volume(level).await
    }

    pub async fn get_volume(&self) -> u8 {
        self.inner.get_volume().await
    }

    /// Step the volume toward `target` one level per `fade_step_ms`.
    pub async fn fade_volume(&self, target: u8) -> Result<()> {
        self.inner.fade_volume(target).await
    }

    pub async fn get_state(&self) -> RadioState {
        self.inner.state().await
    }

    pub fn is_seeking(&self) -> bool {
        self.inner.seeking.load(Ordering::SeqCst)
    }

    /// Whether the headset antenna is plugged in.
    pub async fn get_device_available(&self) -> Result<bool> {
        self.inner
            .routing
            .is_output_connected(OutputKind::AudioJack)
            .await
    }

    /// Install the message callback, replacing any previous one.
    pub fn set_message_callback<F>(&self, callback: F)
    where
        F: Fn(&RadioMessage) + Send + Sync + 'static,
    {
        self.inner.sink.set_callback(Some(Arc::new(callback)));
    }

    pub fn clear_message_callback(&self) {
        self.inner.sink.set_callback(None);
    }

    /// A receiver of every message posted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RadioMessage> {
        self.inner.sink.subscribe()
    }
}

impl Drop for Radio {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.take() {
            debug!("radio dropped without destroy, stopping background tasks");
            tasks.focus_cancel.cancel();
            let _ = self.inner.events.push(DeferredEvent::Destroy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use fmradio_core::device::CloseStatus;
    use fmradio_core::error::ErrorKind;
    use fmradio_core::focus::{FocusCommand, InterruptSource};
    use fmradio_core::region::Deemphasis;
    use fmradio_core::routing::GateState;
    use fmradio_core::tuning::keys;
    use fmradio_test_harness::{
        DeviceCall, DeviceOp, FocusCall, GateCall, MemoryTuningStore, MessageRecorder,
        MockAudioRouting, MockDevice, MockFocusArbiter, MockTransportGate,
    };

    use crate::builder::RadioBuilder;
    use crate::test_util::fast_config;

    const WAIT: Duration = Duration::from_secs(2);

    struct Fixture {
        radio: Radio,
        device: Arc<MockDevice>,
        focus: Arc<MockFocusArbiter>,
        routing: Arc<MockAudioRouting>,
        messages: MessageRecorder,
    }

    async fn fixture_with(device: MockDevice, config: RadioConfig) -> Fixture {
        let device = Arc::new(device);
        let focus = Arc::new(MockFocusArbiter::new());
        let routing = Arc::new(MockAudioRouting::new());
        let messages = MessageRecorder::new();
        let radio = RadioBuilder::with_backend(device.clone())
            .config(config)
            .focus_arbiter(focus.clone())
            .audio_routing(routing.clone())
            .message_callback(messages.sink())
            .create()
            .await
            .unwrap();
        Fixture {
            radio,
            device,
            focus,
            routing,
            messages,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(MockDevice::new(), fast_config()).await
    }

    fn changed(previous: RadioState, current: RadioState) -> RadioMessage {
        RadioMessage::StateChanged { previous, current }
    }

    #[tokio::test]
    async fn create_enters_null() {
        let f = fixture().await;
        assert_eq!(f.radio.get_state().await, RadioState::Null);
        assert_eq!(
            f.messages.messages(),
            vec![changed(RadioState::Uninitialized, RadioState::Null)]
        );
        assert_eq!(f.focus.registered(), 1);
        assert_eq!(f.radio.get_frequency().await.unwrap(), 99_900);
    }

    #[tokio::test]
    async fn europe_round_trip_with_closed_device() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        assert_eq!(f.radio.get_region().await.unwrap(), Region::Europe);
        f.radio.set_frequency(99_900).await.unwrap();
        assert_eq!(f.radio.get_frequency().await.unwrap(), 99_900);
        f.radio.set_frequency(91_900).await.unwrap();
        assert_eq!(f.radio.get_frequency().await.unwrap(), 91_900);
        assert!(f.device.calls().is_empty());
    }

    #[tokio::test]
    async fn band_minimum_snaps_to_backend_default() {
        let f = fixture_with(
            MockDevice::new().with_default_frequency(107_700),
            fast_config(),
        )
        .await;
        f.radio.set_frequency(91_900).await.unwrap();
        f.radio.set_frequency(87_500).await.unwrap();
        assert_eq!(f.radio.get_frequency().await.unwrap(), 107_700);
    }

    #[tokio::test]
    async fn boundary_snap_can_be_disabled() {
        let config = RadioConfig {
            boundary_snap: false,
            ..fast_config()
        };
        let f = fixture_with(MockDevice::new(), config).await;
        f.radio.set_frequency(87_500).await.unwrap();
        assert_eq!(f.radio.get_frequency().await.unwrap(), 87_500);
    }

    #[tokio::test]
    async fn boundary_snap_does_not_apply_to_japan() {
        let f = fixture().await;
        f.radio.set_region(Region::Japan).await.unwrap();
        f.radio.set_frequency(76_100).await.unwrap();
        assert_eq!(f.radio.get_frequency().await.unwrap(), 76_100);
    }

    #[tokio::test]
    async fn out_of_band_rejected_and_cache_kept() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.set_frequency(99_900).await.unwrap();

        for freq in [87_499, 108_001] {
            let err = f.radio.set_frequency(freq).await.unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{err:?}");
            let err = f.radio.set_frequency_async(freq).await.unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{err:?}");
        }
        assert_eq!(f.radio.get_frequency().await.unwrap(), 99_900);
    }

    #[tokio::test]
    async fn failed_device_write_keeps_cache() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.device.fail(DeviceOp::SetFrequency, ErrorKind::Internal);
        assert!(f.radio.set_frequency(91_900).await.is_err());
        assert_eq!(f.radio.get_frequency().await.unwrap(), 99_900);
    }

    #[tokio::test]
    async fn second_realize_is_noop() {
        let f = fixture().await;
        f.radio.set_region(Region::Usa).await.unwrap();
        f.radio.realize().await.unwrap();
        let before = f.messages.messages().len();

        f.radio.realize().await.unwrap();
        assert_eq!(f.messages.messages().len(), before);
        assert_eq!(f.radio.get_region().await.unwrap(), Region::Usa);
        assert_eq!(f.radio.get_channel_spacing().await, 50);
    }

    #[tokio::test]
    async fn realize_applies_configured_default_region() {
        let config = RadioConfig {
            default_region: Region::Japan,
            ..fast_config()
        };
        let f = fixture_with(MockDevice::new(), config).await;
        f.radio.realize().await.unwrap();
        assert_eq!(f.radio.get_region().await.unwrap(), Region::Japan);
        assert_eq!(f.radio.get_region_frequency_range().await, (76_100, 89_900));
    }

    #[tokio::test]
    async fn get_region_invalid_in_null() {
        let f = fixture().await;
        let err = f.radio.get_region().await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                command: Command::GetRegion,
                state: RadioState::Null
            }
        ));
    }

    #[tokio::test]
    async fn start_before_realize_is_invalid() {
        let f = fixture().await;
        assert!(matches!(
            f.radio.start().await,
            Err(Error::InvalidState { .. })
        ));
        assert!(f.device.calls().is_empty());
    }

    #[tokio::test]
    async fn start_opens_configures_and_plays() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.set_frequency(91_900).await.unwrap();
        f.radio.start().await.unwrap();

        assert_eq!(f.radio.get_state().await, RadioState::Playing);
        assert!(f.device.is_open());
        assert_eq!(f.device.frequency(), 91_900);
        assert!(f.focus.holds_focus());
        assert!(!f.routing.is_muted());

        let calls = f.device.calls();
        assert_eq!(calls[0], DeviceCall::Open);
        assert_eq!(calls[1], DeviceCall::InitTuner);
        assert!(calls.contains(&DeviceCall::SetBandRange {
            min_khz: 87_500,
            max_khz: 108_000
        }));
        assert!(calls.contains(&DeviceCall::SetDeemphasis(Deemphasis::Micros50)));
        assert!(calls.contains(&DeviceCall::SetVolume(15)));
        assert_eq!(
            f.messages.messages().last(),
            Some(&changed(RadioState::Ready, RadioState::Playing))
        );
    }

    #[tokio::test]
    async fn start_twice_is_noop() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        let opens = f.device.count(&DeviceCall::Open);
        f.radio.start().await.unwrap();
        assert_eq!(f.device.count(&DeviceCall::Open), opens);
    }

    #[tokio::test]
    async fn start_retries_transient_open_errors() {
        let f = fixture().await;
        f.device
            .queue_open_errors([ErrorKind::TryAgain, ErrorKind::TryAgain]);
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        assert_eq!(f.device.count(&DeviceCall::Open), 3);
    }

    #[tokio::test]
    async fn start_exhausts_open_budget() {
        let f = fixture().await;
        f.device.queue_open_errors([ErrorKind::TryAgain; 4]);
        f.radio.realize().await.unwrap();
        let err = f.radio.start().await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotOpened), "{err:?}");
        assert_eq!(f.device.count(&DeviceCall::Open), 4);
        assert_eq!(f.radio.get_state().await, RadioState::Ready);
    }

    #[tokio::test]
    async fn start_reports_permanent_open_cause() {
        let f = fixture().await;
        f.device.queue_open_errors([ErrorKind::DeviceBusy]);
        f.radio.realize().await.unwrap();
        assert!(matches!(f.radio.start().await, Err(Error::DeviceBusy)));
        assert_eq!(f.device.count(&DeviceCall::Open), 1);
    }

    #[tokio::test]
    async fn init_failure_closes_device() {
        let f = fixture().await;
        f.device.fail(DeviceOp::SetBandRange, ErrorKind::Internal);
        f.radio.realize().await.unwrap();
        let err = f.radio.start().await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)), "{err:?}");
        assert!(!f.device.is_open());
        assert_eq!(f.radio.get_state().await, RadioState::Ready);
    }

    #[tokio::test]
    async fn start_without_antenna_rolls_back() {
        let f = fixture().await;
        f.routing.set_jack_connected(false);
        f.radio.realize().await.unwrap();
        assert!(!f.radio.get_device_available().await.unwrap());

        assert!(matches!(f.radio.start().await, Err(Error::NoAntenna)));
        assert!(!f.device.is_open());
        assert!(!f.focus.holds_focus());
        assert_eq!(f.radio.get_state().await, RadioState::Ready);
    }

    #[tokio::test]
    async fn antenna_check_can_be_disabled() {
        let config = RadioConfig {
            require_antenna: false,
            ..fast_config()
        };
        let f = fixture_with(MockDevice::new(), config).await;
        f.routing.set_jack_connected(false);
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        assert_eq!(f.radio.get_state().await, RadioState::Playing);
    }

    #[tokio::test]
    async fn denied_focus_fails_start() {
        let f = fixture().await;
        f.focus.set_deny(true);
        f.radio.realize().await.unwrap();
        assert!(f.radio.start().await.is_err());
        assert!(!f.device.is_open());
    }

    #[tokio::test]
    async fn start_clamps_cache_left_outside_band() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.set_frequency(99_900).await.unwrap();
        f.radio.set_region(Region::Japan).await.unwrap();
        f.radio.start().await.unwrap();
        assert_eq!(f.device.frequency(), 76_100);
        assert_eq!(f.radio.get_frequency().await.unwrap(), 76_100);
    }

    #[tokio::test]
    async fn start_reapplies_application_mute() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.set_mute(true).await.unwrap();
        f.radio.start().await.unwrap();
        assert!(f.routing.is_muted());
        assert!(f.radio.get_mute().await);
    }

    #[tokio::test]
    async fn stop_closes_device_and_releases_focus() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.radio.stop().await.unwrap();

        assert_eq!(f.radio.get_state().await, RadioState::Ready);
        assert!(!f.device.is_open());
        assert!(f.routing.is_muted());
        assert!(!f.radio.get_mute().await);
        assert!(f.focus.calls().contains(&FocusCall::Release {
            binding: FocusBinding(1),
            paused: false
        }));
        // Stop from READY is a no-op.
        f.radio.stop().await.unwrap();
    }

    #[tokio::test]
    async fn pause_releases_focus_as_paused() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.radio.pause().await.unwrap();
        assert_eq!(f.radio.get_state().await, RadioState::Ready);
        assert!(f.focus.calls().contains(&FocusCall::Release {
            binding: FocusBinding(1),
            paused: true
        }));
    }

    #[tokio::test]
    async fn region_change_on_open_device_reaches_device() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.device.clear_calls();

        f.radio.set_region(Region::Usa).await.unwrap();
        assert_eq!(
            f.device.calls(),
            vec![
                DeviceCall::SetDeemphasis(Deemphasis::Micros75),
                DeviceCall::SetBandRange {
                    min_khz: 87_500,
                    max_khz: 108_000
                },
            ]
        );
    }

    #[tokio::test]
    async fn region_change_on_open_device_retunes_out_of_band_frequency() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.set_frequency(99_900).await.unwrap();
        f.radio.start().await.unwrap();
        f.device.clear_calls();

        f.radio.set_region(Region::Japan).await.unwrap();
        let (min, max) = f.radio.get_region_frequency_range().await;
        let cached = f.radio.get_frequency().await.unwrap();
        assert_eq!((min, max), (76_100, 89_900));
        assert_eq!(cached, 76_100);
        assert_eq!(f.device.frequency(), 76_100);
        assert_eq!(f.device.calls().last(), Some(&DeviceCall::SetFrequency(76_100)));
    }

    #[tokio::test]
    async fn region_change_keeps_in_band_frequency() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.set_frequency(88_000).await.unwrap();
        f.radio.start().await.unwrap();
        f.device.clear_calls();

        f.radio.set_region(Region::Japan).await.unwrap();
        assert_eq!(f.radio.get_frequency().await.unwrap(), 88_000);
        assert!(
            !f.device
                .calls()
                .iter()
                .any(|c| matches!(c, DeviceCall::SetFrequency(_)))
        );
    }

    #[tokio::test]
    async fn failed_region_retune_keeps_cache() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.set_frequency(99_900).await.unwrap();
        f.radio.start().await.unwrap();
        f.device.fail(DeviceOp::SetFrequency, ErrorKind::Internal);

        assert!(f.radio.set_region(Region::Japan).await.is_err());
        assert_eq!(f.radio.get_frequency().await.unwrap(), 99_900);
    }

    #[tokio::test]
    async fn open_device_tunes_immediately() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.radio.set_frequency(87_500).await.unwrap();
        assert_eq!(f.device.frequency(), 87_500);
        assert_eq!(f.radio.get_frequency().await.unwrap(), 87_500);
    }

    #[tokio::test]
    async fn async_frequency_posts_result() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.radio.set_frequency_async(89_100).await.unwrap();

        let msg = f
            .messages
            .wait_for(|m| matches!(m, RadioMessage::FrequencySet { .. }), WAIT)
            .await;
        assert_eq!(msg, Some(RadioMessage::FrequencySet { result: Ok(89_100) }));
        assert_eq!(f.device.frequency(), 89_100);
    }

    #[tokio::test]
    async fn async_frequency_posts_device_error() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.device.fail(DeviceOp::SetFrequency, ErrorKind::Internal);
        f.radio.set_frequency_async(89_100).await.unwrap();

        let msg = f
            .messages
            .wait_for(|m| matches!(m, RadioMessage::FrequencySet { .. }), WAIT)
            .await;
        assert_eq!(
            msg,
            Some(RadioMessage::FrequencySet {
                result: Err(ErrorKind::Internal)
            })
        );
    }

    #[tokio::test]
    async fn close_polls_status_until_closed() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.device.queue_close_statuses([
            CloseStatus::Closing,
            CloseStatus::Closing,
            CloseStatus::Closed,
            CloseStatus::Closing,
        ]);
        f.radio.stop().await.unwrap();
        // The poll stops at the first "closed".
        assert_eq!(
            f.device.close_status().await.unwrap(),
            Some(CloseStatus::Closing)
        );
    }

    #[tokio::test]
    async fn close_status_timeout_does_not_fail_stop() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.device.queue_close_statuses([CloseStatus::Closing; 20]);
        f.radio.stop().await.unwrap();
        assert_eq!(f.radio.get_state().await, RadioState::Ready);
    }

    #[tokio::test]
    async fn tuning_parameters_pushed_after_open() {
        let device = Arc::new(MockDevice::new());
        let store = MemoryTuningStore::new()
            .with_int(keys::ENABLE, 1)
            .with_int(keys::RSSI_THRESHOLD, 17)
            .with_list(keys::VOLUME_TABLE, (0..16).map(|v| v * 10).collect());
        let radio = RadioBuilder::with_backend(device.clone())
            .config(fast_config())
            .tuning_store(Arc::new(store))
            .create()
            .await
            .unwrap();
        radio.realize().await.unwrap();
        radio.start().await.unwrap();

        let applied = device.calls().into_iter().find_map(|c| match c {
            DeviceCall::ApplyTuning(p) => Some(p),
            _ => None,
        });
        let applied = applied.expect("tuning applied");
        assert!(applied.enable);
        assert_eq!(applied.rssi_threshold, 17);
        assert_eq!(device.volume(), 150);
    }

    #[tokio::test]
    async fn focus_stop_interrupts_and_tears_down() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();

        f.focus.fire(FocusCommand::Stop, InterruptSource::CallStart);
        let msg = f
            .messages
            .wait_for(|m| matches!(m, RadioMessage::StateInterrupted { .. }), WAIT)
            .await;
        assert_eq!(
            msg,
            Some(RadioMessage::StateInterrupted {
                cause: InterruptSource::CallStart
            })
        );

        for _ in 0..100 {
            if !f.device.is_open() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!f.device.is_open());
        assert_eq!(f.radio.get_state().await, RadioState::Ready);
        assert_eq!(
            f.messages
                .count(|m| matches!(m, RadioMessage::StateChanged { current: RadioState::Ready, .. })),
            1
        );
    }

    #[tokio::test]
    async fn focus_pause_from_unknown_source_is_silent() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        let before = f.messages.messages().len();

        f.focus.fire(FocusCommand::Pause, InterruptSource::Other(99));
        for _ in 0..100 {
            if f.radio.get_state().await == RadioState::Ready {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.radio.get_state().await, RadioState::Ready);
        assert_eq!(f.messages.messages().len(), before);
        assert!(f.focus.calls().contains(&FocusCall::Release {
            binding: FocusBinding(1),
            paused: true
        }));
    }

    #[tokio::test]
    async fn focus_resume_posts_ready_to_resume() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.focus.fire(FocusCommand::Resume, InterruptSource::AlarmStart);
        let msg = f
            .messages
            .wait_for(|m| matches!(m, RadioMessage::ReadyToResume { .. }), WAIT)
            .await;
        assert_eq!(
            msg,
            Some(RadioMessage::ReadyToResume {
                cause: InterruptSource::AlarmStart
            })
        );
    }

    #[tokio::test]
    async fn focus_stop_while_ready_is_ignored() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.focus.fire(FocusCommand::Stop, InterruptSource::CallStart);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.focus.calls().iter().all(|c| !matches!(c, FocusCall::Release { .. })));
    }

    #[tokio::test]
    async fn signal_strength_reads_device() {
        let f = fixture().await;
        assert!(matches!(
            f.radio.get_signal_strength().await,
            Err(Error::DeviceNotOpened)
        ));
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.device.set_signal(-85);
        assert_eq!(f.radio.get_signal_strength().await.unwrap(), -85);
    }

    #[tokio::test]
    async fn unrealize_stops_playback_and_returns_to_null() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        f.radio.unrealize().await.unwrap();
        assert_eq!(f.radio.get_state().await, RadioState::Null);
        assert!(!f.device.is_open());
        // Unrealize from NULL is a no-op.
        f.radio.unrealize().await.unwrap();
    }

    #[tokio::test]
    async fn destroy_unregisters_and_joins() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        let focus = f.focus.clone();
        let device = f.device.clone();
        f.radio.destroy().await.unwrap();

        assert!(!device.is_open());
        assert_eq!(focus.registered(), 0);
        assert!(matches!(focus.calls().last(), Some(FocusCall::Unregister(_))));
    }

    #[tokio::test]
    async fn destroy_discards_pending_async_frequency() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        for freq in [89_100, 89_900, 91_900] {
            f.radio.set_frequency_async(freq).await.unwrap();
        }
        let messages = f.messages.clone();
        f.radio.destroy().await.unwrap();

        // Whatever ran before destroy was posted; nothing runs after.
        let after = messages.count(|m| matches!(m, RadioMessage::FrequencySet { .. }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            messages.count(|m| matches!(m, RadioMessage::FrequencySet { .. })),
            after
        );
    }

    #[tokio::test]
    async fn gate_enabled_before_open_and_disabled_after_close() {
        let device = Arc::new(MockDevice::new());
        let gate = Arc::new(MockTransportGate::new().with_settle_polls(2));
        let radio = RadioBuilder::with_backend(device.clone())
            .config(fast_config())
            .transport_gate(gate.clone())
            .create()
            .await
            .unwrap();
        radio.realize().await.unwrap();
        radio.start().await.unwrap();
        assert_eq!(gate.current(), GateState::Active);

        radio.unrealize().await.unwrap();
        assert_eq!(gate.calls(), vec![GateCall::Enable, GateCall::Disable]);
        assert_eq!(gate.current(), GateState::Inactive);
    }

    #[tokio::test]
    async fn stuck_gate_fails_start_with_not_opened() {
        let device = Arc::new(MockDevice::new());
        let gate = Arc::new(MockTransportGate::new());
        gate.set_stuck(true);
        let radio = RadioBuilder::with_backend(device.clone())
            .config(fast_config())
            .transport_gate(gate.clone())
            .create()
            .await
            .unwrap();
        radio.realize().await.unwrap();
        assert!(matches!(radio.start().await, Err(Error::DeviceNotOpened)));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn stuck_gate_does_not_block_unrealize() {
        let device = Arc::new(MockDevice::new());
        let gate = Arc::new(MockTransportGate::new());
        let radio = RadioBuilder::with_backend(device.clone())
            .config(fast_config())
            .transport_gate(gate.clone())
            .create()
            .await
            .unwrap();
        radio.realize().await.unwrap();
        radio.start().await.unwrap();
        assert_eq!(gate.current(), GateState::Active);

        gate.set_stuck(true);
        radio.unrealize().await.unwrap();
        assert_eq!(radio.get_state().await, RadioState::Null);
        assert!(!device.is_open());
        assert_eq!(gate.calls(), vec![GateCall::Enable, GateCall::Disable]);
        assert_eq!(gate.current(), GateState::Active);

        radio.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn start_leaves_no_pending_transition() {
        let f = fixture().await;
        f.radio.realize().await.unwrap();
        f.radio.start().await.unwrap();
        assert_eq!(f.radio.inner.control.lock().await.machine.pending(), None);

        f.radio.stop().await.unwrap();
        f.device.queue_open_errors([ErrorKind::DeviceBusy]);
        assert!(f.radio.start().await.is_err());
        let control = f.radio.inner.control.lock().await;
        assert_eq!(control.machine.pending(), None);
        assert_eq!(control.machine.current(), RadioState::Ready);
    }

    #[tokio::test]
    async fn subscribe_receives_messages() {
        let f = fixture().await;
        let mut rx = f.radio.subscribe();
        f.radio.realize().await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            changed(RadioState::Null, RadioState::Ready)
        );
    }
}

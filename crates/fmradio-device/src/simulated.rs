//! In-memory tuner.
//!
//! [`SimulatedDevice`] behaves like a hardware tuner with a fixed set of
//! receivable stations: a seek moves to the next station in the requested
//! direction, stops on the band edge when there is none, or wraps around
//! when asked to. Every instance owns its own station list and position.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use fmradio_core::device::{DeviceBackend, DeviceInfo, SeekRequest};
use fmradio_core::error::{Error, Result};
use fmradio_core::region::Deemphasis;
use fmradio_core::tuning::TuningParams;
use rand::Rng;
use tokio::sync::Notify;
use tracing::debug;

/// Stations the simulated tuner can receive, in kHz.
pub const DEFAULT_STATIONS: &[u32] = &[89_100, 89_900, 91_900, 99_900, 107_700];

/// Frequency a fresh handle starts on with this backend.
pub const DEFAULT_FREQUENCY_KHZ: u32 = 107_700;

#[derive(Debug)]
struct SimState {
    open: bool,
    frequency: u32,
    band: (u32, u32),
    deemphasis: Option<Deemphasis>,
    volume: u32,
    tuning: Option<TuningParams>,
}

/// A simulated tuner.
#[derive(Debug)]
pub struct SimulatedDevice {
    stations: Vec<u32>,
    seek_delay: Duration,
    state: Mutex<SimState>,
    abort: Notify,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        SimulatedDevice::new()
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        SimulatedDevice::with_stations(DEFAULT_STATIONS.to_vec())
    }

    /// A tuner that receives exactly `stations` (kHz, any order).
    pub fn with_stations(mut stations: Vec<u32>) -> Self {
        stations.sort_unstable();
        stations.dedup();
        SimulatedDevice {
            stations,
            seek_delay: Duration::from_millis(200),
            state: Mutex::new(SimState {
                open: false,
                frequency: DEFAULT_FREQUENCY_KHZ,
                band: (87_500, 108_000),
                deemphasis: None,
                volume: 0,
                tuning: None,
            }),
            abort: Notify::new(),
        }
    }

    /// How long a single seek takes.
    pub fn seek_delay(mut self, delay: Duration) -> Self {
        self.seek_delay = delay;
        self
    }

    pub fn stations(&self) -> &[u32] {
        &self.stations
    }

    /// De-emphasis last written, if any.
    pub fn deemphasis(&self) -> Option<Deemphasis> {
        self.lock().deemphasis
    }

    /// Tuning parameters last applied, if any.
    pub fn tuning(&self) -> Option<TuningParams> {
        self.lock().tuning
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn open_state(&self) -> Result<MutexGuard<'_, SimState>> {
        let st = self.lock();
        if st.open {
            Ok(st)
        } else {
            Err(Error::DeviceNotOpened)
        }
    }

    /// Where a seek from `from` ends up.
    fn seek_target(&self, from: u32, band: (u32, u32), request: SeekRequest) -> u32 {
        let (min, max) = band;
        let in_band = self.stations.iter().copied().filter(|&f| f >= min && f <= max);
        if request.upward {
            let mut candidates = in_band;
            match candidates.clone().find(|&f| f > from) {
                Some(f) => f,
                None if request.wrap_around => candidates.next().unwrap_or(max),
                None => max,
            }
        } else {
            let below: Vec<u32> = in_band.collect();
            match below.iter().rev().copied().find(|&f| f < from) {
                Some(f) => f,
                None if request.wrap_around => below.last().copied().unwrap_or(min),
                None => min,
            }
        }
    }
}

#[async_trait]
impl DeviceBackend for SimulatedDevice {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn default_frequency(&self) -> u32 {
        DEFAULT_FREQUENCY_KHZ
    }

    async fn open(&self) -> Result<()> {
        self.lock().open = true;
        Ok(())
    }

    async fn init_tuner(&self) -> Result<DeviceInfo> {
        drop(self.open_state()?);
        Ok(DeviceInfo {
            driver: "fmradio-sim".into(),
            card: "Simulated FM tuner".into(),
            stereo: true,
        })
    }

    async fn close(&self) -> Result<()> {
        self.lock().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    async fn set_band_range(&self, min_khz: u32, max_khz: u32) -> Result<()> {
        self.open_state()?.band = (min_khz, max_khz);
        Ok(())
    }

    async fn set_deemphasis(&self, deemphasis: Deemphasis) -> Result<()> {
        self.open_state()?.deemphasis = Some(deemphasis);
        Ok(())
    }

    async fn set_frequency(&self, freq_khz: u32) -> Result<()> {
        let mut st = self.open_state()?;
        if freq_khz < st.band.0 || freq_khz > st.band.1 {
            return Err(Error::InvalidArgument(format!(
                "frequency {freq_khz} outside tuner range"
            )));
        }
        st.frequency = freq_khz;
        Ok(())
    }

    async fn get_frequency(&self) -> Result<u32> {
        Ok(self.open_state()?.frequency)
    }

    async fn seek(&self, request: SeekRequest) -> Result<()> {
        let (from, band) = {
            let st = self.open_state()?;
            (st.frequency, st.band)
        };
        let target = self.seek_target(from, band, request);

        tokio::select! {
            _ = tokio::time::sleep(self.seek_delay) => {}
            _ = self.abort.notified() => {
                debug!(from, "simulated seek aborted");
                return Err(Error::Internal("seek aborted".into()));
            }
        }

        let mut st = self.open_state()?;
        st.frequency = target;
        debug!(from, target, upward = request.upward, "simulated seek done");
        Ok(())
    }

    async fn abort_seek(&self) -> Result<()> {
        self.abort.notify_waiters();
        Ok(())
    }

    async fn signal_strength(&self) -> Result<i32> {
        drop(self.open_state()?);
        Ok(-(rand::thread_rng().gen_range(1..=20) + 80))
    }

    async fn set_volume(&self, raw: u32) -> Result<()> {
        self.open_state()?.volume = raw;
        Ok(())
    }

    async fn get_volume(&self) -> Result<u32> {
        Ok(self.open_state()?.volume)
    }

    async fn apply_tuning(&self, params: &TuningParams) -> Result<()> {
        self.open_state()?.tuning = Some(*params);
        Ok(())
    }
}

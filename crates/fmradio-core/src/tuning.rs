//! Tuning parameters and the volume table.
//!
//! Both are read from an external key/value store keyed as
//! `section:key`. Missing keys fall back to compiled-in defaults so a
//! handle works with an empty store.

use tracing::debug;

/// Store keys read by [`TuningParams::load`] and [`VolumeTable::load`].
pub mod keys {
    pub const ENABLE: &str = "tuning:enable";
    pub const RSSI_THRESHOLD: &str = "fmradio:mmfw_fmradio_rssi_threshold";
    pub const FREQUENCY_OFFSET: &str = "fmradio:mmfw_fmradio_frequency_offset";
    pub const NOISE_POWER: &str = "fmradio:mmfw_fmradio_noise_power";
    pub const PILOT_POWER: &str = "fmradio:mmfw_fmradio_pilot_power";
    pub const SOFTMUTE_ENABLE: &str = "fmradio:mmfw_fmradio_softmute_enable";
    pub const VOLUME_TABLE: &str = "fmradio:volume_table";
}

/// A read-only key/value source for tuning parameters.
pub trait TuningStore: Send + Sync {
    /// Look up an integer. Keys are `section:key`.
    fn get_int(&self, key: &str) -> Option<i64>;

    /// Look up a list of integers.
    fn get_int_list(&self, key: &str) -> Option<Vec<i64>>;
}

/// A store with no keys.
#[derive(Debug, Default)]
pub struct EmptyTuningStore;

impl TuningStore for EmptyTuningStore {
    fn get_int(&self, _key: &str) -> Option<i64> {
        None
    }

    fn get_int_list(&self, _key: &str) -> Option<Vec<i64>> {
        None
    }
}

/// Receiver thresholds pushed to the device after it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningParams {
    /// Whether the store supplied values at all. When `false` the device
    /// keeps its own defaults.
    pub enable: bool,
    pub rssi_threshold: i32,
    pub frequency_offset: i32,
    pub noise_power: i32,
    pub pilot_power: i32,
    pub softmute_enable: bool,
}

impl Default for TuningParams {
    fn default() -> Self {
        TuningParams {
            enable: false,
            rssi_threshold: 0,
            frequency_offset: 0,
            noise_power: 0,
            pilot_power: 0,
            softmute_enable: true,
        }
    }
}

impl TuningParams {
    /// Read every parameter from `store`, defaulting what is absent.
    pub fn load(store: &dyn TuningStore) -> TuningParams {
        let defaults = TuningParams::default();
        let int = |key: &str, default: i32| {
            store
                .get_int(key)
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(default)
        };

        let params = TuningParams {
            enable: store.get_int(keys::ENABLE).map(|v| v != 0).unwrap_or(defaults.enable),
            rssi_threshold: int(keys::RSSI_THRESHOLD, defaults.rssi_threshold),
            frequency_offset: int(keys::FREQUENCY_OFFSET, defaults.frequency_offset),
            noise_power: int(keys::NOISE_POWER, defaults.noise_power),
            pilot_power: int(keys::PILOT_POWER, defaults.pilot_power),
            softmute_enable: store
                .get_int(keys::SOFTMUTE_ENABLE)
                .map(|v| v != 0)
                .unwrap_or(defaults.softmute_enable),
        };
        debug!(?params, "tuning parameters loaded");
        params
    }
}

/// Number of user volume steps.
pub const VOLUME_STEPS: usize = 16;

/// Highest user volume level.
pub const MAX_VOLUME_LEVEL: u8 = (VOLUME_STEPS - 1) as u8;

/// Maps user volume levels `0..=15` to raw device volume values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeTable([u32; VOLUME_STEPS]);

impl Default for VolumeTable {
    fn default() -> Self {
        let mut table = [0u32; VOLUME_STEPS];
        for (level, slot) in table.iter_mut().enumerate() {
            *slot = level as u32;
        }
        VolumeTable(table)
    }
}

impl VolumeTable {
    pub fn new(values: [u32; VOLUME_STEPS]) -> Self {
        VolumeTable(values)
    }

    /// Load the table from `store`. A list of the wrong length or with
    /// negative entries is ignored in favour of the default.
    pub fn load(store: &dyn TuningStore) -> VolumeTable {
        let Some(list) = store.get_int_list(keys::VOLUME_TABLE) else {
            return VolumeTable::default();
        };
        if list.len() != VOLUME_STEPS {
            debug!(len = list.len(), "volume table has wrong length, using default");
            return VolumeTable::default();
        }
        let mut table = [0u32; VOLUME_STEPS];
        for (slot, value) in table.iter_mut().zip(list) {
            match u32::try_from(value) {
                Ok(v) => *slot = v,
                Err(_) => {
                    debug!(value, "negative volume table entry, using default");
                    return VolumeTable::default();
                }
            }
        }
        VolumeTable(table)
    }

    /// Raw device value for `level`, or `None` above [`MAX_VOLUME_LEVEL`].
    pub fn raw(&self, level: u8) -> Option<u32> {
        self.0.get(usize::from(level)).copied()
    }
}

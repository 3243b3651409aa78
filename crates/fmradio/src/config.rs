//! Handle configuration and the TOML-backed tuning store.
//!
//! [`RadioConfig`] carries every timing budget and policy switch the handle
//! uses. All fields have defaults, so an empty file (or no file) yields a
//! working configuration:
//!
//! ```toml
//! device_path = "/dev/radio0"
//! default_region = "europe"
//! require_antenna = false
//! open_retries = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fmradio_core::error::Error;
use fmradio_core::region::Region;
use fmradio_core::retry::RetryPolicy;
use fmradio_core::tuning::TuningStore;
use serde::{Deserialize, Deserializer};

/// Failure to read or parse a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}

/// Runtime configuration of a radio handle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Tuner device node.
    pub device_path: PathBuf,
    /// Vendor attribute directory of the tuner.
    pub sysfs_dir: PathBuf,
    /// Region applied at realize when none was set explicitly.
    #[serde(deserialize_with = "deserialize_region")]
    pub default_region: Region,
    /// Cache the backend's default frequency instead of the bottom of the
    /// 87.5 MHz band when tuning a closed device there.
    pub boundary_snap: bool,
    /// Refuse to start without a headset antenna.
    pub require_antenna: bool,

    pub open_retries: u32,
    pub open_retry_interval_ms: u64,
    pub close_poll_retries: u32,
    pub close_poll_interval_ms: u64,
    pub gate_ready_retries: u32,
    pub gate_disable_retries: u32,
    pub gate_poll_interval_ms: u64,
    /// Pause between tuning and the antenna check in `start`.
    pub settle_after_start_ms: u64,
    pub fade_step_ms: u64,
    /// Upper bound on waiting for a seek or scan worker to exit.
    pub worker_join_timeout_ms: u64,

    /// Tuning-parameter document read by [`TomlTuningStore`].
    pub tuning_file: Option<PathBuf>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            device_path: PathBuf::from("/dev/radio0"),
            sysfs_dir: PathBuf::from("/sys/devices/virtual/video4linux/radio0"),
            default_region: Region::Europe,
            boundary_snap: true,
            require_antenna: true,
            open_retries: 3,
            open_retry_interval_ms: 100,
            close_poll_retries: 10,
            close_poll_interval_ms: 100,
            gate_ready_retries: 50,
            gate_disable_retries: 100,
            gate_poll_interval_ms: 100,
            settle_after_start_ms: 100,
            fade_step_ms: 100,
            worker_join_timeout_ms: 5000,
            tuning_file: None,
        }
    }
}

fn deserialize_region<'de, D>(deserializer: D) -> std::result::Result<Region, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl RadioConfig {
    /// Parse a configuration document.
    pub fn from_toml(content: &str) -> std::result::Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn open_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.open_retries,
            Duration::from_millis(self.open_retry_interval_ms),
        )
    }

    pub fn close_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.close_poll_retries,
            Duration::from_millis(self.close_poll_interval_ms),
        )
    }

    pub fn gate_ready_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.gate_ready_retries,
            Duration::from_millis(self.gate_poll_interval_ms),
        )
    }

    pub fn gate_disable_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.gate_disable_retries,
            Duration::from_millis(self.gate_poll_interval_ms),
        )
    }

    pub fn settle_after_start(&self) -> Duration {
        Duration::from_millis(self.settle_after_start_ms)
    }

    pub fn fade_step(&self) -> Duration {
        Duration::from_millis(self.fade_step_ms)
    }

    pub fn worker_join_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_join_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// TomlTuningStore
// ---------------------------------------------------------------------------

/// A [`TuningStore`] over an ini-shaped TOML document.
///
/// Keys are looked up as `section:key`, so `fmradio:volume_table` reads the
/// `volume_table` entry of the `[fmradio]` table.
#[derive(Debug, Clone, Default)]
pub struct TomlTuningStore {
    table: toml::Table,
}

impl TomlTuningStore {
    pub fn from_toml(content: &str) -> std::result::Result<Self, ConfigError> {
        Ok(TomlTuningStore {
            table: content.parse()?,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    fn lookup(&self, key: &str) -> Option<&toml::Value> {
        let (section, name) = key.split_once(':')?;
        self.table.get(section)?.as_table()?.get(name)
    }
}

impl TuningStore for TomlTuningStore {
    fn get_int(&self, key: &str) -> Option<i64> {
        match self.lookup(key)? {
            toml::Value::Integer(v) => Some(*v),
            toml::Value::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    fn get_int_list(&self, key: &str) -> Option<Vec<i64>> {
        self.lookup(key)?
            .as_array()?
            .iter()
            .map(toml::Value::as_integer)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmradio_core::tuning::{TuningParams, VolumeTable, keys};

    #[test]
    fn empty_document_is_default() {
        assert_eq!(RadioConfig::from_toml("").unwrap(), RadioConfig::default());
    }

    #[test]
    fn partial_document_overrides() {
        let config = RadioConfig::from_toml(
            r#"
            default_region = "jp"
            require_antenna = false
            open_retries = 7
            tuning_file = "/etc/fmradio/tuning.toml"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_region, Region::Japan);
        assert!(!config.require_antenna);
        assert_eq!(config.open_retries, 7);
        assert_eq!(config.open_policy().attempts(), 8);
        assert_eq!(
            config.tuning_file.as_deref(),
            Some(Path::new("/etc/fmradio/tuning.toml"))
        );
        assert!(config.boundary_snap);
    }

    #[test]
    fn unknown_region_rejected() {
        let err = RadioConfig::from_toml(r#"default_region = "mars""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("radio.toml");
        std::fs::write(&path, "fade_step_ms = 10\n").unwrap();
        let config = RadioConfig::load(&path).unwrap();
        assert_eq!(config.fade_step(), Duration::from_millis(10));
    }

    #[test]
    fn load_missing_file() {
        let err = RadioConfig::load("/nonexistent/radio.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        let err: Error = err.into();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    const TUNING: &str = r#"
        [tuning]
        enable = 1

        [fmradio]
        mmfw_fmradio_rssi_threshold = 22
        mmfw_fmradio_frequency_offset = 4
        mmfw_fmradio_noise_power = 9
        mmfw_fmradio_pilot_power = 3
        mmfw_fmradio_softmute_enable = false
        volume_table = [0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30]
    "#;

    #[test]
    fn tuning_store_section_lookup() {
        let store = TomlTuningStore::from_toml(TUNING).unwrap();
        assert_eq!(store.get_int(keys::ENABLE), Some(1));
        assert_eq!(store.get_int(keys::RSSI_THRESHOLD), Some(22));
        assert_eq!(store.get_int(keys::SOFTMUTE_ENABLE), Some(0));
        assert_eq!(store.get_int("fmradio:missing"), None);
        assert_eq!(store.get_int("no_section_separator"), None);
    }

    #[test]
    fn tuning_store_feeds_params_and_volume_table() {
        let store = TomlTuningStore::from_toml(TUNING).unwrap();
        let params = TuningParams::load(&store);
        assert!(params.enable);
        assert_eq!(params.noise_power, 9);
        assert!(!params.softmute_enable);

        let table = VolumeTable::load(&store);
        assert_eq!(table.raw(15), Some(30));
    }

    #[test]
    fn int_list_rejects_mixed_types() {
        let store = TomlTuningStore::from_toml("[fmradio]\nvolume_table = [1, \"two\"]").unwrap();
        assert_eq!(store.get_int_list(keys::VOLUME_TABLE), None);
    }
}

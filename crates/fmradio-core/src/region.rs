//! Regulatory region table.
//!
//! Each [`Region`] maps to a fixed [`RegionSetting`]: band edges, channel
//! spacing, and the de-emphasis time constant the tuner must apply.
//!
//! # Example
//!
//! ```
//! use fmradio_core::Region;
//!
//! let setting = Region::Japan.setting();
//! assert_eq!(setting.band_min_khz, 76_100);
//! assert!(setting.contains(80_000));
//! assert_eq!("eu".parse::<Region>().unwrap(), Region::Europe);
//! ```

use std::fmt;
use std::str::FromStr;

/// Regulatory region group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// North America. 75 us de-emphasis.
    Usa,
    /// Europe, most of Asia and Africa. 50 us de-emphasis.
    Europe,
    /// Japan wide band.
    Japan,
}

/// All regions in table order.
const ALL_REGIONS: &[Region] = &[Region::Usa, Region::Europe, Region::Japan];

/// FM de-emphasis filter time constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deemphasis {
    Micros50,
    Micros75,
}

impl Deemphasis {
    pub fn micros(&self) -> u32 {
        match self {
            Deemphasis::Micros50 => 50,
            Deemphasis::Micros75 => 75,
        }
    }
}

impl fmt::Display for Deemphasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} us", self.micros())
    }
}

/// The regulatory parameters currently applied to a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSetting {
    pub region: Region,
    pub deemphasis: Deemphasis,
    /// Lowest tunable frequency in kHz (inclusive).
    pub band_min_khz: u32,
    /// Highest tunable frequency in kHz (inclusive).
    pub band_max_khz: u32,
    /// Channel raster in kHz.
    pub channel_spacing_khz: u32,
}

impl RegionSetting {
    /// Check whether `freq_khz` lies inside the band edges (inclusive).
    pub fn contains(&self, freq_khz: u32) -> bool {
        freq_khz >= self.band_min_khz && freq_khz <= self.band_max_khz
    }

    /// Band edges as a `(min, max)` pair in kHz.
    pub fn range(&self) -> (u32, u32) {
        (self.band_min_khz, self.band_max_khz)
    }

    /// Whether `freq_khz` sits exactly on either band edge.
    pub fn is_edge(&self, freq_khz: u32) -> bool {
        freq_khz == self.band_min_khz || freq_khz == self.band_max_khz
    }
}

impl Region {
    /// Look up the fixed parameters for this region.
    pub fn setting(&self) -> RegionSetting {
        match self {
            Region::Usa => RegionSetting {
                region: Region::Usa,
                deemphasis: Deemphasis::Micros75,
                band_min_khz: 87_500,
                band_max_khz: 108_000,
                channel_spacing_khz: 50,
            },
            Region::Europe => RegionSetting {
                region: Region::Europe,
                deemphasis: Deemphasis::Micros50,
                band_min_khz: 87_500,
                band_max_khz: 108_000,
                channel_spacing_khz: 50,
            },
            Region::Japan => RegionSetting {
                region: Region::Japan,
                deemphasis: Deemphasis::Micros50,
                band_min_khz: 76_100,
                band_max_khz: 89_900,
                channel_spacing_khz: 50,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Region::Usa => "usa",
            Region::Europe => "europe",
            Region::Japan => "japan",
        }
    }

    /// Returns a slice of every region in table order.
    pub fn all() -> &'static [Region] {
        ALL_REGIONS
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when a string cannot be parsed into a [`Region`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRegionError(String);

impl fmt::Display for ParseRegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown region: '{}'", self.0)
    }
}

impl std::error::Error for ParseRegionError {}

impl FromStr for Region {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "usa" | "us" => Ok(Region::Usa),
            "europe" | "eu" => Ok(Region::Europe),
            "japan" | "jp" => Ok(Region::Japan),
            _ => Err(ParseRegionError(s.to_string())),
        }
    }
}

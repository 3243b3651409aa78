//! Unit conversions and formatting helpers.

/// V4L2 low-frequency tuners count in 62.5 Hz steps: 16 per kHz.
pub const FREQ_FRAC: u32 = 16;

/// Convert a frequency in kHz to device units (62.5 Hz steps).
///
/// # Example
///
/// ```
/// use fmradio_core::helpers::khz_to_device_units;
///
/// assert_eq!(khz_to_device_units(99_900), 1_598_400);
/// ```
pub fn khz_to_device_units(freq_khz: u32) -> u32 {
    freq_khz.saturating_mul(FREQ_FRAC)
}

/// Convert device units (62.5 Hz steps) back to kHz, rounding down.
///
/// # Example
///
/// ```
/// use fmradio_core::helpers::device_units_to_khz;
///
/// assert_eq!(device_units_to_khz(1_598_400), 99_900);
/// ```
pub fn device_units_to_khz(units: u32) -> u32 {
    units / FREQ_FRAC
}

/// Scale a raw V4L2 tuner signal reading into a dBm-like figure.
///
/// The driver reports `0..=65535`; the radio surface reports roughly
/// `-128..=0`.
///
/// # Example
///
/// ```
/// use fmradio_core::helpers::scale_signal;
///
/// assert_eq!(scale_signal(0), -128);
/// assert_eq!(scale_signal(65_535), 0);
/// ```
pub fn scale_signal(raw: i32) -> i32 {
    raw / 511 - 128
}

/// Format a frequency in kHz as a broadcast-style MHz string.
///
/// # Example
///
/// ```
/// use fmradio_core::format_freq_mhz;
///
/// assert_eq!(format_freq_mhz(99_900), "99.90 MHz");
/// assert_eq!(format_freq_mhz(107_700), "107.70 MHz");
/// ```
pub fn format_freq_mhz(freq_khz: u32) -> String {
    let mhz = f64::from(freq_khz) / 1_000.0;
    format!("{mhz:.2} MHz")
}

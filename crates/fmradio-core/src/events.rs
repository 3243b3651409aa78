//! Asynchronous radio notifications.
//!
//! Messages are posted by the handle and its workers to the installed
//! message callback and to every [`tokio::sync::broadcast`] subscriber.
//! Seek and scan results arrive only through this path because the caller
//! has already returned by the time the worker finishes.

use crate::error::ErrorKind;
use crate::focus::InterruptSource;
use crate::types::RadioState;

/// A notification emitted by a radio handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioMessage {
    /// The state machine moved on an application-initiated command.
    StateChanged {
        previous: RadioState,
        current: RadioState,
    },

    /// The state machine moved because the audio focus was revoked.
    StateInterrupted {
        /// What took the focus away.
        cause: InterruptSource,
    },

    /// A scan session began. Always precedes any [`RadioMessage::ScanInfo`].
    ScanStart,

    /// A station was found during a scan.
    ScanInfo {
        /// Frequency in kHz.
        frequency: u32,
    },

    /// A scan was stopped by `stop_scan`.
    ScanStop,

    /// A scan ran to the end of the band.
    ScanFinish,

    /// A seek worker began searching.
    SeekStart,

    /// A seek worker finished.
    SeekFinish {
        /// Found frequency in kHz, or `None` when the seek failed or was
        /// cancelled (the `-1` sentinel on the C-style message surface).
        frequency: Option<u32>,
    },

    /// The audio focus came back; the application may restart playback.
    ReadyToResume { cause: InterruptSource },

    /// Outcome of a deferred `set_frequency_async` request.
    FrequencySet {
        /// The tuned frequency in kHz, or the reason it failed.
        result: Result<u32, ErrorKind>,
    },
}

impl RadioMessage {
    /// Whether this message ends a scan session.
    pub fn is_scan_terminal(&self) -> bool {
        matches!(self, RadioMessage::ScanStop | RadioMessage::ScanFinish)
    }

    /// The integer form of a seek result: the frequency, or `-1` on failure.
    pub fn seek_code(frequency: Option<u32>) -> i64 {
        frequency.map(i64::from).unwrap_or(-1)
    }
}

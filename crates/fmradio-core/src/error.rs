//! Error types for fmradio.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Command-admission failures, device
//! open/ioctl failures, and collaborator failures are all captured here.

use std::fmt;
use std::io;

use crate::types::{Command, RadioState};

/// The error type for all fmradio operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A parameter was out of range or otherwise unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The command cannot be admitted from the current state.
    #[error("command {command} not allowed in state {state}")]
    InvalidState { command: Command, state: RadioState },

    /// The tuner device node does not exist.
    #[error("radio device not found")]
    DeviceNotFound,

    /// The tuner device node exists but may not be opened by this process.
    #[error("permission denied opening radio device")]
    PermissionDenied,

    /// The tuner device is held by another process.
    #[error("radio device busy")]
    DeviceBusy,

    /// An operation needed an open device and none was open, or the
    /// device could not be made ready.
    #[error("radio device not opened")]
    DeviceNotOpened,

    /// The device asked to be retried (EAGAIN class).
    ///
    /// Open retries this locally; seek and scan treat it as "keep going"
    /// or as a failed attempt depending on the worker.
    #[error("device temporarily unavailable")]
    TryAgain,

    /// An unexpected ioctl, task, or IPC failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// A resource could not be allocated.
    #[error("no free space: {0}")]
    NoFreeSpace(String),

    /// The headset/antenna accessory required for reception is absent.
    #[error("no antenna connected")]
    NoAntenna,

    /// Timed out waiting for a device or worker.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// An underlying I/O error that does not map to a device cause.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Classify an I/O error raised by a device node or ioctl.
    ///
    /// Open failures keep their distinct cause; anything unrecognised
    /// becomes [`Error::Internal`].
    pub fn from_device_io(e: io::Error) -> Error {
        #[cfg(unix)]
        if let Some(code) = e.raw_os_error() {
            use nix::errno::Errno;
            // No io::ErrorKind covers a node without a bound driver.
            if matches!(Errno::from_raw(code), Errno::ENODEV | Errno::ENXIO) {
                return Error::DeviceNotFound;
            }
        }
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Error::TryAgain,
            io::ErrorKind::NotFound => Error::DeviceNotFound,
            io::ErrorKind::PermissionDenied => Error::PermissionDenied,
            io::ErrorKind::ResourceBusy => Error::DeviceBusy,
            _ => Error::Internal(e.to_string()),
        }
    }

    /// The cloneable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::DeviceNotFound => ErrorKind::DeviceNotFound,
            Error::PermissionDenied => ErrorKind::PermissionDenied,
            Error::DeviceBusy => ErrorKind::DeviceBusy,
            Error::DeviceNotOpened => ErrorKind::DeviceNotOpened,
            Error::TryAgain => ErrorKind::TryAgain,
            Error::Internal(_) | Error::Io(_) => ErrorKind::Internal,
            Error::NoFreeSpace(_) => ErrorKind::NoFreeSpace,
            Error::NoAntenna => ErrorKind::NoAntenna,
            Error::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Whether the operation may succeed if simply repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TryAgain)
    }
}

/// Error classification that can travel inside [`RadioMessage`](crate::RadioMessage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    DeviceNotFound,
    PermissionDenied,
    DeviceBusy,
    DeviceNotOpened,
    TryAgain,
    Internal,
    NoFreeSpace,
    NoAntenna,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::DeviceNotFound => "device not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::DeviceBusy => "device busy",
            ErrorKind::DeviceNotOpened => "device not opened",
            ErrorKind::TryAgain => "try again",
            ErrorKind::Internal => "internal",
            ErrorKind::NoFreeSpace => "no free space",
            ErrorKind::NoAntenna => "no antenna",
            ErrorKind::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_argument() {
        let e = Error::InvalidArgument("frequency 86000 out of range".into());
        assert_eq!(e.to_string(), "invalid argument: frequency 86000 out of range");
    }

    #[test]
    fn error_display_invalid_state() {
        let e = Error::InvalidState {
            command: Command::Seek,
            state: RadioState::Ready,
        };
        assert_eq!(e.to_string(), "command seek not allowed in state READY");
    }

    #[test]
    fn error_display_open_causes() {
        assert_eq!(Error::DeviceNotFound.to_string(), "radio device not found");
        assert_eq!(
            Error::PermissionDenied.to_string(),
            "permission denied opening radio device"
        );
        assert_eq!(Error::DeviceBusy.to_string(), "radio device busy");
        assert_eq!(Error::DeviceNotOpened.to_string(), "radio device not opened");
    }

    #[test]
    fn error_display_timeout() {
        let e = Error::Timeout("seek worker");
        assert_eq!(e.to_string(), "timed out waiting for seek worker");
    }

    #[test]
    fn from_device_io_maps_open_causes() {
        let cases = [
            (io::ErrorKind::WouldBlock, ErrorKind::TryAgain),
            (io::ErrorKind::NotFound, ErrorKind::DeviceNotFound),
            (io::ErrorKind::PermissionDenied, ErrorKind::PermissionDenied),
            (io::ErrorKind::ResourceBusy, ErrorKind::DeviceBusy),
            (io::ErrorKind::InvalidInput, ErrorKind::Internal),
        ];
        for (io_kind, expected) in cases {
            let e = Error::from_device_io(io::Error::new(io_kind, "x"));
            assert_eq!(e.kind(), expected, "{io_kind:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn from_raw_enodev_and_enxio_mean_not_found() {
        use nix::errno::Errno;

        for errno in [Errno::ENODEV, Errno::ENXIO] {
            let e = Error::from_device_io(io::Error::from_raw_os_error(errno as i32));
            assert!(matches!(e, Error::DeviceNotFound), "{errno:?} gave {e:?}");
        }
        let e = Error::from_device_io(io::Error::from_raw_os_error(Errno::EIO as i32));
        assert_eq!(e.kind(), ErrorKind::Internal);
    }

    #[test]
    fn from_raw_eagain_is_transient() {
        // EAGAIN is 11 on Linux.
        let e = Error::from_device_io(io::Error::from_raw_os_error(11));
        assert!(e.is_transient());
    }

    #[test]
    fn error_from_io_is_internal_kind() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert_eq!(e.kind(), ErrorKind::Internal);
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn only_try_again_is_transient() {
        assert!(Error::TryAgain.is_transient());
        assert!(!Error::DeviceBusy.is_transient());
        assert!(!Error::Internal("ioctl".into()).is_transient());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}

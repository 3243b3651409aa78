//! Value types shared across the fmradio crates.

use std::fmt;
use std::str::FromStr;

/// Position of a radio handle in its lifecycle.
///
/// `Uninitialized` only exists while `create` runs; a handle returned to a
/// caller is always in one of the other four states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioState {
    Uninitialized,
    /// Created, device and region not prepared.
    Null,
    /// Realized; region applied, device may or may not be open.
    Ready,
    /// Tuned and producing audio.
    Playing,
    /// A scan worker owns the device.
    Scanning,
}

impl RadioState {
    pub fn name(&self) -> &'static str {
        match self {
            RadioState::Uninitialized => "UNINITIALIZED",
            RadioState::Null => "NULL",
            RadioState::Ready => "READY",
            RadioState::Playing => "PLAYING",
            RadioState::Scanning => "SCANNING",
        }
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Commands gated by the admission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Create,
    Destroy,
    Realize,
    Unrealize,
    Start,
    Stop,
    Pause,
    StartScan,
    StopScan,
    SetFrequency,
    GetFrequency,
    Volume,
    Mute,
    Unmute,
    Seek,
    SetRegion,
    GetRegion,
}

const ALL_COMMANDS: &[Command] = &[
    Command::Create,
    Command::Destroy,
    Command::Realize,
    Command::Unrealize,
    Command::Start,
    Command::Stop,
    Command::Pause,
    Command::StartScan,
    Command::StopScan,
    Command::SetFrequency,
    Command::GetFrequency,
    Command::Volume,
    Command::Mute,
    Command::Unmute,
    Command::Seek,
    Command::SetRegion,
    Command::GetRegion,
];

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Create => "create",
            Command::Destroy => "destroy",
            Command::Realize => "realize",
            Command::Unrealize => "unrealize",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::StartScan => "start_scan",
            Command::StopScan => "stop_scan",
            Command::SetFrequency => "set_frequency",
            Command::GetFrequency => "get_frequency",
            Command::Volume => "volume",
            Command::Mute => "mute",
            Command::Unmute => "unmute",
            Command::Seek => "seek",
            Command::SetRegion => "set_region",
            Command::GetRegion => "get_region",
        }
    }

    /// Every command, in declaration order.
    pub fn all() -> &'static [Command] {
        ALL_COMMANDS
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Direction of a hardware seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekDirection {
    Up,
    Down,
}

impl SeekDirection {
    pub fn is_upward(&self) -> bool {
        matches!(self, SeekDirection::Up)
    }
}

impl fmt::Display for SeekDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekDirection::Up => write!(f, "up"),
            SeekDirection::Down => write!(f, "down"),
        }
    }
}

/// Error returned when a string cannot be parsed into a [`SeekDirection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSeekDirectionError(String);

impl fmt::Display for ParseSeekDirectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown seek direction: '{}'", self.0)
    }
}

impl std::error::Error for ParseSeekDirectionError {}

impl FromStr for SeekDirection {
    type Err = ParseSeekDirectionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" | "u" => Ok(SeekDirection::Up),
            "down" | "d" => Ok(SeekDirection::Down),
            _ => Err(ParseSeekDirectionError(s.to_string())),
        }
    }
}

/// Audio outputs the routing service can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Wired headset. Its cable doubles as the FM antenna.
    AudioJack,
    Speaker,
}

//! Audio focus arbitration.
//!
//! The system arbiter decides which application may produce audio. It
//! pushes [`FocusSignal`]s at any time, concurrently with application
//! calls. [`FocusEvent::classify`] turns a signal into the action the
//! handle takes, and [`FocusEvent::notify_mode`] into the way the
//! resulting state change is reported.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::state::NotifyMode;
use crate::types::RadioState;

/// Why the audio focus moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptSource {
    CallStart,
    AlarmStart,
    EmergencyStart,
    EarjackUnplug,
    Media,
    ResourceConflict,
    NotifyStart,
    OtherPlayerApp,
    /// A source the arbiter reports by raw code only.
    Other(u32),
}

impl InterruptSource {
    /// Whether the application is told about interruptions from this source.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, InterruptSource::Other(_))
    }
}

impl fmt::Display for InterruptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptSource::CallStart => write!(f, "call"),
            InterruptSource::AlarmStart => write!(f, "alarm"),
            InterruptSource::EmergencyStart => write!(f, "emergency"),
            InterruptSource::EarjackUnplug => write!(f, "earjack unplug"),
            InterruptSource::Media => write!(f, "media"),
            InterruptSource::ResourceConflict => write!(f, "resource conflict"),
            InterruptSource::NotifyStart => write!(f, "notification"),
            InterruptSource::OtherPlayerApp => write!(f, "other player"),
            InterruptSource::Other(code) => write!(f, "source {code}"),
        }
    }
}

/// What the arbiter asks the radio to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusCommand {
    Stop,
    Pause,
    Play,
    Resume,
}

/// A focus change pushed by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusSignal {
    pub command: FocusCommand,
    pub source: InterruptSource,
}

/// The handle's reaction to a [`FocusSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusEvent {
    /// Stop (or pause) playback and tear the device down.
    Stopped { cause: InterruptSource, pause: bool },
    /// The focus is available again; tell the application.
    Resumable(InterruptSource),
    /// Nothing to do.
    Ignored,
}

impl FocusEvent {
    /// Decide what `signal` means for a handle in `state`.
    ///
    /// Stop and pause only matter while playing.
    pub fn classify(signal: FocusSignal, state: RadioState) -> FocusEvent {
        match signal.command {
            FocusCommand::Stop | FocusCommand::Pause if state != RadioState::Playing => {
                FocusEvent::Ignored
            }
            FocusCommand::Stop => FocusEvent::Stopped {
                cause: signal.source,
                pause: false,
            },
            FocusCommand::Pause => FocusEvent::Stopped {
                cause: signal.source,
                pause: true,
            },
            FocusCommand::Play | FocusCommand::Resume => FocusEvent::Resumable(signal.source),
        }
    }

    /// How a state change caused by this event is reported.
    pub fn notify_mode(&self) -> NotifyMode {
        match self {
            FocusEvent::Stopped { cause, .. } if cause.is_reportable() => {
                NotifyMode::Interrupted(*cause)
            }
            FocusEvent::Stopped { .. } => NotifyMode::Silent,
            FocusEvent::Resumable(_) | FocusEvent::Ignored => NotifyMode::Post,
        }
    }
}

/// Registration token returned by [`FocusArbiter::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FocusBinding(pub u64);

/// The system audio-focus arbiter.
#[async_trait]
pub trait FocusArbiter: Send + Sync {
    /// Register a session. Signals for it are pushed into `signals`.
    async fn register(&self, signals: mpsc::UnboundedSender<FocusSignal>) -> Result<FocusBinding>;

    /// Drop the registration made by [`FocusArbiter::register`].
    async fn unregister(&self, binding: FocusBinding) -> Result<()>;

    /// Take the focus before producing audio.
    async fn acquire(&self, binding: FocusBinding) -> Result<()>;

    /// Give the focus back. `paused` marks the session as resumable.
    async fn release(&self, binding: FocusBinding, paused: bool) -> Result<()>;
}

/// Arbiter for systems without focus arbitration. Always grants.
#[derive(Debug, Default)]
pub struct NullFocusArbiter;

#[async_trait]
impl FocusArbiter for NullFocusArbiter {
    async fn register(&self, _signals: mpsc::UnboundedSender<FocusSignal>) -> Result<FocusBinding> {
        Ok(FocusBinding(0))
    }

    async fn unregister(&self, _binding: FocusBinding) -> Result<()> {
        Ok(())
    }

    async fn acquire(&self, _binding: FocusBinding) -> Result<()> {
        Ok(())
    }

    async fn release(&self, _binding: FocusBinding, _paused: bool) -> Result<()> {
        Ok(())
    }
}

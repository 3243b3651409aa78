//! Command admission and the radio state machine.
//!
//! [`admit`] is a pure table lookup from `(command, state)` to an
//! [`Admission`]. [`StateMachine`] records the current, previous, and
//! pending states and decides which notification, if any, a transition
//! produces.

use crate::error::{Error, Result};
use crate::events::RadioMessage;
use crate::focus::InterruptSource;
use crate::types::{Command, RadioState};

/// Outcome of checking a command against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run the command.
    Proceed,
    /// Already in the command's target state; succeed without side effects.
    NoOp,
    /// The command is not allowed from this state.
    Invalid,
}

/// Classify `command` against `state`.
///
/// Every command except `create` is invalid on a handle that has not been
/// created yet.
///
/// # Example
///
/// ```
/// use fmradio_core::{admit, Admission, Command, RadioState};
///
/// assert_eq!(admit(Command::Start, RadioState::Ready), Admission::Proceed);
/// assert_eq!(admit(Command::Start, RadioState::Playing), Admission::NoOp);
/// assert_eq!(admit(Command::Seek, RadioState::Ready), Admission::Invalid);
/// ```
pub fn admit(command: Command, state: RadioState) -> Admission {
    use Admission::*;
    use RadioState::*;

    if state == Uninitialized {
        return if command == Command::Create { Proceed } else { Invalid };
    }

    match command {
        Command::Create => Invalid,
        Command::Realize => match state {
            Null => Proceed,
            _ => NoOp,
        },
        Command::Unrealize => match state {
            Null => NoOp,
            _ => Proceed,
        },
        Command::Start => match state {
            Ready => Proceed,
            Playing => NoOp,
            _ => Invalid,
        },
        Command::Stop | Command::Pause => match state {
            Playing => Proceed,
            Ready => NoOp,
            _ => Invalid,
        },
        Command::StartScan => match state {
            Ready => Proceed,
            Scanning => NoOp,
            _ => Invalid,
        },
        Command::StopScan => match state {
            Scanning => Proceed,
            Ready => NoOp,
            _ => Invalid,
        },
        Command::Seek => match state {
            Playing => Proceed,
            _ => Invalid,
        },
        Command::GetRegion => match state {
            Null => Invalid,
            _ => Proceed,
        },
        Command::Destroy
        | Command::SetFrequency
        | Command::GetFrequency
        | Command::Volume
        | Command::Mute
        | Command::Unmute
        | Command::SetRegion => Proceed,
    }
}

/// How a state transition is reported.
///
/// Application calls use [`NotifyMode::Post`]. Transitions forced by a
/// focus revocation carry the revocation cause, or stay silent when the
/// cause is not one the application is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    Post,
    Interrupted(InterruptSource),
    Silent,
}

/// The observable position of a radio handle.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: RadioState,
    old: RadioState,
    pending: Option<RadioState>,
    last_command: Option<Command>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            current: RadioState::Uninitialized,
            old: RadioState::Uninitialized,
            pending: None,
            last_command: None,
        }
    }

    pub fn current(&self) -> RadioState {
        self.current
    }

    pub fn old(&self) -> RadioState {
        self.old
    }

    pub fn pending(&self) -> Option<RadioState> {
        self.pending
    }

    /// The most recently admitted command.
    pub fn last_command(&self) -> Option<Command> {
        self.last_command
    }

    /// Record a transition that has been started but not completed.
    pub fn set_pending(&mut self, state: Option<RadioState>) {
        self.pending = state;
    }

    /// Admit `command`, mapping [`Admission::Invalid`] to
    /// [`Error::InvalidState`].
    pub fn check(&mut self, command: Command) -> Result<Admission> {
        match admit(command, self.current) {
            Admission::Invalid => {
                tracing::debug!(%command, state = %self.current, "command rejected");
                Err(Error::InvalidState {
                    command,
                    state: self.current,
                })
            }
            Admission::NoOp => {
                tracing::debug!(%command, state = %self.current, "command is a no-op");
                Ok(Admission::NoOp)
            }
            Admission::Proceed => {
                self.last_command = Some(command);
                Ok(Admission::Proceed)
            }
        }
    }

    /// Move to `new_state` and return the message the move produces.
    ///
    /// Returns `None` when nothing changed or when `mode` is
    /// [`NotifyMode::Silent`].
    pub fn set_state(&mut self, new_state: RadioState, mode: NotifyMode) -> Option<RadioMessage> {
        if self.current == new_state && self.pending.is_none() {
            return None;
        }

        self.old = self.current;
        self.current = new_state;
        self.pending = None;

        tracing::debug!(old = %self.old, new = %self.current, ?mode, "state changed");

        match mode {
            NotifyMode::Post => Some(RadioMessage::StateChanged {
                previous: self.old,
                current: self.current,
            }),
            NotifyMode::Interrupted(cause) => Some(RadioMessage::StateInterrupted { cause }),
            NotifyMode::Silent => None,
        }
    }
}

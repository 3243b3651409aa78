//! Audio routing and the radio transport gate.
//!
//! [`AudioRouting`] is the system mixer: it owns the `fm_mute` route and
//! knows which outputs are connected. [`TransportGate`] is the external
//! service that powers the radio carrier (a bluetooth/FM combo chip on
//! some hardware) before the tuner node becomes usable.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::OutputKind;

/// The system audio-routing service.
#[async_trait]
pub trait AudioRouting: Send + Sync {
    /// Mute or unmute the FM path in the mixer.
    async fn set_mute(&self, muted: bool) -> Result<()>;

    /// Whether the given output is currently connected.
    async fn is_output_connected(&self, kind: OutputKind) -> Result<bool>;
}

/// Routing for systems without a mixer service.
///
/// Mutes succeed and every output reports connected.
#[derive(Debug, Default)]
pub struct NullAudioRouting;

#[async_trait]
impl AudioRouting for NullAudioRouting {
    async fn set_mute(&self, _muted: bool) -> Result<()> {
        Ok(())
    }

    async fn is_output_connected(&self, _kind: OutputKind) -> Result<bool> {
        Ok(true)
    }
}

/// Power state reported by a [`TransportGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Active,
    Inactive,
}

/// The external radio-carrier enablement service.
///
/// Reached over the system bus with three calls: turn on, turn off, and
/// query state, each naming the `fmradio` client.
#[async_trait]
pub trait TransportGate: Send + Sync {
    async fn enable(&self) -> Result<()>;
    async fn disable(&self) -> Result<()>;
    async fn state(&self) -> Result<GateState>;

    /// Whether this hardware needs the gate at all.
    fn required(&self) -> bool {
        true
    }
}

/// Gate for hardware whose tuner is always powered.
#[derive(Debug, Default)]
pub struct NullTransportGate;

#[async_trait]
impl TransportGate for NullTransportGate {
    async fn enable(&self) -> Result<()> {
        Ok(())
    }

    async fn disable(&self) -> Result<()> {
        Ok(())
    }

    async fn state(&self) -> Result<GateState> {
        Ok(GateState::Active)
    }

    fn required(&self) -> bool {
        false
    }
}

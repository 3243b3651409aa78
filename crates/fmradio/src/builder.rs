//! RadioBuilder -- fluent builder for constructing [`Radio`] handles.
//!
//! Separates wiring from construction so that callers can choose the device
//! backend, plug in the system services the handle talks to, and adjust
//! timing before the handle registers with the focus arbiter.
//!
//! Every collaborator except the device has a default that needs no system
//! service: focus is always granted, mute and jack detection are no-ops,
//! the transport gate is not required, and tuning parameters come from
//! `config.tuning_file` when set and are empty otherwise.
//!
//! # Example
//!
//! ```no_run
//! use fmradio::{RadioBuilder, RadioConfig, Region};
//! # use fmradio_core::DeviceBackend;
//!
//! # async fn example(device: impl DeviceBackend + 'static) -> fmradio::Result<()> {
//! let radio = RadioBuilder::new(device)
//!     .config(RadioConfig::default())
//!     .region(Region::Japan)
//!     .message_callback(|msg| println!("{msg:?}"))
//!     .create()
//!     .await?;
//! radio.realize().await?;
//! radio.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use fmradio_core::device::DeviceBackend;
use fmradio_core::error::Result;
use fmradio_core::events::RadioMessage;
use fmradio_core::focus::{FocusArbiter, NullFocusArbiter};
use fmradio_core::region::Region;
use fmradio_core::routing::{AudioRouting, NullAudioRouting, NullTransportGate, TransportGate};
use fmradio_core::tuning::{EmptyTuningStore, TuningStore};

use crate::config::{RadioConfig, TomlTuningStore};
use crate::radio::{Collaborators, Radio};
use crate::sink::MessageCallback;

/// Fluent builder for [`Radio`].
pub struct RadioBuilder {
    backend: Arc<dyn DeviceBackend>,
    focus: Option<Arc<dyn FocusArbiter>>,
    routing: Option<Arc<dyn AudioRouting>>,
    gate: Option<Arc<dyn TransportGate>>,
    store: Option<Arc<dyn TuningStore>>,
    config: RadioConfig,
    region: Option<Region>,
    callback: Option<MessageCallback>,
}

impl RadioBuilder {
    /// Start a builder around an owned device backend.
    pub fn new(backend: impl DeviceBackend + 'static) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Start a builder around a shared device backend.
    ///
    /// Tests keep a clone of the `Arc` to inspect the mock afterwards.
    pub fn with_backend(backend: Arc<dyn DeviceBackend>) -> Self {
        RadioBuilder {
            backend,
            focus: None,
            routing: None,
            gate: None,
            store: None,
            config: RadioConfig::default(),
            region: None,
            callback: None,
        }
    }

    pub fn focus_arbiter(mut self, focus: Arc<dyn FocusArbiter>) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn audio_routing(mut self, routing: Arc<dyn AudioRouting>) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn transport_gate(mut self, gate: Arc<dyn TransportGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Source of tuning parameters and the volume table. Overrides
    /// `config.tuning_file`.
    pub fn tuning_store(mut self, store: Arc<dyn TuningStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: RadioConfig) -> Self {
        self.config = config;
        self
    }

    /// Region applied at realize. Shorthand for setting
    /// `config.default_region`.
    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Install the message callback before any message is posted, so the
    /// initial NULL transition is delivered too.
    pub fn message_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RadioMessage) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Register with the focus arbiter and start the handle in NULL.
    ///
    /// Fails if the tuning file named by the configuration cannot be read
    /// or the arbiter refuses the registration.
    pub async fn create(self) -> Result<Radio> {
        let mut config = self.config;
        if let Some(region) = self.region {
            config.default_region = region;
        }

        let store: Arc<dyn TuningStore> = match (self.store, &config.tuning_file) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(TomlTuningStore::load(path)?),
            (None, None) => Arc::new(EmptyTuningStore),
        };

        let parts = Collaborators {
            backend: self.backend,
            focus: self.focus.unwrap_or_else(|| Arc::new(NullFocusArbiter)),
            routing: self.routing.unwrap_or_else(|| Arc::new(NullAudioRouting)),
            gate: self.gate.unwrap_or_else(|| Arc::new(NullTransportGate)),
            store,
        };
        Radio::create(config, parts, self.callback).await
    }
}

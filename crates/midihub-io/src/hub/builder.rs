//! Fluent construction of a [`Hub`].

use super::{Hub, HubDelegate};
use crate::config::HubConfig;
use crate::platform::MidiPlatform;
use crate::source::SourceDelegate;
use crate::Result;
use midihub_core::OverflowPolicy;
use std::fmt;
use std::sync::{Arc, Weak};

#[cfg(feature = "midi-io")]
use crate::platform::midir_platform::MidirPlatform;

/// Builder for [`Hub`].
///
/// # Example
///
/// ```ignore
/// let hub = HubBuilder::new()
///     .client_name("Monitor")
///     .queue_capacity(256)
///     .virtual_destination()
///     .build_midir()?;
/// ```
#[derive(Clone, Default)]
pub struct HubBuilder {
    config: HubConfig,
    delegate: Option<Weak<dyn HubDelegate>>,
    source_delegate: Option<Weak<dyn SourceDelegate>>,
}

impl fmt::Debug for HubBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubBuilder")
            .field("config", &self.config)
            .field("delegate", &self.delegate.is_some())
            .field("source_delegate", &self.source_delegate.is_some())
            .finish()
    }
}

impl HubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing config, e.g. one loaded from disk.
    pub fn from_config(config: HubConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    pub fn port_names(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.config.input_port_name = input.into();
        self.config.output_port_name = output.into();
        self
    }

    pub fn virtual_endpoint_name(mut self, name: impl Into<String>) -> Self {
        self.config.virtual_endpoint_name = name.into();
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    pub fn unbounded_queues(mut self) -> Self {
        self.config.queue_capacity = None;
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    /// Publish a virtual source other apps can listen to.
    pub fn virtual_source(mut self) -> Self {
        self.config.virtual_source_enabled = true;
        self
    }

    /// Publish a virtual destination other apps can send to.
    pub fn virtual_destination(mut self) -> Self {
        self.config.virtual_destination_enabled = true;
        self
    }

    pub fn network(mut self) -> Self {
        self.config.network_enabled = true;
        self
    }

    /// Topology observer, installed before the first enumeration so it
    /// also sees the endpoints present at startup. Held weakly.
    pub fn delegate<D: HubDelegate + 'static>(mut self, delegate: &Arc<D>) -> Self {
        let weak: Weak<D> = Arc::downgrade(delegate);
        let weak: Weak<dyn HubDelegate> = weak;
        self.delegate = Some(weak);
        self
    }

    /// Packet observer for every source, including those found at startup.
    /// Held weakly.
    pub fn source_delegate<D: SourceDelegate + 'static>(mut self, delegate: &Arc<D>) -> Self {
        let weak: Weak<D> = Arc::downgrade(delegate);
        let weak: Weak<dyn SourceDelegate> = weak;
        self.source_delegate = Some(weak);
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn build<P: MidiPlatform>(self, platform: P) -> Result<Hub<P>> {
        Hub::with_delegates(platform, self.config, self.delegate, self.source_delegate)
    }

    /// Builds on the system MIDI stack.
    #[cfg(feature = "midi-io")]
    pub fn build_midir(self) -> Result<Hub<MidirPlatform>> {
        self.build(MidirPlatform::new())
    }
}

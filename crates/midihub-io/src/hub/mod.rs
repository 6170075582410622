//! The endpoint registry.
//!
//! A [`Hub`] owns the platform client and the live set of [`Source`]s and
//! [`Destination`]s. It diffs the platform's listings against that set on
//! [`enumerate`](Hub::enumerate), manages the optional virtual endpoints and
//! network session toggle, and fans sends out to every destination.
//!
//! Every `&mut self` method must be called from the thread that owns the
//! hub. Packet callbacks never touch the hub itself, only the sources.

mod builder;

pub use builder::HubBuilder;

use crate::config::HubConfig;
use crate::connection::{Connection, HubId};
use crate::destination::Destination;
use crate::platform::{EndpointInfo, MidiPlatform, PlatformNotification};
use crate::source::{Source, SourceDelegate};
use crate::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use midihub_core::{EndpointId, PacketList, PacketQueue};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

// ============================================================================
// Observer
// ============================================================================

/// Topology observer. Called on the hub's owning thread, after the set has
/// been updated.
pub trait HubDelegate: Send + Sync {
    fn source_added(&self, _source: &Arc<Source>) {}
    fn source_removed(&self, _source: &Arc<Source>) {}
    fn destination_added(&self, _destination: &Arc<Destination>) {}
    fn destination_removed(&self, _destination: &Arc<Destination>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubEvent {
    SourceAdded(EndpointId),
    SourceRemoved(EndpointId),
    DestinationAdded(EndpointId),
    DestinationRemoved(EndpointId),
}

/// Forwards topology changes as [`HubEvent`] messages.
impl HubDelegate for Sender<HubEvent> {
    fn source_added(&self, source: &Arc<Source>) {
        let _ = self.try_send(HubEvent::SourceAdded(source.endpoint()));
    }

    fn source_removed(&self, source: &Arc<Source>) {
        let _ = self.try_send(HubEvent::SourceRemoved(source.endpoint()));
    }

    fn destination_added(&self, destination: &Arc<Destination>) {
        let _ = self.try_send(HubEvent::DestinationAdded(destination.endpoint()));
    }

    fn destination_removed(&self, destination: &Arc<Destination>) {
        let _ = self.try_send(HubEvent::DestinationRemoved(destination.endpoint()));
    }
}

// ============================================================================
// Reports
// ============================================================================

/// What one enumeration changed.
#[derive(Debug, Default)]
pub struct TopologyChange {
    pub sources_added: Vec<EndpointId>,
    pub sources_removed: Vec<EndpointId>,
    pub destinations_added: Vec<EndpointId>,
    pub destinations_removed: Vec<EndpointId>,
    /// Endpoints the platform listed but that could not be connected.
    /// They are retried on the next enumeration.
    pub failures: Vec<(EndpointId, Error)>,
}

impl TopologyChange {
    /// `true` when no endpoint was added or removed.
    pub fn is_empty(&self) -> bool {
        self.sources_added.is_empty()
            && self.sources_removed.is_empty()
            && self.destinations_added.is_empty()
            && self.destinations_removed.is_empty()
    }
}

/// Outcome of a fan-out send.
#[derive(Debug, Default)]
pub struct SendReport {
    attempted: usize,
    failures: Vec<(EndpointId, Error)>,
}

impl SendReport {
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    pub fn failures(&self) -> &[(EndpointId, Error)] {
        &self.failures
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapses the report: the number of successful sends, or
    /// [`Error::PartialSend`] if any destination failed.
    pub fn into_result(self) -> Result<usize> {
        if self.failures.is_empty() {
            Ok(self.attempted)
        } else {
            Err(Error::PartialSend {
                failed: self.failures.len(),
                attempted: self.attempted,
            })
        }
    }
}

// ============================================================================
// Hub
// ============================================================================

pub struct Hub<P: MidiPlatform> {
    id: HubId,
    config: HubConfig,
    platform: P,
    notifications: Receiver<PlatformNotification>,
    sources: Vec<Arc<Source>>,
    destinations: Vec<Arc<Destination>>,
    delegate: Option<Weak<dyn HubDelegate>>,
    source_delegate: Option<Weak<dyn SourceDelegate>>,
    /// Destination wrapper emitting on our virtual source.
    virtual_source: Option<Arc<Destination>>,
    /// Source wrapper receiving what others send to our virtual destination.
    virtual_destination: Option<Arc<Source>>,
    network_enabled: bool,
    stale_drops: Arc<AtomicU64>,
}

impl<P: MidiPlatform> Hub<P> {
    /// Acquires the platform client and ports, applies the config's toggles
    /// and runs the first enumeration.
    ///
    /// Fails if the config is invalid or the client or ports cannot be
    /// created. Toggle and enumeration failures are only logged.
    pub fn new(platform: P, config: HubConfig) -> Result<Self> {
        Self::with_delegates(platform, config, None, None)
    }

    /// Like [`new`](Self::new), with delegates installed before the first
    /// enumeration so they observe the initial `*_added` calls.
    pub(crate) fn with_delegates(
        mut platform: P,
        config: HubConfig,
        delegate: Option<Weak<dyn HubDelegate>>,
        source_delegate: Option<Weak<dyn SourceDelegate>>,
    ) -> Result<Self> {
        config.validate()?;

        let (notify_tx, notify_rx) = crossbeam_channel::unbounded();
        platform
            .create_client(&config.client_name, notify_tx)
            .inspect_err(|e| {
                tracing::error!("Failed to create MIDI client '{}': {}", config.client_name, e);
            })?;

        if let Err(e) = platform.create_ports(&config.input_port_name, &config.output_port_name) {
            tracing::error!("Failed to create MIDI ports: {}", e);
            platform.dispose_client();
            return Err(e);
        }

        let mut hub = Self {
            id: HubId::next(),
            config,
            platform,
            notifications: notify_rx,
            sources: Vec::new(),
            destinations: Vec::new(),
            delegate,
            source_delegate,
            virtual_source: None,
            virtual_destination: None,
            network_enabled: false,
            stale_drops: Arc::new(AtomicU64::new(0)),
        };
        tracing::debug!("Created MIDI hub {:?} as '{}'", hub.id, hub.config.client_name);

        // Failures are already logged by the setters
        if hub.config.network_enabled {
            let _ = hub.set_network_enabled(true);
        }
        if hub.config.virtual_source_enabled {
            let _ = hub.set_virtual_source_enabled(true);
        }
        if hub.config.virtual_destination_enabled {
            let _ = hub.set_virtual_destination_enabled(true);
        }

        if let Err(e) = hub.enumerate() {
            tracing::warn!("Initial MIDI enumeration failed: {}", e);
        }

        Ok(hub)
    }

    // ==================== Delegates ====================

    /// Held weakly; the hub never keeps the delegate alive.
    pub fn set_delegate<D: HubDelegate + 'static>(&mut self, delegate: &Arc<D>) {
        let weak: Weak<D> = Arc::downgrade(delegate);
        let weak: Weak<dyn HubDelegate> = weak;
        self.delegate = Some(weak);
    }

    pub fn clear_delegate(&mut self) {
        self.delegate = None;
    }

    /// Installs `delegate` on every current source (including the virtual
    /// destination's source) and on every source created later.
    pub fn set_source_delegate<D: SourceDelegate + 'static>(&mut self, delegate: &Arc<D>) {
        let weak: Weak<D> = Arc::downgrade(delegate);
        let weak: Weak<dyn SourceDelegate> = weak;
        for source in self.sources.iter().chain(self.virtual_destination.iter()) {
            source.set_delegate_weak(weak.clone());
        }
        self.source_delegate = Some(weak);
    }

    pub fn clear_source_delegate(&mut self) {
        for source in self.sources.iter().chain(self.virtual_destination.iter()) {
            source.clear_delegate();
        }
        self.source_delegate = None;
    }

    fn notify_delegate(&self, f: impl FnOnce(&dyn HubDelegate)) {
        if let Some(delegate) = self.delegate.as_ref().and_then(Weak::upgrade) {
            f(delegate.as_ref());
        }
    }

    // ==================== Enumeration ====================

    /// Diffs the platform's current sources and destinations against the
    /// hub's sets.
    ///
    /// Vanished endpoints are removed from the set, detached and reported
    /// before they are dropped; new endpoints are connected, inserted and
    /// reported. Running it again with unchanged topology changes nothing.
    /// If either listing fails the sets are left untouched.
    pub fn enumerate(&mut self) -> Result<TopologyChange> {
        let sources = self.platform.sources()?;
        let destinations = self.platform.destinations()?;

        let mut change = TopologyChange::default();
        self.sync_sources(sources, &mut change);
        self.sync_destinations(destinations, &mut change);

        if !change.is_empty() {
            tracing::debug!(
                "MIDI topology changed: +{}/-{} sources, +{}/-{} destinations",
                change.sources_added.len(),
                change.sources_removed.len(),
                change.destinations_added.len(),
                change.destinations_removed.len()
            );
        }
        Ok(change)
    }

    fn sync_sources(&mut self, listed: Vec<EndpointInfo>, change: &mut TopologyChange) {
        let live: HashSet<EndpointId> = listed.iter().map(|info| info.id).collect();
        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut self.sources)
            .into_iter()
            .partition(|source| live.contains(&source.endpoint()));
        self.sources = kept;

        for source in gone {
            self.retire_source(&source);
            change.sources_removed.push(source.endpoint());
            self.notify_delegate(|d| d.source_removed(&source));
        }

        for info in listed {
            let endpoint = info.id;
            if self.is_own_virtual(endpoint) || self.source(endpoint).is_some() {
                continue;
            }
            match self.attach_source(info) {
                Ok(source) => {
                    change.sources_added.push(endpoint);
                    self.notify_delegate(|d| d.source_added(&source));
                }
                Err(e) => {
                    tracing::warn!("Failed to connect MIDI source {}: {}", endpoint, e);
                    change.failures.push((endpoint, e));
                }
            }
        }
    }

    fn sync_destinations(&mut self, listed: Vec<EndpointInfo>, change: &mut TopologyChange) {
        let live: HashSet<EndpointId> = listed.iter().map(|info| info.id).collect();
        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut self.destinations)
            .into_iter()
            .partition(|destination| live.contains(&destination.endpoint()));
        self.destinations = kept;

        for destination in gone {
            destination.detach();
            tracing::debug!("Removed MIDI destination {}", destination.connection());
            change.destinations_removed.push(destination.endpoint());
            self.notify_delegate(|d| d.destination_removed(&destination));
        }

        for info in listed {
            let endpoint = info.id;
            if self.is_own_virtual(endpoint) || self.destination(endpoint).is_some() {
                continue;
            }
            match self.attach_destination(info) {
                Ok(destination) => {
                    change.destinations_added.push(endpoint);
                    self.notify_delegate(|d| d.destination_added(&destination));
                }
                Err(e) => {
                    tracing::warn!("Failed to open MIDI destination {}: {}", endpoint, e);
                    change.failures.push((endpoint, e));
                }
            }
        }
    }

    fn new_source(&self, info: EndpointInfo) -> Source {
        let queue = PacketQueue::new(self.config.queue_capacity, self.config.overflow_policy);
        let source = Source::new(
            Connection::new(self.id, info),
            queue,
            Arc::clone(&self.stale_drops),
        );
        if let Some(delegate) = &self.source_delegate {
            source.set_delegate_weak(delegate.clone());
        }
        source
    }

    fn attach_source(&mut self, info: EndpointInfo) -> Result<Arc<Source>> {
        let source = Arc::new(self.new_source(info));
        if let Err(e) = self.platform.connect_source(Arc::clone(&source)) {
            source.detach();
            return Err(e);
        }
        self.sources.push(Arc::clone(&source));
        tracing::debug!("Added MIDI source {}", source.connection());
        Ok(source)
    }

    fn retire_source(&mut self, source: &Source) {
        let discarded = source.detach();
        if let Err(e) = self.platform.disconnect_source(source.endpoint()) {
            tracing::warn!("Failed to disconnect MIDI source {}: {}", source.connection(), e);
        }
        tracing::debug!(
            "Removed MIDI source {} ({} undrained packets discarded)",
            source.connection(),
            discarded
        );
    }

    fn attach_destination(&mut self, info: EndpointInfo) -> Result<Arc<Destination>> {
        let sender = self.platform.open_destination(&info)?;
        let destination = Arc::new(Destination::new(Connection::new(self.id, info), sender));
        self.destinations.push(Arc::clone(&destination));
        tracing::debug!("Added MIDI destination {}", destination.connection());
        Ok(destination)
    }

    fn is_own_virtual(&self, endpoint: EndpointId) -> bool {
        self.virtual_source
            .as_ref()
            .is_some_and(|d| d.endpoint() == endpoint)
            || self
                .virtual_destination
                .as_ref()
                .is_some_and(|s| s.endpoint() == endpoint)
    }

    // ==================== Platform notifications ====================

    /// Applies topology notifications queued by the platform since the last
    /// call. Any number of them collapses into one enumeration.
    pub fn process_notifications(&mut self) -> Result<TopologyChange> {
        let pending = self.take_pending_notifications();
        if pending == 0 {
            return Ok(TopologyChange::default());
        }
        self.enumerate()
    }

    /// Like [`process_notifications`](Self::process_notifications), but
    /// first waits up to `timeout` for a notification to arrive.
    pub fn wait_for_notifications(&mut self, timeout: Duration) -> Result<TopologyChange> {
        match self.notifications.recv_timeout(timeout) {
            Ok(notification) => {
                tracing::trace!("MIDI platform notification: {:?}", notification);
                self.take_pending_notifications();
                self.enumerate()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                Ok(TopologyChange::default())
            }
        }
    }

    fn take_pending_notifications(&self) -> usize {
        let mut count = 0;
        for notification in self.notifications.try_iter() {
            tracing::trace!("MIDI platform notification: {:?}", notification);
            count += 1;
        }
        count
    }

    // ==================== Virtual endpoints ====================

    /// Creates or removes this client's virtual source. Idempotent.
    ///
    /// While enabled, [`virtual_source_destination`](Self::virtual_source_destination)
    /// sends through it to whoever listens.
    pub fn set_virtual_source_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.virtual_source.is_some() {
            return Ok(());
        }

        if enabled {
            let (info, sender) = self
                .platform
                .create_virtual_source(&self.config.virtual_endpoint_name)
                .inspect_err(|e| tracing::warn!("Failed to create virtual MIDI source: {}", e))?;
            let destination = Arc::new(Destination::new(Connection::new(self.id, info), sender));
            tracing::info!("Virtual MIDI source enabled: {}", destination.connection());
            self.virtual_source = Some(destination);
        } else if let Some(destination) = self.virtual_source.take() {
            if let Err(e) = self.platform.dispose_virtual_source(destination.endpoint()) {
                tracing::warn!("Failed to remove virtual MIDI source: {}", e);
                self.virtual_source = Some(destination);
                return Err(e);
            }
            destination.detach();
            tracing::info!("Virtual MIDI source disabled");
        }
        Ok(())
    }

    /// Creates or removes this client's virtual destination. Idempotent.
    ///
    /// While enabled, [`virtual_destination_source`](Self::virtual_destination_source)
    /// queues whatever other clients send to it.
    pub fn set_virtual_destination_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.virtual_destination.is_some() {
            return Ok(());
        }

        if enabled {
            let info = self
                .platform
                .create_virtual_destination(&self.config.virtual_endpoint_name)
                .inspect_err(|e| {
                    tracing::warn!("Failed to create virtual MIDI destination: {}", e)
                })?;
            let endpoint = info.id;
            let source = Arc::new(self.new_source(info));

            if let Err(e) = self.platform.connect_source(Arc::clone(&source)) {
                tracing::warn!("Failed to bind virtual MIDI destination: {}", e);
                source.detach();
                if let Err(dispose_err) = self.platform.dispose_virtual_destination(endpoint) {
                    tracing::warn!("Failed to clean up virtual MIDI destination: {}", dispose_err);
                }
                return Err(e);
            }
            tracing::info!("Virtual MIDI destination enabled: {}", source.connection());
            self.virtual_destination = Some(source);
        } else if let Some(source) = self.virtual_destination.take() {
            if let Err(e) = self.platform.dispose_virtual_destination(source.endpoint()) {
                tracing::warn!("Failed to remove virtual MIDI destination: {}", e);
                self.virtual_destination = Some(source);
                return Err(e);
            }
            self.retire_source(&source);
            tracing::info!("Virtual MIDI destination disabled");
        }
        Ok(())
    }

    // ==================== Network ====================

    /// Asks the platform to advertise network sessions. Idempotent; existing
    /// connections are unaffected.
    pub fn set_network_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.network_enabled {
            return Ok(());
        }
        self.platform
            .set_network_enabled(enabled)
            .inspect_err(|e| tracing::warn!("Failed to toggle MIDI network session: {}", e))?;
        self.network_enabled = enabled;
        tracing::info!(
            "MIDI network session {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    // ==================== Sending ====================

    /// Sends `bytes` to every destination. A failing destination does not
    /// stop the others.
    pub fn send_to_all(&self, bytes: &[u8]) -> SendReport {
        self.send_packet_list_to_all(&PacketList::from_bytes(0, bytes))
    }

    pub fn send_packet_list_to_all(&self, packets: &PacketList) -> SendReport {
        let mut report = SendReport::default();
        for destination in &self.destinations {
            report.attempted += 1;
            if let Err(e) = destination.send_packet_list(packets) {
                report.failures.push((destination.endpoint(), e));
            }
        }
        report
    }

    // ==================== Accessors ====================

    pub fn id(&self) -> HubId {
        self.id
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn sources(&self) -> &[Arc<Source>] {
        &self.sources
    }

    pub fn destinations(&self) -> &[Arc<Destination>] {
        &self.destinations
    }

    /// Looks in the source set and at the virtual destination's source.
    pub fn source(&self, endpoint: EndpointId) -> Option<&Arc<Source>> {
        self.sources
            .iter()
            .chain(self.virtual_destination.iter())
            .find(|source| source.endpoint() == endpoint)
    }

    pub fn destination(&self, endpoint: EndpointId) -> Option<&Arc<Destination>> {
        self.destinations
            .iter()
            .find(|destination| destination.endpoint() == endpoint)
    }

    pub fn number_of_connections(&self) -> usize {
        self.sources.len() + self.destinations.len()
    }

    pub fn virtual_source_destination(&self) -> Option<&Arc<Destination>> {
        self.virtual_source.as_ref()
    }

    pub fn virtual_destination_source(&self) -> Option<&Arc<Source>> {
        self.virtual_destination.as_ref()
    }

    pub fn is_virtual_source_enabled(&self) -> bool {
        self.virtual_source.is_some()
    }

    pub fn is_virtual_destination_enabled(&self) -> bool {
        self.virtual_destination.is_some()
    }

    pub fn is_network_enabled(&self) -> bool {
        self.network_enabled
    }

    /// Packets that reached any of this hub's sources after removal.
    pub fn stale_packet_drops(&self) -> u64 {
        self.stale_drops.load(Ordering::Relaxed)
    }
}

impl<P: MidiPlatform> Drop for Hub<P> {
    fn drop(&mut self) {
        for source in std::mem::take(&mut self.sources) {
            self.retire_source(&source);
        }
        for destination in std::mem::take(&mut self.destinations) {
            destination.detach();
        }

        if let Some(destination) = self.virtual_source.take() {
            destination.detach();
            if let Err(e) = self.platform.dispose_virtual_source(destination.endpoint()) {
                tracing::warn!("Failed to remove virtual MIDI source: {}", e);
            }
        }
        if let Some(source) = self.virtual_destination.take() {
            self.retire_source(&source);
            if let Err(e) = self.platform.dispose_virtual_destination(source.endpoint()) {
                tracing::warn!("Failed to remove virtual MIDI destination: {}", e);
            }
        }

        self.platform.dispose_client();
        tracing::debug!("MIDI hub {:?} torn down", self.id);
    }
}

impl<P: MidiPlatform> fmt::Debug for Hub<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("id", &self.id)
            .field("client_name", &self.config.client_name)
            .field("num_sources", &self.sources.len())
            .field("num_destinations", &self.destinations.len())
            .field("virtual_source", &self.virtual_source.is_some())
            .field("virtual_destination", &self.virtual_destination.is_some())
            .field("network_enabled", &self.network_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_report_into_result() {
        let ok = SendReport {
            attempted: 2,
            failures: vec![],
        };
        assert!(ok.is_ok());
        assert_eq!(ok.succeeded(), 2);
        assert_eq!(ok.into_result().unwrap(), 2);

        let partial = SendReport {
            attempted: 3,
            failures: vec![(EndpointId::new(1), Error::Port("gone".into()))],
        };
        assert!(!partial.is_ok());
        assert_eq!(partial.succeeded(), 2);
        assert!(matches!(
            partial.into_result(),
            Err(Error::PartialSend {
                failed: 1,
                attempted: 3
            })
        ));
    }

    #[test]
    fn test_empty_topology_change() {
        let mut change = TopologyChange::default();
        assert!(change.is_empty());

        // Failures alone are not a topology change
        change
            .failures
            .push((EndpointId::new(1), Error::Endpoint("busy".into())));
        assert!(change.is_empty());

        change.sources_added.push(EndpointId::new(2));
        assert!(!change.is_empty());
    }

    #[test]
    fn test_sender_delegate_forwards_events() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let source = Arc::new(crate::source::test_source(5, "Keys"));
        tx.source_added(&source);
        tx.source_removed(&source);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![
                HubEvent::SourceAdded(EndpointId::new(5)),
                HubEvent::SourceRemoved(EndpointId::new(5))
            ]
        );
    }
}

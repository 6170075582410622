//! The boundary to the host MIDI system.
//!
//! [`MidiPlatform`] is everything the hub needs from a driver: a client,
//! endpoint listings, per-source packet callbacks, per-destination send
//! transports, virtual endpoints and network session advertisement.
//!
//! - [`mock::MockPlatform`]: in-memory, for tests and demos
//! - [`midir_platform::MidirPlatform`]: the host MIDI system via midir (`midi-io` feature)

use crate::destination::EndpointSender;
use crate::source::Source;
use crate::Result;
use crossbeam_channel::Sender;
use midihub_core::EndpointId;
use std::sync::Arc;

#[cfg(feature = "midi-io")]
pub mod midir_platform;
pub mod mock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Source,
    Destination,
}

/// How the platform describes one endpoint in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub id: EndpointId,
    pub name: Option<String>,
    pub is_network_session: bool,
}

impl EndpointInfo {
    pub fn new(id: EndpointId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            is_network_session: false,
        }
    }

    pub fn network_session(mut self, is_network_session: bool) -> Self {
        self.is_network_session = is_network_session;
        self
    }
}

/// Pushed by the platform, from any thread, whenever its topology changes.
///
/// The hub treats all variants alike: it re-enumerates and diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformNotification {
    SetupChanged,
    EndpointAdded(EndpointKind, EndpointId),
    EndpointRemoved(EndpointKind, EndpointId),
}

/// A host MIDI system as seen by the [`Hub`](crate::Hub).
///
/// All methods are called from the hub's owning thread. The only calls that
/// happen elsewhere are the ones the platform itself makes: pushing
/// [`PlatformNotification`]s and calling [`Source::receive`] from its
/// packet callbacks.
pub trait MidiPlatform {
    /// Acquires the client handle and subscribes to topology notifications.
    fn create_client(
        &mut self,
        name: &str,
        notifications: Sender<PlatformNotification>,
    ) -> Result<()>;

    /// Releases the client handle. Called once, on hub teardown.
    fn dispose_client(&mut self);

    fn create_ports(&mut self, input_name: &str, output_name: &str) -> Result<()>;

    /// Current sources, in platform order. Excludes this client's own
    /// virtual endpoints.
    fn sources(&mut self) -> Result<Vec<EndpointInfo>>;

    /// Current destinations, in platform order. Excludes this client's own
    /// virtual endpoints.
    fn destinations(&mut self) -> Result<Vec<EndpointInfo>>;

    /// Binds the packet callback for `source.endpoint()` to `source`.
    fn connect_source(&mut self, source: Arc<Source>) -> Result<()>;

    /// Unbinds the packet callback. Late callbacks may still reach the
    /// detached `Source`, which drops them.
    fn disconnect_source(&mut self, endpoint: EndpointId) -> Result<()>;

    /// Opens the send transport for a destination.
    fn open_destination(&mut self, endpoint: &EndpointInfo) -> Result<Box<dyn EndpointSender>>;

    /// Creates a source other processes can read from. The returned sender
    /// emits on it.
    fn create_virtual_source(&mut self, name: &str)
        -> Result<(EndpointInfo, Box<dyn EndpointSender>)>;

    fn dispose_virtual_source(&mut self, endpoint: EndpointId) -> Result<()>;

    /// Creates a destination other processes can send to. Packets reach the
    /// hub once the endpoint is bound with [`connect_source`](Self::connect_source).
    fn create_virtual_destination(&mut self, name: &str) -> Result<EndpointInfo>;

    fn dispose_virtual_destination(&mut self, endpoint: EndpointId) -> Result<()>;

    /// Advertises (or stops advertising) network MIDI sessions.
    fn set_network_enabled(&mut self, enabled: bool) -> Result<()>;
}

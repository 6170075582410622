//! Host MIDI system through midir.
//!
//! midir identifies ports by a platform string id and opens one connection
//! per port, so every source gets its own input connection and every
//! destination its own output connection. Port ids are mapped to stable
//! [`EndpointId`]s for the lifetime of the platform.
//!
//! midir has no hot-plug notifications. [`MidirPlatform::with_poll_interval`]
//! starts a watcher thread that polls the port ids and posts
//! [`PlatformNotification::SetupChanged`] when they change.

use super::{EndpointInfo, EndpointKind, MidiPlatform, PlatformNotification};
use crate::destination::EndpointSender;
use crate::source::Source;
use crate::{Error, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use midihub_core::{EndpointId, PacketList};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ::midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

#[cfg(unix)]
use arc_swap::ArcSwapOption;

/// Endpoints whose name starts with this are network MIDI sessions.
const NETWORK_SESSION_PREFIX: &str = "Network Session";

struct Client {
    name: String,
    input_port_name: String,
    output_port_name: String,
    /// Used for listings only; connections get their own handles.
    probe_in: MidiInput,
    probe_out: MidiOutput,
    /// Held so the hub's receiver stays connected without a watcher.
    _notifications: Sender<PlatformNotification>,
}

#[cfg(unix)]
struct VirtualDestination {
    name: String,
    /// The source bound by `connect_source`, read by the callback.
    slot: Arc<ArcSwapOption<Source>>,
    _connection: MidiInputConnection<()>,
}

struct Watcher {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct MidirPlatform {
    client: Option<Client>,
    poll_interval: Option<Duration>,
    watcher: Option<Watcher>,

    next_id: u64,
    ids: HashMap<(EndpointKind, String), EndpointId>,
    ports: HashMap<EndpointId, String>,

    inputs: HashMap<EndpointId, MidiInputConnection<()>>,
    /// Listing entries that are our own virtual ports, and the virtual
    /// endpoint each belongs to.
    own_ports: HashMap<(EndpointKind, String), EndpointId>,
    virtual_sources: HashMap<EndpointId, String>,
    #[cfg(unix)]
    virtual_destinations: HashMap<EndpointId, VirtualDestination>,
}

impl MidirPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Polls for port changes every `interval` once the client exists.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::Client("MIDI client has not been created".into()))
    }

    fn endpoint_id(&mut self, kind: EndpointKind, port_id: String) -> EndpointId {
        if let Some(id) = self.ids.get(&(kind, port_id.clone())) {
            return *id;
        }
        let id = self.allocate();
        self.ports.insert(id, port_id.clone());
        self.ids.insert((kind, port_id), id);
        id
    }

    fn allocate(&mut self) -> EndpointId {
        self.next_id += 1;
        EndpointId::new(self.next_id)
    }

    fn port_id(&self, endpoint: EndpointId) -> Result<&String> {
        self.ports
            .get(&endpoint)
            .ok_or_else(|| Error::Endpoint(format!("unknown {endpoint}")))
    }

    /// `(port id, name)` for every port of `kind` the system lists.
    fn listed_ports(&self, kind: EndpointKind) -> Result<Vec<(String, Option<String>)>> {
        let client = self.client()?;
        Ok(match kind {
            EndpointKind::Source => client
                .probe_in
                .ports()
                .iter()
                .map(|port| (port.id(), client.probe_in.port_name(port).ok()))
                .collect(),
            EndpointKind::Destination => client
                .probe_out
                .ports()
                .iter()
                .map(|port| (port.id(), client.probe_out.port_name(port).ok()))
                .collect(),
        })
    }

    fn list(&mut self, kind: EndpointKind) -> Result<Vec<EndpointInfo>> {
        let ports = self.listed_ports(kind)?;

        let mut infos = Vec::with_capacity(ports.len());
        for (port_id, name) in ports {
            // Our own virtual ports show up in the system listings too
            if self.own_ports.contains_key(&(kind, port_id.clone())) {
                continue;
            }
            let network = name
                .as_deref()
                .is_some_and(|name| name.starts_with(NETWORK_SESSION_PREFIX));
            let id = self.endpoint_id(kind, port_id);
            infos.push(EndpointInfo::new(id, name).network_session(network));
        }
        Ok(infos)
    }

    fn start_watcher(
        &mut self,
        client_name: &str,
        notifications: Sender<PlatformNotification>,
    ) -> Result<()> {
        let Some(interval) = self.poll_interval else {
            return Ok(());
        };
        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let probe_name = format!("{client_name} watcher");

        let handle = thread::Builder::new()
            .name("midihub-watcher".to_string())
            .spawn(move || {
                let mut last = poll_port_ids(&probe_name);
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let current = poll_port_ids(&probe_name);
                            if current != last {
                                tracing::debug!("MIDI ports changed");
                                last = current;
                                if notifications.send(PlatformNotification::SetupChanged).is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::trace!("MIDI watcher thread stopped");
            })
            .map_err(|e| Error::Client(format!("failed to spawn MIDI watcher: {e}")))?;

        self.watcher = Some(Watcher { shutdown, handle });
        Ok(())
    }

    /// Port ids of `kind` listed right now, taken before a virtual port is
    /// created so the new entries can be told apart from existing ones.
    fn snapshot(&self, kind: EndpointKind) -> HashSet<String> {
        self.listed_ports(kind)
            .map(|ports| ports.into_iter().map(|(port_id, _)| port_id).collect())
            .unwrap_or_default()
    }

    fn claim_own_ports(
        &mut self,
        kind: EndpointKind,
        before: &HashSet<String>,
        name: &str,
        endpoint: EndpointId,
    ) {
        let Ok(after) = self.listed_ports(kind) else {
            return;
        };
        let Ok(client) = self.client() else {
            return;
        };
        let claimed = new_own_ports(before, &after, &client.name, name);
        if claimed.is_empty() {
            tracing::debug!("Virtual port '{}' is not listed yet", name);
        }
        for port_id in claimed {
            self.own_ports.insert((kind, port_id), endpoint);
        }
    }

    fn release_own_ports(&mut self, endpoint: EndpointId) {
        self.own_ports.retain(|_, owner| *owner != endpoint);
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.shutdown.send(());
            if watcher.handle.join().is_err() {
                tracing::warn!("MIDI watcher thread panicked");
            }
        }
    }
}

/// Entries of `after` that were not in `before` and carry our virtual port's
/// name. ALSA reports "client:port id", CoreMIDI the bare port name.
fn new_own_ports(
    before: &HashSet<String>,
    after: &[(String, Option<String>)],
    client: &str,
    name: &str,
) -> Vec<String> {
    let prefix = format!("{client}:{name} ");
    after
        .iter()
        .filter(|(port_id, _)| !before.contains(port_id))
        .filter(|(_, port_name)| {
            port_name
                .as_deref()
                .is_some_and(|port_name| port_name == name || port_name.starts_with(&prefix))
        })
        .map(|(port_id, _)| port_id.clone())
        .collect()
}

/// Sorted input and output port ids, or `None` if midir is unavailable.
fn poll_port_ids(client_name: &str) -> Option<(Vec<String>, Vec<String>)> {
    let input = MidiInput::new(client_name).ok()?;
    let output = MidiOutput::new(client_name).ok()?;
    let mut inputs: Vec<String> = input.ports().iter().map(|p| p.id()).collect();
    let mut outputs: Vec<String> = output.ports().iter().map(|p| p.id()).collect();
    inputs.sort();
    outputs.sort();
    Some((inputs, outputs))
}

fn receive_callback(source: Arc<Source>) -> impl FnMut(u64, &[u8], &mut ()) + Send + 'static {
    move |stamp, bytes, _| {
        source.receive_list(&PacketList::from_bytes(stamp, bytes));
    }
}

impl Drop for MidirPlatform {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

impl MidiPlatform for MidirPlatform {
    fn create_client(
        &mut self,
        name: &str,
        notifications: Sender<PlatformNotification>,
    ) -> Result<()> {
        let probe_in = MidiInput::new(name)?;
        let probe_out = MidiOutput::new(name)?;
        self.start_watcher(name, notifications.clone())?;

        tracing::debug!("Created midir client '{}'", name);
        self.client = Some(Client {
            name: name.to_string(),
            input_port_name: String::new(),
            output_port_name: String::new(),
            probe_in,
            probe_out,
            _notifications: notifications,
        });
        Ok(())
    }

    fn dispose_client(&mut self) {
        self.stop_watcher();
        self.inputs.clear();
        self.own_ports.clear();
        self.virtual_sources.clear();
        #[cfg(unix)]
        self.virtual_destinations.clear();
        if let Some(client) = self.client.take() {
            tracing::debug!("Disposed midir client '{}'", client.name);
        }
    }

    fn create_ports(&mut self, input_name: &str, output_name: &str) -> Result<()> {
        // midir opens one port per connection; the names are used for each
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| Error::Client("MIDI client has not been created".into()))?;
        client.input_port_name = input_name.to_string();
        client.output_port_name = output_name.to_string();
        Ok(())
    }

    fn sources(&mut self) -> Result<Vec<EndpointInfo>> {
        self.list(EndpointKind::Source)
    }

    fn destinations(&mut self) -> Result<Vec<EndpointInfo>> {
        self.list(EndpointKind::Destination)
    }

    fn connect_source(&mut self, source: Arc<Source>) -> Result<()> {
        let endpoint = source.endpoint();

        #[cfg(unix)]
        {
            if let Some(virtual_destination) = self.virtual_destinations.get(&endpoint) {
                virtual_destination.slot.store(Some(source));
                return Ok(());
            }
        }

        let port_id = self.port_id(endpoint)?.clone();
        let client = self.client()?;

        let mut input = MidiInput::new(&client.name)?;
        input.ignore(Ignore::None);
        let port = input
            .ports()
            .into_iter()
            .find(|port| port.id() == port_id)
            .ok_or_else(|| Error::Endpoint(format!("{endpoint} is no longer available")))?;

        let connection = input.connect(
            &port,
            &client.input_port_name,
            receive_callback(source),
            (),
        )?;
        self.inputs.insert(endpoint, connection);
        Ok(())
    }

    fn disconnect_source(&mut self, endpoint: EndpointId) -> Result<()> {
        #[cfg(unix)]
        {
            if let Some(virtual_destination) = self.virtual_destinations.get(&endpoint) {
                virtual_destination.slot.store(None);
                return Ok(());
            }
        }

        // Dropping the connection closes the port
        self.inputs.remove(&endpoint);
        Ok(())
    }

    fn open_destination(&mut self, endpoint: &EndpointInfo) -> Result<Box<dyn EndpointSender>> {
        let port_id = self.port_id(endpoint.id)?.clone();
        let client = self.client()?;

        let output = MidiOutput::new(&client.name)?;
        let port = output
            .ports()
            .into_iter()
            .find(|port| port.id() == port_id)
            .ok_or_else(|| Error::Endpoint(format!("{} is no longer available", endpoint.id)))?;

        let connection = output.connect(&port, &client.output_port_name)?;
        Ok(Box::new(MidirSender {
            endpoint: endpoint.id,
            connection,
        }))
    }

    #[cfg(unix)]
    fn create_virtual_source(
        &mut self,
        name: &str,
    ) -> Result<(EndpointInfo, Box<dyn EndpointSender>)> {
        use ::midir::os::unix::VirtualOutput;

        let output = MidiOutput::new(&self.client()?.name)?;
        let before = self.snapshot(EndpointKind::Source);
        let connection = output.create_virtual(name)?;

        let id = self.allocate();
        self.claim_own_ports(EndpointKind::Source, &before, name, id);
        self.virtual_sources.insert(id, name.to_string());
        let sender = MidirSender {
            endpoint: id,
            connection,
        };
        Ok((EndpointInfo::new(id, Some(name.to_string())), Box::new(sender)))
    }

    #[cfg(not(unix))]
    fn create_virtual_source(
        &mut self,
        _name: &str,
    ) -> Result<(EndpointInfo, Box<dyn EndpointSender>)> {
        Err(Error::Unsupported("virtual MIDI sources".into()))
    }

    fn dispose_virtual_source(&mut self, endpoint: EndpointId) -> Result<()> {
        // The connection closes when the hub drops its sender
        self.release_own_ports(endpoint);
        self.virtual_sources
            .remove(&endpoint)
            .map(|_| ())
            .ok_or_else(|| Error::Endpoint(format!("no virtual source {endpoint}")))
    }

    #[cfg(unix)]
    fn create_virtual_destination(&mut self, name: &str) -> Result<EndpointInfo> {
        use ::midir::os::unix::VirtualInput;

        let mut input = MidiInput::new(&self.client()?.name)?;
        input.ignore(Ignore::None);

        let before = self.snapshot(EndpointKind::Destination);
        let slot: Arc<ArcSwapOption<Source>> = Arc::new(ArcSwapOption::empty());
        let callback_slot = Arc::clone(&slot);
        let connection = input.create_virtual(
            name,
            move |stamp, bytes, _| {
                let guard = callback_slot.load();
                if let Some(source) = (*guard).as_ref() {
                    source.receive_list(&PacketList::from_bytes(stamp, bytes));
                }
            },
            (),
        )?;

        let id = self.allocate();
        self.claim_own_ports(EndpointKind::Destination, &before, name, id);
        self.virtual_destinations.insert(
            id,
            VirtualDestination {
                name: name.to_string(),
                slot,
                _connection: connection,
            },
        );
        Ok(EndpointInfo::new(id, Some(name.to_string())))
    }

    #[cfg(not(unix))]
    fn create_virtual_destination(&mut self, _name: &str) -> Result<EndpointInfo> {
        Err(Error::Unsupported("virtual MIDI destinations".into()))
    }

    #[cfg(unix)]
    fn dispose_virtual_destination(&mut self, endpoint: EndpointId) -> Result<()> {
        self.release_own_ports(endpoint);
        self.virtual_destinations
            .remove(&endpoint)
            .map(|_| ())
            .ok_or_else(|| Error::Endpoint(format!("no virtual destination {endpoint}")))
    }

    #[cfg(not(unix))]
    fn dispose_virtual_destination(&mut self, endpoint: EndpointId) -> Result<()> {
        Err(Error::Endpoint(format!("no virtual destination {endpoint}")))
    }

    fn set_network_enabled(&mut self, _enabled: bool) -> Result<()> {
        Err(Error::Unsupported("network MIDI sessions through midir".into()))
    }
}

struct MidirSender {
    endpoint: EndpointId,
    connection: MidiOutputConnection,
}

impl EndpointSender for MidirSender {
    fn send(&mut self, packets: &PacketList) -> Result<()> {
        // midir sends immediately; timestamps are not scheduled
        for packet in packets {
            self.connection
                .send(packet.bytes())
                .map_err(|e| Error::Send {
                    endpoint: self.endpoint,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}

//! Outbound endpoint: forwards payloads straight to the platform transport.

use crate::connection::Connection;
use crate::{Error, Result};
use midihub_core::{EndpointId, PacketList};
use parking_lot::Mutex;
use std::fmt;

/// Platform send transport for one destination endpoint.
pub trait EndpointSender: Send {
    fn send(&mut self, packets: &PacketList) -> Result<()>;
}

pub struct Destination {
    connection: Connection,
    /// `None` once the hub has removed this destination.
    sender: Mutex<Option<Box<dyn EndpointSender>>>,
}

impl Destination {
    pub(crate) fn new(connection: Connection, sender: Box<dyn EndpointSender>) -> Self {
        Self {
            connection,
            sender: Mutex::new(Some(sender)),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn endpoint(&self) -> EndpointId {
        self.connection.endpoint()
    }

    pub fn name(&self) -> Option<&str> {
        self.connection.name()
    }

    /// Sends a raw byte stream, split into packets timestamped "now".
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.send_packet_list(&PacketList::from_bytes(0, bytes))
    }

    pub fn send_packet_list(&self, packets: &PacketList) -> Result<()> {
        if packets.is_empty() {
            return Ok(());
        }

        let mut sender = self.sender.lock();
        let sender = sender
            .as_mut()
            .ok_or(Error::Detached(self.connection.endpoint()))?;

        sender.send(packets).inspect_err(|e| {
            tracing::warn!("MIDI send to {} failed: {}", self.connection, e);
        })
    }

    pub fn is_attached(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Releases the platform transport. Later sends fail with [`Error::Detached`].
    pub(crate) fn detach(&self) {
        self.sender.lock().take();
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("connection", &self.connection)
            .field("attached", &self.is_attached())
            .finish()
    }
}

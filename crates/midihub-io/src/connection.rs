//! Endpoint identity shared by sources and destinations.

use crate::platform::EndpointInfo;
use midihub_core::EndpointId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HUB_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the hub that created a connection, without keeping it alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HubId(u64);

impl HubId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HUB_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Identity of one platform endpoint. Written once before the owning
/// [`Source`](crate::Source) or [`Destination`](crate::Destination) is
/// published, so the callback thread reads it without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    hub: HubId,
    endpoint: EndpointId,
    name: Option<String>,
    is_network_session: bool,
}

impl Connection {
    pub(crate) fn new(hub: HubId, info: EndpointInfo) -> Self {
        Self {
            hub,
            endpoint: info.id,
            name: info.name,
            is_network_session: info.is_network_session,
        }
    }

    pub fn hub(&self) -> HubId {
        self.hub
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for display, falling back to a placeholder for unnamed endpoints.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }

    pub fn is_network_session(&self) -> bool {
        self.is_network_session
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_identity() {
        let hub = HubId::next();
        let info = EndpointInfo::new(EndpointId::new(7), Some("Keys".into()));
        let conn = Connection::new(hub, info);

        assert_eq!(conn.hub(), hub);
        assert_eq!(conn.endpoint(), EndpointId::new(7));
        assert_eq!(conn.name(), Some("Keys"));
        assert!(!conn.is_network_session());
        assert_eq!(conn.to_string(), "Keys (endpoint#7)");
    }

    #[test]
    fn test_unnamed_connection() {
        let conn = Connection::new(HubId::next(), EndpointInfo::new(EndpointId::new(1), None));
        assert_eq!(conn.name(), None);
        assert_eq!(conn.display_name(), "(unnamed)");
    }

    #[test]
    fn test_hub_ids_are_unique() {
        assert_ne!(HubId::next(), HubId::next());
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque platform handle for a MIDI source or destination.
///
/// Unique among the endpoints the platform currently reports. A handle must
/// not be used once its endpoint has been removed from the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(u64);

impl EndpointId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for EndpointId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint#{}", self.0)
    }
}

//! # midihub - MIDI endpoint hub
//!
//! Discovers a platform's MIDI sources and destinations, queues inbound
//! packets per source for a consumer thread to drain, and fans outbound
//! packets out to every destination.
//!
//! ## Architecture
//!
//! midihub is an umbrella crate over:
//! - **midihub-core** - Packets, packet lists and the per-source packet queue
//! - **midihub-io** - The hub, its sources and destinations, and the platform
//!   backends (midir and an in-memory mock)
//!
//! ## Quick Start
//!
//! ```ignore
//! use midihub::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut hub = HubBuilder::new().build_midir()?;
//! let signal = Arc::new(DataSignal::new());
//! hub.set_source_delegate(&signal);
//!
//! // Consumer side: wait for data, then drain it
//! if let Some(endpoint) = signal.recv_timeout(Duration::from_millis(100)) {
//!     for packet in hub.source(endpoint).map(|s| s.drain()).unwrap_or_default() {
//!         println!("{:02X?}", packet.bytes());
//!     }
//! }
//!
//! // Send a note-on to every destination
//! hub.send_to_all(&[0x90, 60, 100]).into_result()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `midi-io` (default) - Host MIDI backend through midir

/// Re-export of midihub-core for direct access
pub use midihub_core as core;

/// Re-export of midihub-io for direct access
pub use midihub_io as io;

pub use midihub_core::{
    EndpointId, OverflowPolicy, Packet, PacketList, PacketQueue, PushOutcome,
    DEFAULT_QUEUE_CAPACITY, PACKET_CAPACITY,
};

pub use midihub_io::{
    Connection, DataSignal, Destination, EndpointInfo, EndpointKind, EndpointSender, Hub,
    HubBuilder, HubConfig, HubDelegate, HubEvent, HubId, MidiPlatform, MockPlatform,
    PlatformNotification, SendReport, Source, SourceDelegate, SourceState, TopologyChange,
};

#[cfg(feature = "midi-io")]
pub use midihub_io::{DefaultHub, MidirPlatform};

mod error;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{
        DataSignal, Destination, EndpointId, Hub, HubBuilder, HubConfig, HubDelegate,
        OverflowPolicy, Packet, PacketList, Source, SourceDelegate,
    };

    // Backends
    pub use crate::MockPlatform;

    #[cfg(feature = "midi-io")]
    pub use crate::MidirPlatform;
}

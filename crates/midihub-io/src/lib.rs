//! MIDI endpoint hub.
//!
//! Discovers the platform's MIDI sources and destinations, queues inbound
//! packets per source for a consumer to drain, and fans outbound packets out
//! to every destination.
//!
//! Feature gates: `midi-io` (the [`MidirPlatform`] backend).
//!
//! # Threading
//!
//! Packet callbacks run on platform threads and only ever touch a
//! [`Source`]'s queue. Everything that mutates the [`Hub`] runs on the
//! thread that owns it.
//!
//! ```ignore
//! use midihub_io::{DataSignal, HubBuilder};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut hub = HubBuilder::new().virtual_destination().build_midir()?;
//! let signal = Arc::new(DataSignal::new());
//! hub.set_source_delegate(&signal);
//!
//! loop {
//!     hub.process_notifications()?;
//!     if let Some(endpoint) = signal.recv_timeout(Duration::from_millis(100)) {
//!         if let Some(source) = hub.source(endpoint) {
//!             for packet in source.drain() {
//!                 println!("{:02X?}", packet.bytes());
//!             }
//!         }
//!     }
//! }
//! ```

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::HubConfig;

mod connection;
pub use connection::{Connection, HubId};

mod source;
pub use source::{Source, SourceDelegate, SourceState};

mod destination;
pub use destination::{Destination, EndpointSender};

mod signal;
pub use signal::DataSignal;

mod hub;
pub use hub::{Hub, HubBuilder, HubDelegate, HubEvent, SendReport, TopologyChange};

pub mod platform;
pub use platform::{EndpointInfo, EndpointKind, MidiPlatform, PlatformNotification};

pub use platform::mock::MockPlatform;

#[cfg(feature = "midi-io")]
pub use platform::midir_platform::MidirPlatform;

/// Hub backed by the host's MIDI system through midir.
#[cfg(feature = "midi-io")]
pub type DefaultHub = Hub<MidirPlatform>;

pub use midihub_core::{
    EndpointId, OverflowPolicy, Packet, PacketList, PacketQueue, PushOutcome,
    DEFAULT_QUEUE_CAPACITY, PACKET_CAPACITY,
};

//! Core types for the midihub MIDI endpoint layer.
//!
//! Platform-independent pieces shared by every backend:
//!
//! - [`Packet`] / [`PacketList`]: raw MIDI bytes with a platform timestamp
//! - [`PacketQueue`]: the mutex-guarded hand-off between a platform receive
//!   callback (producer) and the consumer that drains it
//! - [`EndpointId`]: opaque platform handle for a source or destination

pub mod error;
pub use error::{Error, Result};

mod endpoint;
pub use endpoint::EndpointId;

mod packet;
pub use packet::{Packet, PacketList, PACKET_CAPACITY};

mod queue;
pub use queue::{OverflowPolicy, PacketQueue, PushOutcome, DEFAULT_QUEUE_CAPACITY};

//! Error types for the MIDI endpoint hub.

use midihub_core::EndpointId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] midihub_core::Error),

    /// The platform client could not be acquired. The hub cannot run.
    #[error("MIDI client error: {0}")]
    Client(String),

    #[error("MIDI port error: {0}")]
    Port(String),

    #[error("MIDI endpoint error: {0}")]
    Endpoint(String),

    #[error("MIDI send to {endpoint} failed: {reason}")]
    Send { endpoint: EndpointId, reason: String },

    #[error("{0} has been removed from the hub")]
    Detached(EndpointId),

    #[error("{failed} of {attempted} destinations failed to send")]
    PartialSend { failed: usize, attempted: usize },

    #[error("Not supported by this MIDI platform: {0}")]
    Unsupported(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::Client(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Error::Port(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::Port(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Centralized error type for the midihub umbrella crate.
//!
//! Wraps both subsystem errors so `?` propagates across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] midihub_core::Error),

    #[error("MIDI hub: {0}")]
    Hub(#[from] midihub_io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

use std::io;

use thiserror::Error;

use crate::utils::types::Address;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid bind address, helper address or config file. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A peer could not be dialed, or the call failed.
    #[error("peer {0} unreachable")]
    Unreachable(Address),

    /// Snapshot load/save failed. Logged by the caller, never fatal.
    #[error("snapshot i/o: {0}")]
    SnapshotIo(#[from] io::Error),

    /// The snapshot file exists but does not decode.
    #[error("snapshot format: {0}")]
    SnapshotFormat(String),

    /// The legacy resolver had no answer for a name.
    #[error("legacy dns lookup for {name} failed: {reason}")]
    Resolve { name: String, reason: String },
}

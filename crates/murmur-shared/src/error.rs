use thiserror::Error;

use crate::types::{ChannelId, ChannelKind};

/// Errors surfaced by channel operations.
///
/// Stale fetch results, ingestion while not receiving and lookup misses are
/// ordinary control flow and never show up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MurmurError {
    /// The channel kind has no backend for this operation.
    #[error("{operation} is not implemented for {kind} channels")]
    NotImplemented {
        operation: &'static str,
        kind: ChannelKind,
    },

    /// The backend call (fetch, send or acknowledge) failed.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("A message is already being sent")]
    SendInProgress,
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MurmurError>;

//! Identifiers, value types, errors and tuning constants shared by the murmur crates.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{MurmurError, Result};
pub use types::{ChannelId, ChannelKind, ConnectionStatus, MessageId, Timestamp, User, UserId};

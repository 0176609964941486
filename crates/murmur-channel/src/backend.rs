//! Capabilities a channel consumes from the outside world.
//!
//! [`Account`] is the session a channel belongs to; [`ChannelBackend`] is the
//! transport for one kind of channel. Each backend method has a default body
//! reporting [`MurmurError::NotImplemented`], so a kind that lacks an
//! operation fails loudly at the call instead of silently doing nothing.

use async_trait::async_trait;

use murmur_shared::error::{MurmurError, Result};
use murmur_shared::types::{ChannelId, ChannelKind, ConnectionStatus, Timestamp, User, UserId};

use crate::message::Message;

/// Immutable identity of a channel, handed to backend calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub kind: ChannelKind,
    pub id: ChannelId,
    pub name: String,
}

impl ChannelInfo {
    pub fn new(kind: ChannelKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: ChannelId(id.into()),
            name: name.into(),
        }
    }
}

/// The session that owns a set of channels.
///
/// Channels only ever propose a new aggregate read state; the account
/// decides what the aggregate is.
#[async_trait]
pub trait Account: Send + Sync {
    fn status(&self) -> ConnectionStatus;

    /// Aggregate read state across every channel of the account.
    fn is_read(&self) -> bool;

    fn set_read_state(&self, is_read: bool);

    /// Recompute the aggregate from the channels' own read flags.
    fn compute_read_state(&self) -> bool;

    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>>;
}

/// Transport operations for one channel kind.
#[async_trait]
pub trait ChannelBackend: Send + Sync {
    /// Fetch the most recent page of history, oldest first.
    async fn fetch_history(&self, channel: &ChannelInfo) -> Result<Vec<Message>> {
        Err(MurmurError::NotImplemented {
            operation: "fetch_history",
            kind: channel.kind,
        })
    }

    async fn send_message(&self, channel: &ChannelInfo, text: &str) -> Result<()> {
        let _ = text;
        Err(MurmurError::NotImplemented {
            operation: "send_message",
            kind: channel.kind,
        })
    }

    /// Tell the backend everything up to `ts` has been read.
    async fn acknowledge_read(&self, channel: &ChannelInfo, ts: &Timestamp) -> Result<()> {
        let _ = ts;
        Err(MurmurError::NotImplemented {
            operation: "acknowledge_read",
            kind: channel.kind,
        })
    }
}

/// Backend for kinds nobody registered a transport for.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl ChannelBackend for UnsupportedBackend {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_backend_reports_not_implemented() {
        let info = ChannelInfo::new(ChannelKind::Public, "C1", "general");
        let backend = UnsupportedBackend;

        let err = backend.fetch_history(&info).await.unwrap_err();
        assert_eq!(
            err,
            MurmurError::NotImplemented {
                operation: "fetch_history",
                kind: ChannelKind::Public,
            }
        );
        assert!(backend.send_message(&info, "hi").await.is_err());
        assert!(backend
            .acknowledge_read(&info, &Timestamp::from_secs(1))
            .await
            .is_err());
    }
}

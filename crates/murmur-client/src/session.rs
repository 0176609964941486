//! The signed-in session.
//!
//! A [`Session`] owns the channel registry and acts as the [`Account`] every
//! channel reports to: it tracks the connection, arbitrates the aggregate
//! read state, resolves users through an optional [`UserDirectory`] and
//! routes transport push events to the right channel.
//!
//! Channels only hold a weak reference back to the session, so dropping the
//! last `Arc<Session>` tears everything down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use async_trait::async_trait;
use tracing::{debug, info};

use murmur_channel::{
    Account, Channel, ChannelBackend, ChannelConfig, ChannelInfo, Message, UnsupportedBackend,
};
use murmur_shared::error::{MurmurError, Result};
use murmur_shared::types::{
    ChannelId, ChannelKind, ConnectionStatus, MessageId, Timestamp, User, UserId,
};

/// Source of user profiles, queried on cache misses.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, id: &UserId) -> Result<Option<User>>;
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub struct Session {
    this: Weak<Session>,
    config: ChannelConfig,
    status: RwLock<ConnectionStatus>,
    is_read: AtomicBool,
    channels: RwLock<HashMap<ChannelId, Channel>>,
    backends: RwLock<HashMap<ChannelKind, Arc<dyn ChannelBackend>>>,
    fallback: Arc<dyn ChannelBackend>,
    directory: RwLock<Option<Arc<dyn UserDirectory>>>,
    users: RwLock<HashMap<UserId, User>>,
}

impl Session {
    pub fn new(config: ChannelConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            status: RwLock::new(ConnectionStatus::Connecting),
            is_read: AtomicBool::new(true),
            channels: RwLock::new(HashMap::new()),
            backends: RwLock::new(HashMap::new()),
            fallback: Arc::new(UnsupportedBackend),
            directory: RwLock::new(None),
            users: RwLock::new(HashMap::new()),
        })
    }

    /// Use `backend` for every channel of `kind` created from now on.
    pub fn register_backend(&self, kind: ChannelKind, backend: Arc<dyn ChannelBackend>) {
        debug!(%kind, "Registered channel backend");
        write(&self.backends).insert(kind, backend);
    }

    pub fn set_directory(&self, directory: Arc<dyn UserDirectory>) {
        *write(&self.directory) = Some(directory);
    }

    fn backend_for(&self, kind: ChannelKind) -> Arc<dyn ChannelBackend> {
        read(&self.backends)
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    // -----------------------------------------------------------------------
    // Channel registry
    // -----------------------------------------------------------------------

    /// Create the channel described by `info`, or return the existing one
    /// with the same id.
    pub fn add_channel(&self, info: ChannelInfo) -> Channel {
        if let Some(existing) = read(&self.channels).get(&info.id) {
            return existing.clone();
        }

        let account: Weak<dyn Account> = self.this.clone();
        let backend = self.backend_for(info.kind);
        write(&self.channels)
            .entry(info.id.clone())
            .or_insert_with(|| {
                debug!(channel = %info.id, kind = %info.kind, name = %info.name, "Channel added");
                Channel::new(account, info, backend, self.config.clone())
            })
            .clone()
    }

    pub fn channel(&self, id: &ChannelId) -> Option<Channel> {
        read(&self.channels).get(id).cloned()
    }

    pub fn channels(&self) -> Vec<Channel> {
        read(&self.channels).values().cloned().collect()
    }

    /// Forget a channel. The aggregate read state is recomputed since the
    /// removed channel may have been the only unread one.
    pub fn remove_channel(&self, id: &ChannelId) -> Option<Channel> {
        let removed = write(&self.channels).remove(id);
        if removed.is_some() {
            debug!(channel = %id, "Channel removed");
            self.refresh_read_state();
        }
        removed
    }

    /// Mute or unmute a channel. Muted channels don't count towards the
    /// aggregate read state.
    pub fn set_muted(&self, id: &ChannelId, muted: bool) -> Result<()> {
        let channel = self.require(id)?;
        channel.update_flags(|flags| flags.is_muted = muted);
        self.refresh_read_state();
        Ok(())
    }

    fn require(&self, id: &ChannelId) -> Result<Channel> {
        self.channel(id)
            .ok_or_else(|| MurmurError::UnknownChannel(id.clone()))
    }

    fn refresh_read_state(&self) {
        self.set_read_state(self.compute_read_state());
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Record a connection change. Losing the connection drops every cached
    /// window, since pushes may be missed until the next fetch.
    pub fn set_status(&self, status: ConnectionStatus) {
        let previous = std::mem::replace(&mut *write(&self.status), status);
        if previous == status {
            return;
        }
        info!(?previous, current = ?status, "Connection status changed");

        if status == ConnectionStatus::Disconnected {
            let channels = self.channels();
            for channel in &channels {
                channel.clear();
            }
            debug!(count = channels.len(), "Cleared channel caches after disconnect");
        }
    }

    // -----------------------------------------------------------------------
    // Transport push routing
    // -----------------------------------------------------------------------

    pub fn dispatch_message(&self, channel_id: &ChannelId, message: Message) -> Result<()> {
        self.require(channel_id)?.dispatch_message(message);
        Ok(())
    }

    /// Returns whether a cached message was removed.
    pub fn delete_message(
        &self,
        channel_id: &ChannelId,
        id: &MessageId,
        timestamp: &Timestamp,
    ) -> Result<bool> {
        Ok(self.require(channel_id)?.delete_message(id, timestamp))
    }

    /// Returns whether a cached message was changed.
    pub fn modify_message(
        &self,
        channel_id: &ChannelId,
        id: &MessageId,
        timestamp: &Timestamp,
        text: &str,
    ) -> Result<bool> {
        Ok(self.require(channel_id)?.modify_message(id, timestamp, text))
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn cache_user(&self, user: User) {
        write(&self.users).insert(user.id.clone(), user);
    }

    pub fn cached_user(&self, id: &UserId) -> Option<User> {
        read(&self.users).get(id).cloned()
    }
}

#[async_trait]
impl Account for Session {
    fn status(&self) -> ConnectionStatus {
        *read(&self.status)
    }

    fn is_read(&self) -> bool {
        self.is_read.load(Ordering::SeqCst)
    }

    fn set_read_state(&self, is_read: bool) {
        if self.is_read.swap(is_read, Ordering::SeqCst) != is_read {
            debug!(is_read, "Session read state changed");
        }
    }

    fn compute_read_state(&self) -> bool {
        read(&self.channels)
            .values()
            .filter(|channel| !channel.is_muted())
            .all(Channel::is_read)
    }

    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>> {
        if let Some(user) = self.cached_user(id) {
            return Ok(Some(user));
        }
        let directory = read(&self.directory).clone();
        let Some(directory) = directory else {
            return Ok(None);
        };
        let user = directory.lookup(id).await?;
        if let Some(user) = &user {
            self.cache_user(user.clone());
        }
        Ok(user)
    }
}

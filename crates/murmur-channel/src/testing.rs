//! Test doubles for the account and backend capabilities.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use murmur_shared::error::{MurmurError, Result};
use murmur_shared::types::{ChannelKind, ConnectionStatus, Timestamp, User, UserId};

use crate::backend::{Account, ChannelBackend, ChannelInfo};
use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::message::Message;

// 2017-10-05 10:00:00 UTC
pub const BASE: i64 = 1_507_197_600;

pub fn msg(id: &str, offset_secs: i64, user: &str) -> Message {
    Message::new(
        id,
        Timestamp::from_secs(BASE + offset_secs),
        User::new(user, user),
        format!("text {id}"),
    )
}

pub fn ts(offset_secs: i64) -> Timestamp {
    Timestamp::from_secs(BASE + offset_secs)
}

pub struct MockAccount {
    status: Mutex<ConnectionStatus>,
    is_read: AtomicBool,
    pub read_updates: Mutex<Vec<bool>>,
    channels: Mutex<Vec<Channel>>,
}

impl MockAccount {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(ConnectionStatus::Connected),
            is_read: AtomicBool::new(true),
            read_updates: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
        })
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn track(&self, channel: &Channel) {
        self.channels.lock().unwrap().push(channel.clone());
    }

    pub fn updates(&self) -> Vec<bool> {
        self.read_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Account for MockAccount {
    fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    fn is_read(&self) -> bool {
        self.is_read.load(Ordering::SeqCst)
    }

    fn set_read_state(&self, is_read: bool) {
        self.is_read.store(is_read, Ordering::SeqCst);
        self.read_updates.lock().unwrap().push(is_read);
    }

    fn compute_read_state(&self) -> bool {
        self.channels.lock().unwrap().iter().all(|c| c.is_read())
    }

    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>> {
        Ok(Some(User {
            id: id.clone(),
            name: format!("user {id}"),
        }))
    }
}

/// Backend serving a fixed history page.
///
/// When gated, `fetch_history` blocks until [`MockBackend::open`] is called.
pub struct MockBackend {
    history: Mutex<Vec<Message>>,
    gate: Option<Semaphore>,
    fail: AtomicBool,
    pub fetch_calls: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
    pub acks: Mutex<Vec<Timestamp>>,
}

impl MockBackend {
    pub fn new(history: Vec<Message>) -> Arc<Self> {
        Arc::new(Self::build(history, None))
    }

    pub fn gated(history: Vec<Message>) -> Arc<Self> {
        Arc::new(Self::build(history, Some(Semaphore::new(0))))
    }

    fn build(history: Vec<Message>, gate: Option<Semaphore>) -> Self {
        Self {
            history: Mutex::new(history),
            gate,
            fail: AtomicBool::new(false),
            fetch_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
        }
    }

    pub fn open(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1024);
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> Vec<Timestamp> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelBackend for MockBackend {
    async fn fetch_history(&self, _channel: &ChannelInfo) -> Result<Vec<Message>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| MurmurError::Transport(e.to_string()))?
                .forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MurmurError::Transport("connection reset".into()));
        }
        Ok(self.history.lock().unwrap().clone())
    }

    async fn send_message(&self, _channel: &ChannelInfo, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MurmurError::Transport("send failed".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn acknowledge_read(&self, _channel: &ChannelInfo, ts: &Timestamp) -> Result<()> {
        self.acks.lock().unwrap().push(ts.clone());
        Ok(())
    }
}

pub fn channel_with(account: &Arc<MockAccount>, backend: Arc<dyn ChannelBackend>) -> Channel {
    let weak: Weak<dyn Account> = Arc::downgrade(account) as Weak<dyn Account>;
    let channel = Channel::new(
        weak,
        ChannelInfo::new(ChannelKind::Public, "C1", "general"),
        backend,
        ChannelConfig::default(),
    );
    account.track(&channel);
    channel
}

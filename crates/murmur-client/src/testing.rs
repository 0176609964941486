//! In-memory backend and user directory for session and view tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use murmur_channel::{ChannelBackend, ChannelInfo, Message};
use murmur_shared::error::{MurmurError, Result};
use murmur_shared::types::{ChannelKind, Timestamp, User, UserId};

use crate::session::UserDirectory;

// 2017-10-05 10:00:00 UTC
const BASE: i64 = 1_507_197_600;

pub fn info(kind: ChannelKind, id: &str) -> ChannelInfo {
    ChannelInfo::new(kind, id, format!("#{id}"))
}

pub fn msg(id: &str, offset_secs: i64, user: &str) -> Message {
    Message::new(id, ts(offset_secs), User::new(user, user), format!("text {id}"))
}

pub fn ts(offset_secs: i64) -> Timestamp {
    Timestamp::from_secs(BASE + offset_secs)
}

pub struct MemoryBackend {
    history: Vec<Message>,
    fetch_calls: AtomicUsize,
    send_gate: Option<Semaphore>,
    fail_sends: AtomicBool,
    pub sent: Mutex<Vec<String>>,
    pub acks: Mutex<Vec<Timestamp>>,
}

impl MemoryBackend {
    pub fn new(history: Vec<Message>) -> Arc<Self> {
        Arc::new(Self::build(history, None))
    }

    /// Sends block until [`MemoryBackend::release_send`] is called.
    pub fn with_send_gate(history: Vec<Message>) -> Arc<Self> {
        Arc::new(Self::build(history, Some(Semaphore::new(0))))
    }

    fn build(history: Vec<Message>, send_gate: Option<Semaphore>) -> Self {
        Self {
            history,
            fetch_calls: AtomicUsize::new(0),
            send_gate,
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
        }
    }

    pub fn release_send(&self) {
        if let Some(gate) = &self.send_gate {
            gate.add_permits(1);
        }
    }

    pub fn set_failing_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn acked(&self) -> Vec<Timestamp> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelBackend for MemoryBackend {
    async fn fetch_history(&self, _channel: &ChannelInfo) -> Result<Vec<Message>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.history.clone())
    }

    async fn send_message(&self, _channel: &ChannelInfo, text: &str) -> Result<()> {
        if let Some(gate) = &self.send_gate {
            gate.acquire()
                .await
                .map_err(|e| MurmurError::Transport(e.to_string()))?
                .forget();
        }
        if self.fail_sends.load(Ordering::SeqCst) {
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

pub struct StaticDirectory {
    users: HashMap<UserId, User>,
    lookups: AtomicUsize,
}

impl StaticDirectory {
    pub fn new(users: Vec<User>) -> Arc<Self> {
        Arc::new(Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            lookups: AtomicUsize::new(0),
        })
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn lookup(&self, id: &UserId) -> Result<Option<User>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.get(id).cloned())
    }
}

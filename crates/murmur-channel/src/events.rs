//! Per-channel event delivery.
//!
//! Every subscriber owns an unbounded mpsc receiver, so events are handed
//! over in exactly the order the channel emitted them and a slow subscriber
//! never makes the channel wait. A [`Subscription`] unsubscribes itself when
//! dropped; explicit [`Subscription::unsubscribe`] is also available.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::trace;

use murmur_shared::types::{MessageId, Timestamp};

use crate::message::Message;

/// The four notification streams a channel exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageAdded,
    MessageDeleted,
    MessageModified,
    ReadStateChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::MessageAdded,
        EventKind::MessageDeleted,
        EventKind::MessageModified,
        EventKind::ReadStateChanged,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    MessageAdded(Message),
    MessageDeleted {
        id: MessageId,
        timestamp: Timestamp,
    },
    MessageModified {
        id: MessageId,
        timestamp: Timestamp,
        text: String,
    },
    ReadStateChanged {
        is_read: bool,
    },
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageAdded(_) => EventKind::MessageAdded,
            Self::MessageDeleted { .. } => EventKind::MessageDeleted,
            Self::MessageModified { .. } => EventKind::MessageModified,
            Self::ReadStateChanged { .. } => EventKind::ReadStateChanged,
        }
    }
}

struct Subscriber {
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

type Registry = Mutex<BTreeMap<u64, Subscriber>>;

fn lock(registry: &Registry) -> MutexGuard<'_, BTreeMap<u64, Subscriber>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct EventNotifier {
    subscribers: Arc<Registry>,
    next_id: AtomicU64,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the given streams.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).insert(
            id,
            Subscriber {
                kinds: kinds.to_vec(),
                tx,
            },
        );
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(&EventKind::ALL)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Deliver `event` to every subscriber of its stream, dropping
    /// subscribers whose receiver is gone.
    pub fn emit(&self, event: ChannelEvent) {
        let kind = event.kind();
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|id, sub| {
            if !sub.kinds.contains(&kind) {
                return true;
            }
            let alive = sub.tx.send(event.clone()).is_ok();
            if !alive {
                trace!(subscriber = id, "Dropping closed subscriber");
            }
            alive
        });
    }
}

/// Receiving end of a channel subscription.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything already delivered.
    pub fn drain(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn unsubscribe(self) {}

    fn detach(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

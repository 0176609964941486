//! The per-conversation aggregate.
//!
//! A [`Channel`] owns its message window, read markers, reference counts,
//! timers and in-flight fetch. All local mutation happens under one mutex
//! that is never held across an `.await`; the only suspension points are the
//! backend calls. Calls into the [`Account`] are made after the lock is
//! released, since the account reads every channel's state when it
//! recomputes the aggregate.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use serde::Serialize;
use tracing::{debug, trace, warn};

use murmur_shared::constants::DEFAULT_DESCRIPTION;
use murmur_shared::error::{MurmurError, Result};
use murmur_shared::types::{
    ChannelId, ChannelKind, ConnectionStatus, MessageId, Timestamp, User, UserId,
};

use crate::backend::{Account, ChannelBackend, ChannelInfo};
use crate::config::ChannelConfig;
use crate::events::{ChannelEvent, EventKind, EventNotifier, Subscription};
use crate::fetch::{self, FetchCoordinator};
use crate::lifecycle::Lifecycle;
use crate::message::Message;
use crate::read_state::{ReadState, ReadTransition};
use crate::timer::DeferredTask;
use crate::window::MessageWindow;

/// Metadata assigned by the backend. No invariants tie these together.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChannelFlags {
    pub description: String,
    pub is_member: bool,
    pub is_private: bool,
    pub is_default: bool,
    pub is_multi_party: bool,
    pub is_muted: bool,
}

impl Default for ChannelFlags {
    fn default() -> Self {
        Self {
            description: DEFAULT_DESCRIPTION.to_string(),
            is_member: false,
            is_private: false,
            is_default: false,
            is_multi_party: false,
            is_muted: false,
        }
    }
}

struct ChannelState {
    flags: ChannelFlags,
    read: ReadState,
    lifecycle: Lifecycle,
    window: MessageWindow,
    /// The window reflects a consistent, fetched history.
    messages_ready: bool,
    fetch: FetchCoordinator,
    stop_timer: DeferredTask,
    mark_timer: DeferredTask,
}

struct ChannelInner {
    info: ChannelInfo,
    account: Weak<dyn Account>,
    backend: Arc<dyn ChannelBackend>,
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    events: EventNotifier,
}

/// Cheaply clonable handle to one conversation.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub fn new(
        account: Weak<dyn Account>,
        info: ChannelInfo,
        backend: Arc<dyn ChannelBackend>,
        config: ChannelConfig,
    ) -> Self {
        let state = ChannelState {
            flags: ChannelFlags::default(),
            read: ReadState::new(),
            lifecycle: Lifecycle::new(),
            window: MessageWindow::new(&config),
            messages_ready: false,
            fetch: FetchCoordinator::new(),
            stop_timer: DeferredTask::new(),
            mark_timer: DeferredTask::new(),
        };
        Self {
            inner: Arc::new(ChannelInner {
                info,
                account,
                backend,
                config,
                state: Mutex::new(state),
                events: EventNotifier::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Identity and metadata
    // -----------------------------------------------------------------------

    pub fn info(&self) -> &ChannelInfo {
        &self.inner.info
    }

    pub fn id(&self) -> &ChannelId {
        &self.inner.info.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.inner.info.kind
    }

    pub fn name(&self) -> &str {
        &self.inner.info.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn flags(&self) -> ChannelFlags {
        self.state().flags.clone()
    }

    pub fn update_flags(&self, update: impl FnOnce(&mut ChannelFlags)) {
        update(&mut self.state().flags);
    }

    pub fn is_muted(&self) -> bool {
        self.state().flags.is_muted
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn read_state(&self) -> ReadState {
        self.state().read.clone()
    }

    pub fn is_read(&self) -> bool {
        self.state().read.is_read
    }

    pub fn last_read_ts(&self) -> Option<Timestamp> {
        self.state().read.last_read_ts.clone()
    }

    pub fn first_unread_ts(&self) -> Option<Timestamp> {
        self.state().read.first_unread_ts.clone()
    }

    pub fn latest_ts(&self) -> Option<Timestamp> {
        self.state().read.latest_ts.clone()
    }

    pub fn is_displaying(&self) -> bool {
        self.state().lifecycle.is_displaying()
    }

    pub fn viewer_count(&self) -> usize {
        self.state().lifecycle.viewer_count()
    }

    pub fn is_receiving(&self) -> bool {
        self.state().lifecycle.is_receiving()
    }

    pub fn receiver_count(&self) -> usize {
        self.state().lifecycle.receiver_count()
    }

    pub fn messages_ready(&self) -> bool {
        self.state().messages_ready
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().window.to_vec()
    }

    pub fn has_messages(&self) -> bool {
        !self.state().window.is_empty()
    }

    pub fn latest_message(&self) -> Option<Message> {
        self.state().window.latest().cloned()
    }

    pub fn is_fetching(&self) -> bool {
        self.state().fetch.is_in_flight()
    }

    pub fn fetches_started(&self) -> u64 {
        self.state().fetch.fetches_started()
    }

    /// Whether a debounced read acknowledgment is waiting to be sent.
    pub fn acknowledge_pending(&self) -> bool {
        self.state().mark_timer.is_pending()
    }

    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        self.inner.events.subscribe(kinds)
    }

    pub fn subscribe_all(&self) -> Subscription {
        self.inner.events.subscribe_all()
    }

    /// Look a user up through the owning account.
    pub async fn user(&self, id: &UserId) -> Result<Option<User>> {
        match self.inner.account.upgrade() {
            Some(account) => account.fetch_user(id).await,
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Read state
    // -----------------------------------------------------------------------

    pub fn mark_read(&self) {
        let transition = {
            let mut st = self.state();
            self.apply_mark_read(&mut st)
        };
        self.propagate(transition);
    }

    pub fn mark_unread(&self) {
        let transition = {
            let mut st = self.state();
            self.apply_mark_unread(&mut st)
        };
        self.propagate(transition);
    }

    /// Mark read now and acknowledge to the backend once activity settles.
    pub fn notify_read(&self) {
        let transition = {
            let mut st = self.state();
            self.apply_notify_read(&mut st)
        };
        self.propagate(transition);
    }

    /// Acknowledge the current read position right away.
    pub async fn acknowledge_read(&self) -> Result<()> {
        let ts = self.state().read.last_read_ts.clone();
        self.acknowledge_read_at(ts).await
    }

    fn apply_mark_read(&self, st: &mut ChannelState) -> Option<ReadTransition> {
        let transition = st.read.mark_read();
        if transition.is_some() {
            debug!(channel = %self.id(), "Channel marked read");
            self.inner
                .events
                .emit(ChannelEvent::ReadStateChanged { is_read: true });
        }
        transition
    }

    fn apply_mark_unread(&self, st: &mut ChannelState) -> Option<ReadTransition> {
        let transition = st.read.mark_unread(st.lifecycle.is_displaying());
        if transition.is_some() {
            debug!(channel = %self.id(), "Channel marked unread");
            self.inner
                .events
                .emit(ChannelEvent::ReadStateChanged { is_read: false });
        }
        transition
    }

    fn apply_notify_read(&self, st: &mut ChannelState) -> Option<ReadTransition> {
        let transition = self.apply_mark_read(st);
        if !st.window.is_empty() {
            let weak = Arc::downgrade(&self.inner);
            st.mark_timer
                .schedule(self.inner.config.mark_read_delay, |generation| async move {
                    if let Some(inner) = weak.upgrade() {
                        Channel { inner }.acknowledge_deferred(generation).await;
                    }
                });
        }
        transition
    }

    /// Forward a read transition to the account aggregate.
    fn propagate(&self, transition: Option<ReadTransition>) {
        let Some(transition) = transition else {
            return;
        };
        let Some(account) = self.inner.account.upgrade() else {
            return;
        };
        match transition {
            ReadTransition::BecameRead => {
                if !account.is_read() {
                    account.set_read_state(account.compute_read_state());
                }
            }
            ReadTransition::BecameUnread => {
                if account.is_read() {
                    account.set_read_state(false);
                }
            }
        }
    }

    async fn acknowledge_deferred(&self, generation: u64) {
        let ts = {
            let mut st = self.state();
            if !st.mark_timer.disarm(generation) {
                trace!(channel = %self.id(), "Superseded acknowledgment skipped");
                return;
            }
            st.read.last_read_ts.clone()
        };
        if let Err(e) = self.acknowledge_read_at(ts).await {
            warn!(channel = %self.id(), error = %e, "Failed to acknowledge read position");
        }
    }

    async fn acknowledge_read_at(&self, ts: Option<Timestamp>) -> Result<()> {
        let Some(ts) = ts else {
            return Ok(());
        };
        self.inner
            .backend
            .acknowledge_read(&self.inner.info, &ts)
            .await?;
        debug!(channel = %self.id(), ts = %ts, "Read position acknowledged");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn select(&self) {
        let transition = {
            let mut st = self.state();
            st.lifecycle.select();
            debug!(
                channel = %self.id(),
                viewers = st.lifecycle.viewer_count(),
                "Channel selected"
            );
            if st.messages_ready {
                self.apply_mark_read(&mut st)
            } else {
                None
            }
        };
        self.propagate(transition);
    }

    pub fn deselect(&self) {
        let mut st = self.state();
        st.lifecycle.deselect();
        debug!(
            channel = %self.id(),
            viewers = st.lifecycle.viewer_count(),
            "Channel deselected"
        );
    }

    pub fn start_receiving(&self) {
        let mut st = self.state();
        st.lifecycle.start_receiving();
        if st.stop_timer.cancel() {
            debug!(channel = %self.id(), "Cancelled pending stop");
        }
    }

    /// Detach a receiver. The cache survives for the configured grace period
    /// after the last one leaves.
    pub fn stop_receiving(&self) {
        let mut st = self.state();
        if !st.lifecycle.stop_receiving() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let grace = self.inner.config.stop_receiving_after;
        st.stop_timer.schedule(grace, |generation| async move {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.stop_receiving_elapsed(generation);
            }
        });
        debug!(channel = %self.id(), grace_secs = grace.as_secs(), "Last receiver left");
    }

    fn stop_receiving_elapsed(&self, generation: u64) {
        let mut st = self.state();
        // A receiver came and went while this run waited for the lock.
        if !st.stop_timer.disarm(generation) {
            return;
        }
        if st.lifecycle.grace_elapsed() {
            Self::clear_locked(&mut st);
            debug!(channel = %self.id(), "Stopped receiving, cache dropped");
        }
    }

    /// Drop the cached window and force a fetch on next access.
    pub fn clear(&self) {
        Self::clear_locked(&mut self.state());
    }

    fn clear_locked(st: &mut ChannelState) {
        st.messages_ready = false;
        st.window.clear();
    }

    // -----------------------------------------------------------------------
    // Live ingestion
    // -----------------------------------------------------------------------

    /// Ingest a live message pushed by the transport.
    pub fn dispatch_message(&self, message: Message) {
        let transition = {
            let mut st = self.state();
            st.read.observe(&message);

            let transition = if st.lifecycle.is_displaying() {
                let transition = self.apply_notify_read(&mut st);
                st.read.last_read_ts = st.read.latest_ts.clone();
                transition
            } else {
                let transition = self.apply_mark_unread(&mut st);
                st.read.note_unread_from_latest();
                transition
            };

            if !st.lifecycle.is_receiving() {
                // Not caching: whatever is stored is now stale.
                st.messages_ready = false;
            } else {
                match st.fetch.hold(message) {
                    Ok(()) => trace!(channel = %self.id(), "Holding message until fetch settles"),
                    Err(message) => self.insert_live(&mut st, message),
                }
            }
            transition
        };
        self.propagate(transition);
    }

    fn insert_live(&self, st: &mut ChannelState, message: Message) {
        let last_read = st.read.last_read_ts.clone();
        let outcome = st.window.insert(message, last_read.as_ref());
        st.read.accept_first_unread(outcome.first_unread);
        if outcome.evicted > 0 {
            debug!(channel = %self.id(), evicted = outcome.evicted, "Trimmed message window");
        }

        let Some(stored) = outcome.index.and_then(|i| st.window.get(i)) else {
            return;
        };
        let event = if outcome.replaced {
            ChannelEvent::MessageModified {
                id: stored.id.clone(),
                timestamp: stored.timestamp.clone(),
                text: stored.text.clone(),
            }
        } else {
            ChannelEvent::MessageAdded(stored.clone())
        };
        self.inner.events.emit(event);
    }

    /// Remove a cached message. Misses (including messages beyond the
    /// backward scan) are ignored.
    pub fn delete_message(&self, id: &MessageId, timestamp: &Timestamp) -> bool {
        let mut st = self.state();
        if !st.lifecycle.is_receiving() {
            return false;
        }
        let Some(index) = st.window.lookup(id, timestamp) else {
            trace!(channel = %self.id(), message = %id, "Delete target not cached");
            return false;
        };
        st.window.remove(index);
        self.inner.events.emit(ChannelEvent::MessageDeleted {
            id: id.clone(),
            timestamp: timestamp.clone(),
        });
        true
    }

    /// Replace the text of a cached message.
    pub fn modify_message(&self, id: &MessageId, timestamp: &Timestamp, text: &str) -> bool {
        let mut st = self.state();
        if !st.lifecycle.is_receiving() {
            return false;
        }
        let Some(message) = st
            .window
            .lookup(id, timestamp)
            .and_then(|index| st.window.get_mut(index))
        else {
            trace!(channel = %self.id(), message = %id, "Modify target not cached");
            return false;
        };
        message.text = text.to_string();
        self.inner.events.emit(ChannelEvent::MessageModified {
            id: id.clone(),
            timestamp: timestamp.clone(),
            text: text.to_string(),
        });
        true
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Return the cached history, fetching it first if the cache is not
    /// ready. Concurrent callers share a single fetch.
    ///
    /// A fetch that completes after the account disconnected is discarded:
    /// the result is empty and the channel stays not ready.
    pub async fn ensure_history(&self) -> Result<Vec<Message>> {
        let (future, started) = {
            let mut st = self.state();
            if st.messages_ready {
                return Ok(st.window.to_vec());
            }
            let weak = Arc::downgrade(&self.inner);
            let backend = self.inner.backend.clone();
            let info = self.inner.info.clone();
            st.fetch
                .join_or_start(move |id| Self::spawn_fetch(weak, backend, info, id))
        };

        if started {
            debug!(channel = %self.id(), "Fetching history");
        } else {
            trace!(channel = %self.id(), "Joining in-flight history fetch");
        }
        future.await
    }

    /// Run fetch `id` and its merge on its own task, so it settles even if
    /// every caller stops waiting.
    fn spawn_fetch(
        weak: Weak<ChannelInner>,
        backend: Arc<dyn ChannelBackend>,
        info: ChannelInfo,
        id: u64,
    ) -> BoxFuture<'static, Result<Vec<Message>>> {
        let settle = {
            let weak = weak.clone();
            move |fetched: Result<Vec<Message>>| match weak.upgrade() {
                Some(inner) => Channel { inner }.complete_fetch(id, fetched),
                None => fetched,
            }
        };
        let task = {
            let settle = settle.clone();
            async move { settle(backend.fetch_history(&info).await) }
        };

        match Handle::try_current() {
            Ok(runtime) => runtime
                .spawn(task)
                .map(move |joined| {
                    joined.unwrap_or_else(|e| {
                        settle(Err(MurmurError::Transport(format!(
                            "history fetch task failed: {e}"
                        ))))
                    })
                })
                .boxed(),
            Err(_) => {
                warn!("No tokio runtime, history fetch runs on the caller");
                task.boxed()
            }
        }
    }

    fn complete_fetch(&self, id: u64, fetched: Result<Vec<Message>>) -> Result<Vec<Message>> {
        let connected = self
            .inner
            .account
            .upgrade()
            .is_some_and(|account| account.status() == ConnectionStatus::Connected);

        let mut st = self.state();
        let Some(held) = st.fetch.settle(id) else {
            return fetched;
        };

        let batch = match fetched {
            Ok(batch) => batch,
            Err(e) => {
                warn!(channel = %self.id(), error = %e, "History fetch failed");
                self.replay_held(&mut st, held);
                return Err(e);
            }
        };

        let count = batch.len();
        let last_read = st.read.last_read_ts.clone();
        let merge = st.window.prepend_history(batch, last_read.as_ref());
        st.read.accept_first_unread(merge.first_unread);
        let newest = st.window.latest().map(|m| m.timestamp.clone());
        st.read.seed_latest(newest.as_ref());

        if connected {
            st.messages_ready = true;
            self.replay_held(&mut st, held);
            debug!(
                channel = %self.id(),
                fetched = count,
                added = merge.added,
                cached = st.window.len(),
                "History ready"
            );
        } else {
            Self::clear_locked(&mut st);
            debug!(channel = %self.id(), "Discarding history fetched while disconnected");
        }
        Ok(st.window.to_vec())
    }

    fn replay_held(&self, st: &mut ChannelState, held: Vec<Message>) {
        let total = held.len();
        let fresh = fetch::uncovered(held, st.window.latest());
        if fresh.len() < total {
            trace!(
                channel = %self.id(),
                dropped = total - fresh.len(),
                "Held messages already covered by fetch"
            );
        }
        for message in fresh {
            self.insert_live(st, message);
        }
    }

    // -----------------------------------------------------------------------
    // Outgoing
    // -----------------------------------------------------------------------

    pub async fn send_message(&self, text: &str) -> Result<()> {
        if let Err(e) = self.inner.backend.send_message(&self.inner.info, text).await {
            warn!(channel = %self.id(), error = %e, "Failed to send message");
            return Err(e);
        }
        debug!(channel = %self.id(), "Message sent");
        Ok(())
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", self.id())
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

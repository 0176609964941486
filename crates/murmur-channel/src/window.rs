//! Bounded, date-ordered message window.
//!
//! The window keeps a channel's cached history sorted by ascending date,
//! recomputes fold and day-marker flags whenever a message's predecessor
//! changes, and evicts the oldest messages in batches once it grows past its
//! soft capacity. It never dispatches events; the owning channel does.

use std::collections::HashSet;

use chrono::FixedOffset;

use murmur_shared::types::{MessageId, Timestamp};

use crate::config::ChannelConfig;
use crate::message::Message;

/// Parameters for fold and day-marker computation.
#[derive(Debug, Clone)]
pub struct FoldRules {
    pub gap: chrono::Duration,
    pub offset: FixedOffset,
}

impl From<&ChannelConfig> for FoldRules {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            gap: config.fold_gap,
            offset: config.day_offset(),
        }
    }
}

/// Compute `m`'s flags against its predecessor `pm`.
///
/// Returns `true` when `pm` is the last read message, making `m` the first
/// unread one.
pub fn compare_message(
    m: &mut Message,
    pm: &Message,
    rules: &FoldRules,
    last_read: Option<&Timestamp>,
) -> bool {
    if m.user.id == pm.user.id && m.date - pm.date < rules.gap {
        m.is_folded = true;
    }
    if m.day(&rules.offset) != pm.day(&rules.offset) {
        m.set_day_marker();
    }
    last_read.is_some_and(|ts| *ts == pm.timestamp)
}

/// Recompute flags for a whole sequence.
///
/// The first entry always starts a day. Returns the timestamp of the message
/// following the last read one, if the sequence contains it.
pub fn fold_messages(
    messages: &mut [Message],
    rules: &FoldRules,
    last_read: Option<&Timestamp>,
) -> Option<Timestamp> {
    let mut first_unread = None;
    for i in 0..messages.len() {
        messages[i].reset_presentation();
        if i == 0 {
            messages[i].set_day_marker();
            continue;
        }
        let (head, tail) = messages.split_at_mut(i);
        if compare_message(&mut tail[0], &head[i - 1], rules, last_read) {
            first_unread = Some(tail[0].timestamp.clone());
        }
    }
    first_unread
}

/// Result of [`MessageWindow::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Final index of the message, `None` if it was evicted right away.
    pub index: Option<usize>,
    /// An existing message with the same id was overwritten.
    pub replaced: bool,
    /// Number of messages dropped by eviction.
    pub evicted: usize,
    /// New first-unread candidate discovered while folding.
    pub first_unread: Option<Timestamp>,
}

/// Result of [`MessageWindow::prepend_history`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryMerge {
    pub added: usize,
    pub evicted: usize,
    pub first_unread: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct MessageWindow {
    messages: Vec<Message>,
    capacity: usize,
    eviction_batch: usize,
    rules: FoldRules,
}

impl MessageWindow {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            messages: Vec::new(),
            capacity: config.cache_limit,
            eviction_batch: config.eviction_batch.max(1),
            rules: FoldRules::from(config),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Message> {
        self.messages.get_mut(index)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Find a message by scanning backward from the newest entry.
    ///
    /// The scan gives up as soon as it meets a message dated before
    /// `timestamp`, so a match sitting behind an out-of-order older entry is
    /// reported as absent.
    pub fn lookup(&self, id: &MessageId, timestamp: &Timestamp) -> Option<usize> {
        let target = timestamp.to_datetime();
        for (i, message) in self.messages.iter().enumerate().rev() {
            if message.id == *id {
                return Some(i);
            }
            if message.date < target {
                return None;
            }
        }
        None
    }

    /// Insert `message` at its date position, or overwrite the entry with
    /// the same id when [`lookup`](Self::lookup) finds one.
    pub fn insert(&mut self, message: Message, last_read: Option<&Timestamp>) -> InsertOutcome {
        if let Some(index) = self.lookup(&message.id, &message.timestamp) {
            self.messages[index] = message;
            let first_unread = self.refold_around(index, last_read);
            return InsertOutcome {
                index: Some(index),
                replaced: true,
                evicted: 0,
                first_unread,
            };
        }

        let mut pos = self.messages.len();
        while pos > 0 && self.messages[pos - 1].date > message.date {
            pos -= 1;
        }
        self.messages.insert(pos, message);
        let first_unread = self.refold_around(pos, last_read);

        let evicted = self.enforce_capacity();
        InsertOutcome {
            index: pos.checked_sub(evicted),
            replaced: false,
            evicted,
            first_unread,
        }
    }

    /// Merge an older history page in front of the current contents.
    ///
    /// Messages already in the window win over fetched copies with the same
    /// id. If the page overlaps the window in time the whole window is
    /// re-sorted (stably) and refolded.
    pub fn prepend_history(
        &mut self,
        mut batch: Vec<Message>,
        last_read: Option<&Timestamp>,
    ) -> HistoryMerge {
        let known: HashSet<&MessageId> = self.messages.iter().map(|m| &m.id).collect();
        batch.retain(|m| !known.contains(&m.id));
        batch.sort_by(|a, b| a.date.cmp(&b.date));

        let added = batch.len();
        let mut first_unread = fold_messages(&mut batch, &self.rules, last_read);

        let boundary = batch.len();
        batch.append(&mut self.messages);
        self.messages = batch;

        if boundary > 0 && boundary < self.messages.len() {
            if self.messages[boundary - 1].date > self.messages[boundary].date {
                self.messages.sort_by(|a, b| a.date.cmp(&b.date));
                first_unread = fold_messages(&mut self.messages, &self.rules, last_read);
            } else if let Some(ts) = self.refold_at(boundary, last_read) {
                first_unread = Some(ts);
            }
        }

        let evicted = self.enforce_capacity();
        HistoryMerge {
            added,
            evicted,
            first_unread,
        }
    }

    pub fn remove(&mut self, index: usize) -> Message {
        let removed = self.messages.remove(index);
        if index < self.messages.len() {
            self.refold_at(index, None);
        }
        removed
    }

    fn refold_around(&mut self, index: usize, last_read: Option<&Timestamp>) -> Option<Timestamp> {
        let own = self.refold_at(index, last_read);
        let next = if index + 1 < self.messages.len() {
            self.refold_at(index + 1, last_read)
        } else {
            None
        };
        next.or(own)
    }

    fn refold_at(&mut self, index: usize, last_read: Option<&Timestamp>) -> Option<Timestamp> {
        self.messages[index].reset_presentation();
        if index == 0 {
            self.messages[0].set_day_marker();
            return None;
        }
        let (head, tail) = self.messages.split_at_mut(index);
        compare_message(&mut tail[0], &head[index - 1], &self.rules, last_read)
            .then(|| tail[0].timestamp.clone())
    }

    /// Drop the oldest messages in batches until the window fits again.
    fn enforce_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.messages.len() > self.capacity {
            let n = self.eviction_batch.min(self.messages.len());
            self.messages.drain(..n);
            evicted += n;
        }
        if evicted > 0 {
            if let Some(first) = self.messages.first_mut() {
                first.set_day_marker();
            }
        }
        evicted
    }
}

//! Read/unread markers for one channel.
//!
//! `ReadState` only tracks the markers. Propagating a transition to the
//! account aggregate and acknowledging the read position to the backend are
//! the channel's job, driven by the [`ReadTransition`] values returned here.

use serde::Serialize;

use murmur_shared::types::Timestamp;

use crate::message::Message;

/// A change of the channel's read flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTransition {
    BecameRead,
    BecameUnread,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadState {
    /// Whether every message of the channel has been read.
    pub is_read: bool,
    /// Timestamp of the last acknowledged message.
    pub last_read_ts: Option<Timestamp>,
    /// Timestamp of the oldest unread message.
    pub first_unread_ts: Option<Timestamp>,
    /// Timestamp of the newest non-sub message seen.
    pub latest_ts: Option<Timestamp>,
}

impl ReadState {
    pub fn new() -> Self {
        Self {
            is_read: true,
            last_read_ts: None,
            first_unread_ts: None,
            latest_ts: None,
        }
    }

    /// Advance `latest_ts` for a non-sub message newer than anything seen.
    pub fn observe(&mut self, message: &Message) -> bool {
        if message.is_sub {
            return false;
        }
        match &self.latest_ts {
            Some(latest) if *latest >= message.timestamp => false,
            _ => {
                self.latest_ts = Some(message.timestamp.clone());
                true
            }
        }
    }

    /// Clear the unread marker and move the read position to `latest_ts`.
    ///
    /// The markers are always reset; the transition is only reported when
    /// the channel was unread.
    pub fn mark_read(&mut self) -> Option<ReadTransition> {
        self.last_read_ts = self.latest_ts.clone();
        self.first_unread_ts = None;
        if self.is_read {
            return None;
        }
        self.is_read = true;
        Some(ReadTransition::BecameRead)
    }

    /// A displayed channel can't become unread.
    pub fn mark_unread(&mut self, is_displaying: bool) -> Option<ReadTransition> {
        if !self.is_read || is_displaying {
            return None;
        }
        self.is_read = false;
        Some(ReadTransition::BecameUnread)
    }

    /// Remember where unread messages begin, unless already known.
    pub fn note_unread_from_latest(&mut self) {
        if self.first_unread_ts.is_none() && !self.is_read {
            self.first_unread_ts = self.latest_ts.clone();
        }
    }

    /// Accept a first-unread candidate found while folding.
    pub fn accept_first_unread(&mut self, candidate: Option<Timestamp>) {
        if let Some(ts) = candidate {
            if !self.is_read {
                self.first_unread_ts = Some(ts);
            }
        }
    }

    /// Seed `latest_ts` from history when nothing live has been seen yet.
    pub fn seed_latest(&mut self, ts: Option<&Timestamp>) {
        if self.latest_ts.is_none() {
            self.latest_ts = ts.cloned();
        }
    }
}

impl Default for ReadState {
    fn default() -> Self {
        Self::new()
    }
}

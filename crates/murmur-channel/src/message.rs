use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use murmur_shared::types::{MessageId, Timestamp, User};

/// A single message held in a channel's window.
///
/// Identity and content come from the source; `is_folded` and `day_marker`
/// are presentation flags recomputed by the window whenever the message's
/// predecessor changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub timestamp: Timestamp,
    /// Wall-clock instant derived from `timestamp`.
    pub date: DateTime<Utc>,
    pub user: User,
    pub text: String,
    /// Thread replies and other secondary events; they never advance the
    /// channel's latest timestamp.
    pub is_sub: bool,
    /// Visually merged with the previous message.
    pub is_folded: bool,
    /// First message of a calendar day.
    pub day_marker: bool,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        timestamp: Timestamp,
        user: User,
        text: impl Into<String>,
    ) -> Self {
        let date = timestamp.to_datetime();
        Self {
            id: MessageId(id.into()),
            timestamp,
            date,
            user,
            text: text.into(),
            is_sub: false,
            is_folded: false,
            day_marker: false,
        }
    }

    /// Mark this message as a secondary (thread) event.
    pub fn into_sub(mut self) -> Self {
        self.is_sub = true;
        self
    }

    pub fn set_day_marker(&mut self) {
        self.day_marker = true;
    }

    pub(crate) fn reset_presentation(&mut self) {
        self.is_folded = false;
        self.day_marker = false;
    }

    /// Calendar day of this message in the given zone.
    pub fn day(&self, offset: &FixedOffset) -> NaiveDate {
        self.date.with_timezone(offset).date_naive()
    }
}

//! Per-channel tuning knobs.
//!
//! Every setting has a default taken from `murmur_shared::constants`, so a
//! channel can be built with `ChannelConfig::default()` and the session layer
//! only overrides what the environment asks for.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use murmur_shared::constants::{
    CACHE_EVICTION_BATCH, CACHE_MESSAGES_LIMIT, FOLD_GAP_SECS, MARK_READ_DELAY_SECS,
    STOP_RECEIVING_TIMEOUT_SECS,
};

/// Cache, folding and timer settings for a [`Channel`](crate::Channel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Soft capacity of the message window.
    pub cache_limit: usize,

    /// How many of the oldest messages are dropped once the window exceeds
    /// `cache_limit`.
    pub eviction_batch: usize,

    /// Maximum gap between two messages of one author for the later one to
    /// be folded into the earlier.
    pub fold_gap: chrono::Duration,

    /// Grace period after the last receiver detaches before the cache is
    /// discarded.
    pub stop_receiving_after: Duration,

    /// Debounce delay for acknowledging the read position to the backend.
    pub mark_read_delay: Duration,

    /// Offset from UTC, in seconds, used to decide calendar-day boundaries.
    pub utc_offset_secs: i32,
}

impl ChannelConfig {
    /// Time zone used for day markers. Out-of-range offsets fall back to UTC.
    pub fn day_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| Utc.fix())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            cache_limit: CACHE_MESSAGES_LIMIT,
            eviction_batch: CACHE_EVICTION_BATCH,
            fold_gap: chrono::Duration::seconds(FOLD_GAP_SECS),
            stop_receiving_after: Duration::from_secs(STOP_RECEIVING_TIMEOUT_SECS),
            mark_read_delay: Duration::from_secs(MARK_READ_DELAY_SECS),
            utc_offset_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.cache_limit, 300);
        assert_eq!(config.eviction_batch, 50);
        assert_eq!(config.fold_gap, chrono::Duration::minutes(5));
        assert_eq!(config.stop_receiving_after, Duration::from_secs(3600));
        assert_eq!(config.mark_read_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_offset_falls_back_to_utc() {
        let config = ChannelConfig {
            utc_offset_secs: 100 * 3600,
            ..ChannelConfig::default()
        };
        assert_eq!(config.day_offset().local_minus_utc(), 0);
    }
}

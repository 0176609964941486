//! Client configuration loaded from the environment.
//!
//! All settings have sensible defaults; env vars override them:
//!
//! - `MURMUR_CACHE_LIMIT`: messages kept per channel (default 300)
//! - `MURMUR_EVICTION_BATCH`: messages dropped per eviction (default 50)
//! - `MURMUR_FOLD_GAP_SECS`: folding window for consecutive messages (default 300)
//! - `MURMUR_STOP_RECEIVING_SECS`: cache grace period after the last receiver leaves (default 3600)
//! - `MURMUR_MARK_READ_DELAY_SECS`: read acknowledgment debounce (default 5)
//! - `MURMUR_UTC_OFFSET_SECS`: offset used for day markers (default 0)
//! - `MURMUR_LOG`: default tracing directive when `RUST_LOG` is unset

use std::str::FromStr;
use std::time::Duration;

use murmur_channel::ChannelConfig;
use murmur_shared::constants::DEFAULT_LOG_FILTER;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Settings applied to every channel the session creates.
    pub channel: ChannelConfig,

    /// Directive handed to `EnvFilter` if `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let channel = &mut config.channel;

        if let Some(n) = parse_var::<usize>(&lookup, "MURMUR_CACHE_LIMIT") {
            if n > 0 {
                channel.cache_limit = n;
            } else {
                tracing::warn!("MURMUR_CACHE_LIMIT must be positive, using default");
            }
        }

        if let Some(n) = parse_var::<usize>(&lookup, "MURMUR_EVICTION_BATCH") {
            if n > 0 {
                channel.eviction_batch = n;
            } else {
                tracing::warn!("MURMUR_EVICTION_BATCH must be positive, using default");
            }
        }

        if let Some(secs) = parse_var::<i64>(&lookup, "MURMUR_FOLD_GAP_SECS") {
            channel.fold_gap = chrono::Duration::seconds(secs);
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "MURMUR_STOP_RECEIVING_SECS") {
            channel.stop_receiving_after = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "MURMUR_MARK_READ_DELAY_SECS") {
            channel.mark_read_delay = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<i32>(&lookup, "MURMUR_UTC_OFFSET_SECS") {
            // chrono rejects offsets of a full day or more.
            if secs.abs() < 86_400 {
                channel.utc_offset_secs = secs;
            } else {
                tracing::warn!(value = secs, "MURMUR_UTC_OFFSET_SECS out of range, using UTC");
            }
        }

        if let Some(filter) = lookup("MURMUR_LOG") {
            if !filter.trim().is_empty() {
                config.log_filter = filter;
            }
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

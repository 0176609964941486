/// Soft capacity of a channel's in-memory message window
pub const CACHE_MESSAGES_LIMIT: usize = 300;

/// Number of oldest messages dropped at once when the window overflows
pub const CACHE_EVICTION_BATCH: usize = 50;

/// Consecutive messages from one author closer than this are folded (5 minutes)
pub const FOLD_GAP_SECS: i64 = 5 * 60;

/// Grace period between the last receiver detaching and the cache being dropped (1 hour)
pub const STOP_RECEIVING_TIMEOUT_SECS: u64 = 60 * 60;

/// Debounce delay before a read position is acknowledged to the backend (5 seconds)
pub const MARK_READ_DELAY_SECS: u64 = 5;

/// Description given to channels the backend did not describe
pub const DEFAULT_DESCRIPTION: &str = "(No description)";

/// Default tracing directive when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "murmur_client_lib=debug,murmur_channel=debug,warn";

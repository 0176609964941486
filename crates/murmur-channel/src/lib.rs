//! Client-side state for chat channels: a bounded, folded message window,
//! read/unread tracking, reference-counted display and receive lifecycles,
//! and single-flight history fetches.

pub mod backend;
pub mod channel;
pub mod config;
pub mod events;
pub mod fetch;
pub mod lifecycle;
pub mod message;
pub mod read_state;
pub mod timer;
pub mod window;

#[cfg(test)]
mod testing;

pub use backend::{Account, ChannelBackend, ChannelInfo, UnsupportedBackend};
pub use channel::{Channel, ChannelFlags};
pub use config::ChannelConfig;
pub use events::{ChannelEvent, EventKind, Subscription};
pub use message::Message;
pub use read_state::ReadState;

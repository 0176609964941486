//! A consumer's handle on one channel.
//!
//! A [`ChannelView`] pairs the channel's reference counts with its own
//! lifetime: it holds at most one receiver and one viewer slot, and gives
//! both back on [`ChannelView::unload`] or when dropped. Any number of views
//! can share a channel.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use murmur_channel::{Channel, ChannelEvent, Message, Subscription};
use murmur_shared::error::{MurmurError, Result};

pub struct ChannelView {
    channel: Channel,
    subscription: Option<Subscription>,
    receiving: bool,
    focused: bool,
    sending: AtomicBool,
}

/// Clears the in-progress flag on every exit path, cancellation included.
struct SendGuard<'a>(&'a AtomicBool);

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ChannelView {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            subscription: None,
            receiving: false,
            focused: false,
            sending: AtomicBool::new(false),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn is_loaded(&self) -> bool {
        self.receiving
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    /// Subscribe, start receiving and make sure history is cached.
    ///
    /// Calling `load` again only re-runs the history check.
    pub async fn load(&mut self) -> Result<Vec<Message>> {
        if self.subscription.is_none() {
            self.subscription = Some(self.channel.subscribe_all());
        }
        if !self.receiving {
            self.channel.start_receiving();
            self.receiving = true;
        }

        let messages = self.channel.ensure_history().await?;
        if self.focused {
            self.channel.notify_read();
        }
        debug!(channel = %self.channel.id(), count = messages.len(), "View loaded");
        Ok(messages)
    }

    pub fn focus(&mut self) {
        if self.focused {
            return;
        }
        self.focused = true;
        self.channel.select();
        if self.channel.messages_ready() {
            self.channel.notify_read();
        }
    }

    pub fn blur(&mut self) {
        if !self.focused {
            return;
        }
        self.focused = false;
        self.channel.deselect();
    }

    /// Give back the viewer and receiver slots and drop the subscription.
    pub fn unload(&mut self) {
        self.blur();
        if self.receiving {
            self.receiving = false;
            self.channel.stop_receiving();
        }
        if self.subscription.take().is_some() {
            debug!(channel = %self.channel.id(), "View unloaded");
        }
    }

    /// Wait for the next channel event. `None` when the view isn't loaded.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        match &mut self.subscription {
            Some(subscription) => subscription.recv().await,
            None => None,
        }
    }

    /// Events delivered so far that haven't been consumed yet.
    pub fn pending_events(&mut self) -> Vec<ChannelEvent> {
        self.subscription
            .as_mut()
            .map(Subscription::drain)
            .unwrap_or_default()
    }

    /// Send `text`, refusing while a previous send from this view is still
    /// in flight.
    pub async fn send(&self, text: &str) -> Result<()> {
        if self.sending.swap(true, Ordering::SeqCst) {
            return Err(MurmurError::SendInProgress);
        }
        let _guard = SendGuard(&self.sending);
        self.channel.send_message(text).await
    }
}

impl Drop for ChannelView {
    fn drop(&mut self) {
        self.unload();
    }
}

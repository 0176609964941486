//! Viewer and receiver reference counts.
//!
//! Viewers decide whether the channel is on screen; receivers decide whether
//! the channel caches messages at all. The deferred stop that follows the
//! last receiver detaching is scheduled by the channel, which calls
//! [`Lifecycle::grace_elapsed`] when the timer fires.

use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lifecycle {
    viewer_count: usize,
    receiver_count: usize,
    is_receiving: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewer_count
    }

    pub fn receiver_count(&self) -> usize {
        self.receiver_count
    }

    pub fn is_displaying(&self) -> bool {
        self.viewer_count > 0
    }

    pub fn is_receiving(&self) -> bool {
        self.is_receiving
    }

    pub fn select(&mut self) {
        self.viewer_count += 1;
    }

    /// Returns `true` if the channel is still displayed by another viewer.
    pub fn deselect(&mut self) -> bool {
        if self.viewer_count == 0 {
            warn!("deselect called on a channel with no viewers");
            return false;
        }
        self.viewer_count -= 1;
        self.is_displaying()
    }

    pub fn start_receiving(&mut self) {
        self.receiver_count += 1;
        self.is_receiving = true;
    }

    /// Returns `true` when the last receiver detached and the grace timer
    /// should be armed.
    pub fn stop_receiving(&mut self) -> bool {
        if self.receiver_count == 0 {
            warn!("stop_receiving called on a channel with no receivers");
            return false;
        }
        self.receiver_count -= 1;
        self.receiver_count == 0
    }

    /// The grace period is over. Returns `true` if receiving actually
    /// stopped, i.e. nobody reattached in the meantime.
    pub fn grace_elapsed(&mut self) -> bool {
        if self.receiver_count > 0 {
            return false;
        }
        self.is_receiving = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_viewers() {
        let mut lc = Lifecycle::new();
        lc.select();
        lc.select();
        assert!(lc.deselect());
        assert!(lc.is_displaying());
        assert!(!lc.deselect());
        assert!(!lc.is_displaying());
    }

    #[test]
    fn test_deselect_underflow_is_ignored() {
        let mut lc = Lifecycle::new();
        assert!(!lc.deselect());
        assert_eq!(lc.viewer_count(), 0);
    }

    #[test]
    fn test_receiving_survives_until_grace_elapses() {
        let mut lc = Lifecycle::new();
        lc.start_receiving();
        lc.start_receiving();
        assert!(!lc.stop_receiving());
        assert!(lc.stop_receiving());
        assert!(lc.is_receiving());

        assert!(lc.grace_elapsed());
        assert!(!lc.is_receiving());
    }

    #[test]
    fn test_grace_elapsed_after_reattach_is_noop() {
        let mut lc = Lifecycle::new();
        lc.start_receiving();
        lc.stop_receiving();
        lc.start_receiving();
        assert!(!lc.grace_elapsed());
        assert!(lc.is_receiving());
    }

    #[test]
    fn test_stop_receiving_underflow_is_ignored() {
        let mut lc = Lifecycle::new();
        assert!(!lc.stop_receiving());
        assert_eq!(lc.receiver_count(), 0);
    }
}

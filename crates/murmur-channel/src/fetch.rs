//! Single-flight bookkeeping for history fetches.
//!
//! At most one fetch runs per channel. The first caller publishes a
//! [`HistoryFuture`]; everyone arriving while it is in flight awaits a clone
//! of the same future. Live messages ingested meanwhile are parked here and
//! handed back, in arrival order, when the fetch settles.

use futures::future::{BoxFuture, FutureExt, Shared};

use murmur_shared::error::Result;

use crate::message::Message;

/// Shared handle to the in-flight fetch; resolves to the window snapshot
/// taken after the fetched page was merged.
pub type HistoryFuture = Shared<BoxFuture<'static, Result<Vec<Message>>>>;

#[derive(Default)]
pub struct FetchCoordinator {
    in_flight: Option<HistoryFuture>,
    held: Vec<Message>,
    fetches_started: u64,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of fetches started over the channel's lifetime.
    pub fn fetches_started(&self) -> u64 {
        self.fetches_started
    }

    /// Join the running fetch, or start one built by `start`, which receives
    /// the id to hand back to [`settle`](Self::settle).
    ///
    /// Returns the shared future and whether this call started it.
    pub fn join_or_start<F>(&mut self, start: F) -> (HistoryFuture, bool)
    where
        F: FnOnce(u64) -> BoxFuture<'static, Result<Vec<Message>>>,
    {
        if let Some(in_flight) = &self.in_flight {
            return (in_flight.clone(), false);
        }
        let future = start(self.fetches_started + 1).shared();
        self.in_flight = Some(future.clone());
        self.fetches_started += 1;
        (future, true)
    }

    /// Park a live message while a fetch is running. Hands the message back
    /// if no fetch is in flight.
    pub fn hold(&mut self, message: Message) -> std::result::Result<(), Message> {
        if self.in_flight.is_none() {
            return Err(message);
        }
        self.held.push(message);
        Ok(())
    }

    /// Fetch `id` settled: clear the in-flight handle so the next call can
    /// start a new one, and return the parked messages. `None` if `id` is
    /// not the fetch in flight.
    pub fn settle(&mut self, id: u64) -> Option<Vec<Message>> {
        if self.in_flight.is_none() || id != self.fetches_started {
            return None;
        }
        self.in_flight = None;
        Some(std::mem::take(&mut self.held))
    }
}

/// Keep only held messages newer than the window's tail.
///
/// Anything not newer than `tail` is assumed to be covered by the fetched
/// page. Accepted messages raise the bar for the ones after them.
pub fn uncovered(held: Vec<Message>, tail: Option<&Message>) -> Vec<Message> {
    let mut bar = tail.map(|m| m.date);
    let mut fresh = Vec::with_capacity(held.len());
    for message in held {
        if bar.is_some_and(|date| message.date <= date) {
            continue;
        }
        bar = Some(message.date);
        fresh.push(message);
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_shared::types::{Timestamp, User};

    fn msg(id: &str, secs: i64) -> Message {
        Message::new(id, Timestamp::from_secs(secs), User::new("U1", "ada"), "hi")
    }

    #[tokio::test]
    async fn test_second_caller_joins() {
        let mut coordinator = FetchCoordinator::new();
        let (first, started) =
            coordinator.join_or_start(|_| async { Ok(vec![msg("a", 1)]) }.boxed());
        assert!(started);
        let (second, started) =
            coordinator.join_or_start(|_| panic!("a second fetch must not start"));
        assert!(!started);

        assert_eq!(first.await.unwrap(), second.await.unwrap());
        assert_eq!(coordinator.fetches_started(), 1);
    }

    #[test]
    fn test_hold_only_while_in_flight() {
        let mut coordinator = FetchCoordinator::new();
        assert!(coordinator.hold(msg("a", 1)).is_err());

        let _ = coordinator.join_or_start(|id| {
            assert_eq!(id, 1);
            async { Ok(Vec::new()) }.boxed()
        });
        assert!(coordinator.hold(msg("b", 2)).is_ok());
        assert!(coordinator.hold(msg("c", 3)).is_ok());

        assert!(coordinator.settle(7).is_none());
        assert!(coordinator.is_in_flight());
        let held = coordinator.settle(1).unwrap();
        assert_eq!(held.len(), 2);
        assert!(coordinator.settle(1).is_none());
        assert!(!coordinator.is_in_flight());
        assert!(coordinator.hold(msg("d", 4)).is_err());
    }

    #[test]
    fn test_uncovered_drops_messages_not_newer_than_tail() {
        let tail = msg("t", 10);
        let held = vec![msg("old", 5), msg("same", 10), msg("new", 11), msg("late", 9)];
        let fresh = uncovered(held, Some(&tail));
        let ids: Vec<_> = fresh.iter().map(|m| m.id.0.as_str()).collect();
        assert_eq!(ids, vec!["new"]);

        assert_eq!(uncovered(vec![msg("a", 1)], None).len(), 1);
    }
}

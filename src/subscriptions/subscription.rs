//! The per-subscription long-poll state machine.
//!
//! A subscription holds a FIFO of undelivered events and at most one parked
//! poll (the listener). Each poll owns a private unbounded signal channel:
//! producers push onto the queue under the lock and signal `Ready` after
//! releasing it, so a send never blocks and never reaches a receiver that is
//! not parked yet (the receiver end exists before the listener is installed).
//!
//! A new poll replaces the listener and sends `Aborted` to the previous one,
//! then waits for the previous poll to vacate. Every exit path of a poll drops
//! its vacate guard, which is what the handshake waits on.

use crate::error::{BrokerError, Result};
use crate::events::Event;
use crate::types::{FeedId, SubscriptionId};
use crossbeam_channel::{
    at, bounded, never, select, unbounded, Receiver, RecvTimeoutError, Sender,
};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::types::{PollOutcome, PollState, Signal};

/// The parked poll.
struct Listener {
    ticket: u64,
    signals: Sender<Signal>,
    /// Disconnects when the poll has vacated.
    vacated: Receiver<()>,
}

struct Inner {
    feeds: HashSet<FeedId>,
    pending: VecDeque<Arc<Event>>,
    listener: Option<Listener>,
    next_ticket: u64,
}

impl Inner {
    fn is_listener(&self, ticket: u64) -> bool {
        self.listener.as_ref().map(|l| l.ticket) == Some(ticket)
    }

    fn vacate(&mut self, ticket: u64) {
        if self.is_listener(ticket) {
            self.listener = None;
        }
    }
}

/// A consumer's registration against one or more feeds.
pub struct Subscription {
    id: SubscriptionId,
    inner: Mutex<Inner>,
    handshake_timeout: Duration,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, handshake_timeout: Duration) -> Self {
        Self {
            id,
            inner: Mutex::new(Inner {
                feeds: HashSet::new(),
                pending: VecDeque::new(),
                listener: None,
                next_ticket: 1,
            }),
            handshake_timeout,
        }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Feeds this subscription is attached to.
    pub fn feed_ids(&self) -> Vec<FeedId> {
        self.inner.lock().feeds.iter().cloned().collect()
    }

    /// Record that this subscription listens to `feed`. Returns false if it
    /// already did.
    pub(crate) fn add_feed(&self, feed: FeedId) -> bool {
        self.inner.lock().feeds.insert(feed)
    }

    pub(crate) fn remove_feed(&self, feed: &FeedId) -> bool {
        self.inner.lock().feeds.remove(feed)
    }

    /// Number of buffered, undelivered events.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn state(&self) -> PollState {
        if self.inner.lock().listener.is_some() {
            PollState::Listening
        } else {
            PollState::Idle
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state() == PollState::Listening
    }

    /// Take every buffered event without waiting.
    pub fn drain(&self) -> Vec<Arc<Event>> {
        self.inner.lock().pending.drain(..).collect()
    }

    /// Producer side: buffer `event` and wake the parked poll, if any.
    pub fn deliver(&self, event: Arc<Event>) {
        let signals = {
            let mut inner = self.inner.lock();
            inner.pending.push_back(event);
            inner.listener.as_ref().map(|l| l.signals.clone())
        };

        if let Some(signals) = signals {
            // The poll may have just exited; a dropped receiver is fine.
            let _ = signals.send(Signal::Ready);
        }
    }

    /// Block until events are available, the timeout elapses, or a newer poll
    /// supersedes this one.
    pub fn poll(&self, timeout: Duration) -> Result<PollOutcome> {
        let (signal_tx, signal_rx) = unbounded();
        // Never sent on; dropping the sender is the acknowledgement.
        let (_vacate, vacated) = bounded::<()>(0);

        let (ticket, previous) = {
            let mut inner = self.inner.lock();
            let ticket = inner.next_ticket;
            inner.next_ticket += 1;

            let previous = inner.listener.replace(Listener {
                ticket,
                signals: signal_tx.clone(),
                vacated,
            });
            if let Some(previous) = &previous {
                let _ = previous.signals.send(Signal::Aborted);
            }

            // Events that arrived before this poll was installed.
            if !inner.pending.is_empty() {
                let _ = signal_tx.send(Signal::Ready);
            }

            (ticket, previous)
        };
        // From here on the listener slot holds the only sender, so the
        // channel disconnects once this poll has been replaced.
        drop(signal_tx);

        if let Some(previous) = previous {
            tracing::debug!(subscription = %self.id, ticket, "superseding parked poll");
            match previous.vacated.recv_timeout(self.handshake_timeout) {
                Err(RecvTimeoutError::Disconnected) | Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => {
                    self.inner.lock().vacate(ticket);
                    tracing::warn!(
                        subscription = %self.id,
                        ticket,
                        timeout = ?self.handshake_timeout,
                        "previous poll did not acknowledge abort"
                    );
                    return Err(BrokerError::Internal(format!(
                        "can not send abort response to subscription {}",
                        self.id
                    )));
                }
            }
        }

        tracing::trace!(subscription = %self.id, ticket, ?timeout, "poll parked");
        let timer = match Instant::now().checked_add(timeout) {
            Some(deadline) => at(deadline),
            None => never(),
        };

        loop {
            select! {
                recv(signal_rx) -> signal => match signal {
                    Ok(Signal::Ready) => {
                        let mut inner = self.inner.lock();
                        if !inner.is_listener(ticket) {
                            // Replaced between the signal and the lock; the
                            // Aborted message is already queued behind us.
                            return Ok(PollOutcome::Aborted);
                        }
                        if inner.pending.is_empty() {
                            continue;
                        }
                        let events: Vec<_> = inner.pending.drain(..).collect();
                        inner.listener = None;
                        drop(inner);

                        tracing::debug!(subscription = %self.id, count = events.len(), "poll ready");
                        return Ok(PollOutcome::Ready(events));
                    }
                    Ok(Signal::Aborted) => {
                        tracing::debug!(subscription = %self.id, ticket, "poll aborted");
                        return Ok(PollOutcome::Aborted);
                    }
                    Err(_) => {
                        // The listener slot no longer holds our sender.
                        tracing::debug!(subscription = %self.id, ticket, "poll replaced");
                        return Ok(PollOutcome::Aborted);
                    }
                },
                recv(timer) -> _ => {
                    self.inner.lock().vacate(ticket);
                    tracing::debug!(subscription = %self.id, ticket, "poll timed out");
                    return Ok(PollOutcome::TimedOut);
                }
            }
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S:{}", self.id)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pending", &self.pending_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventId, FeedRef, Timestamp};
    use serde_json::json;
    use std::thread;

    fn make_event(n: u64) -> Arc<Event> {
        Arc::new(Event {
            id: EventId(format!("e{}", n)),
            feed: FeedRef {
                id: FeedId::from("f"),
                name: "feed".to_string(),
            },
            created: Timestamp::now(),
            payload: json!(n),
        })
    }

    fn make_subscription() -> Arc<Subscription> {
        Arc::new(Subscription::new(
            SubscriptionId::from("s"),
            Duration::from_secs(5),
        ))
    }

    fn wait_until_listening(sub: &Subscription) {
        let start = Instant::now();
        while !sub.is_listening() {
            assert!(start.elapsed() < Duration::from_secs(5), "poll never parked");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_buffered_events_return_immediately() {
        let sub = make_subscription();
        sub.deliver(make_event(1));

        let start = Instant::now();
        let outcome = sub.poll(Duration::from_secs(5)).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        let events = outcome.into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, json!(1));
        assert_eq!(sub.state(), PollState::Idle);
    }

    #[test]
    fn test_parked_poll_wakes_on_delivery() {
        let sub = make_subscription();
        let poller = {
            let sub = Arc::clone(&sub);
            thread::spawn(move || sub.poll(Duration::from_secs(5)).unwrap())
        };

        wait_until_listening(&sub);
        sub.deliver(make_event(7));

        let events = poller.join().unwrap().into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, json!(7));
        assert_eq!(sub.pending_len(), 0);
    }

    #[test]
    fn test_timeout_leaves_subscription_idle() {
        let sub = make_subscription();
        let start = Instant::now();
        let outcome = sub.poll(Duration::from_millis(100)).unwrap();

        assert!(outcome.is_timed_out());
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(!sub.is_listening());
    }

    #[test]
    fn test_new_poll_aborts_parked_poll() {
        let sub = make_subscription();
        let first = {
            let sub = Arc::clone(&sub);
            thread::spawn(move || sub.poll(Duration::from_secs(5)).unwrap())
        };
        wait_until_listening(&sub);

        let second = {
            let sub = Arc::clone(&sub);
            thread::spawn(move || sub.poll(Duration::from_millis(300)).unwrap())
        };

        assert!(first.join().unwrap().is_aborted());
        assert!(second.join().unwrap().is_timed_out());
    }

    #[test]
    fn test_unbounded_timeout_returns_buffered_events() {
        let sub = make_subscription();
        sub.deliver(make_event(3));

        let events = sub.poll(Duration::MAX).unwrap().into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, json!(3));
    }

    #[test]
    fn test_unbounded_timeout_parks_until_delivery() {
        let sub = make_subscription();
        let poller = {
            let sub = Arc::clone(&sub);
            thread::spawn(move || sub.poll(Duration::MAX).unwrap())
        };

        wait_until_listening(&sub);
        sub.deliver(make_event(4));
        assert!(poller.join().unwrap().is_ready());
    }

    #[test]
    fn test_drain_is_idempotent() {
        let sub = make_subscription();
        sub.deliver(make_event(1));
        sub.deliver(make_event(2));

        assert_eq!(sub.drain().len(), 2);
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_feed_bookkeeping() {
        let sub = make_subscription();
        assert!(sub.add_feed(FeedId::from("a")));
        assert!(!sub.add_feed(FeedId::from("a")));
        assert_eq!(sub.feed_ids(), vec![FeedId::from("a")]);
        assert!(sub.remove_feed(&FeedId::from("a")));
        assert!(sub.feed_ids().is_empty());
    }

    #[test]
    fn test_display() {
        let sub = make_subscription();
        assert_eq!(sub.to_string(), "S:s");
        assert_eq!(PollState::Listening.to_string(), "Waiting for events");
    }
}

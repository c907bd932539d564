//! Subscription types for long-poll delivery.

use crate::events::Event;
use std::fmt;
use std::sync::Arc;

/// Result of a single poll request.
///
/// None of these are faults: a poll that is superseded or that times out is
/// a normal steady-state outcome of the protocol.
#[derive(Clone, Debug)]
pub enum PollOutcome {
    /// Buffered events, in the order they were delivered to the subscription.
    Ready(Vec<Arc<Event>>),
    /// A newer poll on the same subscription took over.
    Aborted,
    /// The poll's timeout elapsed with nothing to deliver.
    TimedOut,
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, PollOutcome::Aborted)
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, PollOutcome::TimedOut)
    }

    /// Delivered events, empty unless `Ready`.
    pub fn into_events(self) -> Vec<Arc<Event>> {
        match self {
            PollOutcome::Ready(events) => events,
            PollOutcome::Aborted | PollOutcome::TimedOut => Vec::new(),
        }
    }
}

/// Observable state of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    /// No poll is parked; buffered events wait for the next one.
    Idle,
    /// Exactly one poll is parked.
    Listening,
}

impl PollState {
    pub fn describe(&self) -> &'static str {
        match self {
            PollState::Idle => "Idle, events are buffered for the next poll",
            PollState::Listening => "Waiting for events",
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Message sent to a parked poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Signal {
    /// The queue may be non-empty.
    Ready,
    /// A newer poll replaced this one.
    Aborted,
}

//! Subscriptions and long-poll delivery.
//!
//! A [`Subscription`] buffers events published on the feeds it is attached
//! to and hands them out through blocking polls:
//! - a poll returns immediately if events are already buffered
//! - otherwise it parks until an event arrives or its timeout elapses
//! - a newer poll on the same subscription aborts the parked one
//!
//! # Example
//!
//! ```ignore
//! let registry = SubscriptionRegistry::new(ids, Duration::from_secs(5));
//! let subscription = registry.create();
//!
//! loop {
//!     match subscription.poll(Duration::from_secs(30))? {
//!         PollOutcome::Ready(events) => handle(events),
//!         PollOutcome::TimedOut => continue,
//!         PollOutcome::Aborted => break,
//!     }
//! }
//! ```

mod registry;
mod subscription;
mod types;

pub use registry::SubscriptionRegistry;
pub use subscription::Subscription;
pub use types::{PollOutcome, PollState};

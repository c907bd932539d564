//! # Long-poll broker
//!
//! An in-process event broadcaster with long-poll delivery. Producers publish
//! events into named feeds; consumers hold a subscription to one or more feeds
//! and repeatedly issue blocking polls that return as soon as an event is
//! available or a timeout elapses.
//!
//! ## Core Concepts
//!
//! - **Feeds**: Named topics, unique by name
//! - **Subscriptions**: Per-consumer event queues with at most one parked poll
//! - **Events**: Immutable payloads tagged with their feed and creation time
//! - **Envelopes**: Transport-neutral response shapes and status codes
//!
//! ## Example
//!
//! ```ignore
//! use longpoll::{Broker, BrokerConfig, PollOutcome};
//!
//! let broker = Broker::new(BrokerConfig::default());
//! broker.create_feed(&["news"])?;
//!
//! let subscribed = broker.subscribe(&["news"])?;
//! broker.publish(&["news"], json!({"headline": "hello"}))?;
//!
//! match broker.poll(&subscribed.subscription_id, Some(Duration::from_secs(5)))? {
//!     PollOutcome::Ready(events) => println!("{} events", events.len()),
//!     PollOutcome::TimedOut => println!("nothing yet"),
//!     PollOutcome::Aborted => println!("superseded by a newer poll"),
//! }
//! ```

pub mod broker;
pub mod envelope;
pub mod error;
pub mod events;
pub mod feeds;
pub mod ids;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use broker::{Broker, BrokerConfig, PayloadParser, Subscribed};
pub use envelope::{ErrorResponse, EventData, EventsResponse, Response};
pub use error::{BrokerError, Result};
pub use events::{Event, EventBroadcaster, EventLog};
pub use feeds::{Feed, FeedRegistry};
pub use ids::IdSource;
pub use subscriptions::{PollOutcome, PollState, Subscription, SubscriptionRegistry};
pub use types::*;

//! Feed registry.
//!
//! Feeds are named topics. Names are unique for the lifetime of the
//! registry; each feed tracks the subscriptions currently attached to it.

mod registry;

pub use registry::{Feed, FeedRegistry};

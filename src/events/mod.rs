//! Events and broadcasting.
//!
//! Every published event is appended to a global [`EventLog`] and then
//! queued on each subscription attached to its feed.

mod broadcaster;
mod types;

pub use broadcaster::EventBroadcaster;
pub use types::{Event, EventLog};

//! Event construction and fan-out.

use crate::feeds::Feed;
use crate::ids::IdSource;
use crate::types::Timestamp;
use std::sync::Arc;

use super::types::{Event, EventLog};

/// Builds events and delivers them to every subscriber of their feed.
pub struct EventBroadcaster {
    ids: Arc<IdSource>,
    log: EventLog,
}

impl EventBroadcaster {
    pub fn new(ids: Arc<IdSource>) -> Self {
        Self {
            ids,
            log: EventLog::new(),
        }
    }

    /// Publish `payload` on `feed`.
    ///
    /// The event is logged even when the feed has no subscribers. Each
    /// delivery only appends under the subscription's lock and never waits on
    /// the poller, so a busy subscription does not hold up the others.
    pub fn publish(&self, feed: &Feed, payload: serde_json::Value) -> Arc<Event> {
        let event = Arc::new(Event {
            id: self.ids.next_event_id(),
            feed: feed.to_ref(),
            created: Timestamp::now(),
            payload,
        });

        self.log.append(Arc::clone(&event));

        let subscribers = feed.snapshot_subscribers();
        tracing::debug!(
            feed = %feed.name(),
            event = %event.id,
            subscribers = subscribers.len(),
            "broadcasting event"
        );

        for subscription in subscribers {
            subscription.deliver(Arc::clone(&event));
        }

        event
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::FeedRegistry;
    use crate::subscriptions::SubscriptionRegistry;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        feeds: FeedRegistry,
        subs: SubscriptionRegistry,
        broadcaster: EventBroadcaster,
    }

    fn fixture() -> Fixture {
        let ids = Arc::new(IdSource::new());
        Fixture {
            feeds: FeedRegistry::new(Arc::clone(&ids)),
            subs: SubscriptionRegistry::new(Arc::clone(&ids), Duration::from_secs(1)),
            broadcaster: EventBroadcaster::new(ids),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_recorded() {
        let fx = fixture();
        let feed = fx.feeds.create("empty").unwrap();

        let event = fx.broadcaster.publish(&feed, json!("A"));
        assert_eq!(event.feed.name, "empty");
        assert_eq!(fx.broadcaster.log().len(), 1);
    }

    #[test]
    fn test_fan_out_to_every_subscriber() {
        let fx = fixture();
        let feed = fx.feeds.create("f1").unwrap();
        let a = fx.subs.create();
        let b = fx.subs.create();
        fx.feeds.subscribe(&feed, &a).unwrap();
        fx.feeds.subscribe(&feed, &b).unwrap();

        fx.broadcaster.publish(&feed, json!("A"));

        assert_eq!(a.pending_len(), 1);
        assert_eq!(b.pending_len(), 1);
    }

    #[test]
    fn test_unsubscribed_subscription_gets_nothing() {
        let fx = fixture();
        let feed = fx.feeds.create("f1").unwrap();
        let other = fx.feeds.create("f2").unwrap();
        let sub = fx.subs.create();
        fx.feeds.subscribe(&other, &sub).unwrap();

        fx.broadcaster.publish(&feed, json!("A"));
        assert_eq!(sub.pending_len(), 0);
    }

    #[test]
    fn test_events_queue_in_publish_order() {
        let fx = fixture();
        let feed = fx.feeds.create("f1").unwrap();
        let sub = fx.subs.create();
        fx.feeds.subscribe(&feed, &sub).unwrap();

        for i in 0..5 {
            fx.broadcaster.publish(&feed, json!(i));
        }

        let payloads: Vec<_> = sub.drain().iter().map(|e| e.payload.clone()).collect();
        assert_eq!(payloads, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    }
}

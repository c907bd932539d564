//! Main Broker struct tying all components together.

use crate::error::{BrokerError, Result};
use crate::events::{Event, EventBroadcaster};
use crate::feeds::{Feed, FeedRegistry};
use crate::ids::IdSource;
use crate::subscriptions::{PollOutcome, Subscription, SubscriptionRegistry};
use crate::types::SubscriptionId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Broker configuration.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Poll timeout used when the caller gives none (or zero).
    pub default_poll_timeout: Duration,

    /// Upper bound on any poll timeout.
    pub max_poll_timeout: Duration,

    /// How long a new poll waits for the poll it supersedes to vacate.
    pub abort_handshake_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_poll_timeout: Duration::from_secs(30),
            max_poll_timeout: Duration::from_secs(300),
            abort_handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl BrokerConfig {
    pub fn with_default_poll_timeout(mut self, timeout: Duration) -> Self {
        self.default_poll_timeout = timeout;
        self
    }

    pub fn with_max_poll_timeout(mut self, timeout: Duration) -> Self {
        self.max_poll_timeout = timeout;
        self
    }

    pub fn with_abort_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.abort_handshake_timeout = timeout;
        self
    }

    /// The timeout a poll actually waits for.
    pub fn effective_poll_timeout(&self, requested: Option<Duration>) -> Duration {
        match requested {
            Some(timeout) if !timeout.is_zero() => timeout.min(self.max_poll_timeout),
            _ => self.default_poll_timeout,
        }
    }
}

/// Turns a raw request body into an event payload.
pub type PayloadParser = Arc<dyn Fn(&str) -> Result<serde_json::Value> + Send + Sync>;

fn json_parser() -> PayloadParser {
    Arc::new(|body: &str| {
        serde_json::from_str(body).map_err(|e| BrokerError::InvalidInput(e.to_string()))
    })
}

/// Result of a successful subscribe call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscribed {
    pub subscription_id: SubscriptionId,
    /// Feeds that resolved, in request order.
    pub feed_names: Vec<String>,
}

/// The broker.
///
/// Provides a unified interface for:
/// - Creating feeds
/// - Subscribing to one or more feeds
/// - Publishing events
/// - Long-polling a subscription
///
/// Operations that take feed names accept a list, the way names arrive from
/// repeated request parameters; the single-feed operations reject lists that
/// do not hold exactly one name.
pub struct Broker {
    config: BrokerConfig,
    ids: Arc<IdSource>,
    feeds: FeedRegistry,
    subscriptions: SubscriptionRegistry,
    broadcaster: EventBroadcaster,
    parser: PayloadParser,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        let ids = Arc::new(IdSource::new());
        Self {
            feeds: FeedRegistry::new(Arc::clone(&ids)),
            subscriptions: SubscriptionRegistry::new(
                Arc::clone(&ids),
                config.abort_handshake_timeout,
            ),
            broadcaster: EventBroadcaster::new(Arc::clone(&ids)),
            ids,
            config,
            parser: json_parser(),
        }
    }

    /// Replace the parser used by [`publish_raw`](Self::publish_raw).
    pub fn with_payload_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.parser = Arc::new(parser);
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn feeds(&self) -> &FeedRegistry {
        &self.feeds
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub fn ids(&self) -> &IdSource {
        &self.ids
    }

    // --- Feeds ---

    /// Create the single feed named in `names`.
    pub fn create_feed<S: AsRef<str>>(&self, names: &[S]) -> Result<Arc<Feed>> {
        let name = single_name(names)?;
        self.feeds.create(name)
    }

    // --- Subscriptions ---

    /// Create a subscription attached to every feed in `names` that exists.
    ///
    /// Unknown names are skipped. Fails if none resolve.
    pub fn subscribe<S: AsRef<str>>(&self, names: &[S]) -> Result<Subscribed> {
        let mut resolved: Vec<Arc<Feed>> = Vec::new();
        for name in names {
            match self.feeds.lookup_by_name(name.as_ref()) {
                Ok(feed) => {
                    if !resolved.iter().any(|f| f.id() == feed.id()) {
                        resolved.push(feed);
                    }
                }
                Err(_) => tracing::debug!(feed = name.as_ref(), "skipping unknown feed"),
            }
        }
        if resolved.is_empty() {
            return Err(BrokerError::InvalidInput("missing valid feed(s)".to_string()));
        }

        let subscription = self.subscriptions.create();
        for feed in &resolved {
            self.feeds.subscribe(feed, &subscription)?;
        }

        let feed_names: Vec<String> = resolved.iter().map(|f| f.name().to_string()).collect();
        tracing::info!(subscription = %subscription, feeds = ?feed_names, "subscription created");

        Ok(Subscribed {
            subscription_id: subscription.id().clone(),
            feed_names,
        })
    }

    /// Attach an existing subscription to one more feed.
    pub fn subscribe_existing(&self, id: &SubscriptionId, feed_name: &str) -> Result<()> {
        let subscription = self.subscriptions.get(id)?;
        let feed = self.feeds.lookup_by_name(feed_name)?;
        self.feeds.subscribe(&feed, &subscription)
    }

    /// Detach a subscription from a feed. Detaching twice is not an error.
    pub fn unsubscribe(&self, id: &SubscriptionId, feed_name: &str) -> Result<()> {
        let subscription = self.subscriptions.get(id)?;
        let feed = self.feeds.lookup_by_name(feed_name)?;
        self.feeds.unsubscribe(&feed, &subscription);
        Ok(())
    }

    pub fn subscription(&self, id: &SubscriptionId) -> Result<Arc<Subscription>> {
        self.subscriptions.get(id)
    }

    // --- Publishing ---

    /// Publish `payload` on the single feed named in `names`.
    pub fn publish<S: AsRef<str>>(
        &self,
        names: &[S],
        payload: serde_json::Value,
    ) -> Result<Arc<Event>> {
        let name = single_name(names)?;
        let feed = self.feeds.lookup_by_name(name)?;
        Ok(self.broadcaster.publish(&feed, payload))
    }

    /// Parse `body` with the configured payload parser and publish it.
    pub fn publish_raw<S: AsRef<str>>(&self, names: &[S], body: &str) -> Result<Arc<Event>> {
        let name = single_name(names)?;
        let feed = self.feeds.lookup_by_name(name)?;
        let payload = (self.parser)(body)?;
        Ok(self.broadcaster.publish(&feed, payload))
    }

    // --- Polling ---

    /// Long-poll a subscription.
    ///
    /// `None` or a zero timeout waits for the configured default.
    pub fn poll(&self, id: &SubscriptionId, timeout: Option<Duration>) -> Result<PollOutcome> {
        let subscription = self.subscriptions.get(id)?;
        subscription.poll(self.config.effective_poll_timeout(timeout))
    }

    /// Dump every feed and its subscribers at debug level.
    pub fn log_topology(&self) {
        for name in self.feeds.names() {
            if let Ok(feed) = self.feeds.lookup_by_name(&name) {
                feed.log_topology();
            }
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.config)
            .field("feeds", &self.feeds.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("events", &self.broadcaster.log().len())
            .finish()
    }
}

fn single_name<S: AsRef<str>>(names: &[S]) -> Result<&str> {
    match names {
        [] => Err(BrokerError::InvalidInput("missing valid feed(s)".to_string())),
        [name] => Ok(name.as_ref()),
        _ => Err(BrokerError::InvalidInput("too many feeds".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_poll_timeout() {
        let config = BrokerConfig::default();
        assert_eq!(config.effective_poll_timeout(None), Duration::from_secs(30));
        assert_eq!(
            config.effective_poll_timeout(Some(Duration::ZERO)),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.effective_poll_timeout(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.effective_poll_timeout(Some(Duration::from_secs(3600))),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_single_name() {
        let none: [&str; 0] = [];
        assert!(matches!(single_name(&none), Err(BrokerError::InvalidInput(_))));
        assert_eq!(single_name(&["a"]).unwrap(), "a");
        assert!(matches!(
            single_name(&["a", "b"]),
            Err(BrokerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_subscribe_dedupes_repeated_names() {
        let broker = Broker::default();
        broker.create_feed(&["f1"]).unwrap();

        let subscribed = broker.subscribe(&["f1", "f1", "missing"]).unwrap();
        assert_eq!(subscribed.feed_names, vec!["f1".to_string()]);
    }

    #[test]
    fn test_publish_raw_uses_parser() {
        let broker = Broker::default()
            .with_payload_parser(|body| Ok(json!({ "raw": body })));
        broker.create_feed(&["f1"]).unwrap();

        let event = broker.publish_raw(&["f1"], "hello").unwrap();
        assert_eq!(event.payload, json!({"raw": "hello"}));
    }

    #[test]
    fn test_publish_raw_rejects_bad_json() {
        let broker = Broker::default();
        broker.create_feed(&["f1"]).unwrap();

        let result = broker.publish_raw(&["f1"], "{not json");
        assert!(matches!(result, Err(BrokerError::InvalidInput(_))));
        assert!(broker.broadcaster().log().is_empty());
    }

    #[test]
    fn test_subscribe_existing_and_unsubscribe() {
        let broker = Broker::default();
        broker.create_feed(&["a"]).unwrap();
        broker.create_feed(&["b"]).unwrap();

        let subscribed = broker.subscribe(&["a"]).unwrap();
        let id = subscribed.subscription_id;
        broker.subscribe_existing(&id, "b").unwrap();
        assert!(matches!(
            broker.subscribe_existing(&id, "b"),
            Err(BrokerError::AlreadySubscribed { .. })
        ));

        broker.unsubscribe(&id, "a").unwrap();
        broker.unsubscribe(&id, "a").unwrap();

        broker.publish(&["a"], json!(1)).unwrap();
        broker.publish(&["b"], json!(2)).unwrap();

        let drained = broker.subscription(&id).unwrap().drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].payload, json!(2));
    }
}

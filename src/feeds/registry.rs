//! Feed and feed registry implementation.

use crate::error::{BrokerError, Result};
use crate::ids::IdSource;
use crate::subscriptions::Subscription;
use crate::types::{FeedId, FeedRef, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named topic.
///
/// The subscriber set is guarded by the feed's own lock. Membership changes
/// never take a subscription's lock.
pub struct Feed {
    id: FeedId,
    name: String,
    subscribers: Mutex<HashMap<SubscriptionId, Arc<Subscription>>>,
}

impl Feed {
    fn new(id: FeedId, name: String) -> Self {
        Self {
            id,
            name,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &FeedId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn to_ref(&self) -> FeedRef {
        FeedRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// Attach a subscription to this feed.
    pub fn add_subscriber(&self, subscription: &Arc<Subscription>) -> Result<()> {
        let mut subscribers = self.subscribers.lock();
        if subscribers.contains_key(subscription.id()) {
            return Err(BrokerError::AlreadySubscribed {
                subscription: subscription.id().clone(),
                feed: self.id.clone(),
            });
        }
        subscribers.insert(subscription.id().clone(), Arc::clone(subscription));
        Ok(())
    }

    /// Detach a subscription. Absent subscriptions are ignored.
    pub fn remove_subscriber(&self, subscription: &SubscriptionId) {
        self.subscribers.lock().remove(subscription);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn subscriber_ids(&self) -> Vec<SubscriptionId> {
        self.subscribers.lock().keys().cloned().collect()
    }

    /// Current subscribers, copied out so fan-out runs without the feed lock.
    pub fn snapshot_subscribers(&self) -> Vec<Arc<Subscription>> {
        self.subscribers.lock().values().cloned().collect()
    }

    /// Dump the feed and its subscribers at debug level.
    pub fn log_topology(&self) {
        tracing::debug!("{}", self);
        for subscription in self.snapshot_subscribers() {
            tracing::debug!("|-- {}", subscription);
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (F:{})", self.name, self.id)
    }
}

impl fmt::Debug for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Feed lookup tables. Both maps change together under one lock.
#[derive(Default)]
struct FeedIndex {
    feeds: HashMap<FeedId, Arc<Feed>>,
    name_to_id: HashMap<String, FeedId>,
}

/// Owns every feed, keyed by id and by unique name.
pub struct FeedRegistry {
    index: RwLock<FeedIndex>,
    ids: Arc<IdSource>,
}

impl FeedRegistry {
    pub fn new(ids: Arc<IdSource>) -> Self {
        Self {
            index: RwLock::new(FeedIndex::default()),
            ids,
        }
    }

    /// Create a feed with a unique name.
    pub fn create(&self, name: &str) -> Result<Arc<Feed>> {
        if name.is_empty() {
            return Err(BrokerError::InvalidInput("feed name is empty".to_string()));
        }

        let mut index = self.index.write();

        if index.name_to_id.contains_key(name) {
            return Err(BrokerError::FeedExists(name.to_string()));
        }

        let id = self.ids.next_feed_id();
        let feed = Arc::new(Feed::new(id.clone(), name.to_string()));

        index.name_to_id.insert(name.to_string(), id.clone());
        index.feeds.insert(id, Arc::clone(&feed));

        tracing::info!(feed = %feed, "feed created");
        Ok(feed)
    }

    pub fn lookup_by_id(&self, id: &FeedId) -> Result<Arc<Feed>> {
        self.index
            .read()
            .feeds
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::FeedNotFound(id.to_string()))
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<Arc<Feed>> {
        let index = self.index.read();
        index
            .name_to_id
            .get(name)
            .and_then(|id| index.feeds.get(id))
            .cloned()
            .ok_or_else(|| BrokerError::FeedNotFound(name.to_string()))
    }

    /// Attach `subscription` to `feed`, recording the membership on both sides.
    ///
    /// Takes the feed's lock, releases it, then the subscription's. The two are
    /// never held together.
    pub fn subscribe(&self, feed: &Feed, subscription: &Arc<Subscription>) -> Result<()> {
        feed.add_subscriber(subscription)?;
        subscription.add_feed(feed.id().clone());
        Ok(())
    }

    /// Detach `subscription` from `feed` on both sides. Idempotent.
    pub fn unsubscribe(&self, feed: &Feed, subscription: &Subscription) {
        feed.remove_subscriber(subscription.id());
        subscription.remove_feed(feed.id());
    }

    /// All feed names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.read().name_to_id.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.index.read().feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

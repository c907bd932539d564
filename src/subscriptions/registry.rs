//! Subscription registry.

use crate::error::{BrokerError, Result};
use crate::ids::IdSource;
use crate::types::SubscriptionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::subscription::Subscription;

/// Owns every subscription, keyed by id.
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<Subscription>>>,
    ids: Arc<IdSource>,
    handshake_timeout: Duration,
}

impl SubscriptionRegistry {
    pub fn new(ids: Arc<IdSource>, handshake_timeout: Duration) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            ids,
            handshake_timeout,
        }
    }

    /// Create and register an empty subscription.
    pub fn create(&self) -> Arc<Subscription> {
        let id = self.ids.next_subscription_id();
        let subscription = Arc::new(Subscription::new(id.clone(), self.handshake_timeout));
        self.subscriptions
            .write()
            .insert(id, Arc::clone(&subscription));
        subscription
    }

    pub fn get(&self, id: &SubscriptionId) -> Result<Arc<Subscription>> {
        self.subscriptions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::SubscriptionNotFound(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new(Arc::new(IdSource::new()), Duration::from_secs(1))
    }

    #[test]
    fn test_create_and_get() {
        let registry = registry();
        let sub = registry.create();
        assert_eq!(registry.len(), 1);

        let found = registry.get(sub.id()).unwrap();
        assert!(Arc::ptr_eq(&sub, &found));
    }

    #[test]
    fn test_get_unknown() {
        let registry = registry();
        let result = registry.get(&SubscriptionId::from("missing"));
        assert!(matches!(result, Err(BrokerError::SubscriptionNotFound(_))));
    }
}

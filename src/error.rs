//! Error types for the broker.

use crate::types::{FeedId, SubscriptionId};
use thiserror::Error;

/// Main error type for broker operations.
///
/// Superseded and timed-out polls are not errors; they are reported through
/// [`PollOutcome`](crate::subscriptions::PollOutcome).
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Feed already exists: {0}")]
    FeedExists(String),

    #[error("Subscription {subscription} already subscribed to feed {feed}")]
    AlreadySubscribed {
        subscription: SubscriptionId,
        feed: FeedId,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BrokerError {
    /// Status code a transport should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::InvalidInput(_) => 400,
            // Unknown subscription ids are treated as a forbidden poll.
            BrokerError::SubscriptionNotFound(_) => 403,
            BrokerError::FeedNotFound(_) => 404,
            BrokerError::FeedExists(_) | BrokerError::AlreadySubscribed { .. } => 409,
            BrokerError::Internal(_) | BrokerError::Serialization(_) => 500,
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for BrokerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        BrokerError::Serialization(e.to_string())
    }
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

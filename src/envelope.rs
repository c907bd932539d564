//! Response envelopes for transports.
//!
//! Every response carries `error`. Successful responses add their data
//! fields; failures add `errorCode` and `message`. Timed-out and aborted
//! polls are reported with the error shape but are expected outcomes, not
//! faults.

use crate::broker::Subscribed;
use crate::error::{BrokerError, Result};
use crate::events::Event;
use crate::subscriptions::PollOutcome;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Status code for a poll that timed out.
pub const STATUS_TIMEOUT: u16 = 408;

/// Status code for a poll superseded by a newer one.
pub const STATUS_ABORTED: u16 = 409;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkResponse {
    pub error: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedResponse {
    pub error: bool,
    pub subscription_id: String,
    pub feeds: Vec<String>,
}

/// One delivered event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub timestamp: Timestamp,
    pub payload: serde_json::Value,
}

impl From<&Event> for EventData {
    fn from(event: &Event) -> Self {
        Self {
            timestamp: event.created,
            payload: event.payload.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub error: bool,
    pub events: Vec<EventData>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: bool,
    pub error_code: u16,
    pub message: String,
}

/// Any response a transport sends back.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok(OkResponse),
    Subscribed(SubscribedResponse),
    Events(EventsResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(OkResponse {
            error: false,
            message: "OK".to_string(),
        })
    }

    pub fn subscribed(subscribed: &Subscribed) -> Self {
        Response::Subscribed(SubscribedResponse {
            error: false,
            subscription_id: subscribed.subscription_id.to_string(),
            feeds: subscribed.feed_names.clone(),
        })
    }

    pub fn events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a Event>,
    {
        Response::Events(EventsResponse {
            error: false,
            events: events.into_iter().map(EventData::from).collect(),
        })
    }

    pub fn timeout() -> Self {
        Self::error_with(STATUS_TIMEOUT, "timeout")
    }

    pub fn aborted() -> Self {
        Self::error_with(STATUS_ABORTED, "aborted")
    }

    pub fn error(err: &BrokerError) -> Self {
        tracing::debug!(code = err.status_code(), error = %err, "error response");
        Self::error_with(err.status_code(), err.to_string())
    }

    fn error_with(code: u16, message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            error: true,
            error_code: code,
            message: message.into(),
        })
    }

    /// Plain acknowledgement for operations whose value the client never sees
    /// (feed creation, publishing).
    pub fn acknowledge<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(err) => Self::error(err),
        }
    }

    /// Envelope for the result of a poll.
    pub fn from_poll(result: &Result<PollOutcome>) -> Self {
        match result {
            Ok(PollOutcome::Ready(events)) => Self::events(events.iter().map(|e| &**e)),
            Ok(PollOutcome::TimedOut) => Self::timeout(),
            Ok(PollOutcome::Aborted) => Self::aborted(),
            Err(err) => Self::error(err),
        }
    }

    /// Status code a transport should answer with.
    pub fn status(&self) -> u16 {
        match self {
            Response::Ok(_) | Response::Subscribed(_) | Response::Events(_) => 200,
            Response::Error(e) => e.error_code,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// MessagePack encoding with field names, for binary transports.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

impl<T> From<Result<T>> for Response
where
    T: Into<Response>,
{
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => value.into(),
            Err(err) => Response::error(&err),
        }
    }
}

impl From<Subscribed> for Response {
    fn from(subscribed: Subscribed) -> Self {
        Response::subscribed(&subscribed)
    }
}

impl From<PollOutcome> for Response {
    fn from(outcome: PollOutcome) -> Self {
        Response::from_poll(&Ok(outcome))
    }
}

//! # Opaque execution requests.
//!
//! The supervisor never interprets the business payload of a request. It only
//! forwards the serialized blob to the worker and, for logs, extracts the
//! correlation identifier (the webhook id) through [`HasCorrelationId`].

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

/// Narrow view of a request: the tracing identifier and nothing else.
pub trait HasCorrelationId {
    /// Returns the correlation identifier, if the payload carries one.
    fn correlation_id(&self) -> Option<&str>;
}

/// Only the correlation field is deserialized; every other field is skipped.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "webhookId", alias = "webhook_id")]
    webhook_id: Option<String>,
}

/// Serialized execution request, treated as an uninterpreted string.
///
/// Cheap to clone (`Arc`-backed).
#[derive(Clone)]
pub struct ExecutionRequest {
    payload: Arc<str>,
    webhook_id: Option<Arc<str>>,
}

impl ExecutionRequest {
    /// Wraps a serialized payload.
    ///
    /// Payloads that are not JSON objects are still valid requests; they simply
    /// carry no correlation id.
    pub fn new(payload: impl Into<Arc<str>>) -> Self {
        let payload = payload.into();
        let webhook_id = serde_json::from_str::<Envelope>(&payload)
            .ok()
            .and_then(|env| env.webhook_id)
            .filter(|id| !id.is_empty())
            .map(Arc::from);
        Self {
            payload,
            webhook_id,
        }
    }

    /// The raw serialized payload sent to the worker.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl HasCorrelationId for ExecutionRequest {
    fn correlation_id(&self) -> Option<&str> {
        self.webhook_id.as_deref()
    }
}

impl fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("webhook_id", &self.webhook_id)
            .field("len", &self.payload.len())
            .finish()
    }
}

impl From<String> for ExecutionRequest {
    fn from(payload: String) -> Self {
        Self::new(payload)
    }
}

impl From<&str> for ExecutionRequest {
    fn from(payload: &str) -> Self {
        Self::new(payload)
    }
}

/// Tracing identity of one queued task: a queue-local id plus the webhook id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskLabel {
    id: Arc<str>,
    webhook_id: Option<Arc<str>>,
}

impl TaskLabel {
    /// Creates a label for `request` with the given task id.
    pub fn new(id: impl Into<Arc<str>>, request: &impl HasCorrelationId) -> Self {
        Self {
            id: id.into(),
            webhook_id: request.correlation_id().map(Arc::from),
        }
    }

    /// Queue-local task id (e.g. `execute-7`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Webhook id extracted from the request, if any.
    pub fn webhook_id(&self) -> Option<&str> {
        self.webhook_id.as_deref()
    }

    pub(crate) fn id_arc(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub(crate) fn webhook_arc(&self) -> Option<Arc<str>> {
        self.webhook_id.clone()
    }
}

impl fmt::Display for TaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.webhook_id {
            Some(w) => write!(f, "{} (webhook {w})", self.id),
            None => f.write_str(&self.id),
        }
    }
}

//! Wire-facing request and object types.
//!
//! These types cross the boundary between the embedding HTTP handler and
//! the aggregation layer: the request context ferried into every partition
//! call, the objects and lists returned to clients, and the events carried
//! on watch streams.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Request verbs routed through the aggregating store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Create,
    Update,
    Delete,
    List,
    Watch,
}

impl Verb {
    /// Stable string form, as seen by partitioners.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Watch => "watch",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request context propagated through the aggregation layer.
///
/// Carries the resource kind, the request's query parameters, and the
/// caller's cancellation token. The aggregator clones the context and
/// rewrites the pagination parameters before delegating to a partition
/// store; everything else passes through untouched.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Resource kind this request addresses.
    pub resource: String,

    /// Query parameters from the HTTP request.
    query: HashMap<String, String>,

    /// Cancellation handle for the request.
    cancel: CancellationToken,
}

impl ApiRequest {
    /// Create a new request context for a resource kind.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            query: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set a query parameter, builder style.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Attach a cancellation token, builder style.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Read a query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Set a query parameter.
    pub fn set_query(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.insert(key.into(), value.into());
    }

    /// Remove a query parameter.
    pub fn remove_query(&mut self, key: &str) {
        self.query.remove(key);
    }

    /// The request's cancellation token.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// A single API object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiObject {
    /// Object identifier, unique within its partition.
    pub id: String,

    /// Opaque object payload.
    pub data: serde_json::Value,
}

impl ApiObject {
    /// Create a new object.
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// A page of API objects, as returned to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiObjectList {
    /// Objects in this page.
    pub objects: Vec<ApiObject>,

    /// Backend revision the page was listed at.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,

    /// Opaque continue token; empty means no more pages.
    #[serde(
        rename = "continue",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub continue_token: String,
}

impl ApiObjectList {
    /// Create a page from its parts.
    pub fn new(objects: Vec<ApiObject>, revision: impl Into<String>) -> Self {
        Self {
            objects,
            revision: revision.into(),
            continue_token: String::new(),
        }
    }

    /// Attach a backend continue cursor, builder style.
    pub fn with_continue(mut self, continue_token: impl Into<String>) -> Self {
        self.continue_token = continue_token.into();
        self
    }
}

/// Watch event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Object created.
    Create,
    /// Object modified.
    Change,
    /// Object deleted.
    Remove,
}

/// A watch event delivered on the merged stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEvent {
    /// Event type.
    pub event_type: EventType,

    /// Revision at which the event occurred.
    pub revision: String,

    /// The object after the event.
    pub object: ApiObject,
}

/// Parameters of a watch call.
#[derive(Debug, Clone, Default)]
pub struct WatchRequest {
    /// Object ID to watch; empty watches the whole resource.
    pub id: String,

    /// Revision to start replay from; empty starts at "now".
    pub revision: String,
}

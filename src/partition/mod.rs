//! Partition model and embedder-supplied contracts.
//!
//! A partition is a named subset of the resource space with its own backing
//! store, pagination cursor, and revision stream. The embedder supplies a
//! [`Partitioner`] that resolves requests to partitions and a
//! [`PartitionStore`] per partition; Braid owns everything above that seam:
//! the continue-token codec ([`token`]), the parallel lister ([`lister`]),
//! and the aggregating store facade ([`store`]).

use crate::api::{ApiEvent, ApiObject, ApiObjectList, ApiRequest, Verb, WatchRequest};
use crate::core::error::BraidResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod lister;
pub mod store;
pub mod token;

/// A named grouping of resources, such as by namespace or tenant.
///
/// Names are stable for the lifetime of one request sequence and distinct
/// within one partition list. The order of a partition list is significant:
/// it defines emission order and resumption anchoring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    name: String,
}

impl Partition {
    /// Create a partition handle.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The partition's stable name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Resolves requests to partitions and materializes their stores.
///
/// Supplied by the embedder; typically backed by the authorization layer
/// that decides which partitions a caller sees. `all` returns an ordered
/// list, and the order is part of the external contract because continue
/// tokens reference partition names.
#[async_trait]
pub trait Partitioner: Send + Sync {
    /// Resolve the single partition relevant to a point operation.
    ///
    /// Must be deterministic for a given `(verb, id)`.
    async fn lookup(&self, req: &ApiRequest, verb: Verb, id: &str) -> BraidResult<Partition>;

    /// Resolve every partition the caller may see, in emission order.
    async fn all(&self, req: &ApiRequest, verb: Verb, id: &str) -> BraidResult<Vec<Partition>>;

    /// Materialize the backing store for one partition.
    async fn store(
        &self,
        req: &ApiRequest,
        partition: &Partition,
    ) -> BraidResult<Arc<dyn PartitionStore>>;
}

/// The backing store of one partition.
///
/// `list` reads three query parameters from the request: `continue` (the
/// backend cursor), `revision` (snapshot pin), and `limit` (page size,
/// absent meaning unbounded). The aggregator clones the request and sets
/// these before delegating.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Look up a single object by its ID.
    async fn get_by_id(&self, req: &ApiRequest, id: &str) -> BraidResult<ApiObject>;

    /// Create a single object.
    async fn create(&self, req: &ApiRequest, obj: ApiObject) -> BraidResult<ApiObject>;

    /// Update a single object.
    async fn update(&self, req: &ApiRequest, obj: ApiObject, id: &str) -> BraidResult<ApiObject>;

    /// Delete a single object, returning its final state.
    async fn delete(&self, req: &ApiRequest, id: &str) -> BraidResult<ApiObject>;

    /// List one page of objects from this partition.
    async fn list(&self, req: &ApiRequest) -> BraidResult<ApiObjectList>;

    /// Open a watch stream for this partition.
    ///
    /// The stream ends when the backend closes it or the request's
    /// cancellation token fires.
    async fn watch(
        &self,
        req: &ApiRequest,
        wr: WatchRequest,
    ) -> BraidResult<mpsc::Receiver<ApiEvent>>;
}

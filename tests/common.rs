//! Common test utilities.
//!
//! This module contains shared helpers for integration tests: scripted
//! page sources for driving the lister directly, and an in-memory
//! partitioner/store pair for exercising the aggregating store facade.
//! Import with `mod common;` in test files.

use async_trait::async_trait;
use braid::api::{ApiEvent, ApiObject, ApiObjectList, ApiRequest, Verb, WatchRequest};
use braid::core::error::{BraidError, BraidResult};
use braid::partition::lister::PageSource;
use braid::partition::{Partition, PartitionStore, Partitioner};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Generate `n` objects with IDs `{prefix}1..{prefix}n`.
pub fn objects(prefix: &str, n: usize) -> Vec<ApiObject> {
    (1..=n)
        .map(|i| {
            let id = format!("{prefix}{i}");
            ApiObject::new(&id, serde_json::json!({ "name": id }))
        })
        .collect()
}

/// Flatten batches into their object IDs, in receipt order.
pub fn ids(batches: &[Vec<ApiObject>]) -> Vec<String> {
    batches
        .iter()
        .flatten()
        .map(|o| o.id.clone())
        .collect()
}

/// Tracks how many page calls run at once.
#[derive(Default)]
pub struct FlightRecorder {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl FlightRecorder {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// One recorded page call, as seen by a scripted source.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub partition: String,
    pub cursor: String,
    pub revision: String,
    pub limit: usize,
}

/// Scripted behavior of one partition's backend.
#[derive(Default)]
pub struct PartitionFixture {
    /// Full listing of the partition, in backend order.
    pub objects: Vec<ApiObject>,

    /// Revision reported when no snapshot pin is requested.
    pub revision: String,

    /// Backend's own page size; 0 serves everything in one page.
    pub page_size: usize,

    /// That many initial calls return zero objects with a cursor.
    pub leading_empty_pages: usize,

    /// Fail the nth call (1-based) with a backend error.
    pub fail_at_call: Option<usize>,

    /// Sleep before answering.
    pub delay: Option<Duration>,

    /// Never answer; wait for cancellation instead.
    pub block: bool,
}

impl PartitionFixture {
    pub fn with_objects(objects: Vec<ApiObject>, revision: &str) -> Self {
        Self {
            objects,
            revision: revision.to_string(),
            ..Default::default()
        }
    }
}

/// A [`PageSource`] serving scripted fixtures, recording every call.
///
/// Cursors are stringified offsets into the partition's full listing. The
/// backend ignores the request limit unless `honor_limit` is set, which
/// lets tests exercise batches larger than the remaining page budget.
pub struct ScriptedSource {
    fixtures: HashMap<String, PartitionFixture>,
    honor_limit: bool,
    calls: Mutex<Vec<RecordedCall>>,
    call_counts: Mutex<HashMap<String, usize>>,
    pub flights: FlightRecorder,
}

impl ScriptedSource {
    pub fn new(fixtures: Vec<(&str, PartitionFixture)>) -> Self {
        Self {
            fixtures: fixtures
                .into_iter()
                .map(|(name, fixture)| (name.to_string(), fixture))
                .collect(),
            honor_limit: false,
            calls: Mutex::new(Vec::new()),
            call_counts: Mutex::new(HashMap::new()),
            flights: FlightRecorder::default(),
        }
    }

    pub fn honoring_limit(mut self) -> Self {
        self.honor_limit = true;
        self
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    async fn page(
        &self,
        cancel: &CancellationToken,
        partition: &Partition,
        cursor: &str,
        revision: &str,
        limit: usize,
    ) -> BraidResult<ApiObjectList> {
        self.calls.lock().push(RecordedCall {
            partition: partition.name().to_string(),
            cursor: cursor.to_string(),
            revision: revision.to_string(),
            limit,
        });

        let fixture = self
            .fixtures
            .get(partition.name())
            .ok_or_else(|| BraidError::backend(partition.name(), "unknown partition"))?;

        let call = {
            let mut counts = self.call_counts.lock();
            let entry = counts.entry(partition.name().to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if fixture.block {
            cancel.cancelled().await;
            return Err(BraidError::Cancelled);
        }

        if let Some(delay) = fixture.delay {
            tokio::time::sleep(delay).await;
        }

        if fixture.fail_at_call == Some(call) {
            return Err(BraidError::backend(partition.name(), "scripted failure"));
        }

        let reported = if revision.is_empty() {
            fixture.revision.clone()
        } else {
            revision.to_string()
        };

        if call <= fixture.leading_empty_pages {
            return Ok(ApiObjectList::new(Vec::new(), reported).with_continue("0"));
        }

        let start: usize = if cursor.is_empty() {
            0
        } else {
            cursor
                .parse()
                .map_err(|_| BraidError::backend(partition.name(), "bad cursor"))?
        };

        let available = fixture.objects.len().saturating_sub(start);
        let mut take = available;
        if fixture.page_size > 0 {
            take = take.min(fixture.page_size);
        }
        if self.honor_limit && limit > 0 {
            take = take.min(limit);
        }

        let end = start + take;
        let mut list =
            ApiObjectList::new(fixture.objects[start..end].to_vec(), reported);
        if end < fixture.objects.len() {
            list = list.with_continue(end.to_string());
        }
        Ok(list)
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn list_page(
        &self,
        cancel: &CancellationToken,
        partition: &Partition,
        continue_token: &str,
        revision: &str,
        limit: usize,
    ) -> BraidResult<ApiObjectList> {
        self.flights.enter();
        let result = self
            .page(cancel, partition, continue_token, revision, limit)
            .await;
        self.flights.exit();
        result
    }
}

/// In-memory store for one partition, for facade-level tests.
pub struct MemoryStore {
    pub partition: String,
    pub objects: Mutex<Vec<ApiObject>>,
    pub revision: String,
    pub watch_events: Vec<ApiEvent>,
    pub hold_watch_open: bool,
    pub fail_watch: bool,
}

impl MemoryStore {
    pub fn new(partition: &str, objects: Vec<ApiObject>, revision: &str) -> Self {
        Self {
            partition: partition.to_string(),
            objects: Mutex::new(objects),
            revision: revision.to_string(),
            watch_events: Vec::new(),
            hold_watch_open: false,
            fail_watch: false,
        }
    }

    pub fn with_events(mut self, events: Vec<ApiEvent>) -> Self {
        self.watch_events = events;
        self
    }

    pub fn holding_watch_open(mut self) -> Self {
        self.hold_watch_open = true;
        self
    }

    pub fn failing_watch(mut self) -> Self {
        self.fail_watch = true;
        self
    }
}

#[async_trait]
impl PartitionStore for MemoryStore {
    async fn get_by_id(&self, _req: &ApiRequest, id: &str) -> BraidResult<ApiObject> {
        self.objects
            .lock()
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or_else(|| BraidError::backend(&self.partition, "object not found"))
    }

    async fn create(&self, _req: &ApiRequest, obj: ApiObject) -> BraidResult<ApiObject> {
        self.objects.lock().push(obj.clone());
        Ok(obj)
    }

    async fn update(&self, _req: &ApiRequest, obj: ApiObject, id: &str) -> BraidResult<ApiObject> {
        let mut objects = self.objects.lock();
        let slot = objects
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| BraidError::backend(&self.partition, "object not found"))?;
        *slot = obj.clone();
        Ok(obj)
    }

    async fn delete(&self, _req: &ApiRequest, id: &str) -> BraidResult<ApiObject> {
        let mut objects = self.objects.lock();
        let index = objects
            .iter()
            .position(|o| o.id == id)
            .ok_or_else(|| BraidError::backend(&self.partition, "object not found"))?;
        Ok(objects.remove(index))
    }

    async fn list(&self, req: &ApiRequest) -> BraidResult<ApiObjectList> {
        let cursor = req.query("continue").unwrap_or("");
        let requested_revision = req.query("revision").unwrap_or("");
        let limit: usize = req
            .query("limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let start: usize = if cursor.is_empty() {
            0
        } else {
            cursor
                .parse()
                .map_err(|_| BraidError::backend(&self.partition, "bad cursor"))?
        };

        let objects = self.objects.lock();
        let available = objects.len().saturating_sub(start);
        let take = if limit > 0 { available.min(limit) } else { available };
        let end = start + take;

        let reported = if requested_revision.is_empty() {
            self.revision.clone()
        } else {
            requested_revision.to_string()
        };

        let mut list = ApiObjectList::new(objects[start..end].to_vec(), reported);
        if end < objects.len() {
            list = list.with_continue(end.to_string());
        }
        Ok(list)
    }

    async fn watch(
        &self,
        req: &ApiRequest,
        _wr: WatchRequest,
    ) -> BraidResult<mpsc::Receiver<ApiEvent>> {
        if self.fail_watch {
            return Err(BraidError::backend(&self.partition, "watch refused"));
        }

        let (tx, rx) = mpsc::channel(self.watch_events.len().max(1));
        for event in &self.watch_events {
            let _ = tx.try_send(event.clone());
        }

        if self.hold_watch_open {
            let cancel = req.cancellation();
            tokio::spawn(async move {
                cancel.cancelled().await;
                drop(tx);
            });
        }
        Ok(rx)
    }
}

/// Partitioner over a fixed partition list and per-partition stores.
pub struct StaticPartitioner {
    pub partitions: Vec<Partition>,
    pub stores: HashMap<String, Arc<MemoryStore>>,
    /// Routes point-operation IDs to partition names.
    pub routes: HashMap<String, String>,
}

impl StaticPartitioner {
    pub fn new(stores: Vec<MemoryStore>) -> Self {
        let partitions = stores
            .iter()
            .map(|s| Partition::new(&s.partition))
            .collect();
        let stores = stores
            .into_iter()
            .map(|s| (s.partition.clone(), Arc::new(s)))
            .collect();
        Self {
            partitions,
            stores,
            routes: HashMap::new(),
        }
    }

    pub fn with_route(mut self, id: &str, partition: &str) -> Self {
        self.routes.insert(id.to_string(), partition.to_string());
        self
    }

    pub fn store_for(&self, partition: &str) -> Arc<MemoryStore> {
        Arc::clone(&self.stores[partition])
    }
}

#[async_trait]
impl Partitioner for StaticPartitioner {
    async fn lookup(&self, _req: &ApiRequest, _verb: Verb, id: &str) -> BraidResult<Partition> {
        if let Some(partition) = self.routes.get(id) {
            return Ok(Partition::new(partition));
        }
        self.partitions
            .first()
            .cloned()
            .ok_or_else(|| BraidError::partitioner("no partitions visible"))
    }

    async fn all(&self, _req: &ApiRequest, _verb: Verb, _id: &str) -> BraidResult<Vec<Partition>> {
        Ok(self.partitions.clone())
    }

    async fn store(
        &self,
        _req: &ApiRequest,
        partition: &Partition,
    ) -> BraidResult<Arc<dyn PartitionStore>> {
        self.stores
            .get(partition.name())
            .map(|s| Arc::clone(s) as Arc<dyn PartitionStore>)
            .ok_or_else(|| {
                BraidError::partitioner(format!("no store for partition {partition}"))
            })
    }
}

//! Aggregating store facade.
//!
//! Routes point operations to the single partition resolved for them,
//! delegates `list` to the parallel partition lister, and multiplexes
//! `watch` streams from all partitions into one event channel. This is the
//! surface an embedding HTTP handler talks to.

use crate::api::{ApiEvent, ApiObject, ApiObjectList, ApiRequest, Verb, WatchRequest};
use crate::core::config::AggregatorConfig;
use crate::core::error::BraidResult;
use crate::partition::lister::{PageSource, ParallelPartitionLister};
use crate::partition::{Partition, PartitionStore, Partitioner};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Store facade over a set of partitions.
pub struct PartitionedStore {
    partitioner: Arc<dyn Partitioner>,
    config: AggregatorConfig,
}

impl PartitionedStore {
    /// Create a store with default aggregation settings.
    pub fn new(partitioner: Arc<dyn Partitioner>) -> Self {
        Self::with_config(partitioner, AggregatorConfig::default())
    }

    /// Create a store with explicit aggregation settings.
    pub fn with_config(partitioner: Arc<dyn Partitioner>, config: AggregatorConfig) -> Self {
        Self {
            partitioner,
            config,
        }
    }

    /// Resolve the store backing a point operation.
    async fn resolve(
        &self,
        req: &ApiRequest,
        verb: Verb,
        id: &str,
    ) -> BraidResult<Arc<dyn PartitionStore>> {
        let partition = self.partitioner.lookup(req, verb, id).await?;
        self.partitioner.store(req, &partition).await
    }

    /// Look up a single object by its ID.
    pub async fn get_by_id(&self, req: &ApiRequest, id: &str) -> BraidResult<ApiObject> {
        let target = self.resolve(req, Verb::Get, id).await?;
        target.get_by_id(req, id).await
    }

    /// Create a single object.
    pub async fn create(&self, req: &ApiRequest, obj: ApiObject) -> BraidResult<ApiObject> {
        let target = self.resolve(req, Verb::Create, "").await?;
        target.create(req, obj).await
    }

    /// Update a single object.
    pub async fn update(
        &self,
        req: &ApiRequest,
        obj: ApiObject,
        id: &str,
    ) -> BraidResult<ApiObject> {
        let target = self.resolve(req, Verb::Update, id).await?;
        target.update(req, obj, id).await
    }

    /// Delete a single object.
    pub async fn delete(&self, req: &ApiRequest, id: &str) -> BraidResult<ApiObject> {
        let target = self.resolve(req, Verb::Delete, id).await?;
        target.delete(req, id).await
    }

    /// List objects across all applicable partitions.
    ///
    /// With pagination parameters in play the result is one segment of the
    /// list: at most `limit` objects plus a continue token locating the
    /// next segment.
    pub async fn list(&self, req: &ApiRequest) -> BraidResult<ApiObjectList> {
        let partitions = self.partitioner.all(req, Verb::List, "").await?;
        tracing::debug!(
            resource = %req.resource,
            partitions = partitions.len(),
            "listing across partitions"
        );

        let source = Arc::new(RequestPageSource {
            partitioner: Arc::clone(&self.partitioner),
            request: req.clone(),
        });
        let lister = ParallelPartitionLister::new(source, self.config.concurrency, partitions);

        let resume = req.query("continue").unwrap_or("");
        let limit = self.page_limit(req);

        let mut stream = lister.list(req.cancellation().child_token(), limit, resume)?;

        let mut result = ApiObjectList::default();
        while let Some(batch) = stream.recv().await {
            result.objects.extend(batch);
        }

        let outcome = stream.finish().await;
        if let Some(error) = outcome.error {
            return Err(error);
        }
        result.revision = outcome.revision;
        result.continue_token = outcome.continue_token;
        Ok(result)
    }

    /// Open a merged watch stream over all applicable partitions.
    ///
    /// Every partition's upstream watch is opened before any event flows;
    /// a single open failure cancels the already-opened upstreams and
    /// returns the error. Events from distinct partitions interleave
    /// arbitrarily. Any upstream terminating tears the whole stream down:
    /// the output closes once every forwarder has stopped, and the caller
    /// redrives.
    pub async fn watch(
        &self,
        req: &ApiRequest,
        wr: WatchRequest,
    ) -> BraidResult<mpsc::Receiver<ApiEvent>> {
        let partitions = self.partitioner.all(req, Verb::Watch, &wr.id).await?;

        let cancel = req.cancellation().child_token();
        let sub_req = req.clone().with_cancellation(cancel.clone());

        let mut upstreams = Vec::with_capacity(partitions.len());
        for partition in &partitions {
            let opened = match self.partitioner.store(&sub_req, partition).await {
                Ok(store) => store.watch(&sub_req, wr.clone()).await,
                Err(err) => Err(err),
            };
            match opened {
                Ok(stream) => upstreams.push((partition.clone(), stream)),
                Err(err) => {
                    cancel.cancel();
                    return Err(err);
                }
            }
        }

        let (event_tx, event_rx) = mpsc::channel(self.config.watch_channel_capacity);
        for (partition, stream) in upstreams {
            tokio::spawn(forward_events(
                partition,
                stream,
                event_tx.clone(),
                cancel.clone(),
            ));
        }
        Ok(event_rx)
    }

    /// Extract the page limit from the request.
    ///
    /// Missing, non-numeric, and non-positive values all fall back to the
    /// configured default, so clients must always be prepared for a
    /// truncated list.
    fn page_limit(&self, req: &ApiRequest) -> usize {
        req.query("limit")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|limit| *limit > 0)
            .map(|limit| limit as usize)
            .unwrap_or(self.config.default_page_limit)
    }
}

/// Forward one partition's watch events onto the merged channel.
///
/// The upstream ending for any reason cancels the group, mirroring the
/// teardown the caller expects: the merged channel closes once every
/// forwarder has returned.
async fn forward_events(
    partition: Partition,
    mut stream: mpsc::Receiver<ApiEvent>,
    events: mpsc::Sender<ApiEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.recv() => match event {
                Some(event) => {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    tracing::debug!(partition = %partition, "watch upstream closed");
    cancel.cancel();
}

/// Per-partition page source that dispatches through the partitioner.
///
/// Clones the original request and rewrites the pagination parameters the
/// backing store reads: `continue`, `revision`, and `limit` (removed when
/// unbounded).
struct RequestPageSource {
    partitioner: Arc<dyn Partitioner>,
    request: ApiRequest,
}

#[async_trait]
impl PageSource for RequestPageSource {
    async fn list_page(
        &self,
        cancel: &CancellationToken,
        partition: &Partition,
        continue_token: &str,
        revision: &str,
        limit: usize,
    ) -> BraidResult<ApiObjectList> {
        let store = self.partitioner.store(&self.request, partition).await?;

        let mut req = self.request.clone().with_cancellation(cancel.clone());
        req.set_query("continue", continue_token);
        req.set_query("revision", revision);
        if limit > 0 {
            req.set_query("limit", limit.to_string());
        } else {
            req.remove_query("limit");
        }

        store.list(&req).await
    }
}

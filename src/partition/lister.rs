//! Concurrent, order-preserving, resumable partition lister.
//!
//! The lister fans paginated list calls out across partitions under a
//! concurrency bound, serializes emission in partition order, enforces a
//! global item budget per page, and records resumption state in a
//! [`ListState`] when it truncates.
//!
//! Emission order is enforced with a linked chain of one-shot turn signals:
//! partition *k* emits only after partition *k-1*'s task has returned, and a
//! task signals its successor by dropping the sender on every exit path.
//! All shared aggregator state (pinned revision, remaining capacity, the
//! terminal resumption state, the first error) lives behind one mutex and
//! is written only while the writer holds its turn.

use crate::api::{ApiObject, ApiObjectList};
use crate::core::error::{BraidError, BraidResult};
use crate::partition::token::ListState;
use crate::partition::Partition;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Page size applied when a request carries no usable limit.
///
/// Because a limit is always in force, clients must assume any list
/// response may be truncated and follow the continue token.
pub const DEFAULT_PAGE_LIMIT: usize = 100_000;

/// Lists one page of objects from one partition.
///
/// `continue_token` is the backend-level cursor ("" for the first page),
/// `revision` the snapshot pin ("" until the session pins one), and
/// `limit` the caller's page size. Implementations are expected to return
/// promptly once `cancel` fires.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn list_page(
        &self,
        cancel: &CancellationToken,
        partition: &Partition,
        continue_token: &str,
        revision: &str,
        limit: usize,
    ) -> BraidResult<ApiObjectList>;
}

/// Terminal report of one list call.
///
/// Available from [`ListStream::finish`] once every partition task has
/// returned.
#[derive(Debug)]
pub struct ListOutcome {
    /// The pinned session revision; empty if no partition ever returned.
    pub revision: String,

    /// Encoded continue token; empty when the listing is exhausted.
    pub continue_token: String,

    /// First non-cancellation error, else the cancellation error, if any.
    pub error: Option<BraidError>,
}

/// A lazy, finite stream of object batches.
///
/// Batches arrive in strict partition-index order; consumers concatenate
/// them in receipt order to obtain the page. Batches already received stay
/// valid even when the terminal outcome carries an error.
pub struct ListStream {
    batches: mpsc::Receiver<Vec<ApiObject>>,
    outcome: oneshot::Receiver<ListOutcome>,
}

impl ListStream {
    /// Receive the next batch; `None` once every partition has emitted.
    pub async fn recv(&mut self) -> Option<Vec<ApiObject>> {
        self.batches.recv().await
    }

    /// Wait for the terminal outcome.
    ///
    /// Closes the batch channel first, so calling this before draining
    /// abandons the remaining batches and stops the producers.
    pub async fn finish(self) -> ListOutcome {
        drop(self.batches);
        self.outcome.await.unwrap_or_else(|_| ListOutcome {
            revision: String::new(),
            continue_token: String::new(),
            error: Some(BraidError::internal("list driver dropped its outcome")),
        })
    }
}

/// Shared aggregator state, written only while the writer holds its turn.
struct Progress {
    /// Pinned session revision.
    revision: String,

    /// Remaining item budget for this page.
    capacity: usize,

    /// Terminal resumption state, set once by the truncating partition.
    resume: Option<ListState>,

    /// First meaningful error observed.
    error: Option<BraidError>,
}

impl Progress {
    /// Record an error, preferring the first non-cancellation one.
    fn record_error(&mut self, err: BraidError) {
        match &self.error {
            None => self.error = Some(err),
            Some(existing) if existing.is_cancelled() && !err.is_cancelled() => {
                self.error = Some(err);
            }
            _ => {}
        }
    }
}

/// Concurrent lister over an ordered set of partitions.
///
/// Generic over the page source so embedders and tests can supply their
/// own backends without boxing.
pub struct ParallelPartitionLister<S> {
    source: Arc<S>,
    concurrency: usize,
    partitions: Vec<Partition>,
}

impl<S: PageSource + 'static> ParallelPartitionLister<S> {
    /// Create a lister over `partitions`, queried in the given order.
    pub fn new(source: Arc<S>, concurrency: usize, partitions: Vec<Partition>) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
            partitions,
        }
    }

    /// Start a list call and return its batch stream.
    ///
    /// A non-empty `resume` token is decoded first; a malformed token
    /// fails here, before any partition work starts. The token's pinned
    /// limit overrides `limit`, and a zero limit falls back to
    /// [`DEFAULT_PAGE_LIMIT`].
    pub fn list(
        &self,
        cancel: CancellationToken,
        limit: usize,
        resume: &str,
    ) -> BraidResult<ListStream> {
        let state = ListState::decode(resume)?;

        let mut limit = limit;
        if state.limit > 0 {
            limit = state.limit;
        }
        if limit == 0 {
            limit = DEFAULT_PAGE_LIMIT;
        }

        let (batch_tx, batch_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(feed(
            Arc::clone(&self.source),
            self.concurrency,
            self.partitions.clone(),
            state,
            limit,
            cancel,
            batch_tx,
            done_tx,
        ));

        Ok(ListStream {
            batches: batch_rx,
            outcome: done_rx,
        })
    }
}

/// Resolve the resumption anchor.
///
/// An anchor naming a partition absent from the current list is stale:
/// listing restarts at index 0 with the within-partition fields cleared,
/// keeping the token's revision and limit.
fn resume_anchor(partitions: &[Partition], mut state: ListState) -> (usize, ListState) {
    if state.partition_name.is_empty() {
        return (0, state);
    }
    match partitions
        .iter()
        .position(|p| p.name() == state.partition_name)
    {
        Some(index) => (index, state),
        None => {
            tracing::debug!(
                anchor = %state.partition_name,
                "stale resumption anchor, restarting from the first partition"
            );
            state.partition_name.clear();
            state.continue_token.clear();
            state.offset = 0;
            (0, state)
        }
    }
}

/// Schedule one task per partition and drive them to completion.
///
/// Scheduling stops early when the page budget is spent or the call is
/// cancelled. The first partition list of a session takes the full
/// semaphore weight, so the session revision is pinned before any other
/// partition list begins; once pinned, tasks take one ticket each.
#[allow(clippy::too_many_arguments)]
async fn feed<S: PageSource + 'static>(
    source: Arc<S>,
    concurrency: usize,
    partitions: Vec<Partition>,
    state: ListState,
    limit: usize,
    cancel: CancellationToken,
    batch_tx: mpsc::Sender<Vec<ApiObject>>,
    done_tx: oneshot::Sender<ListOutcome>,
) {
    let (start, state) = resume_anchor(&partitions, state);

    let shared = Arc::new(Mutex::new(Progress {
        revision: state.revision.clone(),
        capacity: limit,
        resume: None,
        error: None,
    }));
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks: JoinSet<()> = JoinSet::new();

    // Linked chain of turn signals controlling emission order.
    let mut turn: Option<oneshot::Receiver<()>> = None;

    for partition in &partitions[start..] {
        if shared.lock().capacity == 0 {
            break;
        }
        if cancel.is_cancelled() {
            shared.lock().record_error(BraidError::Cancelled);
            break;
        }

        // Grab every ticket while the session revision is still unpinned.
        let tickets = if shared.lock().revision.is_empty() {
            concurrency as u32
        } else {
            1
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                shared.lock().record_error(BraidError::Cancelled);
                break;
            }
            acquired = Arc::clone(&semaphore).acquire_many_owned(tickets) => match acquired {
                Ok(permit) => permit,
                Err(_) => {
                    shared.lock().record_error(BraidError::Cancelled);
                    break;
                }
            },
        };

        let (next_tx, next_rx) = oneshot::channel();
        let task = PartitionTask {
            source: Arc::clone(&source),
            partition: partition.clone(),
            session: state.clone(),
            limit,
            shared: Arc::clone(&shared),
            cancel: cancel.clone(),
            batches: batch_tx.clone(),
        };
        tasks.spawn(task.run(turn.take(), next_tx, permit));
        turn = Some(next_rx);
    }
    drop(turn);

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            shared
                .lock()
                .record_error(BraidError::internal(format!("partition task failed: {e}")));
        }
    }

    // Close the batch channel before reporting, so consumers observe the
    // stream end and then the outcome.
    drop(batch_tx);

    let mut progress = shared.lock();
    let outcome = ListOutcome {
        revision: std::mem::take(&mut progress.revision),
        continue_token: progress
            .resume
            .take()
            .map(|s| s.encode())
            .unwrap_or_default(),
        error: progress.error.take(),
    };
    drop(progress);

    let _ = done_tx.send(outcome);
}

/// What a partition does with one backend page while holding its turn.
enum Step {
    /// Budget exhausted: emit the truncated batch and stop the session.
    Sealed(Vec<ApiObject>),

    /// Emit the batch and follow the backend cursor if there is one.
    Open {
        batch: Vec<ApiObject>,
        cursor: String,
    },
}

/// One partition's share of a list call.
struct PartitionTask<S> {
    source: Arc<S>,
    partition: Partition,
    session: ListState,
    limit: usize,
    shared: Arc<Mutex<Progress>>,
    cancel: CancellationToken,
    batches: mpsc::Sender<Vec<ApiObject>>,
}

impl<S: PageSource> PartitionTask<S> {
    /// Run to completion, then release the permit and signal the successor.
    ///
    /// The successor's turn signal fires when `_next` drops, which happens
    /// on every exit path; a partition therefore finishes all of its
    /// looping emissions before the next partition may emit anything.
    async fn run(
        self,
        turn: Option<oneshot::Receiver<()>>,
        _next: oneshot::Sender<()>,
        _permit: OwnedSemaphorePermit,
    ) {
        if let Err(err) = self.drive(turn).await {
            tracing::debug!(
                partition = %self.partition,
                error = %err,
                "partition list task stopped"
            );
            self.shared.lock().record_error(err);
            // Stop scheduling and signal in-flight siblings.
            self.cancel.cancel();
        }
    }

    async fn drive(&self, mut turn: Option<oneshot::Receiver<()>>) -> BraidResult<()> {
        let mut local = self.session.clone();
        let mut holds_turn = false;

        loop {
            let cursor = if self.partition.name() == local.partition_name {
                local.continue_token.clone()
            } else {
                String::new()
            };

            // Adopt the pinned session revision once an earlier partition
            // establishes it.
            if local.revision.is_empty() {
                local.revision = self.shared.lock().revision.clone();
            }

            let page = tokio::select! {
                _ = self.cancel.cancelled() => return Err(BraidError::Cancelled),
                listed = self.source.list_page(
                    &self.cancel,
                    &self.partition,
                    &cursor,
                    &local.revision,
                    self.limit,
                ) => listed?,
            };

            if !holds_turn {
                wait_for_turn(&self.cancel, turn.take()).await?;
                holds_turn = true;
            }

            let step = {
                let mut progress = self.shared.lock();

                // An earlier partition already sealed the page.
                if progress.resume.is_some() {
                    return Ok(());
                }

                if local.revision.is_empty() {
                    local.revision = page.revision.clone();
                }
                if progress.revision.is_empty() {
                    progress.revision = page.revision.clone();
                }

                let mut objects = page.objects;

                // Skip objects already delivered from this partition in
                // previous pages of the session.
                let mut dropped = 0;
                if self.partition.name() == local.partition_name && local.offset > 0 {
                    dropped = local.offset.min(objects.len());
                    objects.drain(..dropped);
                }

                if objects.len() > progress.capacity {
                    // The budget is spent but the listing is still partial:
                    // record where the next page must pick up. The offset
                    // covers everything delivered from the cursor used for
                    // this call, including objects skipped on entry.
                    let emitted = progress.capacity;
                    objects.truncate(emitted);
                    progress.resume = Some(ListState {
                        revision: progress.revision.clone(),
                        partition_name: self.partition.name().to_string(),
                        continue_token: cursor.clone(),
                        offset: dropped + emitted,
                        limit: self.limit,
                    });
                    progress.capacity = 0;
                    tracing::debug!(
                        partition = %self.partition,
                        emitted,
                        "page budget exhausted, recording resumption state"
                    );
                    Step::Sealed(objects)
                } else {
                    progress.capacity -= objects.len();
                    Step::Open {
                        batch: objects,
                        cursor: page.continue_token,
                    }
                }
            };

            match step {
                Step::Sealed(batch) => {
                    self.emit(batch).await?;
                    return Ok(());
                }
                Step::Open { batch, cursor } => {
                    self.emit(batch).await?;
                    if cursor.is_empty() {
                        // Partition exhausted.
                        return Ok(());
                    }
                    local.continue_token = cursor;
                    local.partition_name = self.partition.name().to_string();
                    local.offset = 0;
                }
            }
        }
    }

    /// Deliver a batch to the consumer; a dropped receiver stops the task.
    async fn emit(&self, batch: Vec<ApiObject>) -> BraidResult<()> {
        self.batches
            .send(batch)
            .await
            .map_err(|_| BraidError::Cancelled)
    }
}

/// Wait for the predecessor partition to finish emitting.
async fn wait_for_turn(
    cancel: &CancellationToken,
    turn: Option<oneshot::Receiver<()>>,
) -> BraidResult<()> {
    let Some(turn) = turn else {
        return Ok(());
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(BraidError::Cancelled),
        // A dropped sender also means the predecessor finished.
        _ = turn => Ok(()),
    }
}

//! Braid - Partitioned aggregation layer for object-storage APIs.
//!
//! Braid presents a single list/watch/CRUD surface over a resource type whose
//! instances are physically distributed across many backing partitions (one
//! per namespace, or per tenant). Each partition has its own backing store,
//! its own pagination cursor, and its own revision stream; Braid merges them
//! behind one paginated stream with a stable, opaque continue-token protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Embedder HTTP handler                       │
//! │              (router, schemas, authorization)                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Aggregating Store                         │
//! │   get/create/update/delete → one partition │ list │ watch       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Parallel Partition Lister                      │
//! │  bounded fan-out │ ordered emission │ capacity │ continue token │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Per-partition stores                          │
//! │        list │ watch │ point operations (embedder-supplied)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types and HTTP status mapping
//!
//! ## API
//! - [`api`] - Request context, objects, lists, and watch events
//!
//! ## Partition
//! - [`partition`] - Partition model and embedder-supplied contracts
//! - [`partition::token`] - Opaque continue-token codec
//! - [`partition::lister`] - Concurrent, order-preserving, resumable lister
//! - [`partition::store`] - Aggregating store facade and watch multiplex
//!
//! # Key Invariants
//!
//! - **ORDER**: list batches are emitted in partition-index order; a
//!   partition emits only after every earlier partition has finished
//! - **CAPACITY**: one page never carries more objects than its limit
//! - **REV-PIN**: the first successful partition list pins the session
//!   revision; every later backend call in the session carries it
//! - **TOKEN-OPAQUE**: all resumption state travels in the client's
//!   continue token; the server keeps no session state

// Core infrastructure
pub mod core;

// Wire-facing request and object types
pub mod api;

// Partition model, lister, and aggregating store
pub mod partition;

// Re-exports for convenience
pub use self::core::{config, error};
pub use api::{ApiEvent, ApiObject, ApiObjectList, ApiRequest, EventType, Verb, WatchRequest};
pub use partition::{lister, store, token, Partition, PartitionStore, Partitioner};

//! convoy-store: the coordination store adapter for Convoy.
//!
//! Agents and schedulers never talk to each other; they read and write
//! five tables (`status`, `assignments`, `services`, `revisions`,
//! `units`) in a shared key-value store.
//!
//! # Architecture
//!
//! ```text
//! Store (timeouts, paging, batch chunking, typed records)
//!   └── Arc<dyn KvBackend>
//!       ├── RedbBackend (embedded, on-disk or in-memory)
//!       └── FaultyBackend (feature `testing`, wraps another backend)
//! ```
//!
//! Items are open attribute maps serialized as JSON. A missing key is
//! `None`, never an error; every backend or timeout failure is
//! `StoreError::Unavailable`.

pub mod backend;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fault;
pub mod item;
pub mod records;
pub mod redb_backend;
pub mod tables;

pub use backend::{IndexQuery, KvBackend, Page, StoreFuture};
pub use client::{Cursor, Store};
pub use error::{StoreError, StoreResult};
pub use item::Item;
pub use records::{AssignmentRecord, Record, ServiceRecord, StatusRecord, UnitRecord};
pub use redb_backend::RedbBackend;
pub use tables::Table;

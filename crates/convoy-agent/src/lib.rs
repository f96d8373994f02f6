//! convoy-agent: the per-instance side of Convoy.
//!
//! An agent reads the revision the scheduler assigned to its instance,
//! resolves the revision's units, hands them to a [`UnitSupervisor`], and
//! reports per-unit status back to the store.
//!
//! # Architecture
//!
//! ```text
//! Agent (sync loop + status loop, backoff, shutdown)
//!   ├── AgentDb (own assignment row, revision, units, own status row)
//!   │   └── resolver::resolve_units
//!   ├── StatusReporter (full-overwrite heartbeat)
//!   └── Arc<dyn UnitSupervisor>
//! ```
//!
//! [`publish`] holds the write side used by operators: storing revisions
//! and setting service weights.

pub mod db;
pub mod error;
pub mod publish;
pub mod resolver;
pub mod status;
pub mod supervisor;
pub mod sync;

pub use db::AgentDb;
pub use error::{AgentError, AgentResult};
pub use publish::{publish_revision, set_weights};
pub use resolver::{Resolution, resolve_units};
pub use status::StatusReporter;
pub use supervisor::{LoggingSupervisor, SupervisorFuture, UnitSupervisor};
pub use sync::{Agent, SyncOutcome};

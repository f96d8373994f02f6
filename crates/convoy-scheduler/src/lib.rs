//! convoy-scheduler: weighted revision assignment.
//!
//! Reads service weights and live instance populations from the store and
//! writes, for each instance, the revision it should run. Assignments
//! follow the weights as closely as integer counts allow and move as few
//! instances as possible between passes.
//!
//! # Architecture
//!
//! ```text
//! Scheduler (loop, backoff, shutdown)
//!   ├── SchedulerDb (segment scan, population query, batch reads, writes)
//!   │     └── Store
//!   └── planner::plan
//!         └── targets::target_counts (largest remainder)
//! ```
//!
//! Several schedulers can split the services table with `(segment,
//! total_segments)`; nothing enforces that their segments are distinct.

pub mod db;
pub mod error;
pub mod planner;
pub mod scheduler;
pub mod targets;

pub use db::SchedulerDb;
pub use error::{SchedulerError, SchedulerResult};
pub use planner::{AssignmentChange, AssignmentMap, AssignmentPlan, plan, plan_with_targets};
pub use scheduler::{PassReport, Scheduler, ServiceSnapshot};
pub use targets::target_counts;

//! convoy-core: shared types and configuration for Convoy.
//!
//! Holds the content-addressed unit/revision model, validated service
//! weights, scan partitioning, retry backoff, and the `convoy.toml` parser.

pub mod backoff;
pub mod config;
pub mod partition;
pub mod types;
pub mod weights;

pub use backoff::Backoff;
pub use config::ConvoyConfig;
pub use partition::{Segment, SegmentError, segment_of};
pub use types::*;
pub use weights::{ServiceWeights, WeightError};

//! # rotary-retention
//!
//! Pruning of snapshot series under a retention policy.
//!
//! [`RetentionEngine::scan`] turns a working directory into [`Rotation`]s,
//! [`decide`] partitions them with an injected [`RetentionPolicy`] and
//! protects the latest alias target, [`RetentionEngine::execute`] previews or
//! removes the erase set.

pub mod engine;
pub mod error;
pub mod policy;
pub mod rotation;

pub use engine::{decide, PruneAction, RetentionDecision, RetentionEngine, Scan, Skipped};
pub use error::RetentionError;
pub use policy::{CountPolicy, RetentionPolicy};
pub use rotation::Rotation;

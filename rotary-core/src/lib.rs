//! Rotary core library — domain types, configuration, lifecycle hooks.
//!
//! - [`types`] — servers, directories and the per-job [`Scope`]
//! - [`config`] — YAML configuration load / save / validate
//! - [`lifecycle`] — guarded execution with prepare/success/failure/finish hooks
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod types;

pub use config::{Config, KeepTieBreak, RetentionRules, SnapshotConfig, TransferConfig};
pub use error::ConfigError;
pub use lifecycle::{Abort, Attempt, Hook, LifecycleBuilder, LifecycleController, Outcome};
pub use types::{Directory, Scope, Server, ServerName};

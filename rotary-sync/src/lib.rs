//! # rotary-sync
//!
//! Builds and issues the external synchronization command.
//!
//! [`Rsync`] copies a directory as-is; [`Snapshot`] writes each run into a
//! fresh snapshot series, hard-linking unchanged files from the latest one.
//! Both implement [`TransferMethod`] and issue commands through a
//! [`CommandRunner`].

pub mod error;
pub mod escape;
pub mod method;
pub mod runner;
pub mod snapshot;

pub use error::TransferError;
pub use escape::{escape, shell_quote};
pub use method::{connect_arguments, Rsync, TransferMethod, TransferOptions, PARTIAL_TRANSFER_CODE};
pub use runner::{CommandRunner, DryRunner, SystemRunner};
pub use snapshot::{link_arguments, Snapshot, SnapshotOptions};

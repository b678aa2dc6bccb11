//! Incremental snapshot transfers.
//!
//! Every run writes into `<target root>/<snapshot>/<directory>` and passes
//! `--link-dest` pointing at `<target root>/<latest>/<directory>`, so files
//! unchanged since the latest snapshot become hard links instead of copies.
//! The directory is sent by name into the parent of its snapshot path.
//!
//! ```text
//! /backups/
//!   2024-01-01T00-00/data/app/…
//!   2024-01-02T00-00/data/app/…   (unchanged files hard-linked)
//!   latest -> 2024-01-02T00-00
//! ```

use rotary_core::{Directory, Scope, Server};

use crate::error::TransferError;
use crate::method::{on_target, run_checked, Rsync, TransferMethod, TransferOptions};
use crate::runner::CommandRunner;

/// Options of the incremental method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub transfer: TransferOptions,
    /// Series this run writes into (usually a formatted timestamp).
    pub snapshot_name: String,
    /// Alias of the most recent completed series.
    pub latest_name: String,
}

/// Hard-linking transfer into a fresh snapshot series.
#[derive(Debug)]
pub struct Snapshot {
    rsync: Rsync,
    snapshot_name: String,
    latest_name: String,
}

impl Snapshot {
    /// Both series names must be single, distinct path segments.
    pub fn new(options: SnapshotOptions, runner: Box<dyn CommandRunner>) -> Result<Self, TransferError> {
        for (what, name) in [
            ("snapshot name", &options.snapshot_name),
            ("latest name", &options.latest_name),
        ] {
            if name.is_empty() || name == "." || name == ".." || name.contains('/') {
                return Err(TransferError::InvalidOption(format!(
                    "{what} '{name}' must be a single path segment"
                )));
            }
        }
        if options.snapshot_name == options.latest_name {
            return Err(TransferError::InvalidOption(format!(
                "snapshot name and latest name are both '{}'",
                options.latest_name
            )));
        }
        Ok(Self {
            rsync: Rsync::new(options.transfer, runner)?,
            snapshot_name: options.snapshot_name,
            latest_name: options.latest_name,
        })
    }

    pub fn snapshot_name(&self) -> &str {
        &self.snapshot_name
    }

    pub fn latest_name(&self) -> &str {
        &self.latest_name
    }

    /// `<snapshot>/<directory>`, relative to the target root.
    pub fn incremental_path(&self, directory: &Directory) -> String {
        std::iter::once(self.snapshot_name.as_str())
            .chain(directory.segments())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Point the latest alias on `target` at this run's snapshot.
    ///
    /// Issued once every directory of the run has been transferred.
    pub fn promote(&self, master: &Server, target: &Server) -> Result<(), TransferError> {
        let alias = target.path(&self.latest_name).display().to_string();
        let args = vec![
            "ln".to_string(),
            "-sfn".to_string(),
            self.snapshot_name.clone(),
            alias,
        ];
        tracing::info!(
            target = %target.name,
            snapshot = %self.snapshot_name,
            latest = %self.latest_name,
            "promoting snapshot"
        );
        run_checked(self.rsync.runner(), &on_target(master, target, &args), &[])
    }

    /// Create the destination tree on the target; `--link-dest` needs it.
    fn ensure_destination(&self, scope: &Scope, parent: &str) -> Result<(), TransferError> {
        let path = scope.target.path(parent).display().to_string();
        let args = vec!["mkdir".to_string(), "-p".to_string(), path];
        run_checked(
            self.rsync.runner(),
            &on_target(&scope.master, &scope.target, &args),
            &[],
        )
    }
}

impl TransferMethod for Snapshot {
    fn call(&self, scope: &Scope) -> Result<(), TransferError> {
        let incremental = self.incremental_path(&scope.directory);
        let parent = parent_path(&incremental);
        let links = link_arguments(&incremental, &self.latest_name, &scope.directory);
        let tokens = self.rsync.command_into(scope, parent, &links)?;

        self.ensure_destination(scope, parent)?;
        tracing::info!(
            directory = %scope.directory.path,
            target = %scope.target.name,
            snapshot = %incremental,
            "transferring snapshot"
        );
        self.rsync.issue(&tokens)
    }
}

/// Everything before the last `/` of `path`; `path` itself when it has none.
fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(parent, _)| parent)
}

/// `--link-dest` option for a transfer into `incremental`.
///
/// The path climbs one level per `/` separator of `incremental`, back to the
/// target root, then descends into `<latest>/<directory>`.
pub fn link_arguments(incremental: &str, latest_name: &str, directory: &Directory) -> Vec<String> {
    let depth = incremental.trim_matches('/').matches('/').count();
    let path = std::iter::repeat("..")
        .take(depth)
        .chain(std::iter::once(latest_name))
        .chain(directory.segments())
        .collect::<Vec<_>>()
        .join("/");
    vec!["--link-dest".to_string(), path]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Scan → decide → execute.
//!
//! ## Latest protection
//!
//! Whatever the policy returns, the rotation the latest alias points at is
//! moved into the keep set before anything is removed. Removal has no
//! rollback: an interrupted batch leaves earlier entries removed and the
//! rest untouched.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{io_err, RetentionError};
use crate::policy::RetentionPolicy;
use crate::rotation::Rotation;

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// A working-directory entry whose name did not match the format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub name: String,
    pub reason: String,
}

/// Result of [`RetentionEngine::scan`].
#[derive(Debug, Clone, Default)]
pub struct Scan {
    pub rotations: HashSet<Rotation>,
    pub skipped: Vec<Skipped>,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Disjoint keep and erase sets covering every scanned rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionDecision {
    pub keep: HashSet<Rotation>,
    pub erase: HashSet<Rotation>,
}

impl RetentionDecision {
    /// Keep set, newest first.
    pub fn keep_sorted(&self) -> Vec<&Rotation> {
        sorted(&self.keep)
    }

    /// Erase set, newest first.
    pub fn erase_sorted(&self) -> Vec<&Rotation> {
        sorted(&self.erase)
    }
}

fn sorted(set: &HashSet<Rotation>) -> Vec<&Rotation> {
    let mut list: Vec<&Rotation> = set.iter().collect();
    list.sort();
    list
}

/// Partition `all` with `policy`, then protect the latest alias target.
///
/// A misbehaving policy is normalised: rotations it left out or put in
/// both sets are kept, rotations it made up are dropped.
pub fn decide(
    all: &HashSet<Rotation>,
    policy: &dyn RetentionPolicy,
    latest: Option<&str>,
) -> RetentionDecision {
    let (keep, erase) = policy.filter(all);

    let invented = keep.iter().chain(erase.iter()).filter(|r| !all.contains(*r)).count();
    if invented > 0 {
        tracing::warn!(count = invented, "policy returned unknown rotations; ignoring them");
    }

    let mut decision = RetentionDecision::default();
    for rotation in all {
        if erase.contains(rotation) && !keep.contains(rotation) {
            decision.erase.insert(rotation.clone());
        } else {
            decision.keep.insert(rotation.clone());
        }
    }

    if let Some(latest) = latest {
        if let Some(protected) = decision.erase.iter().find(|r| r.path == latest).cloned() {
            tracing::info!(path = %protected.path, "latest snapshot protected from removal");
            decision.erase.remove(&protected);
            decision.keep.insert(protected);
        }
    }
    decision
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One reported step of a prune run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PruneAction {
    Keep { path: String },
    WouldErase { path: String },
    Erased { path: String },
    Failed { path: String, error: String },
}

impl PruneAction {
    pub fn path(&self) -> &str {
        match self {
            PruneAction::Keep { path }
            | PruneAction::WouldErase { path }
            | PruneAction::Erased { path }
            | PruneAction::Failed { path, .. } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Retention over the snapshot series inside one working directory.
#[derive(Debug, Clone)]
pub struct RetentionEngine {
    workdir: PathBuf,
    format: String,
    latest_name: String,
}

impl RetentionEngine {
    /// Rejects `format` when it contains an unknown strftime specifier.
    pub fn new(
        workdir: impl Into<PathBuf>,
        format: impl Into<String>,
        latest_name: impl Into<String>,
    ) -> Result<Self, RetentionError> {
        let format = format.into();
        if format.is_empty() || StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(RetentionError::InvalidFormat(format));
        }
        Ok(Self {
            workdir: workdir.into(),
            format,
            latest_name: latest_name.into(),
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Parse the immediate entries of the working directory.
    ///
    /// The latest alias is never a candidate. Names that do not match the
    /// format are skipped with a warning.
    pub fn scan(&self) -> Result<Scan, RetentionError> {
        let entries = fs::read_dir(&self.workdir).map_err(|e| io_err(&self.workdir, e))?;
        let mut scan = Scan::default();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.workdir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == self.latest_name {
                continue;
            }
            match Rotation::parse(&name, &self.format) {
                Ok(rotation) => {
                    scan.rotations.insert(rotation);
                }
                Err(err) => {
                    tracing::warn!(name = %name, format = %self.format, error = %err, "skipping entry");
                    scan.skipped.push(Skipped {
                        name,
                        reason: err.to_string(),
                    });
                }
            }
        }
        scan.skipped.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(scan)
    }

    /// Name of the rotation the latest alias points at, if it is a symlink.
    pub fn latest_target(&self) -> Option<String> {
        let link = fs::read_link(self.workdir.join(&self.latest_name)).ok()?;
        link.file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// [`scan`](Self::scan) followed by [`decide`] against the current alias.
    pub fn plan(&self, policy: &dyn RetentionPolicy) -> Result<(Scan, RetentionDecision), RetentionError> {
        let scan = self.scan()?;
        let latest = self.latest_target();
        let decision = decide(&scan.rotations, policy, latest.as_deref());
        Ok((scan, decision))
    }

    /// Report the partition and, unless `dry`, remove the erase set.
    ///
    /// Actions come keep set first, then erase set, each newest first.
    /// Every removal is attempted on its own; a failure is reported and the
    /// batch continues.
    pub fn execute(&self, decision: &RetentionDecision, dry: bool) -> Vec<PruneAction> {
        let mut actions: Vec<PruneAction> = decision
            .keep_sorted()
            .into_iter()
            .map(|r| PruneAction::Keep {
                path: r.path.clone(),
            })
            .collect();

        for rotation in decision.erase_sorted() {
            let path = rotation.path.clone();
            if dry {
                tracing::info!("[dry-run] would remove {}", path);
                actions.push(PruneAction::WouldErase { path });
                continue;
            }
            match remove_entry(&self.workdir.join(&rotation.path)) {
                Ok(()) => {
                    tracing::info!(path = %path, "removed");
                    actions.push(PruneAction::Erased { path });
                }
                Err(err) => {
                    tracing::error!(path = %path, error = %err, "removal failed");
                    actions.push(PruneAction::Failed {
                        path,
                        error: err.to_string(),
                    });
                }
            }
        }
        actions
    }
}

// ---------------------------------------------------------------------------
// Removal helpers
// ---------------------------------------------------------------------------

fn remove_entry(path: &Path) -> Result<(), RetentionError> {
    let meta = fs::symlink_metadata(path).map_err(|e| io_err(path, e))?;
    if !meta.is_dir() {
        return fs::remove_file(path).map_err(|e| io_err(path, e));
    }
    make_writable(path)?;
    fs::remove_dir_all(path).map_err(|e| io_err(path, e))
}

/// Give the owner full access to every directory below `root` so read-only
/// snapshot trees can be removed.
///
/// Files are left alone: unlinking needs a writable parent, not a writable
/// file, and snapshot files share inodes with the snapshots that are kept.
fn make_writable(root: &Path) -> Result<(), RetentionError> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            io_err(path, e.into())
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let meta = entry.metadata().map_err(|e| io_err(entry.path(), e.into()))?;
        set_owner_writable(entry.path(), meta.permissions())?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_owner_writable(path: &Path, mut perms: fs::Permissions) -> Result<(), RetentionError> {
    use std::os::unix::fs::PermissionsExt;
    if perms.mode() & 0o700 == 0o700 {
        return Ok(());
    }
    perms.set_mode(perms.mode() | 0o700);
    fs::set_permissions(path, perms).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_owner_writable(path: &Path, mut perms: fs::Permissions) -> Result<(), RetentionError> {
    if !perms.readonly() {
        return Ok(());
    }
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms).map_err(|e| io_err(path, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rotary_core::KeepTieBreak;
    use tempfile::TempDir;

    use crate::policy::CountPolicy;

    fn rotation(day: u32) -> Rotation {
        let created = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Rotation::new(format!("202401{day:02}"), created)
    }

    fn set(days: &[u32]) -> HashSet<Rotation> {
        days.iter().map(|d| rotation(*d)).collect()
    }

    fn erase_everything(all: &HashSet<Rotation>) -> (HashSet<Rotation>, HashSet<Rotation>) {
        (HashSet::new(), all.clone())
    }

    fn assert_partition(all: &HashSet<Rotation>, d: &RetentionDecision) {
        assert!(d.keep.is_disjoint(&d.erase), "keep and erase overlap");
        let union: HashSet<_> = d.keep.union(&d.erase).cloned().collect();
        assert_eq!(&union, all, "partition must cover exactly the input");
    }

    #[test]
    fn latest_is_moved_out_of_erase() {
        let all = set(&[1, 2, 3]);
        let decision = decide(&all, &erase_everything, Some("20240103"));
        assert_partition(&all, &decision);
        assert!(decision.keep.contains(&rotation(3)));
        assert_eq!(decision.erase.len(), 2);
    }

    #[test]
    fn without_latest_policy_decision_stands() {
        let all = set(&[1, 2, 3]);
        let decision = decide(&all, &erase_everything, None);
        assert!(decision.keep.is_empty());
        assert_eq!(decision.erase.len(), 3);
    }

    #[test]
    fn unknown_latest_changes_nothing() {
        let all = set(&[1, 2]);
        let decision = decide(&all, &erase_everything, Some("20991231"));
        assert_eq!(decision.erase.len(), 2);
    }

    #[test]
    fn misbehaving_policy_is_normalised() {
        let all = set(&[1, 2, 3]);
        let sloppy = |_: &HashSet<Rotation>| {
            // 1 in both, 2 missing, 9 invented, 3 erased.
            (set(&[1, 9]), set(&[1, 3]))
        };
        let decision = decide(&all, &sloppy, None);
        assert_partition(&all, &decision);
        assert!(decision.keep.contains(&rotation(1)));
        assert!(decision.keep.contains(&rotation(2)));
        assert_eq!(decision.erase_sorted(), vec![&rotation(3)]);
    }

    #[test]
    fn count_policy_with_protection() {
        let all = set(&[1, 2, 3, 4]);
        let policy = CountPolicy::new(1, KeepTieBreak::Oldest);
        let decision = decide(&all, &policy, Some("20240104"));
        assert_partition(&all, &decision);
        let kept: Vec<_> = decision.keep_sorted().iter().map(|r| r.path.clone()).collect();
        assert_eq!(kept, vec!["20240104", "20240101"]);
    }

    #[test]
    fn unknown_format_specifier_is_rejected() {
        let err = RetentionEngine::new("/tmp", "%Y-%Q", "latest").unwrap_err();
        assert!(matches!(err, RetentionError::InvalidFormat(_)));
    }

    #[test]
    fn scan_skips_alias_and_unparseable_names() {
        let dir = TempDir::new().unwrap();
        for name in ["20240101", "20240102", "bad-name", "latest"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let engine = RetentionEngine::new(dir.path(), "%Y%m%d", "latest").unwrap();
        let scan = engine.scan().unwrap();
        assert_eq!(scan.rotations, set(&[1, 2]));
        assert_eq!(scan.skipped.len(), 1);
        assert_eq!(scan.skipped[0].name, "bad-name");
    }

    #[test]
    fn scan_of_missing_workdir_fails_with_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = RetentionEngine::new(&missing, "%Y%m%d", "latest")
            .unwrap()
            .scan()
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn dry_run_reports_without_removing() {
        let dir = TempDir::new().unwrap();
        for name in ["20240101", "20240102", "20240103"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let engine = RetentionEngine::new(dir.path(), "%Y%m%d", "latest").unwrap();
        let (_, decision) = engine.plan(&CountPolicy::new(1, KeepTieBreak::Youngest)).unwrap();
        let actions = engine.execute(&decision, true);

        assert_eq!(
            actions,
            vec![
                PruneAction::Keep { path: "20240103".into() },
                PruneAction::WouldErase { path: "20240102".into() },
                PruneAction::WouldErase { path: "20240101".into() },
            ]
        );
        for name in ["20240101", "20240102", "20240103"] {
            assert!(dir.path().join(name).exists());
        }
    }

    #[test]
    fn failed_removal_does_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("20240101")).unwrap();
        let engine = RetentionEngine::new(dir.path(), "%Y%m%d", "latest").unwrap();
        // 20240102 is in the decision but gone from disk.
        let decision = RetentionDecision {
            keep: HashSet::new(),
            erase: set(&[1, 2]),
        };
        let actions = engine.execute(&decision, false);
        assert!(matches!(&actions[0], PruneAction::Failed { path, .. } if path == "20240102"));
        assert_eq!(actions[1], PruneAction::Erased { path: "20240101".into() });
        assert!(!dir.path().join("20240101").exists());
    }

    #[test]
    fn action_path_accessor() {
        let action = PruneAction::Failed {
            path: "x".into(),
            error: "boom".into(),
        };
        assert_eq!(action.path(), "x");
    }
}

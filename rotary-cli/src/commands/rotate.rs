//! `rotary rotate` — transfer every configured directory to its targets.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{bail, Result};
use chrono::Local;
use clap::Args;
use colored::Colorize;

use rotary_core::lifecycle::{FAILURE, FINISH, PREPARE, SUCCESS};
use rotary_core::{Attempt, Config, LifecycleBuilder, LifecycleController, Outcome, Scope, Server};
use rotary_sync::{
    CommandRunner, DryRunner, Rsync, Snapshot, SnapshotOptions, SystemRunner, TransferError,
    TransferMethod, TransferOptions,
};

/// Arguments for `rotary rotate`.
#[derive(Args, Debug)]
pub struct RotateArgs {
    /// Only rotate to this target (default: every configured target).
    #[arg(long, short = 't')]
    pub target: Option<String>,

    /// Log the commands that would run without running them.
    #[arg(long)]
    pub dry_run: bool,
}

/// A directory that did not make it to a target.
#[derive(Debug, Clone)]
struct Failure {
    target: String,
    directory: String,
    error: String,
}

type Failures = Rc<RefCell<Vec<Failure>>>;

enum Method {
    Plain(Rsync),
    Snapshot(Snapshot),
}

impl Method {
    fn transfer(&self) -> &dyn TransferMethod {
        match self {
            Method::Plain(m) => m,
            Method::Snapshot(m) => m,
        }
    }
}

impl RotateArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let targets: Vec<&Server> = match &self.target {
            Some(name) => vec![config.target(name)?],
            None => config.targets.iter().collect(),
        };
        if targets.is_empty() {
            bail!("no targets configured");
        }

        let snapshot_name = config
            .snapshot
            .name
            .clone()
            .unwrap_or_else(|| Local::now().format(&config.snapshot.format).to_string());

        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        let failures: Failures = Rc::default();

        for target in targets {
            let method = build_method(config, &snapshot_name, self.dry_run)?;
            println!("{prefix}→ {} ({})", target.name.to_string().bold(), target.host);
            rotate_target(config, target, &method, &failures);
        }

        let failures = failures.borrow();
        if failures.is_empty() {
            println!("{prefix}{} rotation complete", "✓".green().bold());
            return Ok(());
        }
        for f in failures.iter() {
            eprintln!("  {} {} → {}: {}", "✗".red().bold(), f.directory, f.target, f.error);
        }
        bail!("{} transfer(s) failed", failures.len())
    }
}

fn build_method(config: &Config, snapshot_name: &str, dry_run: bool) -> Result<Method> {
    let runner: Box<dyn CommandRunner> = if dry_run {
        Box::new(DryRunner)
    } else {
        Box::new(SystemRunner)
    };
    let transfer = TransferOptions::from(&config.transfer);
    let method = if config.snapshot.enabled {
        Method::Snapshot(Snapshot::new(
            SnapshotOptions {
                transfer,
                snapshot_name: snapshot_name.to_string(),
                latest_name: config.snapshot.latest_name.clone(),
            },
            runner,
        )?)
    } else {
        Method::Plain(Rsync::new(transfer, runner)?)
    };
    Ok(method)
}

/// Run every directory for one target inside its own controller, so a
/// persistent abort only stops this target.
fn rotate_target(config: &Config, target: &Server, method: &Method, failures: &Failures) {
    let controller = build_controller(failures);
    let before = failures.borrow().len();
    let mut completed = 0usize;

    for directory in &config.directories {
        let scope = Scope::new(config.master.clone(), target.clone(), directory.clone());
        let result = controller.attempt(Some(&scope), || transfer(method.transfer(), &scope, failures));
        match result {
            Ok(Attempt::Completed(())) => completed += 1,
            Ok(Attempt::Skipped) => {
                tracing::warn!(directory = %directory.path, target = %target.name, "skipped: target aborted");
            }
            Ok(Attempt::Aborted | Attempt::Recovered) => {}
            // The failure hook records and handles every error.
            Err(err) => record(failures, &scope, &err),
        }
    }

    let clean = failures.borrow().len() == before && completed == config.directories.len();
    if let Method::Snapshot(snapshot) = method {
        if !clean {
            tracing::warn!(target = %target.name, "not promoting incomplete snapshot");
            return;
        }
        if let Err(err) = snapshot.promote(&config.master, target) {
            failures.borrow_mut().push(Failure {
                target: target.name.to_string(),
                directory: format!("<{}>", snapshot.latest_name()),
                error: err.to_string(),
            });
        }
    }
}

/// Work for one directory. A missing source skips the directory; a broken
/// connection command stops the whole target.
fn transfer(
    method: &dyn TransferMethod,
    scope: &Scope,
    failures: &Failures,
) -> Result<Outcome<()>, TransferError> {
    let source = scope.master.path(&scope.directory.path);
    if !source.exists() {
        tracing::warn!(path = %source.display(), "source directory missing; skipping");
        return Ok(Outcome::abort());
    }
    match method.call(scope) {
        Ok(()) => Ok(Outcome::Completed(())),
        Err(err @ TransferError::Configuration { .. }) => {
            tracing::error!(target = %scope.target.name, error = %err, "aborting target");
            record(failures, scope, &err);
            Ok(Outcome::abort_persistent())
        }
        Err(err) => Err(err),
    }
}

fn build_controller(failures: &Failures) -> LifecycleController<Scope, TransferError> {
    let sink = Rc::clone(failures);
    LifecycleBuilder::<Scope, TransferError>::new()
        .on(PREPARE, |hook| {
            if let Some(scope) = hook.scope {
                tracing::debug!(directory = %scope.directory.path, target = %scope.target.name, "prepare");
            }
            Ok(())
        })
        .on(SUCCESS, |hook| {
            if let Some(scope) = hook.scope {
                println!("  {} {}", "✓".green(), scope.directory.path);
            }
            Ok(())
        })
        .on(FAILURE, move |hook| {
            if let (Some(scope), Some(err)) = (hook.scope, hook.error) {
                println!("  {} {}", "✗".red(), scope.directory.path);
                record(&sink, scope, err);
            }
            Ok(())
        })
        .on(FINISH, |hook| {
            if let Some(scope) = hook.scope {
                tracing::debug!(directory = %scope.directory.path, "finished");
            }
            Ok(())
        })
        .build()
}

fn record(failures: &Failures, scope: &Scope, err: &TransferError) {
    tracing::error!(directory = %scope.directory.path, target = %scope.target.name, error = %err, "transfer failed");
    failures.borrow_mut().push(Failure {
        target: scope.target.name.to_string(),
        directory: scope.directory.path.clone(),
        error: err.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotary_core::{Directory, RetentionRules, SnapshotConfig, TransferConfig};
    use tempfile::TempDir;

    fn config(root: &std::path::Path, dirs: &[&str]) -> Config {
        Config {
            master: Server::new("master", "localhost", root.join("master")),
            targets: vec![Server::new("target", "localhost", root.join("target"))],
            directories: dirs.iter().map(|d| Directory::new(*d)).collect(),
            transfer: TransferConfig::default(),
            snapshot: SnapshotConfig {
                name: Some("20240101".into()),
                ..SnapshotConfig::default()
            },
            retention: RetentionRules::default(),
        }
    }

    #[test]
    fn missing_source_is_skipped_without_failure() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path(), &["absent"]);
        let method = build_method(&cfg, "20240101", true).unwrap();
        let failures: Failures = Rc::default();
        rotate_target(&cfg, &cfg.targets[0], &method, &failures);
        assert!(failures.borrow().is_empty());
    }

    #[test]
    fn broken_connection_command_aborts_remaining_directories() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(tmp.path(), &["a", "b"]);
        for d in ["a", "b"] {
            std::fs::create_dir_all(tmp.path().join("master").join(d)).unwrap();
        }
        cfg.targets[0].host = "nas.lan".into();
        cfg.targets[0].command = Some(vec!["ssh".into(), "wrong-host".into()]);

        let method = build_method(&cfg, "20240101", true).unwrap();
        let failures: Failures = Rc::default();
        rotate_target(&cfg, &cfg.targets[0], &method, &failures);

        let failures = failures.borrow();
        assert_eq!(failures.len(), 1, "second directory must be skipped");
        assert_eq!(failures[0].directory, "a");
        assert!(failures[0].error.contains("wrong-host"));
    }

    #[test]
    fn dry_run_completes_every_directory() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path(), &["a"]);
        std::fs::create_dir_all(tmp.path().join("master/a")).unwrap();
        let method = build_method(&cfg, "20240101", true).unwrap();
        let failures: Failures = Rc::default();
        rotate_target(&cfg, &cfg.targets[0], &method, &failures);
        assert!(failures.borrow().is_empty());
        assert!(!tmp.path().join("target").exists(), "dry-run must not touch the target");
    }
}

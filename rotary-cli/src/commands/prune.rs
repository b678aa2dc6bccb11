//! `rotary prune` — apply the retention rules to one working directory.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use rotary_core::Config;
use rotary_retention::{CountPolicy, PruneAction, RetentionEngine, Skipped};

/// Arguments for `rotary prune`.
#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Directory holding the snapshot series.
    pub workdir: PathBuf,

    /// Report what would be removed without removing anything.
    #[arg(long)]
    pub dry: bool,

    /// Keep this many snapshots (overrides `retention.last`).
    #[arg(long, value_name = "N")]
    pub keep: Option<usize>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PruneReport {
    workdir: String,
    dry: bool,
    latest: Option<String>,
    skipped: Vec<Skipped>,
    actions: Vec<ActionJson>,
}

#[derive(Serialize)]
struct ActionJson {
    #[serde(flatten)]
    action: PruneAction,
    created: Option<String>,
}

#[derive(Tabled)]
struct PruneTableRow {
    #[tabled(rename = "snapshot")]
    snapshot: String,
    #[tabled(rename = "created")]
    created: String,
    #[tabled(rename = "action")]
    action: String,
}

impl PruneArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let rules = &config.retention;
        let count = match self.keep.or(rules.last.map(|n| n as usize)) {
            Some(count) => count,
            None => bail!("no retention count: set retention.last or pass --keep"),
        };
        let periods = rules.periods();
        if !periods.is_empty() {
            let names: Vec<&str> = periods.iter().map(|(p, _)| *p).collect();
            tracing::warn!(
                periods = %names.join(","),
                "period retention needs an external policy; keeping the newest {count} only"
            );
        }

        let engine = RetentionEngine::new(
            &self.workdir,
            &config.snapshot.format,
            &config.snapshot.latest_name,
        )?;
        let policy = CountPolicy::new(count, rules.keep);
        let (scan, decision) = engine
            .plan(&policy)
            .with_context(|| format!("failed to scan '{}'", self.workdir.display()))?;
        let actions = engine.execute(&decision, self.dry);

        let created: HashMap<&str, String> = scan
            .rotations
            .iter()
            .map(|r| (r.path.as_str(), r.created.format("%Y-%m-%d %H:%M").to_string()))
            .collect();
        let failed = actions
            .iter()
            .filter(|a| matches!(a, PruneAction::Failed { .. }))
            .count();

        if self.json {
            let report = PruneReport {
                workdir: self.workdir.display().to_string(),
                dry: self.dry,
                latest: engine.latest_target(),
                skipped: scan.skipped.clone(),
                actions: actions
                    .iter()
                    .map(|action| ActionJson {
                        created: created.get(action.path()).cloned(),
                        action: action.clone(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_table(&self, &actions, &created, &scan.skipped);
        }

        if failed > 0 {
            bail!("{failed} snapshot(s) could not be removed");
        }
        Ok(())
    }
}

fn print_table(
    args: &PruneArgs,
    actions: &[PruneAction],
    created: &HashMap<&str, String>,
    skipped: &[Skipped],
) {
    let prefix = if args.dry { "[dry-run] " } else { "" };
    println!("{prefix}{}", args.workdir.display().to_string().bold());

    if actions.is_empty() {
        println!("  no snapshots found");
    } else {
        let rows: Vec<PruneTableRow> = actions
            .iter()
            .map(|action| PruneTableRow {
                snapshot: action.path().to_string(),
                created: created.get(action.path()).cloned().unwrap_or_default(),
                action: action_label(action),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    for entry in skipped {
        println!("  {} skipped '{}': {}", "!".yellow(), entry.name, entry.reason);
    }

    let count = |f: fn(&PruneAction) -> bool| actions.iter().filter(|a| f(a)).count();
    let kept = count(|a| matches!(a, PruneAction::Keep { .. }));
    let erased = count(|a| matches!(a, PruneAction::Erased { .. } | PruneAction::WouldErase { .. }));
    let failed = count(|a| matches!(a, PruneAction::Failed { .. }));
    let verb = if args.dry { "would remove" } else { "removed" };
    let summary = format!("{kept} kept, {erased} {verb}");
    if failed > 0 {
        println!("{} {summary}, {failed} failed", "✗".red().bold());
    } else {
        println!("{} {summary}", "✓".green().bold());
    }
}

fn action_label(action: &PruneAction) -> String {
    match action {
        PruneAction::Keep { .. } => "KEEP".to_string(),
        PruneAction::WouldErase { .. } => "WOULD REMOVE".to_string(),
        PruneAction::Erased { .. } => "REMOVED".to_string(),
        PruneAction::Failed { error, .. } => format!("FAILED: {error}"),
    }
}

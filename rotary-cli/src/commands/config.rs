//! `rotary config check` — validate and summarise the configuration.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use rotary_core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the config and print what it describes.
    Check,
}

pub fn run(command: ConfigCommand, config: &Config) -> Result<()> {
    match command {
        ConfigCommand::Check => {
            print_summary(config);
            Ok(())
        }
    }
}

fn print_summary(config: &Config) {
    println!("{} config is valid", "✓".green().bold());
    println!(
        "  master:  {} ({}:{})",
        config.master.name,
        config.master.host,
        config.master.root.display()
    );
    for target in &config.targets {
        println!(
            "  target:  {} ({}:{})  via `{}`",
            target.name,
            target.host,
            target.root.display(),
            target.connect_command().join(" ")
        );
    }
    for dir in &config.directories {
        println!("  dir:     {}", dir.path);
    }

    let method = if config.snapshot.enabled {
        format!(
            "snapshot (format {}, latest '{}')",
            config.snapshot.format, config.snapshot.latest_name
        )
    } else {
        "plain".to_string()
    };
    println!("  method:  {method}");

    let rules = &config.retention;
    let mut retention: Vec<String> = rules.last.iter().map(|n| format!("last {n}")).collect();
    retention.extend(rules.periods().into_iter().map(|(p, n)| format!("{p} {n}")));
    if retention.is_empty() {
        println!("  retain:  (none)");
    } else {
        println!("  retain:  {} (keep {})", retention.join(", "), rules.keep);
    }
}

//! Plain transfer method and the command plumbing shared with [`Snapshot`].
//!
//! Command layout:
//!
//! ```text
//! <program> <arguments> <directory tokens> [-e <remote shell>] [--link-dest <dir>] <source> <destination>
//! ```
//!
//! [`Snapshot`]: crate::Snapshot

use rotary_core::{Scope, Server, TransferConfig};

use crate::error::TransferError;
use crate::escape::{escape, shell_quote};
use crate::runner::{command_line, CommandRunner};

/// rsync exit code for "some files vanished before they could be
/// transferred". Expected when backing up a live filesystem.
pub const PARTIAL_TRANSFER_CODE: i32 = 24;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Construction-time options of a transfer method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Base command tokens.
    pub program: Vec<String>,
    /// Appends `--archive`.
    pub archive: bool,
    /// Appends `--stats`.
    pub stats: bool,
    /// Appended after the feature flags.
    pub arguments: Vec<String>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            program: vec!["rsync".to_string()],
            archive: false,
            stats: false,
            arguments: vec![],
        }
    }
}

impl From<&TransferConfig> for TransferOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            program: config.program.clone(),
            archive: config.archive,
            stats: config.stats,
            arguments: config.arguments.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TransferMethod
// ---------------------------------------------------------------------------

/// Moves one directory from the scope's master to its target.
pub trait TransferMethod {
    fn call(&self, scope: &Scope) -> Result<(), TransferError>;
}

/// Copies a directory straight into the same relative path on the target.
pub struct Rsync {
    program: Vec<String>,
    arguments: Vec<String>,
    runner: Box<dyn CommandRunner>,
}

impl std::fmt::Debug for Rsync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rsync")
            .field("program", &self.program)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

impl Rsync {
    pub fn new(options: TransferOptions, runner: Box<dyn CommandRunner>) -> Result<Self, TransferError> {
        if options.program.is_empty() {
            return Err(TransferError::InvalidOption("program is empty".into()));
        }
        let mut arguments = Vec::new();
        if options.archive {
            arguments.push("--archive".to_string());
        }
        if options.stats {
            arguments.push("--stats".to_string());
        }
        arguments.extend(options.arguments);
        Ok(Self {
            program: options.program,
            arguments,
            runner,
        })
    }

    /// Base tokens.
    pub fn program(&self) -> &[String] {
        &self.program
    }

    /// Feature flags and extra arguments, in construction order.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub(crate) fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Full token list copying the contents of `scope`'s directory into
    /// `destination` (a path relative to the target root).
    pub fn command(
        &self,
        scope: &Scope,
        destination: &str,
        extra: &[String],
    ) -> Result<Vec<String>, TransferError> {
        let source = format!(
            "{}/",
            scope.master.location(&scope.directory.path, &scope.master)
        );
        let destination = scope.target.location(destination, &scope.master);
        self.tokens(scope, source, destination, extra)
    }

    /// Full token list copying `scope`'s directory itself, last segment
    /// included, into the target directory `parent`.
    pub fn command_into(
        &self,
        scope: &Scope,
        parent: &str,
        extra: &[String],
    ) -> Result<Vec<String>, TransferError> {
        let source = scope.master.location(&scope.directory.path, &scope.master);
        let destination = format!("{}/", scope.target.location(parent, &scope.master));
        self.tokens(scope, source, destination, extra)
    }

    fn tokens(
        &self,
        scope: &Scope,
        source: String,
        destination: String,
        extra: &[String],
    ) -> Result<Vec<String>, TransferError> {
        let mut tokens = self.program.clone();
        tokens.extend(self.arguments.iter().cloned());
        tokens.extend(scope.directory.tokens());
        tokens.extend(connect_arguments(&scope.master, &scope.target)?);
        tokens.extend(extra.iter().cloned());
        tokens.push(source);
        tokens.push(destination);
        Ok(tokens)
    }

    /// Issue `tokens`, tolerating [`PARTIAL_TRANSFER_CODE`].
    pub(crate) fn issue(&self, tokens: &[String]) -> Result<(), TransferError> {
        run_checked(self.runner(), tokens, &[PARTIAL_TRANSFER_CODE])
    }
}

impl TransferMethod for Rsync {
    fn call(&self, scope: &Scope) -> Result<(), TransferError> {
        let tokens = self.command(scope, &scope.directory.path, &[])?;
        tracing::info!(
            directory = %scope.directory.path,
            target = %scope.target.name,
            "transferring"
        );
        self.issue(&tokens)
    }
}

// ---------------------------------------------------------------------------
// Connection helpers
// ---------------------------------------------------------------------------

/// `-e <remote shell>` options needed to reach `target` from `master`.
///
/// Empty when both are the same host. rsync appends the host itself, so the
/// target's connection command must end with its host token, which is
/// dropped here.
pub fn connect_arguments(master: &Server, target: &Server) -> Result<Vec<String>, TransferError> {
    if master.same_host(target) {
        return Ok(vec![]);
    }
    let mut command = target.connect_command();
    if command.last() != Some(&target.host) {
        return Err(TransferError::Configuration {
            command: escape(&command),
            host: target.host.clone(),
        });
    }
    command.pop();
    Ok(vec!["-e".to_string(), escape(&command)])
}

/// Tokens running `args` on `target`, locally when it shares `master`'s
/// host, otherwise through the target's connection command. The remote
/// shell sees every argument quoted.
pub(crate) fn on_target(master: &Server, target: &Server, args: &[String]) -> Vec<String> {
    if master.same_host(target) {
        return args.to_vec();
    }
    let mut tokens = target.connect_command();
    tokens.extend(args.iter().map(|arg| shell_quote(arg)));
    tokens
}

/// Run `tokens`; exit code zero and the `tolerated` codes count as success.
pub(crate) fn run_checked(
    runner: &dyn CommandRunner,
    tokens: &[String],
    tolerated: &[i32],
) -> Result<(), TransferError> {
    let Some((program, args)) = tokens.split_first() else {
        return Err(TransferError::InvalidOption("empty command".into()));
    };
    let line = command_line(program, args);
    let code = runner.run(program, args).map_err(|source| TransferError::Spawn {
        command: line.clone(),
        source,
    })?;
    match code {
        Some(0) => Ok(()),
        Some(code) if tolerated.contains(&code) => {
            tracing::warn!(status = code, command = %line, "partial transfer tolerated");
            Ok(())
        }
        Some(code) => Err(TransferError::CommandFailed {
            command: line,
            status: format!("exit status {code}"),
        }),
        None => Err(TransferError::CommandFailed {
            command: line,
            status: "terminated by signal".to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

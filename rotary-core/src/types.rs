//! Domain types shared by the transfer and retention crates.
//!
//! All filesystem roots use `PathBuf`; directory paths inside a root are kept
//! as relative `/`-separated strings because they are replayed verbatim on
//! remote hosts.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a configured server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerName(pub String);

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServerName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A host taking part in a backup: either the master or one of its targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub name: ServerName,
    /// Hostname used both for host comparison and as the trailing token of
    /// the default connection command.
    pub host: String,
    /// Backup root on this host. Directory paths are resolved below it.
    pub root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Explicit connection command. Must end with the host token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl Server {
    /// A server reachable with the default `ssh <host>` command.
    pub fn new(name: impl Into<ServerName>, host: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            root: root.into(),
            user: None,
            port: None,
            command: None,
        }
    }

    /// Whether both servers name the same host.
    pub fn same_host(&self, other: &Server) -> bool {
        self.host == other.host
    }

    /// Tokens that open a shell on this server.
    ///
    /// Either the configured `command`, or `ssh [-p port] [-l user] host`.
    pub fn connect_command(&self) -> Vec<String> {
        if let Some(command) = &self.command {
            return command.clone();
        }
        let mut tokens = vec!["ssh".to_string()];
        if let Some(port) = self.port {
            tokens.push("-p".to_string());
            tokens.push(port.to_string());
        }
        if let Some(user) = &self.user {
            tokens.push("-l".to_string());
            tokens.push(user.clone());
        }
        tokens.push(self.host.clone());
        tokens
    }

    /// `<root>/<relative>` on this server.
    pub fn path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    /// Location string for `relative` as seen from `from`.
    ///
    /// Plain path when `from` is on the same host, `host:path` otherwise.
    pub fn location(&self, relative: &str, from: &Server) -> String {
        let path = self.path(relative).display().to_string();
        if self.same_host(from) {
            path
        } else {
            format!("{}:{}", self.host, path)
        }
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// A directory below the master's root that gets transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    /// Relative, `/`-separated path (e.g. `data/app`).
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    /// Extra transfer arguments applied only to this directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

impl Directory {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            excludes: vec![],
            arguments: vec![],
        }
    }

    /// Directory-specific transfer tokens: its own arguments, then one
    /// `--exclude=<pattern>` per exclude.
    pub fn tokens(&self) -> Vec<String> {
        self.arguments
            .iter()
            .cloned()
            .chain(self.excludes.iter().map(|p| format!("--exclude={p}")))
            .collect()
    }

    /// Path segments, ignoring empty and `.` components.
    pub fn segments(&self) -> Vec<&str> {
        self.path
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect()
    }

    /// `true` when the path is relative and never climbs out of its root.
    pub fn is_contained(&self) -> bool {
        let path = Path::new(&self.path);
        !self.segments().is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Everything a single transfer job needs to know about where data moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub master: Server,
    pub target: Server,
    pub directory: Directory,
}

impl Scope {
    pub fn new(master: Server, target: Server, directory: Directory) -> Self {
        Self {
            master,
            target,
            directory,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

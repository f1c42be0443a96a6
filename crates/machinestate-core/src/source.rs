//! Raw reads from files, commands and environment variables.
//!
//! Every read either yields trimmed text or an [`Unavailable`] carrying the
//! reason. Nothing here returns a hard error: a missing tool or an unreadable
//! file is ordinary data for an inventory.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::collector::Host;

/// Default bound on how long an external command may run.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a raw value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// A (usually virtual) file.
    File(PathBuf),
    /// An external program, looked up on `PATH`.
    Command { program: String, args: Vec<String> },
    /// An environment variable.
    Env(String),
}

impl Source {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Source::File(path.into())
    }

    pub fn command(program: impl Into<String>, args: &[&str]) -> Self {
        Source::Command {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn env(name: impl Into<String>) -> Self {
        Source::Env(name.into())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "file {}", path.display()),
            Source::Command { program, args } if args.is_empty() => {
                write!(f, "command `{program}`")
            }
            Source::Command { program, args } => {
                write!(f, "command `{program} {}`", args.join(" "))
            }
            Source::Env(name) => write!(f, "env ${name}"),
        }
    }
}

/// A source that produced no usable text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{origin} unavailable: {reason}")]
pub struct Unavailable {
    /// Human readable description of the source.
    pub origin: String,
    pub reason: String,
}

impl Unavailable {
    pub fn new(origin: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self {
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }
}

/// Reads [`Source`]s through a [`Host`].
#[derive(Clone, Copy)]
pub struct SourceReader<'a> {
    host: &'a dyn Host,
    timeout: Duration,
}

impl fmt::Debug for SourceReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceReader")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<'a> SourceReader<'a> {
    pub fn new(host: &'a dyn Host, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    pub fn host(&self) -> &'a dyn Host {
        self.host
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reads a source, logging the reason when it is unavailable.
    pub fn read(&self, source: &Source) -> Result<String, Unavailable> {
        let result = match source {
            Source::File(path) => self.read_file(path),
            Source::Command { program, args } => self.run(program, args),
            Source::Env(name) => self.env(name),
        };
        if let Err(e) = &result {
            debug!(origin = %e.origin, reason = %e.reason, "source unavailable");
        }
        result
    }

    /// Reads and trims a file.
    pub fn read_file(&self, path: &Path) -> Result<String, Unavailable> {
        self.host
            .read_to_string(path)
            .map(|content| content.trim().to_string())
            .map_err(|e| Unavailable::new(Source::File(path.to_path_buf()), e.to_string()))
    }

    /// Runs a command and returns its trimmed stdout.
    ///
    /// Missing programs, non-zero exit status and timeouts are unavailable.
    pub fn run(&self, program: &str, args: &[String]) -> Result<String, Unavailable> {
        let origin = || Source::Command {
            program: program.to_string(),
            args: args.to_vec(),
        };
        if self.host.which(program).is_none() {
            return Err(Unavailable::new(origin(), "not found on PATH"));
        }
        let output = self
            .host
            .run(program, args, self.timeout)
            .map_err(|e| Unavailable::new(origin(), e.to_string()))?;
        if !output.success {
            let status = output
                .code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            let first_line = output.stderr.lines().next().unwrap_or("").trim();
            return Err(Unavailable::new(
                origin(),
                format!("exited with {status}: {first_line}"),
            ));
        }
        Ok(output.stdout.trim().to_string())
    }

    pub fn env(&self, name: &str) -> Result<String, Unavailable> {
        self.host
            .var(name)
            .ok_or_else(|| Unavailable::new(Source::Env(name.to_string()), "not set"))
    }

    /// Names of the entries of a directory, sorted.
    pub fn list_dir(&self, dir: &Path) -> Result<Vec<String>, Unavailable> {
        let entries = self
            .host
            .read_dir(dir)
            .map_err(|e| Unavailable::new(Source::File(dir.to_path_buf()), e.to_string()))?;
        let mut names: Vec<String> = entries
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.host.exists(path)
    }

    pub fn which(&self, program: &str) -> Option<PathBuf> {
        self.host.which(program)
    }
}

/// Command results shared by the fields of one class while it populates,
/// so several fields parsed from the same output run the program once.
#[derive(Debug, Default)]
pub struct SourceCache {
    commands: HashMap<Source, Result<String, Unavailable>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads through `reader`, reusing earlier results of the same command.
    pub fn read(&mut self, reader: &SourceReader<'_>, source: &Source) -> Result<String, Unavailable> {
        if !matches!(source, Source::Command { .. }) {
            return reader.read(source);
        }
        if let Some(result) = self.commands.get(source) {
            return result.clone();
        }
        let result = reader.read(source);
        self.commands.insert(source.clone(), result.clone());
        result
    }
}

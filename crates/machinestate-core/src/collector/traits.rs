//! Abstractions over everything an information class reads from.
//!
//! The `Host` trait bundles filesystem access, command execution and
//! environment lookup. Information classes only ever talk to a `Host`, so the
//! same class definitions run against the live machine (`RealHost`) and
//! against an in-memory machine (`MockHost`) in tests.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::command;

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Reads the entire contents of a file as raw bytes.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    ///
    /// Order is unspecified; callers sort what they need.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns the size of a regular file in bytes.
    fn file_size(&self, path: &Path) -> io::Result<u64>;
}

/// Result of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Abstraction for running external tools.
pub trait CommandRunner: Send + Sync {
    /// Resolves a program name to an executable path, like `which`.
    ///
    /// Names containing a `/` are checked as given.
    fn which(&self, program: &str) -> Option<PathBuf>;

    /// Runs `program` with `args`, waiting at most `timeout`.
    ///
    /// A timeout is reported as an error of kind `TimedOut`. A non-zero exit
    /// status is *not* an error here; it is reported in `CommandOutput`.
    fn run(&self, program: &str, args: &[String], timeout: Duration) -> io::Result<CommandOutput>;
}

/// Abstraction for the process environment.
pub trait Environment: Send + Sync {
    /// Returns the value of an environment variable, if set and valid UTF-8.
    fn var(&self, name: &str) -> Option<String>;

    /// Returns all environment variables in a stable (sorted) order.
    fn vars(&self) -> Vec<(String, String)>;
}

/// Everything an information class can query.
pub trait Host: FileSystem + CommandRunner + Environment {}

impl<T: FileSystem + CommandRunner + Environment> Host for T {}

/// The live machine: `std::fs`, `std::process` and `std::env`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealHost;

impl RealHost {
    /// Creates a new `RealHost` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealHost {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }
}

impl CommandRunner for RealHost {
    fn which(&self, program: &str) -> Option<PathBuf> {
        if program.is_empty() {
            return None;
        }
        if program.contains('/') {
            let path = PathBuf::from(program);
            return command::is_executable(&path).then_some(path);
        }
        let search = std::env::var_os("PATH")?;
        std::env::split_paths(&search)
            .map(|dir| dir.join(program))
            .find(|candidate| command::is_executable(candidate))
    }

    fn run(&self, program: &str, args: &[String], timeout: Duration) -> io::Result<CommandOutput> {
        command::run_with_timeout(OsStr::new(program), args, timeout)
    }
}

impl Environment for RealHost {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        vars.sort();
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_real_host_read_to_string() {
        let host = RealHost::new();
        // Cargo.toml of this crate is always present when tests run
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        let content = host.read_to_string(&cargo_toml).unwrap();
        assert!(content.contains("[package]"));
        assert_eq!(
            host.file_size(&cargo_toml).unwrap(),
            content.len() as u64
        );
    }

    #[test]
    fn test_real_host_exists() {
        let host = RealHost::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        assert!(host.exists(&cargo_toml));
        assert!(!host.exists(Path::new("/nonexistent/path/12345")));
    }

    #[test]
    fn test_real_host_read_dir() {
        let host = RealHost::new();
        let src_dir = env::current_dir().unwrap().join("src");
        let entries = host.read_dir(&src_dir).unwrap();
        assert!(entries.iter().any(|p| p.ends_with("lib.rs")));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_host_runs_commands() {
        let host = RealHost::new();
        assert!(host.which("sh").is_some());
        assert!(host.which("definitely-not-a-real-tool-42").is_none());

        let out = host
            .run("sh", &["-c".into(), "echo hello".into()], Duration::from_secs(5))
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_real_host_env_is_sorted() {
        let vars = RealHost::new().vars();
        let mut sorted = vars.clone();
        sorted.sort();
        assert_eq!(vars, sorted);
    }
}

//! In-memory mock machine for testing information classes without a real
//! `/proc`, `/sys`, or installed tools.
//!
//! `MockHost` simulates files, directories, programs on `PATH` with scripted
//! output, and environment variables, so tests run identically on any CI box.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::collector::traits::{CommandOutput, CommandRunner, Environment, FileSystem};

/// Directory scripted programs appear in.
const MOCK_BIN: &str = "/usr/bin";

/// Scripted behaviour of one command invocation.
#[derive(Debug, Clone)]
enum MockCommand {
    Output(CommandOutput),
    Hang,
}

/// In-memory machine for testing.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    /// Programs on `PATH`, by name.
    programs: HashMap<String, PathBuf>,
    /// Scripted outputs keyed by program and argument list.
    commands: HashMap<(String, Vec<String>), MockCommand>,
    env: BTreeMap<String, String>,
    /// Directory listings and command runs, in call order. Shared by clones.
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockHost {
    /// Creates a new empty mock machine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Removes a file or a whole directory subtree.
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.files.retain(|p, _| !p.starts_with(path));
        self.directories.retain(|p| !p.starts_with(path));
    }

    /// Puts a program on `PATH` without scripting any invocation.
    ///
    /// Running it with unscripted arguments fails like a missing binary would.
    pub fn add_program(&mut self, program: &str) {
        let path = if program.contains('/') {
            PathBuf::from(program)
        } else {
            Path::new(MOCK_BIN).join(program)
        };
        self.add_file(&path, "");
        self.programs.insert(program.to_string(), path);
    }

    /// Scripts a successful invocation of `program args...`.
    pub fn add_command(&mut self, program: &str, args: &[&str], stdout: impl Into<String>) {
        self.script(
            program,
            args,
            MockCommand::Output(CommandOutput {
                success: true,
                code: Some(0),
                stdout: stdout.into(),
                stderr: String::new(),
            }),
        );
    }

    /// Scripts an invocation that exits with a non-zero `code`.
    pub fn add_failing_command(
        &mut self,
        program: &str,
        args: &[&str],
        code: i32,
        stderr: impl Into<String>,
    ) {
        self.script(
            program,
            args,
            MockCommand::Output(CommandOutput {
                success: false,
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.into(),
            }),
        );
    }

    /// Scripts an invocation that never finishes within any timeout.
    pub fn add_hanging_command(&mut self, program: &str, args: &[&str]) {
        self.script(program, args, MockCommand::Hang);
    }

    fn script(&mut self, program: &str, args: &[&str], command: MockCommand) {
        if !self.programs.contains_key(program) {
            self.add_program(program);
        }
        let args = args.iter().map(|a| a.to_string()).collect();
        self.commands.insert((program.to_string(), args), command);
    }

    /// Sets an environment variable.
    pub fn set_env(&mut self, name: &str, value: impl Into<String>) {
        self.env.insert(name.to_string(), value.into());
    }

    /// Unsets an environment variable.
    pub fn remove_env(&mut self, name: &str) {
        self.env.remove(name);
    }

    /// How often `call` was made, e.g. `read_dir /sys/devices/system/cpu`
    /// or `run nvidia-smi -L`.
    pub fn call_count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .map_or(0, |calls| calls.iter().filter(|c| *c == call).count())
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// Loads a directory tree from disk and mounts it at `mount_point`.
    ///
    /// This is useful for regression tests with captured `/sys` or `/proc`
    /// trees. Binary files are skipped.
    pub fn from_directory(dir: &Path, mount_point: &Path) -> io::Result<Self> {
        let mut host = Self::new();
        load_directory_recursive(&mut host, dir, mount_point)?;
        Ok(host)
    }
}

fn load_directory_recursive(
    host: &mut MockHost,
    real_path: &Path,
    virtual_path: &Path,
) -> io::Result<()> {
    host.add_dir(virtual_path);

    for entry in std::fs::read_dir(real_path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let real_child = entry.path();
        let virtual_child = virtual_path.join(entry.file_name());

        if file_type.is_dir() {
            load_directory_recursive(host, &real_child, &virtual_child)?;
        } else if file_type.is_file()
            && let Ok(content) = std::fs::read_to_string(&real_child)
        {
            host.add_file(&virtual_child, content);
        }
    }
    Ok(())
}

fn not_found(what: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{what} not found: {path:?}"),
    )
}

impl FileSystem for MockHost {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        if self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {path:?}"),
            ));
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found("file", path))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.read_to_string(path).map(String::into_bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.record(format!("read_dir {}", path.display()));
        if !self.directories.contains(path) {
            return Err(not_found("directory", path));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        self.files
            .get(path)
            .map(|content| content.len() as u64)
            .ok_or_else(|| not_found("file", path))
    }
}

impl CommandRunner for MockHost {
    fn which(&self, program: &str) -> Option<PathBuf> {
        if let Some(path) = self.programs.get(program) {
            return Some(path.clone());
        }
        // Absolute paths to files that exist count as executables
        let path = Path::new(program);
        (program.contains('/') && self.files.contains_key(path)).then(|| path.to_path_buf())
    }

    fn run(&self, program: &str, args: &[String], timeout: Duration) -> io::Result<CommandOutput> {
        let mut call = format!("run {program}");
        for arg in args {
            call.push(' ');
            call.push_str(arg);
        }
        self.record(call);
        if self.which(program).is_none() {
            return Err(not_found("program", Path::new(program)));
        }
        match self.commands.get(&(program.to_string(), args.to_vec())) {
            Some(MockCommand::Output(output)) => Ok(output.clone()),
            Some(MockCommand::Hang) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{program} did not exit within {timeout:?}"),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no scripted output for {program} {}", args.join(" ")),
            )),
        }
    }
}

impl Environment for MockHost {
    fn var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_host_add_file() {
        let mut host = MockHost::new();
        host.add_file("/proc/meminfo", "MemTotal: 16384 kB\n");

        assert!(host.exists(Path::new("/proc/meminfo")));
        assert!(host.exists(Path::new("/proc")));

        let content = host.read_to_string(Path::new("/proc/meminfo")).unwrap();
        assert_eq!(content, "MemTotal: 16384 kB\n");
        assert_eq!(host.file_size(Path::new("/proc/meminfo")).unwrap(), 19);
    }

    #[test]
    fn test_mock_host_read_dir() {
        let mut host = MockHost::new();
        host.add_file("/sys/devices/system/cpu/cpu0/online", "1");
        host.add_file("/sys/devices/system/cpu/cpu1/online", "1");
        host.add_file("/sys/devices/system/cpu/online", "0-1");

        let entries = host.read_dir(Path::new("/sys/devices/system/cpu")).unwrap();
        assert_eq!(entries.len(), 3);

        let cpu0 = host
            .read_dir(Path::new("/sys/devices/system/cpu/cpu0"))
            .unwrap();
        assert_eq!(cpu0, vec![PathBuf::from("/sys/devices/system/cpu/cpu0/online")]);
    }

    #[test]
    fn test_mock_host_directory_is_not_a_file() {
        let mut host = MockHost::new();
        host.add_dir("/sys/class/dmi");
        assert!(host.read_to_string(Path::new("/sys/class/dmi")).is_err());
    }

    #[test]
    fn test_mock_host_remove_subtree() {
        let mut host = MockHost::new();
        host.add_file("/sys/devices/system/node/node0/meminfo", "x");
        host.add_file("/sys/devices/system/cpu/online", "0");
        host.remove("/sys/devices/system/node");

        assert!(!host.exists(Path::new("/sys/devices/system/node")));
        assert!(host.exists(Path::new("/sys/devices/system/cpu/online")));
    }

    #[test]
    fn test_mock_host_commands() {
        let mut host = MockHost::new();
        host.add_command("hostname", &["-s"], "node01\n");
        host.add_failing_command("nvidia-smi", &["-L"], 9, "NVIDIA-SMI has failed");
        host.add_hanging_command("likwid-powermeter", &["-i"]);

        assert_eq!(host.which("hostname"), Some(PathBuf::from("/usr/bin/hostname")));
        assert!(host.which("gcc").is_none());

        let timeout = Duration::from_secs(1);
        let out = host.run("hostname", &["-s".into()], timeout).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "node01\n");

        let out = host.run("nvidia-smi", &["-L".into()], timeout).unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(9));

        let err = host
            .run("likwid-powermeter", &["-i".into()], timeout)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // Scripted program, unscripted arguments
        assert!(host.run("hostname", &["-f".into()], timeout).is_err());
        assert!(host.run("gcc", &[], timeout).is_err());
    }

    #[test]
    fn test_mock_host_counts_calls() {
        let mut host = MockHost::new();
        host.add_command("nvidia-smi", &["-L"], "GPU 0: A100\n");
        host.add_dir("/sys/class/net");

        let timeout = Duration::from_secs(1);
        host.run("nvidia-smi", &["-L".into()], timeout).unwrap();
        host.clone().run("nvidia-smi", &["-L".into()], timeout).unwrap();
        host.read_dir(Path::new("/sys/class/net")).unwrap();

        assert_eq!(host.call_count("run nvidia-smi -L"), 2);
        assert_eq!(host.call_count("read_dir /sys/class/net"), 1);
        assert_eq!(host.call_count("run hostname"), 0);
    }

    #[test]
    fn test_mock_host_env() {
        let mut host = MockHost::new();
        host.set_env("USER", "alice");
        host.set_env("HOME", "/home/alice");
        assert_eq!(host.var("USER").as_deref(), Some("alice"));
        assert_eq!(host.vars()[0].0, "HOME");

        host.remove_env("USER");
        assert!(host.var("USER").is_none());
    }

    #[test]
    fn test_mock_host_from_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("devices/system/cpu/cpu0")).unwrap();
        std::fs::write(tmp.path().join("devices/system/cpu/online"), "0\n").unwrap();

        let host = MockHost::from_directory(tmp.path(), Path::new("/sys")).unwrap();
        assert_eq!(
            host.read_to_string(Path::new("/sys/devices/system/cpu/online"))
                .unwrap(),
            "0\n"
        );
        assert!(host.exists(Path::new("/sys/devices/system/cpu/cpu0")));
    }
}

//! Run configuration.
//!
//! Built once (defaults, then an optional JSON file, then CLI overrides) and
//! passed by reference to everything that needs it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diff::DEFAULT_TOLERANCE;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Mount point of procfs.
    pub proc_path: PathBuf,
    /// Mount point of sysfs.
    pub sys_path: PathBuf,
    pub os_release: PathBuf,
    /// Stored `dmidecode` output to embed, if any.
    pub dmifile: Option<PathBuf>,
    /// Query turbo and prefetcher state with likwid tools.
    pub likwid_enable: bool,
    /// Directory holding the likwid tools; `PATH` when unset.
    pub likwid_path: Option<PathBuf>,
    /// Environment modules command used for the version query.
    pub modulecmd: Option<PathBuf>,
    pub nvidia_smi: String,
    pub command_timeout_secs: u64,
    pub tolerance: f64,
    pub extended: bool,
    pub anonymous: bool,
    /// Executable to fingerprint.
    pub executable: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_path: PathBuf::from("/proc"),
            sys_path: PathBuf::from("/sys"),
            os_release: PathBuf::from("/etc/os-release"),
            dmifile: None,
            likwid_enable: false,
            likwid_path: None,
            modulecmd: None,
            nvidia_smi: "nvidia-smi".to_string(),
            command_timeout_secs: 10,
            tolerance: DEFAULT_TOLERANCE,
            extended: false,
            anonymous: false,
            executable: None,
        }
    }
}

impl Config {
    /// Loads a JSON config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(ConfigError::Invalid {
                key: "tolerance",
                reason: format!("{} is not a non-negative number", self.tolerance),
            });
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "command_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn proc(&self, rel: &str) -> PathBuf {
        self.proc_path.join(rel)
    }

    pub fn sys(&self, rel: &str) -> PathBuf {
        self.sys_path.join(rel)
    }

    /// Full name of a likwid tool, honouring `likwid_path`.
    pub fn likwid_tool(&self, tool: &str) -> String {
        match &self.likwid_path {
            Some(dir) => dir.join(tool).to_string_lossy().into_owned(),
            None => tool.to_string(),
        }
    }

    /// The effective configuration as pretty JSON.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.proc("meminfo"), PathBuf::from("/proc/meminfo"));
        assert_eq!(config.sys("devices/system/cpu"), PathBuf::from("/sys/devices/system/cpu"));
        assert_eq!(config.command_timeout(), Duration::from_secs(10));
        assert_eq!(config.tolerance, 0.2);
        assert_eq!(config.likwid_tool("likwid-features"), "likwid-features");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"likwid_enable": true, "likwid_path": "/opt/likwid/bin", "dmifile": "/etc/dmidecode.txt"}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.likwid_enable);
        assert_eq!(config.dmifile, Some(PathBuf::from("/etc/dmidecode.txt")));
        assert_eq!(config.likwid_tool("likwid-features"), "/opt/likwid/bin/likwid-features");
        assert_eq!(config.proc_path, PathBuf::from("/proc"));
    }

    #[test]
    fn test_from_file_errors() {
        let missing = Config::from_file(Path::new("/nonexistent/machinestate.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"likwid_enabled": true}}"#).unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tolerance": -1.0}}"#).unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Invalid { key: "tolerance", .. })
        ));
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = Config {
            executable: Some(PathBuf::from("/usr/bin/true")),
            ..Config::default()
        };
        let back: Config = serde_json::from_str(&config.to_json_pretty()).unwrap();
        assert_eq!(back, config);
    }
}

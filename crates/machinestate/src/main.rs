//! machinestate - records the state of a machine for benchmark reproducibility.
//!
//! Collects every information class of the running system, writes the
//! snapshot as JSON (or HTML/text), and optionally compares it against a
//! stored snapshot.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use machinestate_core::collector::{Collector, Host, RealHost};
use machinestate_core::render::{to_html, to_text};
use machinestate_core::{Config, ConfigError, DocumentOptions, DocumentSource};

/// Exit code when the current state differs from the stored one.
const EXIT_DIFFER: u8 = 1;
/// Exit code for any error that aborts the run.
const EXIT_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "machinestate",
    about = "Record the state of a machine for reproducible benchmarking",
    version
)]
struct Args {
    /// Collect extended fields
    #[arg(short, long)]
    extended: bool,

    /// Replace identifying values with a placeholder
    #[arg(short, long)]
    anonymous: bool,

    /// Sort keys in the output
    #[arg(short, long)]
    sort: bool,

    /// Indentation of the JSON output (0 for compact)
    #[arg(short, long, default_value_t = 4)]
    indent: usize,

    /// Write output to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Compare against a stored snapshot
    #[arg(short, long, value_name = "PATH", value_parser = readable_file)]
    json: Option<PathBuf>,

    /// Load configuration from a JSON file
    #[arg(long, value_name = "PATH", value_parser = readable_file)]
    configfile: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(short, long)]
    config: bool,

    /// Render the snapshot as HTML
    #[arg(long, conflicts_with = "text")]
    html: bool,

    /// Render the snapshot as indented text
    #[arg(long)]
    text: bool,

    /// Include meta-records so the output can be loaded back (default)
    #[arg(long, overrides_with = "no_meta")]
    meta: bool,

    /// Omit meta-records
    #[arg(long, overrides_with = "meta")]
    no_meta: bool,

    /// Relative tolerance for numeric comparisons
    #[arg(long, value_name = "F")]
    tolerance: Option<f64>,

    /// Timeout for external commands
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Mount point of procfs
    #[arg(long, value_name = "PATH")]
    proc_path: Option<PathBuf>,

    /// Mount point of sysfs
    #[arg(long, value_name = "PATH")]
    sys_path: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Benchmark executable to fingerprint
    #[arg(value_name = "EXECUTABLE", value_parser = executable_file)]
    executable: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Html,
    Text,
}

impl Args {
    fn format(&self) -> Format {
        if self.html {
            Format::Html
        } else if self.text {
            Format::Text
        } else {
            Format::Json
        }
    }

    fn document_options(&self) -> DocumentOptions {
        DocumentOptions {
            meta: self.meta || !self.no_meta,
            sort: self.sort,
            indent: self.indent,
        }
    }
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Accepts an existing, readable regular file.
fn readable_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if !path.is_file() {
        return Err(format!("{s} is not an existing file"));
    }
    fs::File::open(&path).map_err(|e| format!("{s} is not readable: {e}"))?;
    Ok(path)
}

/// Accepts an existing file with an execute bit set.
fn executable_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    let meta = fs::metadata(&path).map_err(|e| format!("{s}: {e}"))?;
    if !meta.is_file() {
        return Err(format!("{s} is not a file"));
    }
    if !is_executable(&meta) {
        return Err(format!("{s} is not executable"));
    }
    Ok(path)
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Defaults, then the config file, then command line overrides.
fn build_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = match &args.configfile {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.extended |= args.extended;
    config.anonymous |= args.anonymous;
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(secs) = args.timeout {
        config.command_timeout_secs = secs;
    }
    if let Some(path) = &args.proc_path {
        config.proc_path = path.clone();
    }
    if let Some(path) = &args.sys_path {
        config.sys_path = path.clone();
    }
    if let Some(exe) = &args.executable {
        config.executable = Some(exe.clone());
    }
    config.validate()?;
    Ok(config)
}

fn write_output(path: Option<&Path>, text: &str) -> Result<(), RunError> {
    match path {
        Some(path) => fs::write(path, text).map_err(|source| RunError::Write {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(text.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|source| RunError::Write {
                    path: PathBuf::from("<stdout>"),
                    source,
                })
        }
    }
}

fn run<H: Host>(args: &Args, host: H) -> Result<ExitCode, RunError> {
    let config = build_config(args)?;
    if args.config {
        write_output(args.output.as_deref(), &format!("{}\n", config.to_json_pretty()))?;
        return Ok(ExitCode::SUCCESS);
    }

    let tolerance = config.tolerance;
    let mut collector = Collector::new(host, config);
    let snapshot = collector.collect_snapshot();

    let options = args.document_options();
    let mut rendered = match args.format() {
        Format::Json => snapshot.to_json(&options),
        Format::Html => to_html(&snapshot.to_document(&options)),
        Format::Text => to_text(&snapshot.to_document(&options)),
    };
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    write_output(args.output.as_deref(), &rendered)?;
    if let Some(path) = &args.output {
        info!(path = %path.display(), "snapshot written");
    }

    let Some(stored) = &args.json else {
        return Ok(ExitCode::SUCCESS);
    };
    let reference = match collector.load(DocumentSource::Path(stored.clone())) {
        Ok(reference) => reference,
        Err(e) => {
            error!(path = %stored.display(), "cannot load stored snapshot: {e}");
            return Ok(ExitCode::from(EXIT_ERROR));
        }
    };
    let report = reference.diff(&snapshot, tolerance);
    debug!(fields = report.entries().len(), "comparison done");
    eprint!("{report}");
    if report.is_equal() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_DIFFER))
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);
    info!(version = env!("CARGO_PKG_VERSION"), "machinestate starting");

    match run(&args, RealHost::new()) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machinestate_core::Snapshot;
    use machinestate_core::collector::MockHost;
    use tempfile::NamedTempFile;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("machinestate").chain(argv.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.indent, 4);
        assert_eq!(args.format(), Format::Json);
        assert_eq!(args.document_options(), DocumentOptions::default());
        assert!(args.executable.is_none());
    }

    #[test]
    fn test_flags() {
        let args = parse(&["-e", "-a", "-s", "-i", "2", "--text", "--no-meta", "-vv"]).unwrap();
        assert!(args.extended && args.anonymous && args.sort);
        assert_eq!(args.format(), Format::Text);
        assert_eq!(args.verbose, 2);
        let options = args.document_options();
        assert!(!options.meta);
        assert_eq!(options.indent, 2);
    }

    #[test]
    fn test_meta_overrides() {
        let args = parse(&["--no-meta", "--meta"]).unwrap();
        assert!(args.document_options().meta);
        let args = parse(&["--meta", "--no-meta"]).unwrap();
        assert!(!args.document_options().meta);
    }

    #[test]
    fn test_html_and_text_conflict() {
        assert!(parse(&["--html", "--text"]).is_err());
        assert_eq!(parse(&["--html"]).unwrap().format(), Format::Html);
    }

    #[test]
    fn test_missing_files_rejected() {
        assert!(parse(&["--configfile", "/nonexistent/machinestate.json"]).is_err());
        assert!(parse(&["-j", "/nonexistent/state.json"]).is_err());
        assert!(parse(&["/nonexistent/bench"]).is_err());
    }

    #[test]
    fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        assert!(parse(&["--configfile", path]).is_err());
        assert!(parse(&[path]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_needs_execute_bit() {
        use std::os::unix::fs::PermissionsExt;

        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o644)).unwrap();
        assert!(parse(&[path.as_str()]).is_err());

        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o755)).unwrap();
        let args = parse(&[path.as_str()]).unwrap();
        assert_eq!(args.executable.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_build_config_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"tolerance": 0.5, "extended": true, "command_timeout_secs": 3}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = parse(&["--configfile", path.as_str(), "--tolerance", "0.1", "--proc-path", "/host/proc"])
            .unwrap();
        let config = build_config(&args).unwrap();
        assert_eq!(config.tolerance, 0.1);
        assert!(config.extended);
        assert_eq!(config.command_timeout_secs, 3);
        assert_eq!(config.proc_path, PathBuf::from("/host/proc"));
    }

    #[test]
    fn test_build_config_rejects_invalid_values() {
        let args = parse(&["--tolerance=-1"]).unwrap();
        assert!(build_config(&args).is_err());
        let args = parse(&["--timeout", "0"]).unwrap();
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_output(Some(&path), "{}\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");

        let missing = dir.path().join("no/such/dir/state.json");
        assert!(matches!(
            write_output(Some(&missing), "{}"),
            Err(RunError::Write { .. })
        ));
    }

    fn typical_snapshot() -> Snapshot {
        Collector::new(MockHost::typical_machine(), Config::default()).collect_snapshot()
    }

    fn stored(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_run_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("state.json");
        let args = parse(&["-o", out.to_str().unwrap()]).unwrap();
        assert_eq!(run(&args, MockHost::typical_machine()).unwrap(), ExitCode::SUCCESS);

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("\"HostInfo\""));
    }

    #[test]
    fn test_run_prints_config() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("config.json");
        let args = parse(&["-c", "--tolerance", "0.3", "-o", out.to_str().unwrap()]).unwrap();
        assert_eq!(run(&args, MockHost::new()).unwrap(), ExitCode::SUCCESS);
        assert!(fs::read_to_string(&out).unwrap().contains("0.3"));
    }

    #[test]
    fn test_run_compare_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("current.json");
        let out = out.to_str().unwrap();
        let snapshot = typical_snapshot();
        let options = DocumentOptions::default();

        let same = stored(dir.path(), "same.json", &snapshot.to_json(&options));
        let args = parse(&["-o", out, "-j", same.as_str()]).unwrap();
        assert_eq!(run(&args, MockHost::typical_machine()).unwrap(), ExitCode::SUCCESS);

        let mut doc = snapshot.to_document(&options);
        doc["HostInfo"]["Hostname"] = "host-B".into();
        let other = stored(dir.path(), "other.json", &doc.to_string());
        let args = parse(&["-o", out, "-j", other.as_str()]).unwrap();
        assert_eq!(
            run(&args, MockHost::typical_machine()).unwrap(),
            ExitCode::from(EXIT_DIFFER)
        );

        let broken = stored(dir.path(), "broken.json", "not a snapshot");
        let args = parse(&["-o", out, "-j", broken.as_str()]).unwrap();
        assert_eq!(
            run(&args, MockHost::typical_machine()).unwrap(),
            ExitCode::from(EXIT_ERROR)
        );
        // The current state is still written
        assert!(fs::read_to_string(out).unwrap().contains("\"HostInfo\""));
    }
}

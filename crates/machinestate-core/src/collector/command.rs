//! Subprocess execution with a bounded lifetime.

use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::trace;

use super::traits::CommandOutput;

/// Poll interval while waiting for a child to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs a command with no stdin, captured output and the `C` locale.
///
/// The child is killed if it has not exited after `timeout`.
pub(crate) fn run_with_timeout(
    program: &OsStr,
    args: &[String],
    timeout: Duration,
) -> io::Result<CommandOutput> {
    let mut child = Command::new(program)
        .args(args)
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain both pipes concurrently so a chatty child never blocks on a full pipe.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let Some(status) = child.wait_timeout(timeout)? else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!(
                "{} did not exit within {:?}",
                program.to_string_lossy(),
                timeout
            ),
        ));
    };

    trace!(program = %program.to_string_lossy(), ?status, "command finished");

    let stdout = String::from_utf8(collect(stdout)).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} wrote invalid UTF-8: {e}", program.to_string_lossy()),
        )
    })?;

    Ok(CommandOutput {
        success: status.success(),
        code: status.code(),
        stdout,
        // Diagnostics only
        stderr: String::from_utf8_lossy(&collect(stderr)).into_owned(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// `Child::wait` with an upper bound.
trait WaitTimeout {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>>;
}

impl WaitTimeout for Child {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let start = Instant::now();
        loop {
            match self.try_wait()? {
                Some(status) => return Ok(Some(status)),
                None => {
                    if start.elapsed() >= timeout {
                        return Ok(None);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

/// Returns `true` for regular files with an execute bit set.
#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}

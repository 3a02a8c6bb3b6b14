//! Running vendor tools (`vcgencmd`, `ddcutil`) with a deadline.
//!
//! Every external process goes through [`CommandRunner`] so discovery and the
//! DDC backend can be tested without the tools installed, and so no call can
//! block the daemon forever: a DDC transaction against a sleeping monitor can
//! hang indefinitely.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::EXTRA_TOOL_DIRS;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs a program to completion and returns its standard output.
///
/// A non-zero exit status and an expired timeout are both errors.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<String>;
}

/// [`CommandRunner`] backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner {
    pub debug_enabled: bool,
}

impl SystemCommandRunner {
    pub fn new(debug_enabled: bool) -> Self {
        Self { debug_enabled }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<String> {
        let display = format!("{} {}", program.display(), args.join(" "));
        if self.debug_enabled {
            log_debug!("Running: {display}");
        }

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", program.display()))?;

        // Drain the pipes on helper threads so a chatty child cannot fill
        // the pipe buffer and stall before it exits
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    anyhow::bail!("'{display}' timed out after {}s", timeout.as_secs_f32());
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(e).with_context(|| format!("Failed to wait for '{display}'"));
                }
            }
        };

        let stdout = stdout.map(join_reader).unwrap_or_default();
        let stderr = stderr.map(join_reader).unwrap_or_default();

        if !status.success() {
            let detail = stderr.trim();
            if detail.is_empty() {
                anyhow::bail!("'{display}' exited with {status}");
            }
            anyhow::bail!("'{display}' exited with {status}: {detail}");
        }

        Ok(stdout)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Locate an executable on `PATH`, then in the vendor tool directories.
pub fn find_tool(name: &str) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default();
    dirs.extend(EXTRA_TOOL_DIRS.iter().map(PathBuf::from));
    find_tool_in(name, &dirs)
}

/// Locate an executable in the given directories, first match wins.
pub fn find_tool_in(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

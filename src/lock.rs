//! Single-instance lock file.
//!
//! Two daemons would fight over the backlight and both answer every bus
//! request, so startup takes an exclusive `flock` on
//! `$XDG_RUNTIME_DIR/display-companion.lock` and writes its PID into it. A
//! lock file left behind by a dead process is not locked and is simply
//! taken over.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::runtime_dir;
use crate::constants::LOCK_FILE_NAME;

/// Held for the lifetime of the daemon; the lock is released on drop.
#[derive(Debug)]
pub struct InstanceLock {
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn default_lock_path() -> PathBuf {
    runtime_dir().join(LOCK_FILE_NAME)
}

/// Take the lock, or `Ok(None)` with the holder's PID logged when another
/// instance owns it.
pub fn acquire_lock(path: &Path) -> Result<Option<InstanceLock>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    // Not truncated before locking, so the holder's PID stays readable
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        match running_pid(path) {
            Some(pid) => log_error!("display-companion is already running (PID {pid})"),
            None => log_error!("display-companion is already running"),
        }
        return Ok(None);
    }

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()?;

    Ok(Some(InstanceLock {
        _file: file,
        path: path.to_path_buf(),
    }))
}

/// PID recorded in the lock file, if that process is alive.
pub fn running_pid(path: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(path).ok()?;
    let pid: u32 = content.lines().next()?.trim().parse().ok()?;
    is_process_running(pid).then_some(pid)
}

pub fn is_process_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks that the process exists
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_lock_is_refused() {
        crate::logger::Log::set_enabled(false);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);

        let first = acquire_lock(&path).unwrap().unwrap();
        assert_eq!(running_pid(&path), Some(std::process::id()));
        assert!(acquire_lock(&path).unwrap().is_none());

        drop(first);
        assert!(!path.exists());
        assert!(acquire_lock(&path).unwrap().is_some());
    }

    #[test]
    fn test_stale_pid_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        std::fs::write(&path, "4194305\n").unwrap();
        assert_eq!(running_pid(&path), None);
    }
}

//! Hot reload of the display config.
//!
//! The shell's settings page writes `OvosDisplay.conf` directly. The bus
//! `*.changed` events normally follow, but a hand edit or a shell that skips
//! the event would leave the daemon stale, so the file is watched as well and
//! every settled change is turned into a reload message for the main loop.

use anyhow::{Context, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::PathBuf;
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::CONFIG_WATCH_DEBOUNCE_MS;
use crate::signals::SignalMessage;

/// Watches a single config file and sends [`SignalMessage::Reload`].
pub struct ConfigWatcher {
    signal_sender: Sender<SignalMessage>,
    path: PathBuf,
    debug_enabled: bool,
}

impl ConfigWatcher {
    pub fn new(signal_sender: Sender<SignalMessage>, path: PathBuf, debug_enabled: bool) -> Self {
        Self {
            signal_sender,
            path,
            debug_enabled,
        }
    }

    /// Spawn the watcher thread.
    ///
    /// The parent directory is watched rather than the file itself, because
    /// the config is replaced by rename on every store and a file watch would
    /// be lost with the old inode.
    pub fn start(self) -> Result<()> {
        let Some(parent) = self.path.parent().map(PathBuf::from) else {
            anyhow::bail!("Config path {} has no parent directory", self.path.display());
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res
                    && matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    )
                {
                    let _ = tx.send(event);
                }
            },
            NotifyConfig::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", parent.display()))?;

        if self.debug_enabled {
            log_pipe!();
            log_debug!("Watching {} for changes", self.path.display());
        }

        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let debounce = Duration::from_millis(CONFIG_WATCH_DEBOUNCE_MS);

        thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || {
                // Keep the watcher alive for the lifetime of the thread
                let _watcher = watcher;
                let mut pending_since: Option<Instant> = None;

                loop {
                    let wait = match pending_since {
                        Some(since) => debounce.saturating_sub(since.elapsed()),
                        None => Duration::from_secs(3600),
                    };

                    match rx.recv_timeout(wait) {
                        Ok(event) => {
                            let ours = event
                                .paths
                                .iter()
                                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                            if ours {
                                pending_since = Some(Instant::now());
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if pending_since.take().is_some() {
                                if self.debug_enabled {
                                    log_pipe!();
                                    log_debug!("Display config changed on disk");
                                }
                                if self.signal_sender.send(SignalMessage::Reload).is_err() {
                                    break;
                                }
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .context("Failed to spawn config watcher thread")?;

        Ok(())
    }
}

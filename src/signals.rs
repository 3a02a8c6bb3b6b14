//! Unix signal handling for the daemon.
//!
//! Signals are turned into [`SignalMessage`]s on a dedicated thread and sent
//! to the main loop over a channel. The config watcher feeds the same
//! channel, so the main loop has a single place to wait.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR2},
    iterator::Signals,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

/// Messages for the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMessage {
    /// Re-read the display config (SIGUSR2 or a change on disk).
    Reload,
    /// Stop the daemon (SIGTERM, SIGINT, SIGHUP).
    Shutdown,
}

/// Signal handling state shared with the main loop.
pub struct SignalState {
    /// Cleared when shutdown starts; worker threads poll it.
    pub running: Arc<AtomicBool>,
    pub signal_receiver: Receiver<SignalMessage>,
    /// For other producers, such as the config watcher.
    pub signal_sender: Sender<SignalMessage>,
}

/// Map a raw signal number to a message.
pub fn message_for(signal: i32) -> Option<SignalMessage> {
    match signal {
        SIGUSR2 => Some(SignalMessage::Reload),
        SIGINT | SIGTERM | SIGHUP => Some(SignalMessage::Shutdown),
        _ => None,
    }
}

/// Install handlers and spawn the signal thread.
pub fn setup_signal_handler(debug_enabled: bool) -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));
    let (signal_sender, signal_receiver) = mpsc::channel();

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR2])
        .context("Failed to register signal handlers")?;

    let running_clone = Arc::clone(&running);
    let sender = signal_sender.clone();

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                let Some(message) = message_for(signal) else {
                    continue;
                };

                if debug_enabled {
                    log_pipe!();
                    log_debug!("Received signal {signal}: {message:?}");
                }

                if message == SignalMessage::Shutdown {
                    running_clone.store(false, Ordering::SeqCst);
                }

                if sender.send(message).is_err() || message == SignalMessage::Shutdown {
                    break;
                }
            }
        })
        .context("Failed to spawn signal handler thread")?;

    Ok(SignalState {
        running,
        signal_receiver,
        signal_sender,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_mapping() {
        assert_eq!(message_for(SIGUSR2), Some(SignalMessage::Reload));
        assert_eq!(message_for(SIGTERM), Some(SignalMessage::Shutdown));
        assert_eq!(message_for(SIGINT), Some(SignalMessage::Shutdown));
        assert_eq!(message_for(SIGHUP), Some(SignalMessage::Shutdown));
        assert_eq!(message_for(signal_hook::consts::signal::SIGUSR1), None);
    }
}

//! Structured logging with box-drawing output.
//!
//! Every line the daemon prints goes through the macros defined here. Lines are
//! grouped into visual blocks:
//!
//! ```text
//! ┏ display-companion v0.4.0 ━━╸
//! ┃
//! ┣ Discovering display interface
//! ┃   vcgencmd: /usr/bin/vcgencmd
//! ┣[INFO] Display interface is DSI
//! ╹
//! ```
//!
//! ## Conventions
//!
//! - `log_block_start!` opens a new conceptual block (prints a spacer pipe first).
//! - `log_decorated!` continues a block, `log_indented!` nests details under it.
//! - `log_pipe!` inserts a spacer before a semantic line that starts a new group.
//! - `log_info!`, `log_warning!`, `log_error!`, `log_debug!`, `log_critical!`
//!   carry a colored `[LEVEL]` tag.
//! - `log_version!` and `log_end!` frame the lifetime of the process.
//!
//! Output can be silenced at runtime with [`Log::set_enabled`] (tests and the
//! `status` command use this) and redirected to a file with
//! [`Log::start_file_logging`], in which case ANSI color codes are stripped.

use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

static TIMESTAMPS_ENABLED: AtomicBool = AtomicBool::new(false);

// Set once when --log is active
static LOG_CHANNEL: OnceLock<Sender<LogMessage>> = OnceLock::new();

enum LogMessage {
    Formatted(String),
    Shutdown,
}

/// Shape of a single log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Block,
    Decorated,
    Indented,
    Pipe,
    Version,
    End,
    Info,
    Warning,
    Error,
    ErrorExit,
    Debug,
    Critical,
}

/// Global logging switches.
pub struct Log;

impl Log {
    /// Enable or disable all output.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Prefix every line with the wall-clock time.
    ///
    /// The daemon turns this on when running unattended so the journal shows
    /// when alarms fired relative to bus traffic.
    pub fn set_timestamps(enabled: bool) {
        TIMESTAMPS_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Route all output to `file_path` until the returned guard is dropped.
    pub fn start_file_logging(file_path: String) -> anyhow::Result<LoggerGuard> {
        let (tx, rx) = channel();

        LOG_CHANNEL
            .set(tx.clone())
            .map_err(|_| anyhow::anyhow!("Logger channel already initialized"))?;

        let handle = std::thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                let mut file = std::fs::File::create(&file_path)?;
                loop {
                    match rx.recv() {
                        Ok(LogMessage::Formatted(text)) => file.write_all(text.as_bytes())?,
                        Ok(LogMessage::Shutdown) | Err(_) => {
                            file.flush()?;
                            break;
                        }
                    }
                }
                Ok::<(), anyhow::Error>(())
            })?;

        Ok(LoggerGuard {
            tx,
            handle: Some(handle),
        })
    }

    fn timestamp_prefix() -> String {
        if TIMESTAMPS_ENABLED.load(Ordering::SeqCst) {
            format!("[{}] ", chrono::Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Flushes and joins the file writer thread on drop.
pub struct LoggerGuard {
    tx: Sender<LogMessage>,
    handle: Option<std::thread::JoinHandle<anyhow::Result<()>>>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Render one line of output, without the trailing newline handling of `emit`.
pub fn render(kind: Line, message: &str) -> String {
    let p = Log::timestamp_prefix();
    match kind {
        Line::Block => format!("{p}┃\n{p}┣ {message}\n"),
        Line::Decorated => format!("{p}┣ {message}\n"),
        Line::Indented => format!("{p}┃   {message}\n"),
        Line::Pipe => format!("{p}┃\n"),
        Line::Version => format!("{p}┏ display-companion v{message} ━━╸\n"),
        Line::End => format!("{p}╹\n"),
        Line::Info => format!("{p}┣[\x1b[32mINFO\x1b[0m] {message}\n"),
        Line::Warning => format!("{p}┣[\x1b[33mWARNING\x1b[0m] {message}\n"),
        Line::Error => format!("{p}┣[\x1b[31mERROR\x1b[0m] {message}\n"),
        Line::ErrorExit => format!("{p}┃\n{p}┗[\x1b[31mERROR\x1b[0m] {message}\n"),
        Line::Debug => format!("{p}┣[\x1b[36mDEBUG\x1b[0m] {message}\n"),
        Line::Critical => format!("{p}┣[\x1b[31mCRITICAL\x1b[0m] {message}\n"),
    }
}

/// Used by the macros; honors the enable switch and the file sink.
pub fn emit(kind: Line, message: &str) {
    if !Log::is_enabled() {
        return;
    }
    write_output(&render(kind, message));
}

fn write_output(text: &str) {
    if let Some(tx) = LOG_CHANNEL.get() {
        let _ = tx.send(LogMessage::Formatted(strip_ansi_codes(text)));
    } else {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

// Drops `ESC [ ... m` sequences
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == 'm' {
                    break;
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_line {
    ($kind:ident, $fmt:literal $($arg:tt)*) => {
        $crate::logger::emit($crate::logger::Line::$kind, &format!($fmt $($arg)*))
    };
    ($kind:ident, $expr:expr) => {
        $crate::logger::emit($crate::logger::Line::$kind, &format!("{}", $expr))
    };
}

/// Start a new block of related lines.
#[macro_export]
macro_rules! log_block_start {
    ($($t:tt)+) => { $crate::__log_line!(Block, $($t)+) };
}

/// Continue the current block.
#[macro_export]
macro_rules! log_decorated {
    ($($t:tt)+) => { $crate::__log_line!(Decorated, $($t)+) };
}

/// Nested detail under the previous line.
#[macro_export]
macro_rules! log_indented {
    ($($t:tt)+) => { $crate::__log_line!(Indented, $($t)+) };
}

/// Empty spacer line.
#[macro_export]
macro_rules! log_pipe {
    () => {
        $crate::logger::emit($crate::logger::Line::Pipe, "")
    };
}

/// Startup header with the crate version.
#[macro_export]
macro_rules! log_version {
    () => {
        $crate::logger::emit($crate::logger::Line::Version, env!("CARGO_PKG_VERSION"))
    };
}

/// Final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {
        $crate::logger::emit($crate::logger::Line::End, "")
    };
}

#[macro_export]
macro_rules! log_info {
    ($($t:tt)+) => { $crate::__log_line!(Info, $($t)+) };
}

#[macro_export]
macro_rules! log_warning {
    ($($t:tt)+) => { $crate::__log_line!(Warning, $($t)+) };
}

#[macro_export]
macro_rules! log_error {
    ($($t:tt)+) => { $crate::__log_line!(Error, $($t)+) };
}

/// Error that terminates the current flow, drawn with a closing corner.
#[macro_export]
macro_rules! log_error_exit {
    ($($t:tt)+) => { $crate::__log_line!(ErrorExit, $($t)+) };
}

#[macro_export]
macro_rules! log_debug {
    ($($t:tt)+) => { $crate::__log_line!(Debug, $($t)+) };
}

#[macro_export]
macro_rules! log_critical {
    ($($t:tt)+) => { $crate::__log_line!(Critical, $($t)+) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(
            strip_ansi_codes("┣[\x1b[33mWARNING\x1b[0m] dim"),
            "┣[WARNING] dim"
        );
        assert_eq!(strip_ansi_codes("plain"), "plain");
        assert_eq!(strip_ansi_codes("\x1bX"), "\x1bX");
    }

    #[test]
    fn test_render_shapes() {
        assert_eq!(render(Line::Decorated, "hello"), "┣ hello\n");
        assert_eq!(render(Line::Indented, "detail"), "┃   detail\n");
        assert_eq!(render(Line::Block, "start"), "┃\n┣ start\n");
        assert_eq!(render(Line::End, ""), "╹\n");
        assert!(render(Line::Error, "bad").contains("ERROR"));
    }
}

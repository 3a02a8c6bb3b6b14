//! Bridge between the local bus and the assistant's messagebus.
//!
//! The messagebus is a websocket server (`ws://127.0.0.1:8181/core` unless
//! the core config says otherwise) carrying one JSON message per text frame.
//! Every message emitted on the [`LocalBus`] is sent as a frame, and every
//! frame received is dispatched to local subscribers. When the connection
//! drops the bridge keeps retrying with a fixed delay; messages emitted while
//! disconnected are dropped.
//!
//! One connection serves both directions. The reader polls with a short
//! timeout and releases the connection between polls so emits get through;
//! writes carry their own timeout so a peer that stops reading cannot stall
//! the threads that emit.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tungstenite::WebSocket;
use tungstenite::client::IntoClientRequest;

use super::{LocalBus, Message};
use crate::config::core_config_paths;
use crate::constants::{
    BUS_CONNECT_TIMEOUT, BUS_RECONNECT_DELAY, BUS_WRITE_TIMEOUT, DEFAULT_BUS_HOST,
    DEFAULT_BUS_PORT, DEFAULT_BUS_ROUTE, DEFAULT_BUS_URL,
};

/// How long one read holds the connection before letting writers in.
const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Pause between reads with the connection released.
const READ_GAP: Duration = Duration::from_millis(5);

type SharedSocket = Arc<Mutex<Option<WebSocket<TcpStream>>>>;

#[derive(Debug, Deserialize)]
struct CoreConfig {
    websocket: Option<WebSocketBlock>,
}

/// The `websocket` block of `mycroft.conf`.
#[derive(Debug, Deserialize)]
struct WebSocketBlock {
    host: Option<String>,
    port: Option<u16>,
    route: Option<String>,
    ssl: Option<bool>,
}

/// Messagebus URL from the core config files, later files overriding
/// earlier ones field by field. Missing files are skipped.
pub fn bus_url_from_core_config(paths: &[PathBuf]) -> Result<String> {
    let mut host = DEFAULT_BUS_HOST.to_string();
    let mut port = DEFAULT_BUS_PORT;
    let mut route = DEFAULT_BUS_ROUTE.to_string();
    let mut ssl = false;

    for path in paths {
        if !path.exists() {
            continue;
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed: CoreConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid websocket settings in {}", path.display()))?;
        let Some(block) = parsed.websocket else {
            continue;
        };
        host = block.host.unwrap_or(host);
        port = block.port.unwrap_or(port);
        route = block.route.unwrap_or(route);
        ssl = block.ssl.unwrap_or(ssl);
    }

    if !route.starts_with('/') {
        route.insert(0, '/');
    }
    let scheme = if ssl { "wss" } else { "ws" };
    Ok(format!("{scheme}://{host}:{port}{route}"))
}

/// The messagebus URL to use when none is given on the command line.
pub fn default_bus_url() -> String {
    match bus_url_from_core_config(&core_config_paths()) {
        Ok(url) => url,
        Err(e) => {
            log_warning!("Failed to read messagebus settings: {e:#}");
            log_indented!("Using {DEFAULT_BUS_URL}");
            DEFAULT_BUS_URL.to_string()
        }
    }
}

/// Open a websocket to `url`. Only plain `ws://` is supported.
fn connect(url: &str, write_timeout: Duration) -> Result<WebSocket<TcpStream>> {
    let request = url
        .into_client_request()
        .with_context(|| format!("Invalid messagebus URL '{url}'"))?;

    let uri = request.uri();
    if uri.scheme_str() != Some("ws") {
        anyhow::bail!("Unsupported messagebus URL '{url}', expected ws://");
    }
    let host = uri
        .host()
        .with_context(|| format!("Messagebus URL '{url}' has no host"))?
        .trim_matches(|c| c == '[' || c == ']')
        .to_string();
    let port = uri.port_u16().unwrap_or(80);

    let addr = (host.as_str(), port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {host}"))?
        .next()
        .with_context(|| format!("No address for {host}"))?;
    let stream = TcpStream::connect_timeout(&addr, BUS_CONNECT_TIMEOUT)
        .with_context(|| format!("Failed to connect to {addr}"))?;
    stream
        .set_read_timeout(Some(BUS_CONNECT_TIMEOUT))
        .context("Failed to set handshake timeout")?;
    stream
        .set_write_timeout(Some(write_timeout))
        .context("Failed to set write timeout")?;
    stream.set_nodelay(true).context("Failed to disable Nagle")?;

    let (socket, _response) = tungstenite::client(request, stream)
        .map_err(|e| anyhow::anyhow!("Websocket handshake with {url} failed: {e}"))?;
    socket
        .get_ref()
        .set_read_timeout(Some(READ_TIMEOUT))
        .context("Failed to set read timeout")?;
    Ok(socket)
}

pub struct WebSocketBridge {
    url: String,
    bus: Arc<LocalBus>,
    socket: SharedSocket,
    running: Arc<AtomicBool>,
    reconnect_delay: Duration,
    write_timeout: Duration,
    debug_enabled: bool,
}

impl WebSocketBridge {
    pub fn new(
        url: impl Into<String>,
        bus: Arc<LocalBus>,
        running: Arc<AtomicBool>,
        debug_enabled: bool,
    ) -> Self {
        Self {
            url: url.into(),
            bus,
            socket: Arc::new(Mutex::new(None)),
            running,
            reconnect_delay: BUS_RECONNECT_DELAY,
            write_timeout: BUS_WRITE_TIMEOUT,
            debug_enabled,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Hook the bridge into the bus and start the connection thread.
    pub fn start(self) -> Result<thread::JoinHandle<()>> {
        let socket = Arc::clone(&self.socket);
        let debug_enabled = self.debug_enabled;
        self.bus.add_sink(Arc::new(move |message: &Message| {
            forward(&socket, message, debug_enabled);
        }));

        thread::Builder::new()
            .name("bus-bridge".to_string())
            .spawn(move || self.run())
            .context("Failed to spawn bus bridge thread")
    }

    fn run(self) {
        let mut announced_failure = false;

        while self.running.load(Ordering::SeqCst) {
            match connect(&self.url, self.write_timeout) {
                Ok(socket) => {
                    announced_failure = false;
                    *lock(&self.socket) = Some(socket);
                    log_pipe!();
                    log_info!("Connected to messagebus at {}", self.url);
                    self.read_loop();
                    if self.running.load(Ordering::SeqCst) {
                        *lock(&self.socket) = None;
                        log_pipe!();
                        log_warning!("Lost connection to messagebus, reconnecting");
                    }
                }
                Err(e) => {
                    // Only the first failure in a row is worth a warning
                    if !announced_failure {
                        log_pipe!();
                        log_warning!("Messagebus unavailable: {e:#}");
                        log_indented!("Retrying every {}s", self.reconnect_delay.as_secs());
                        announced_failure = true;
                    } else if self.debug_enabled {
                        log_debug!("Messagebus connection attempt failed: {e:#}");
                    }
                }
            }
            self.sleep_while_running(self.reconnect_delay);
        }

        self.close();
    }

    fn read_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            let received = {
                let mut guard = lock(&self.socket);
                // A failed write already dropped the connection
                let Some(socket) = guard.as_mut() else {
                    return;
                };
                socket.read()
            };

            match received {
                Ok(frame) if frame.is_close() => return,
                Ok(frame) => self.handle_frame(&frame),
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    thread::sleep(READ_GAP);
                }
                Err(e) => {
                    if self.debug_enabled {
                        log_debug!("Messagebus read failed: {e}");
                    }
                    return;
                }
            }
        }
    }

    fn handle_frame(&self, frame: &tungstenite::Message) {
        // Pings are answered by the websocket layer; binary frames are not ours
        if !frame.is_text() {
            return;
        }
        let Ok(text) = frame.to_text() else {
            return;
        };
        match Message::from_json(text) {
            Ok(message) => {
                self.bus.dispatch(&message);
            }
            Err(e) => {
                if self.debug_enabled {
                    log_debug!("Ignoring malformed bus message: {e}");
                }
            }
        }
    }

    /// Say goodbye to the server on shutdown.
    fn close(&self) {
        if let Some(mut socket) = lock(&self.socket).take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
    }

    fn sleep_while_running(&self, total: Duration) {
        let step = Duration::from_millis(100);
        let mut slept = Duration::ZERO;
        while slept < total && self.running.load(Ordering::SeqCst) {
            thread::sleep(step.min(total - slept));
            slept += step;
        }
    }
}

fn forward(socket: &SharedSocket, message: &Message, debug_enabled: bool) {
    let text = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            log_error!("Failed to serialize {}: {e}", message.msg_type);
            return;
        }
    };

    let mut guard = lock(socket);
    let Some(ws) = guard.as_mut() else {
        if debug_enabled {
            log_debug!("Messagebus offline, dropped {}", message.msg_type);
        }
        return;
    };

    if let Err(e) = ws.send(tungstenite::Message::text(text)) {
        log_pipe!();
        log_warning!("Messagebus write failed, dropping connection: {e}");
        // A timed-out write can leave half a frame on the wire
        *guard = None;
    }
}

fn lock(socket: &SharedSocket) -> MutexGuard<'_, Option<WebSocket<TcpStream>>> {
    socket.lock().unwrap_or_else(|e| e.into_inner())
}

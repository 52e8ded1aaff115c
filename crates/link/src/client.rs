//! Reconnecting TCP client for the shift device.
//!
//! One worker thread owns the reconnect cadence and the liveness probe. The
//! send path and the worker share a single mutex around the connection
//! record, so a frame write never races a reconnect.

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bitmap::ShiftBitmap;
use crate::codec::PacketFormat;
use crate::error::{LinkError, Result};
use crate::reconnect::Backoff;

/// Connection settings. Durations are milliseconds on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    pub format: PacketFormat,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Worker loop cadence.
    pub poll_interval_ms: u64,
    /// Retry interval for the first `fast_attempts` failures.
    pub initial_retry_ms: u64,
    /// Retry interval once the fast attempts are used up.
    pub steady_retry_ms: u64,
    pub fast_attempts: u32,
    /// How long `disconnect` waits for the worker to exit.
    pub stop_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7777,
            format: PacketFormat::Standard,
            connect_timeout_ms: 2_000,
            write_timeout_ms: 1_000,
            poll_interval_ms: 250,
            initial_retry_ms: 1_000,
            steady_retry_ms: 5_000,
            fast_attempts: 5,
            stop_timeout_ms: 3_000,
        }
    }
}

impl LinkConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    // Zero timeouts are rejected by the socket API.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_retry_ms),
            Duration::from_millis(self.steady_retry_ms),
            self.fast_attempts,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
        }
    }
}

/// Point-in-time view of the link.
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub address: String,
    pub state: LinkState,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub connected_since: Option<DateTime<Utc>>,
    pub last_bitmap: Option<ShiftBitmap>,
}

/// Anything that can take the current bitmap for transmission.
pub trait BitmapSink {
    fn send_bitmap(&self, bitmap: ShiftBitmap) -> Result<()>;
}

struct Connection {
    stream: Option<TcpStream>,
    state: LinkState,
    last_bitmap: Option<ShiftBitmap>,
    backoff: Backoff,
    next_attempt: Instant,
    last_error: Option<String>,
    connected_since: Option<DateTime<Utc>>,
}

impl Connection {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(ErrorKind::NotConnected))?;
        stream.write_all(frame)?;
        stream.flush()
    }

    fn mark_disconnected(&mut self, reason: String) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state = LinkState::Disconnected;
        self.connected_since = None;
        let delay = self.schedule_retry();
        warn!(
            error = %reason,
            retry_in_ms = delay.as_millis() as u64,
            "link lost"
        );
        self.last_error = Some(reason);
    }

    /// Count a failure and set the next attempt time.
    fn schedule_retry(&mut self) -> Duration {
        let was_fast = self.backoff.is_fast();
        let delay = self.backoff.next_delay();
        self.next_attempt = Instant::now() + delay;
        if was_fast && !self.backoff.is_fast() {
            info!(failures = self.backoff.failures(), "fast retries exhausted, switching to steady interval");
        }
        delay
    }
}

struct Shared {
    config: LinkConfig,
    conn: Mutex<Connection>,
    stop: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("link connection lock poisoned")
    }
}

/// TCP link to the shift device with a background reconnection worker.
pub struct LinkClient {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    done: Option<mpsc::Receiver<()>>,
}

impl LinkClient {
    /// Create a disconnected client. Nothing touches the network until
    /// [`connect`](Self::connect) or [`start`](Self::start).
    pub fn new(config: LinkConfig) -> Self {
        let conn = Connection {
            stream: None,
            state: LinkState::Disconnected,
            last_bitmap: None,
            backoff: config.backoff(),
            next_attempt: Instant::now(),
            last_error: None,
            connected_since: None,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                conn: Mutex::new(conn),
                stop: AtomicBool::new(false),
            }),
            worker: None,
            done: None,
        }
    }

    /// Spawn the reconnection worker. Its first pass connects immediately.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(LinkError::AlreadyStarted);
        }
        self.shared.stop.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let (done_tx, done_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("shift-link".to_string())
            .spawn(move || {
                run_worker(&shared);
                let _ = done_tx.send(());
            })?;

        self.worker = Some(handle);
        self.done = Some(done_rx);
        Ok(())
    }

    /// One connection attempt. Already connected is a no-op.
    pub fn connect(&self) -> Result<()> {
        connect_once(&self.shared)
    }

    /// Record `bitmap` as the last-known state and write it if connected.
    pub fn send(&self, bitmap: ShiftBitmap) -> Result<()> {
        let mut conn = self.shared.lock();
        conn.last_bitmap = Some(bitmap);
        if conn.state != LinkState::Connected {
            debug!(bitmap = %bitmap, state = %conn.state, "bitmap held until reconnect");
            return Err(LinkError::NotConnected);
        }

        let frame = self.shared.config.format.encode(bitmap);
        match conn.write_frame(&frame) {
            Ok(()) => {
                debug!(bitmap = %bitmap, "bitmap sent");
                Ok(())
            }
            Err(e) => {
                conn.mark_disconnected(e.to_string());
                Err(LinkError::Io(e))
            }
        }
    }

    /// Stop the worker, waiting at most `stop_timeout`, then close the socket.
    pub fn disconnect(&mut self) {
        self.shared.stop.store(true, Ordering::Release);

        if let Some(handle) = self.worker.take() {
            let timeout = self.shared.config.stop_timeout();
            let stopped = match self.done.take() {
                Some(done) => !matches!(done.recv_timeout(timeout), Err(RecvTimeoutError::Timeout)),
                None => true,
            };
            if !stopped {
                warn!(timeout_ms = timeout.as_millis() as u64, "link worker did not stop in time, detaching");
            } else if handle.join().is_err() {
                warn!("link worker panicked");
            }
        }

        let mut conn = self.shared.lock();
        if let Some(stream) = conn.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!(address = %self.shared.config.address(), "link closed");
        }
        conn.state = LinkState::Disconnected;
        conn.connected_since = None;
    }

    pub fn status(&self) -> LinkStatus {
        let conn = self.shared.lock();
        LinkStatus {
            address: self.shared.config.address(),
            state: conn.state,
            consecutive_failures: conn.backoff.failures(),
            last_error: conn.last_error.clone(),
            connected_since: conn.connected_since,
            last_bitmap: conn.last_bitmap,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().state == LinkState::Connected
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }
}

impl BitmapSink for LinkClient {
    fn send_bitmap(&self, bitmap: ShiftBitmap) -> Result<()> {
        self.send(bitmap)
    }
}

impl Drop for LinkClient {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.disconnect();
        }
    }
}

fn run_worker(shared: &Shared) {
    debug!(address = %shared.config.address(), "link worker started");
    while !shared.stop.load(Ordering::Acquire) {
        tick(shared);
        thread::sleep(shared.config.poll_interval());
    }
    debug!("link worker stopped");
}

fn tick(shared: &Shared) {
    let due = {
        let mut conn = shared.lock();
        match conn.state {
            LinkState::Connected => {
                probe(&mut conn);
                false
            }
            LinkState::Disconnected => Instant::now() >= conn.next_attempt,
            LinkState::Connecting => false,
        }
    };
    if due {
        // Failures are logged and rescheduled inside.
        let _ = connect_once(shared);
    }
}

/// The socket is opened without holding the lock so a slow connect never
/// stalls the send path; the state reads `connecting` meanwhile.
fn connect_once(shared: &Shared) -> Result<()> {
    let address = shared.config.address();
    {
        let mut conn = shared.lock();
        match conn.state {
            LinkState::Connected => return Ok(()),
            LinkState::Connecting => return Err(LinkError::ConnectInProgress),
            LinkState::Disconnected => conn.state = LinkState::Connecting,
        }
    }

    debug!(address = %address, "connecting");
    let opened = open_stream(&shared.config);

    let mut conn = shared.lock();
    match opened {
        Ok(stream) => {
            let recovered_after = conn.backoff.failures();
            conn.backoff.reset();
            conn.stream = Some(stream);
            conn.state = LinkState::Connected;
            conn.connected_since = Some(Utc::now());
            conn.last_error = None;
            info!(address = %address, failures = recovered_after, "link connected");

            if let Some(bitmap) = conn.last_bitmap {
                let frame = shared.config.format.encode(bitmap);
                if let Err(e) = conn.write_frame(&frame) {
                    conn.mark_disconnected(e.to_string());
                    return Err(LinkError::Io(e));
                }
                info!(bitmap = %bitmap, "resent last-known bitmap");
            }
            Ok(())
        }
        Err(e) => {
            let delay = conn.schedule_retry();
            conn.state = LinkState::Disconnected;
            conn.last_error = Some(e.to_string());
            warn!(
                address = %address,
                attempt = conn.backoff.failures(),
                retry_in_ms = delay.as_millis() as u64,
                error = %e,
                "link connect failed"
            );
            Err(e)
        }
    }
}

fn open_stream(config: &LinkConfig) -> Result<TcpStream> {
    let address = config.address();
    let addrs = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|source| LinkError::Resolve {
            address: address.clone(),
            source,
        })?;

    let mut last = io::Error::new(ErrorKind::AddrNotAvailable, "no addresses resolved");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.connect_timeout()) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_write_timeout(Some(config.write_timeout()))?;
                return Ok(stream);
            }
            Err(e) => last = e,
        }
    }
    Err(LinkError::Connect { address, source: last })
}

fn probe(conn: &mut Connection) {
    let outcome = match conn.stream.as_ref() {
        Some(stream) => peer_closed(stream),
        None => Ok(true),
    };
    match outcome {
        Ok(false) => {}
        Ok(true) => conn.mark_disconnected("peer closed the connection".to_string()),
        Err(e) => conn.mark_disconnected(e.to_string()),
    }
}

/// Non-blocking liveness check. Inbound bytes are drained and ignored.
fn peer_closed(stream: &TcpStream) -> io::Result<bool> {
    stream.set_nonblocking(true)?;
    let result = drain(stream);
    stream.set_nonblocking(false)?;
    result
}

fn drain(mut stream: &TcpStream) -> io::Result<bool> {
    let mut buf = [0u8; 64];
    loop {
        match stream.peek(&mut buf) {
            Ok(0) => return Ok(true),
            Ok(_) => {
                if stream.read(&mut buf)? == 0 {
                    return Ok(true);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

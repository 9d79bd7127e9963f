// src/session.rs
//
// Serial session controller: one port handle, two states (Closed/Open),
// and the four operations the UI drives - open, send, close, receive.
// A background reader turns inbound bytes into serial-line events.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serialport::SerialPort;
use tauri::{AppHandle, Manager, Runtime, State};

use crate::emit_ui;
use crate::line::LineSplitter;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Hardcoded line settings: 9600 baud, 8 data bits, no parity, 1 stop bit.
/// Only the port name is selectable.
pub const BAUD_RATE: u32 = 9600;

/// Short read timeout keeps the reader loop responsive to the cancel flag.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Terminator appended to every transmitted line.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Port handle shared between the reader task and the command handlers.
type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Payload for a received line
#[derive(Clone, Serialize)]
pub struct SerialLinePayload {
    pub line: String,
    pub port: String,
}

/// Payload for open/close transitions - drives button enablement in the UI
#[derive(Clone, Serialize)]
pub struct PortStatePayload {
    pub open: bool,
    pub port: Option<String>,
}

/// Payload emitted when the background reader exits
#[derive(Clone, Serialize)]
pub struct StreamEndedPayload {
    pub reason: String,
    pub port: String,
}

// ============================================================================
// Session
// ============================================================================

/// The single serial session. Closed when `port` is None.
#[derive(Default)]
pub struct PortSession {
    port_name: Option<String>,
    port: Option<SharedPort>,
    cancel_flag: Arc<AtomicBool>,
    reader: Option<tauri::async_runtime::JoinHandle<()>>,
}

impl PortSession {
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Attach an opened port handle and transition to Open.
    /// Returns the fresh cancel flag for the reader task.
    fn attach(&mut self, name: String, port: SharedPort) -> Arc<AtomicBool> {
        self.cancel_flag = Arc::new(AtomicBool::new(false));
        self.port_name = Some(name);
        self.port = Some(port);
        self.cancel_flag.clone()
    }

    fn set_reader(&mut self, handle: tauri::async_runtime::JoinHandle<()>) {
        self.reader = Some(handle);
    }

    /// Write one terminated line. Returns Ok(false) without touching the
    /// transport when the session is Closed - Send while Closed is a no-op.
    pub fn write_line(&self, text: &str) -> Result<bool, String> {
        let port = match &self.port {
            Some(p) => p,
            None => return Ok(false),
        };

        let data = frame_line(text);
        let mut guard = port
            .lock()
            .map_err(|e| format!("Port mutex poisoned: {}", e))?;
        guard
            .write_all(&data)
            .and_then(|_| guard.flush())
            .map_err(|e| format!("Serial write error: {}", e))?;
        Ok(true)
    }

    /// Read whatever bytes the OS currently buffers, without blocking.
    /// Empty when nothing is pending or the session is Closed.
    pub fn read_pending(&self) -> Result<String, String> {
        let port = match &self.port {
            Some(p) => p,
            None => return Ok(String::new()),
        };

        let mut guard = port
            .lock()
            .map_err(|e| format!("Port mutex poisoned: {}", e))?;
        let bytes = drain_pending(&mut **guard)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Detach the handle and reader for closing. Idempotent - both are None
    /// when already Closed. The caller awaits the reader outside the lock.
    fn detach(
        &mut self,
    ) -> (
        Option<SharedPort>,
        Option<tauri::async_runtime::JoinHandle<()>>,
    ) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        self.port_name = None;
        (self.port.take(), self.reader.take())
    }
}

/// Managed wrapper around the single session.
pub struct SessionState(pub tokio::sync::Mutex<PortSession>);

impl SessionState {
    pub fn new() -> Self {
        SessionState(tokio::sync::Mutex::new(PortSession::default()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Open a port by name with the hardcoded default line settings.
pub fn open_named_port(name: &str) -> Result<Box<dyn SerialPort>, String> {
    serialport::new(name, BAUD_RATE)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| format!("Failed to open {}: {}", name, e))
}

/// Append the line terminator to outgoing text.
pub fn frame_line(text: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(text.len() + 1);
    data.extend_from_slice(text.as_bytes());
    data.push(LINE_TERMINATOR);
    data
}

/// Read the bytes currently buffered by the OS, without waiting for more.
pub fn drain_pending(port: &mut dyn SerialPort) -> Result<Vec<u8>, String> {
    let pending = port
        .bytes_to_read()
        .map_err(|e| format!("Serial read error: {}", e))? as usize;
    if pending == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; pending];
    let mut filled = 0;
    while filled < buf.len() {
        match port.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => return Err(format!("Serial read error: {}", e)),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Shared close path used by the Close button and window-close cleanup.
/// Idempotent: closing an already-closed session does nothing.
///
/// Port-state events are emitted while the session lock is held so they
/// can never interleave out of order with another transition.
pub async fn close_session<R: Runtime>(app: &AppHandle<R>) {
    let state = app.state::<SessionState>();
    let (port, reader) = {
        let mut session = state.0.lock().await;
        let (port, reader) = session.detach();
        if port.is_some() {
            tlog!("[session] Closed");
            emit_ui(
                app,
                "port-state",
                PortStatePayload {
                    open: false,
                    port: None,
                },
            );
        }
        (port, reader)
    };

    // The reader observes the cancel flag within one read timeout.
    if let Some(handle) = reader {
        let _ = handle.await;
    }
    drop(port);
}

/// Clear session state after the reader exits on its own (disconnect or
/// read error). Must not await the reader handle - it is the caller's own
/// task - so the handle is dropped instead.
async fn clear_session_after_reader_exit<R: Runtime>(app: &AppHandle<R>) {
    let state = app.state::<SessionState>();
    let mut session = state.0.lock().await;
    let (port, _reader) = session.detach();
    if port.is_some() {
        emit_ui(
            app,
            "port-state",
            PortStatePayload {
                open: false,
                port: None,
            },
        );
    }
}

// ============================================================================
// Background Reader
// ============================================================================

/// Spawn the background reader for an open port.
fn spawn_reader<R: Runtime>(
    app: AppHandle<R>,
    port_name: String,
    port: SharedPort,
    cancel_flag: Arc<AtomicBool>,
) -> tauri::async_runtime::JoinHandle<()> {
    tauri::async_runtime::spawn(async move {
        let app_for_exit = app.clone();
        let name_for_exit = port_name.clone();

        // Run blocking serial I/O in a dedicated thread
        let result = tokio::task::spawn_blocking(move || {
            run_reader_blocking(app, port_name, port, cancel_flag)
        })
        .await;

        let reason = match result {
            Ok(reason) => reason,
            Err(e) => {
                tlog!("[session] Reader task panicked: {:?}", e);
                "error"
            }
        };

        // "closed" means close_session already detached the state; the
        // other reasons mean the port went away underneath us.
        if reason != "closed" {
            clear_session_after_reader_exit(&app_for_exit).await;
        }

        emit_ui(
            &app_for_exit,
            "stream-ended",
            StreamEndedPayload {
                reason: reason.to_string(),
                port: name_for_exit,
            },
        );
    })
}

/// Blocking read loop: poll the port, assemble lines, emit one serial-line
/// event per complete line. Returns the reason the stream ended.
fn run_reader_blocking<R: Runtime>(
    app: AppHandle<R>,
    port_name: String,
    port: SharedPort,
    cancel_flag: Arc<AtomicBool>,
) -> &'static str {
    let mut splitter = LineSplitter::new();
    let mut buf = [0u8; 256];
    let reason;

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            reason = "closed";
            break;
        }

        let read_result = match port.lock() {
            Ok(mut guard) => guard.read(&mut buf),
            Err(e) => {
                tlog!("[session] Port mutex poisoned in read loop: {}", e);
                emit_ui(
                    &app,
                    "session-error",
                    format!("Port mutex poisoned: {}", e),
                );
                reason = "error";
                break;
            }
        };

        match read_result {
            Ok(n) if n > 0 => {
                for line in splitter.feed(&buf[..n]) {
                    emit_ui(
                        &app,
                        "serial-line",
                        SerialLinePayload {
                            line,
                            port: port_name.clone(),
                        },
                    );
                }
            }
            Ok(_) => {
                // EOF - port closed/disconnected
                reason = "disconnected";
                break;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // Timeout is expected for serial reads
            }
            Err(e) => {
                emit_ui(&app, "session-error", format!("Read error: {}", e));
                reason = "error";
                break;
            }
        }
    }

    // Surface a trailing unterminated chunk before exit
    if let Some(line) = splitter.flush() {
        emit_ui(
            &app,
            "serial-line",
            SerialLinePayload {
                line,
                port: port_name.clone(),
            },
        );
    }

    tlog!("[session] Reader for {} ended: {}", port_name, reason);
    reason
}

// ============================================================================
// Tauri Commands
// ============================================================================

/// Open the selected port and start the background reader.
///
/// State flips only after the open has succeeded: a failed open returns Err,
/// emits nothing, and the UI stays in the Closed arrangement. The open event
/// is emitted while the session lock is still held - a reader that dies
/// instantly blocks on that lock, so its Closed announcement cannot land
/// before the Open one.
#[tauri::command]
pub async fn open_port<R: Runtime>(
    app: AppHandle<R>,
    state: State<'_, SessionState>,
    port_name: String,
) -> Result<(), String> {
    let mut session = state.0.lock().await;
    if session.is_open() {
        return Err(format!(
            "{} is already open",
            session.port_name().unwrap_or("A port")
        ));
    }

    let port: SharedPort = Arc::new(Mutex::new(open_named_port(&port_name)?));
    let cancel_flag = session.attach(port_name.clone(), port.clone());

    tlog!("[session] Opened {} at {} baud (8N1)", port_name, BAUD_RATE);

    let handle = spawn_reader(app.clone(), port_name.clone(), port, cancel_flag);
    session.set_reader(handle);

    emit_ui(
        &app,
        "port-state",
        PortStatePayload {
            open: true,
            port: Some(port_name),
        },
    );
    Ok(())
}

/// Transmit one line, fire-and-forget. Returns whether the text was actually
/// sent so the UI knows whether to clear the input field; while Closed this
/// is a no-op reporting false.
#[tauri::command]
pub async fn send_line(state: State<'_, SessionState>, text: String) -> Result<bool, String> {
    let session = state.0.lock().await;
    let sent = session.write_line(&text)?;
    if sent {
        tlog!("[session] Sent {} bytes", text.len() + 1);
    } else {
        tlog!("[session] Send ignored - port is closed");
    }
    Ok(sent)
}

/// Poll the receive buffer: whatever bytes are pending, possibly empty.
#[tauri::command]
pub async fn read_available(state: State<'_, SessionState>) -> Result<String, String> {
    let session = state.0.lock().await;
    session.read_pending()
}

/// Close the port. Idempotent - closing an already-closed session succeeds.
#[tauri::command]
pub async fn close_port<R: Runtime>(app: AppHandle<R>) -> Result<(), String> {
    close_session(&app).await;
    Ok(())
}

/// Current session state, used by the frontend to derive button enablement.
#[tauri::command]
pub async fn session_is_open(state: State<'_, SessionState>) -> Result<bool, String> {
    Ok(state.0.lock().await.is_open())
}

// ============================================================================
// Tests
// ============================================================================

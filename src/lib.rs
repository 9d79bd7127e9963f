// src/lib.rs
//
// LineTerm: a minimal line-oriented serial terminal.
// The webview is glue only; all serial work happens in the commands and
// the background reader registered here.

#[macro_use]
mod logging;

mod line;
mod ports;
mod session;

use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager, Runtime, WindowEvent};

use session::SessionState;

/// Emit an event to the main window, dropping it quietly when the window is
/// gone. Events raced against window destruction can crash the webview.
pub(crate) fn emit_ui<R: Runtime, S: Serialize + Clone>(app: &AppHandle<R>, event: &str, payload: S) {
    if app.get_webview_window("main").is_none() {
        tlog!("[emit_ui] Dropped event '{}' - no window", event);
        return;
    }
    let _ = app.emit(event, payload);
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(SessionState::new())
        .invoke_handler(tauri::generate_handler![
            ports::list_serial_ports,
            session::open_port,
            session::send_line,
            session::read_available,
            session::close_port,
            session::session_is_open,
        ])
        .on_window_event(|window, event| {
            // Close the port unconditionally when the window goes away.
            if let WindowEvent::CloseRequested { .. } = event {
                tlog!("[window] Close requested - releasing serial port");
                let app = window.app_handle().clone();
                tauri::async_runtime::block_on(session::close_session(&app));
            }
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

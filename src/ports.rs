// src/ports.rs
//
// Serial port enumeration for the port selector.
// Ports are reported in the order the OS returns them; the frontend
// selects the first entry as the default.

use serde::Serialize;

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// Map the serialport crate's enumeration entry to the selector payload.
fn describe_port(p: serialport::SerialPortInfo) -> SerialPortInfo {
    let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
        serialport::SerialPortType::UsbPort(info) => (
            "USB".to_string(),
            info.manufacturer,
            info.product,
            info.serial_number,
            Some(info.vid),
            Some(info.pid),
        ),
        serialport::SerialPortType::BluetoothPort => {
            ("Bluetooth".to_string(), None, None, None, None, None)
        }
        serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None, None),
        serialport::SerialPortType::Unknown => {
            ("Unknown".to_string(), None, None, None, None, None)
        }
    };
    SerialPortInfo {
        port_name: p.port_name,
        port_type,
        manufacturer,
        product,
        serial_number,
        vid,
        pid,
    }
}

/// List available serial ports
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The cu (calling unit) devices are non-blocking and preferred for outgoing connections.
/// The tty (terminal) devices block on open waiting for carrier detect.
#[tauri::command]
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, String> {
    let ports =
        serialport::available_ports().map_err(|e| format!("Failed to enumerate ports: {}", e))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(describe_port)
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

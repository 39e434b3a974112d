//! Classic Bluetooth via the native macOS stack.
//!
//! macOS has no RFCOMM socket API; instead IOBluetooth exposes each paired
//! SPP device as a Bluetooth-type serial port (`/dev/cu.*`). Opening that
//! port talks through the OS Bluetooth framework with the same semantics
//! as the socket variant. The factory prefers this transport on macOS and
//! falls back to the socket variant elsewhere.

use serialport::{SerialPort, SerialPortType};

use crate::transport::{Transport, TransportError, TransportKind, serial};

const BAUD_RATE: u32 = 115_200;
const PORT_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

/// Whether the native stack is usable here: macOS with at least one
/// Bluetooth serial port registered by the framework.
pub fn available() -> bool {
    cfg!(target_os = "macos") && !bluetooth_ports().is_empty()
}

fn bluetooth_ports() -> Vec<String> {
    serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .filter(|p| matches!(p.port_type, SerialPortType::BluetoothPort))
        .map(|p| p.port_name)
        .collect()
}

/// Framework-backed classic Bluetooth channel.
pub struct NativeBluetoothTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl NativeBluetoothTransport {
    /// Open the Bluetooth serial port of the paired printer.
    ///
    /// The framework names ports after the device, not its MAC, so with
    /// several paired SPP devices the choice is ambiguous and the caller
    /// must pair only the printer or use another connection type.
    pub fn open(address: &str) -> Result<Self, TransportError> {
        let candidates = bluetooth_ports();
        let path = match candidates.len() {
            0 => {
                return Err(TransportError::ConnectFailed(format!(
                    "no Bluetooth serial port found; is {address} paired?"
                )));
            }
            1 => candidates.into_iter().next().unwrap(),
            _ => return Err(TransportError::AmbiguousDevice { candidates }),
        };
        tracing::info!(port = %path, address, "opening native Bluetooth channel");
        let port = serialport::new(&path, BAUD_RATE)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|e| TransportError::ConnectFailed(format!("{path}: {e}")))?;
        Ok(Self { port: Some(port) })
    }
}

impl Transport for NativeBluetoothTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::BluetoothNative
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;
        serial::write_port(port, data)
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;
        serial::drain_port(port)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.port.take().is_some() {
            tracing::debug!("native Bluetooth channel closed");
        }
        Ok(())
    }
}

impl Drop for NativeBluetoothTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

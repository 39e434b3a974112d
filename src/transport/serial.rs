//! USB-serial transport using the `serialport` crate.
//!
//! NIIMBOT printers enumerate as a plain 115200 8N1 CDC device; the
//! protocol has its own ack/nak flow, so no serial flow control is used.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::transport::{Transport, TransportError, TransportKind};

const BAUD_RATE: u32 = 115_200;
const PORT_TIMEOUT: Duration = Duration::from_millis(500);

/// Serial channel to the printer.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open the given device path, or auto-detect when `path` is `None`.
    ///
    /// Auto-detection only succeeds when exactly one serial port exists;
    /// several candidates fail with [`TransportError::AmbiguousDevice`] so
    /// the user can pick one explicitly.
    pub fn open(path: Option<&str>) -> Result<Self, TransportError> {
        let path = match path {
            Some(p) => p.to_string(),
            None => detect_port()?,
        };
        tracing::info!(port = %path, "opening serial port");
        let port = serialport::new(&path, BAUD_RATE)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|e| TransportError::ConnectFailed(format!("{path}: {e}")))?;
        Ok(Self { port: Some(port) })
    }
}

fn detect_port() -> Result<String, TransportError> {
    let ports = serialport::available_ports()
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
    match ports.len() {
        0 => Err(TransportError::ConnectFailed(
            "no serial ports detected".into(),
        )),
        1 => Ok(ports[0].port_name.clone()),
        _ => Err(TransportError::AmbiguousDevice {
            candidates: ports.into_iter().map(|p| p.port_name).collect(),
        }),
    }
}

/// Write the whole buffer through a serial handle, then flush.
pub(crate) fn write_port(
    port: &mut Box<dyn SerialPort>,
    data: &[u8],
) -> Result<(), TransportError> {
    port.write_all(data)
        .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
    port.flush()
        .map_err(|e| TransportError::WriteFailed(e.to_string()))
}

/// Drain whatever the port has buffered without blocking.
pub(crate) fn drain_port(port: &mut Box<dyn SerialPort>) -> Result<Vec<u8>, TransportError> {
    let pending = port
        .bytes_to_read()
        .map_err(|e| TransportError::WriteFailed(e.to_string()))? as usize;
    if pending == 0 {
        return Ok(Vec::new());
    }
    let mut buf = vec![0u8; pending];
    match port.read(&mut buf) {
        Ok(n) => {
            buf.truncate(n);
            Ok(buf)
        }
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
        Err(_) => Err(TransportError::Disconnected),
    }
}

impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;
        write_port(port, data)
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;
        drain_port(port)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.port.take().is_some() {
            tracing::debug!("serial port closed");
        }
        Ok(())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

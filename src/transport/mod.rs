//! Printer transport layer.
//!
//! One behavioral contract over four channels: USB-serial, classic
//! Bluetooth via RFCOMM socket (Linux), classic Bluetooth via the native
//! macOS stack, and Bluetooth Low Energy (GATT). A transport is connected
//! by its constructor and exclusively owned by one print session until
//! closed.

pub mod ble;
pub mod bluetooth;
pub mod bluetooth_native;
pub mod serial;

use std::str::FromStr;

use thiserror::Error;

pub use ble::BleTransport;
pub use bluetooth::BluetoothSocketTransport;
pub use bluetooth_native::NativeBluetoothTransport;
pub use serial::SerialTransport;

/// Channel-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Device auto-selection found more than one candidate.
    #[error("cannot auto-select a device, several candidates found: {candidates:?}")]
    AmbiguousDevice { candidates: Vec<String> },
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    /// The channel is gone; fatal to the current session.
    #[error("transport disconnected")]
    Disconnected,
    #[error("bad address {0:?} (expected a MAC like AA:BB:CC:DD:EE:FF)")]
    BadAddress(String),
}

/// Which concrete channel a transport runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Serial,
    BluetoothSocket,
    BluetoothNative,
    Ble,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Serial => "serial",
            Self::BluetoothSocket => "bluetooth (socket)",
            Self::BluetoothNative => "bluetooth (native)",
            Self::Ble => "ble",
        })
    }
}

/// A connected byte channel to the printer.
///
/// `write` either transmits the whole buffer or fails; there is no silent
/// partial write. `read_available` never blocks: it drains whatever the
/// channel has pending and returns an empty vector otherwise. `close` is
/// idempotent and always releases the underlying OS handle, even after an
/// earlier failure.
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;
    fn read_available(&mut self) -> Result<Vec<u8>, TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
}

impl Transport for Box<dyn Transport> {
    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).read_available()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// Connection type selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Usb,
    Bluetooth,
    Ble,
}

impl FromStr for ConnectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usb" => Ok(Self::Usb),
            "bluetooth" => Ok(Self::Bluetooth),
            "ble" => Ok(Self::Ble),
            other => Err(format!(
                "unknown connection type {other:?} (expected usb, bluetooth or ble)"
            )),
        }
    }
}

/// How to reach the printer: connection type plus an optional address
/// (MAC for Bluetooth/BLE, device path for serial).
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub kind: ConnectionKind,
    pub address: Option<String>,
}

impl ConnectionSpec {
    pub fn new(kind: ConnectionKind, address: Option<String>) -> Self {
        Self { kind, address }
    }
}

/// Open the transport described by `spec`.
///
/// Classic Bluetooth prefers the native macOS stack when it exposes the
/// paired device, falling back to the RFCOMM socket variant otherwise.
pub fn open_transport(spec: &ConnectionSpec) -> Result<Box<dyn Transport>, TransportError> {
    match spec.kind {
        ConnectionKind::Usb => {
            let t = SerialTransport::open(spec.address.as_deref())?;
            Ok(Box::new(t))
        }
        ConnectionKind::Bluetooth => {
            let address = required_address(spec)?;
            if !is_valid_mac(address) {
                return Err(TransportError::BadAddress(address.to_string()));
            }
            if bluetooth_native::available() {
                match NativeBluetoothTransport::open(address) {
                    Ok(t) => return Ok(Box::new(t)),
                    Err(e) => {
                        tracing::warn!(error = %e, "native Bluetooth stack unusable, trying RFCOMM socket");
                    }
                }
            }
            Ok(Box::new(BluetoothSocketTransport::open(address)?))
        }
        ConnectionKind::Ble => {
            let address = required_address(spec)?;
            Ok(Box::new(BleTransport::open(address)?))
        }
    }
}

fn required_address(spec: &ConnectionSpec) -> Result<&str, TransportError> {
    spec.address.as_deref().ok_or_else(|| {
        TransportError::ConnectFailed("an address is required for this connection type".into())
    })
}

/// Validate a Bluetooth MAC address (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Parse a MAC address into its six octets, in print order.
pub(crate) fn parse_mac(mac: &str) -> Result<[u8; 6], TransportError> {
    let mut octets = [0u8; 6];
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return Err(TransportError::BadAddress(mac.to_string()));
    }
    for (octet, part) in octets.iter_mut().zip(&parts) {
        *octet =
            u8::from_str_radix(part, 16).map_err(|_| TransportError::BadAddress(mac.to_string()))?;
    }
    Ok(octets)
}

/// Hex-dump helper for wire-level tracing.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44"));
        assert!(!is_valid_mac("00:11:22:33:44:55:66"));
        assert!(!is_valid_mac("00-11-22-33-44-55"));
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL"));
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn mac_parses_to_octets() {
        assert_eq!(
            parse_mac("26:03:03:C3:F9:11").unwrap(),
            [0x26, 0x03, 0x03, 0xC3, 0xF9, 0x11]
        );
        assert!(parse_mac("not-a-mac").is_err());
    }

    #[test]
    fn hex_dump_format() {
        assert_eq!(hex(&[0x55, 0x55, 0x01]), "55:55:01");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn bluetooth_spec_requires_valid_mac() {
        let spec = ConnectionSpec::new(ConnectionKind::Bluetooth, Some("garbage".into()));
        assert!(matches!(
            open_transport(&spec),
            Err(TransportError::BadAddress(_))
        ));

        let spec = ConnectionSpec::new(ConnectionKind::Bluetooth, None);
        assert!(matches!(
            open_transport(&spec),
            Err(TransportError::ConnectFailed(_))
        ));
    }

    #[test]
    fn connection_kind_parses() {
        assert_eq!("usb".parse::<ConnectionKind>().unwrap(), ConnectionKind::Usb);
        assert_eq!("BLE".parse::<ConnectionKind>().unwrap(), ConnectionKind::Ble);
        assert!("tcp".parse::<ConnectionKind>().is_err());
    }
}

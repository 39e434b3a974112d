//! NIIMBOT label printer driver: print monochrome labels over USB-serial,
//! classic Bluetooth (SPP) or Bluetooth Low Energy.
//!
//! Main modules:
//! - packet: vendor frame codec with a resumable decoder
//! - raster: monochrome bitmap to row packets
//! - transport: serial / Bluetooth / BLE channel implementations
//! - printer: print session state machine and device queries
//! - model: supported printer models and job parameters

pub mod model;
pub mod packet;
pub mod printer;
pub mod raster;
pub mod transport;

/// Job parameters and model table
pub use model::{PrintJob, PrinterModel, Rotation};
/// Frame codec (packets, resumable decoding)
pub use packet::{FrameError, Packet, PacketDecoder};
/// Print session API
pub use printer::{
    Heartbeat, InfoKey, InfoValue, Phase, PrintSession, PrintStatus, RfidTag, SessionError,
    SessionState,
};
/// Row encoding
pub use raster::ImageError;
/// Transport abstraction and BLE discovery
pub use transport::ble::{BleScanner, DiscoveredDevice, DiscoveryFilter};
pub use transport::{ConnectionKind, ConnectionSpec, Transport, TransportError, open_transport};

//! Bluetooth Low Energy transport and device discovery using btleplug.
//!
//! The printer exposes one GATT service with a single characteristic used
//! for both writes and notifications. Notifications are the only inbound
//! path and are never frame-aligned: the subscription task appends raw
//! bytes to a shared queue and does nothing else, so all decoding happens
//! on the session's own thread when it drains `read_available`.
//!
//! The public surface is synchronous; each transport owns a private tokio
//! runtime the way the original stack ran its event loop on a background
//! thread.

use std::collections::{HashSet, VecDeque};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::runtime::Runtime;
use uuid::Uuid;

use crate::transport::{Transport, TransportError, TransportKind, hex};

/// GATT service advertised by NIIMBOT printers.
pub const NIIMBOT_SERVICE_UUID: Uuid = Uuid::from_u128(0xe7810a71_73ae_499d_8c15_faa9aef0c3f2);

/// Write/notify characteristic (one characteristic, both directions).
pub const NIIMBOT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xbef8d6c9_9c21_4c9e_b632_bd58c1009f9f);

/// How long to wait for the peripheral to show up in scan results.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Poll interval while waiting for the peripheral during connect.
const CONNECT_POLL: Duration = Duration::from_millis(200);

/// Conservative write chunk; fits any negotiated MTU above the BLE 4.2
/// default and keeps batched row packets from overrunning the stack.
const DEFAULT_CHUNK_SIZE: usize = 150;

/// Pause between chunked writes so the peripheral can keep up.
const CHUNK_WRITE_DELAY: Duration = Duration::from_millis(10);

/// Advertised names that identify NIIMBOT printers during discovery.
const NAME_KEYWORDS: [&str; 6] = ["NIIMBOT", "B1", "B18", "B21", "D11", "D110"];

async fn first_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new()
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
    manager
        .adapters()
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::ConnectFailed("no BLE adapter found".into()))
}

/// GATT channel to the printer.
pub struct BleTransport {
    runtime: Runtime,
    link: Option<(Peripheral, Characteristic)>,
    queue: Arc<Mutex<VecDeque<u8>>>,
    notify_task: Option<tokio::task::JoinHandle<()>>,
    chunk_size: usize,
}

impl BleTransport {
    /// Connect to the printer at `address` (MAC, or peripheral UUID on
    /// macOS) and subscribe to its notification characteristic.
    pub fn open(address: &str) -> Result<Self, TransportError> {
        let runtime =
            Runtime::new().map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let queue: Arc<Mutex<VecDeque<u8>>> = Arc::new(Mutex::new(VecDeque::new()));

        let (link, notify_task) = runtime.block_on(async {
            let adapter = first_adapter().await?;
            let peripheral = find_peripheral(&adapter, address, CONNECT_TIMEOUT).await?;

            peripheral
                .connect()
                .await
                .map_err(|e| TransportError::ConnectFailed(format!("{address}: {e}")))?;
            peripheral
                .discover_services()
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

            let characteristic = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == NIIMBOT_CHARACTERISTIC_UUID)
                .ok_or_else(|| {
                    TransportError::ConnectFailed(format!(
                        "characteristic {NIIMBOT_CHARACTERISTIC_UUID} not found; \
                         is this a NIIMBOT printer?"
                    ))
                })?;

            peripheral
                .subscribe(&characteristic)
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            let mut notifications = peripheral
                .notifications()
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

            // Producer side of the notification queue: append bytes,
            // nothing more. Decoding stays on the session thread.
            let sink = Arc::clone(&queue);
            let task = tokio::spawn(async move {
                while let Some(notification) = notifications.next().await {
                    tracing::trace!(bytes = notification.value.len(), "BLE notification");
                    sink.lock()
                        .expect("notification queue poisoned")
                        .extend(notification.value);
                }
            });

            tracing::info!(address, "BLE connected and subscribed");
            Ok::<_, TransportError>(((peripheral, characteristic), task))
        })?;

        Ok(Self {
            runtime,
            link: Some(link),
            queue,
            notify_task: Some(notify_task),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Override the write chunk size (bytes per GATT write).
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

async fn find_peripheral(
    adapter: &Adapter,
    address: &str,
    timeout: Duration,
) -> Result<Peripheral, TransportError> {
    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
    let deadline = Instant::now() + timeout;
    let found = loop {
        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        if let Some(p) = peripherals.into_iter().find(|p| matches_address(p, address)) {
            break Some(p);
        }
        if Instant::now() >= deadline {
            break None;
        }
        tokio::time::sleep(CONNECT_POLL).await;
    };
    let _ = adapter.stop_scan().await;
    found.ok_or_else(|| {
        TransportError::ConnectFailed(format!(
            "device {address} not seen within {timeout:?}; is it powered on?"
        ))
    })
}

fn matches_address(peripheral: &Peripheral, address: &str) -> bool {
    peripheral
        .address()
        .to_string()
        .eq_ignore_ascii_case(address)
        || peripheral.id().to_string().eq_ignore_ascii_case(address)
}

impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let (peripheral, characteristic) =
            self.link.as_ref().ok_or(TransportError::Disconnected)?;
        tracing::trace!(bytes = data.len(), data = %hex(data), "BLE write");
        self.runtime.block_on(async {
            for chunk in data.chunks(self.chunk_size) {
                peripheral
                    .write(characteristic, chunk, WriteType::WithoutResponse)
                    .await
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
                tokio::time::sleep(CHUNK_WRITE_DELAY).await;
            }
            Ok(())
        })
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.link.is_none() {
            return Err(TransportError::Disconnected);
        }
        let mut queue = self.queue.lock().expect("notification queue poisoned");
        Ok(queue.drain(..).collect())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        if let Some((peripheral, _)) = self.link.take() {
            if let Err(e) = self.runtime.block_on(peripheral.disconnect()) {
                tracing::warn!(error = %e, "BLE disconnect failed; handle dropped anyway");
            } else {
                tracing::debug!("BLE disconnected");
            }
        }
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// One device observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// MAC address (or peripheral UUID on macOS); feed this back as the
    /// BLE connection address.
    pub address: String,
    pub name: String,
    /// Signal strength at discovery time, if the adapter reported one.
    pub rssi: Option<i16>,
}

/// What a discovery scan should yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryFilter {
    /// Only devices matching the NIIMBOT service or name signature.
    #[default]
    KnownPrinters,
    /// Every advertising device in range.
    All,
}

fn matches_known_printer(name: &str, services: &[Uuid]) -> bool {
    if services.contains(&NIIMBOT_SERVICE_UUID) {
        return true;
    }
    let upper = name.to_uppercase();
    NAME_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

/// BLE scanner; one scan per instance.
pub struct BleScanner {
    runtime: Runtime,
    adapter: Adapter,
}

impl BleScanner {
    pub fn new() -> Result<Self, TransportError> {
        let runtime =
            Runtime::new().map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let adapter = runtime.block_on(first_adapter())?;
        Ok(Self { runtime, adapter })
    }

    /// Start scanning and stream devices as they are observed.
    ///
    /// The returned session yields devices until `timeout` elapses and is
    /// not restartable; create a new scanner to scan again.
    pub fn scan(
        self,
        timeout: Duration,
        filter: DiscoveryFilter,
    ) -> Result<DiscoverySession, TransportError> {
        tracing::info!(?timeout, ?filter, "starting BLE scan");
        let (tx, rx) = mpsc::channel();
        let adapter = self.adapter.clone();
        let task = self.runtime.block_on(async {
            adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            let events = adapter
                .events()
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            Ok::<_, TransportError>(tokio::spawn(discovery_loop(
                adapter.clone(),
                events,
                tx,
                filter,
            )))
        })?;
        Ok(DiscoverySession {
            runtime: self.runtime,
            adapter: self.adapter,
            rx,
            deadline: Instant::now() + timeout,
            task: Some(task),
        })
    }
}

async fn discovery_loop(
    adapter: Adapter,
    mut events: futures::stream::BoxStream<'static, CentralEvent>,
    tx: mpsc::Sender<DiscoveredDevice>,
    filter: DiscoveryFilter,
) {
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(event) = events.next().await {
        let CentralEvent::DeviceDiscovered(id) = event else {
            continue;
        };
        let Ok(peripheral) = adapter.peripheral(&id).await else {
            continue;
        };
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        let device = DiscoveredDevice {
            address: id.to_string(),
            name: props.local_name.unwrap_or_default(),
            rssi: props.rssi,
        };
        if !seen.insert(device.address.clone()) {
            continue;
        }
        if filter == DiscoveryFilter::KnownPrinters
            && !matches_known_printer(&device.name, &props.services)
        {
            continue;
        }
        tracing::debug!(address = %device.address, name = %device.name, "device discovered");
        if tx.send(device).is_err() {
            break; // session dropped
        }
    }
}

/// A running discovery scan; iterate to receive devices as observed.
pub struct DiscoverySession {
    runtime: Runtime,
    adapter: Adapter,
    rx: mpsc::Receiver<DiscoveredDevice>,
    deadline: Instant,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl DiscoverySession {
    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = self.runtime.block_on(self.adapter.stop_scan());
            tracing::debug!("BLE scan stopped");
        }
    }
}

impl Iterator for DiscoverySession {
    type Item = DiscoveredDevice;

    fn next(&mut self) -> Option<DiscoveredDevice> {
        loop {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.stop();
                return None;
            }
            match self.rx.recv_timeout(remaining.min(Duration::from_millis(100))) {
                Ok(device) => return Some(device),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.stop();
                    return None;
                }
            }
        }
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_printer_signature_matches_service_uuid() {
        assert!(matches_known_printer("whatever", &[NIIMBOT_SERVICE_UUID]));
        assert!(!matches_known_printer("AirTag", &[Uuid::from_u128(0x1234)]));
    }

    #[test]
    fn known_printer_signature_matches_name_keywords() {
        assert!(matches_known_printer("NIIMBOT D110", &[]));
        assert!(matches_known_printer("b21-ABC123", &[]));
        assert!(!matches_known_printer("Living Room TV", &[]));
    }

    #[test]
    fn uuid_constants_match_the_gatt_contract() {
        assert_eq!(
            NIIMBOT_SERVICE_UUID.to_string(),
            "e7810a71-73ae-499d-8c15-faa9aef0c3f2"
        );
        assert_eq!(
            NIIMBOT_CHARACTERISTIC_UUID.to_string(),
            "bef8d6c9-9c21-4c9e-b632-bd58c1009f9f"
        );
    }
}

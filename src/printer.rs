//! Print session state machine and device queries.
//!
//! A session owns one connected transport for the duration of one print
//! job. Control packets are acknowledged individually; row packets are
//! streamed in batches without per-row acks, with a NAK check after each
//! batch. Any failure closes the transport and parks the session in
//! [`SessionState::Failed`]; sessions are not reusable after that.

use std::time::{Duration, Instant};

use image::GrayImage;
use thiserror::Error;

use crate::model::PrintJob;
use crate::packet::{FrameError, Packet, PacketDecoder, code};
use crate::raster::{self, ImageError};
use crate::transport::{ConnectionSpec, Transport, TransportError, open_transport};

/// Poll interval while waiting for a reply.
const REPLY_POLL: Duration = Duration::from_millis(20);

/// Pause after END_PAGE_PRINT before polling for print completion; the
/// head is still feeding paper and answers END_PRINT with zero until done.
const FEED_SETTLE: Duration = Duration::from_millis(300);

/// Pause between END_PRINT completion polls.
const END_PRINT_POLL: Duration = Duration::from_millis(100);

/// Reply code offset for requests acknowledged at `request + 16`.
const ACK_OFFSET_WIDE: u8 = 16;

/// Default reply code offset (`request + 1`).
const ACK_OFFSET: u8 = 1;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport released; nothing can be sent.
    Disconnected,
    /// Transport open, no job parameters sent yet.
    Connected,
    /// Density and label type acknowledged.
    Configured,
    /// Page brackets sent, rows streaming.
    Printing,
    /// Rows done, waiting for the head to finish.
    Finalizing,
    /// Job completed and transport released.
    Closed,
    /// Something went wrong; transport released, see [`PrintSession::failure`].
    Failed,
}

/// Coarse job phase, attached to errors and the failure record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Configure,
    Print,
    Finalize,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Configure => "configure",
            Self::Print => "print",
            Self::Finalize => "finalize",
        })
    }
}

/// Errors raised by a print session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The printer did not answer a control packet in time.
    #[error("no reply to request {request:#04x} within {timeout:?} during {phase}")]
    Timeout {
        request: u8,
        phase: Phase,
        timeout: Duration,
    },
    /// The printer answered with a NAK or NOT_SUPPORTED code.
    #[error("request {request:#04x} answered with unexpected code {reply:#04x}")]
    UnexpectedReply { request: u8, reply: u8 },
    /// A row batch was rejected twice; the label is likely misprinted.
    #[error("printer rejected a row batch twice")]
    BatchNack,
    /// The operation is not valid in the session's current state.
    #[error("operation not valid in session state {state:?}")]
    InvalidState { state: SessionState },
    /// A reply arrived but its payload does not parse.
    #[error("malformed reply to request {request:#04x}")]
    MalformedReply { request: u8 },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Device properties readable through `GET_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InfoKey {
    Density = 1,
    PrintSpeed = 2,
    LabelType = 3,
    LanguageType = 6,
    AutoShutdownTime = 7,
    DeviceType = 8,
    SoftwareVersion = 9,
    Battery = 10,
    DeviceSerial = 11,
    HardwareVersion = 12,
}

/// A decoded `GET_INFO` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    /// Plain numeric property (density, battery level, ...).
    Number(u64),
    /// Firmware or hardware version, e.g. "5.23".
    Version(String),
    /// Device serial as lowercase hex.
    Serial(String),
}

impl std::fmt::Display for InfoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Version(v) | Self::Serial(v) => f.write_str(v),
        }
    }
}

/// Decoded heartbeat reply.
///
/// Firmware generations answer with different payload lengths and carry
/// different subsets of the fields, hence the options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeat {
    pub closing_state: Option<u8>,
    pub power_level: Option<u8>,
    pub paper_state: Option<u8>,
    pub rfid_read_state: Option<u8>,
}

/// Decoded `GET_PRINT_STATUS` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintStatus {
    /// Page currently being printed.
    pub page: u16,
    pub progress1: u8,
    pub progress2: u8,
}

/// RFID tag data of the loaded label roll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfidTag {
    pub uuid: String,
    pub barcode: String,
    pub serial: String,
    pub total_len: u16,
    pub used_len: u16,
    pub tag_type: u8,
}

/// One print job over one transport.
pub struct PrintSession<T: Transport> {
    transport: Option<T>,
    decoder: PacketDecoder,
    job: PrintJob,
    state: SessionState,
    phase: Phase,
    failure: Option<(Phase, String)>,
}

impl PrintSession<Box<dyn Transport>> {
    /// Open the transport described by `spec` and attach a session to it.
    pub fn connect(spec: &ConnectionSpec, job: PrintJob) -> Result<Self, SessionError> {
        let transport = open_transport(spec)?;
        tracing::info!(kind = %transport.kind(), model = %job.model, "session connected");
        Ok(Self::attach(transport, job))
    }
}

impl<T: Transport> PrintSession<T> {
    /// Attach a session to an already connected transport.
    pub fn attach(transport: T, job: PrintJob) -> Self {
        Self {
            transport: Some(transport),
            decoder: PacketDecoder::new(),
            job,
            state: SessionState::Connected,
            phase: Phase::Connect,
            failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Phase and message of the failure that parked the session, if any.
    pub fn failure(&self) -> Option<(Phase, &str)> {
        self.failure.as_ref().map(|(p, m)| (*p, m.as_str()))
    }

    /// Print one label.
    ///
    /// Consumes the session's one job: on success the session ends up
    /// [`SessionState::Closed`], on any error [`SessionState::Failed`],
    /// with the transport released either way.
    pub fn print(&mut self, image: &GrayImage) -> Result<(), SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::InvalidState { state: self.state });
        }
        match self.run_job(image) {
            Ok(()) => {
                self.state = SessionState::Closed;
                self.release_transport();
                tracing::info!("print job completed");
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn run_job(&mut self, image: &GrayImage) -> Result<(), SessionError> {
        raster::validate_width(image, self.job.rotation, self.job.model)?;
        let bitmap = raster::apply_rotation(image, self.job.rotation);

        self.phase = Phase::Configure;
        self.transceive(code::SET_LABEL_DENSITY, &[self.job.density], ACK_OFFSET_WIDE)?;
        self.transceive(code::SET_LABEL_TYPE, &[self.job.label_type], ACK_OFFSET_WIDE)?;
        self.state = SessionState::Configured;
        tracing::debug!(
            density = self.job.density,
            label_type = self.job.label_type,
            "printer configured"
        );

        self.phase = Phase::Print;
        self.transceive(code::START_PRINT, &[1], ACK_OFFSET)?;
        self.transceive(code::START_PAGE_PRINT, &[1], ACK_OFFSET)?;
        let mut dimension = Vec::with_capacity(4);
        dimension.extend_from_slice(&(bitmap.height() as u16).to_be_bytes());
        dimension.extend_from_slice(&(bitmap.width() as u16).to_be_bytes());
        self.transceive(code::SET_DIMENSION, &dimension, ACK_OFFSET)?;
        self.state = SessionState::Printing;
        self.send_rows(&bitmap)?;

        self.phase = Phase::Finalize;
        self.state = SessionState::Finalizing;
        self.transceive(code::END_PAGE_PRINT, &[1], ACK_OFFSET)?;
        std::thread::sleep(FEED_SETTLE);
        self.wait_print_done()
    }

    /// Stream row packets in batches of `batch_size` per transport write.
    fn send_rows(&mut self, bitmap: &GrayImage) -> Result<(), SessionError> {
        let batch_size = self.job.batch_size;
        let checksums = self.job.row_checksums;
        let mut batch = Vec::new();
        let mut batched = 0usize;
        let mut rows = 0usize;
        for packet in raster::encode_rows(bitmap, self.job.model, self.job.blank_row_shortcut)? {
            batch.extend(packet.encode(checksums)?);
            batched += 1;
            rows += 1;
            if batched == batch_size {
                self.flush_batch(&batch)?;
                batch.clear();
                batched = 0;
            }
        }
        if !batch.is_empty() {
            self.flush_batch(&batch)?;
        }
        tracing::debug!(rows, "all rows sent");
        Ok(())
    }

    /// Write one batch and check for a NAK; a rejected batch is resent
    /// once, a second rejection fails the job.
    fn flush_batch(&mut self, batch: &[u8]) -> Result<(), SessionError> {
        self.write(batch)?;
        if !self.drain_for_nak()? {
            return Ok(());
        }
        tracing::warn!(bytes = batch.len(), "row batch rejected, retrying once");
        self.write(batch)?;
        if self.drain_for_nak()? {
            return Err(SessionError::BatchNack);
        }
        Ok(())
    }

    /// Non-blocking check whether the printer NAKed the rows sent so far.
    fn drain_for_nak(&mut self) -> Result<bool, SessionError> {
        let bytes = self.read_available()?;
        self.decoder.feed(&bytes);
        let mut nacked = false;
        loop {
            match self.decoder.next_packet() {
                Ok(Some(packet)) if packet.type_code == code::NAK => nacked = true,
                Ok(Some(packet)) => {
                    tracing::debug!(code = packet.type_code, "ignoring packet between batches");
                }
                Ok(None) => return Ok(nacked),
                Err(e) => tracing::warn!(error = %e, "dropping corrupt frame"),
            }
        }
    }

    /// Poll END_PRINT until the firmware reports the job done.
    fn wait_print_done(&mut self) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.job.reply_timeout;
        loop {
            let reply = self.transceive(code::END_PRINT, &[1], ACK_OFFSET)?;
            if reply.payload.first().copied().unwrap_or(0) != 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    request: code::END_PRINT,
                    phase: self.phase,
                    timeout: self.job.reply_timeout,
                });
            }
            std::thread::sleep(END_PRINT_POLL);
        }
    }

    /// Abort an in-flight job: best-effort END_PRINT, then release the
    /// transport and park the session in [`SessionState::Failed`].
    pub fn cancel(&mut self) {
        if matches!(self.state, SessionState::Closed | SessionState::Failed) {
            return;
        }
        if matches!(self.state, SessionState::Printing | SessionState::Finalizing) {
            if let Err(e) = self.transceive(code::END_PRINT, &[1], ACK_OFFSET) {
                tracing::warn!(error = %e, "END_PRINT not acknowledged during cancel");
            }
        }
        tracing::info!(phase = %self.phase, "session cancelled");
        self.failure = Some((self.phase, "cancelled".to_string()));
        self.release_transport();
        self.state = SessionState::Failed;
    }

    /// Read one device property.
    pub fn get_info(&mut self, key: InfoKey) -> Result<InfoValue, SessionError> {
        self.ensure_idle()?;
        let reply = self.transceive(code::GET_INFO, &[key as u8], key as u8)?;
        Ok(parse_info(key, &reply.payload))
    }

    /// Query printer health and consumable state.
    pub fn heartbeat(&mut self) -> Result<Heartbeat, SessionError> {
        self.ensure_idle()?;
        let reply = self.transceive(code::HEARTBEAT, &[1], ACK_OFFSET)?;
        Ok(parse_heartbeat(&reply.payload))
    }

    /// Read the RFID tag of the loaded label roll, if it carries one.
    pub fn get_rfid(&mut self) -> Result<Option<RfidTag>, SessionError> {
        self.ensure_idle()?;
        let reply = self.transceive(code::GET_RFID, &[1], ACK_OFFSET)?;
        parse_rfid(&reply.payload).ok_or(SessionError::MalformedReply {
            request: code::GET_RFID,
        })
    }

    /// Query page number and progress of the job being printed.
    pub fn get_print_status(&mut self) -> Result<PrintStatus, SessionError> {
        let reply = self.transceive(code::GET_PRINT_STATUS, &[1], ACK_OFFSET_WIDE)?;
        let [p0, p1, progress1, progress2, ..] = reply.payload[..] else {
            return Err(SessionError::MalformedReply {
                request: code::GET_PRINT_STATUS,
            });
        };
        Ok(PrintStatus {
            page: u16::from_be_bytes([p0, p1]),
            progress1,
            progress2,
        })
    }

    /// Set how many copies the next page prints.
    pub fn set_quantity(&mut self, quantity: u16) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.transceive(code::SET_QUANTITY, &quantity.to_be_bytes(), ACK_OFFSET)?;
        Ok(())
    }

    /// Clear a pending print lock; some firmware wants this before a job.
    pub fn allow_print_clear(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.transceive(code::ALLOW_PRINT_CLEAR, &[1], ACK_OFFSET_WIDE)?;
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Connected | SessionState::Configured => Ok(()),
            state => Err(SessionError::InvalidState { state }),
        }
    }

    /// Send a control packet and wait for its acknowledgement.
    ///
    /// Replies land on a shared byte stream, so unrelated packets (late
    /// heartbeats for example) are skipped and corrupt frames dropped with
    /// a warning until the expected code arrives or the timeout elapses.
    fn transceive(
        &mut self,
        request: u8,
        payload: &[u8],
        reply_offset: u8,
    ) -> Result<Packet, SessionError> {
        let expected = request.wrapping_add(reply_offset);
        let frame = Packet::new(request, payload).encode(true)?;
        self.write(&frame)?;
        let deadline = Instant::now() + self.job.reply_timeout;
        loop {
            let bytes = self.read_available()?;
            self.decoder.feed(&bytes);
            loop {
                match self.decoder.next_packet() {
                    Ok(Some(packet)) if packet.type_code == expected => return Ok(packet),
                    Ok(Some(packet))
                        if packet.type_code == code::NAK
                            || packet.type_code == code::NOT_SUPPORTED =>
                    {
                        return Err(SessionError::UnexpectedReply {
                            request,
                            reply: packet.type_code,
                        });
                    }
                    Ok(Some(packet)) => {
                        tracing::debug!(
                            code = packet.type_code,
                            expected,
                            "skipping unrelated packet"
                        );
                    }
                    Ok(None) => break,
                    Err(e) => tracing::warn!(error = %e, "dropping corrupt frame"),
                }
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    request,
                    phase: self.phase,
                    timeout: self.job.reply_timeout,
                });
            }
            std::thread::sleep(REPLY_POLL);
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Disconnected)?;
        Ok(transport.write(data)?)
    }

    fn read_available(&mut self) -> Result<Vec<u8>, SessionError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Disconnected)?;
        Ok(transport.read_available()?)
    }

    fn fail(&mut self, err: &SessionError) {
        tracing::error!(phase = %self.phase, error = %err, "print session failed");
        self.failure = Some((self.phase, err.to_string()));
        self.release_transport();
        self.state = SessionState::Failed;
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                tracing::warn!(error = %e, "transport close failed");
            }
        }
    }
}

impl<T: Transport> Drop for PrintSession<T> {
    fn drop(&mut self) {
        self.release_transport();
    }
}

fn parse_info(key: InfoKey, payload: &[u8]) -> InfoValue {
    match key {
        InfoKey::DeviceSerial => {
            let hex: String = payload.iter().map(|b| format!("{b:02x}")).collect();
            InfoValue::Serial(hex)
        }
        InfoKey::SoftwareVersion | InfoKey::HardwareVersion => {
            let raw = be_number(payload);
            InfoValue::Version(format!("{}.{:02}", raw / 100, raw % 100))
        }
        _ => InfoValue::Number(be_number(payload)),
    }
}

/// Big-endian integer from a variable-length payload.
fn be_number(payload: &[u8]) -> u64 {
    payload.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Field positions vary with the firmware's payload length.
fn parse_heartbeat(payload: &[u8]) -> Heartbeat {
    let mut hb = Heartbeat::default();
    match payload.len() {
        20 => {
            hb.paper_state = Some(payload[18]);
            hb.rfid_read_state = Some(payload[19]);
        }
        13 => {
            hb.closing_state = Some(payload[9]);
            hb.power_level = Some(payload[10]);
            hb.paper_state = Some(payload[11]);
            hb.rfid_read_state = Some(payload[12]);
        }
        19 => {
            hb.closing_state = Some(payload[15]);
            hb.power_level = Some(payload[16]);
            hb.paper_state = Some(payload[17]);
            hb.rfid_read_state = Some(payload[18]);
        }
        10 => {
            hb.closing_state = Some(payload[8]);
            hb.power_level = Some(payload[9]);
            hb.rfid_read_state = Some(payload[8]);
        }
        9 => {
            hb.closing_state = Some(payload[8]);
        }
        other => {
            tracing::warn!(len = other, "unrecognized heartbeat layout");
        }
    }
    hb
}

/// Tag layout: 8-byte uuid, length-prefixed barcode and serial strings,
/// then total length, used length and tag type. First byte zero means no
/// tag is loaded. `None` on a truncated payload.
fn parse_rfid(payload: &[u8]) -> Option<Option<RfidTag>> {
    if *payload.first()? == 0 {
        return Some(None);
    }
    let uuid: String = payload.get(..8)?.iter().map(|b| format!("{b:02x}")).collect();
    let mut idx = 8;

    let barcode_len = *payload.get(idx)? as usize;
    idx += 1;
    let barcode = String::from_utf8_lossy(payload.get(idx..idx + barcode_len)?).into_owned();
    idx += barcode_len;

    let serial_len = *payload.get(idx)? as usize;
    idx += 1;
    let serial = String::from_utf8_lossy(payload.get(idx..idx + serial_len)?).into_owned();
    idx += serial_len;

    let tail = payload.get(idx..idx + 5)?;
    Some(Some(RfidTag {
        uuid,
        barcode,
        serial,
        total_len: u16::from_be_bytes([tail[0], tail[1]]),
        used_len: u16::from_be_bytes([tail[2], tail[3]]),
        tag_type: tail[4],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrinterModel;
    use crate::transport::TransportKind;
    use pretty_assertions::assert_eq;

    /// Transport that accepts writes and never answers.
    struct SilentTransport;

    impl Transport for SilentTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Serial
        }

        fn write(&mut self, _data: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
            Ok(Vec::new())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn quick_job() -> PrintJob {
        PrintJob::new(PrinterModel::B21).reply_timeout(Duration::from_millis(30))
    }

    #[test]
    fn silence_times_out_and_fails_the_session() {
        let mut session = PrintSession::attach(SilentTransport, quick_job());
        let img = GrayImage::from_pixel(8, 2, image::Luma([0]));
        let err = session.print(&img).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Timeout {
                request: code::SET_LABEL_DENSITY,
                phase: Phase::Configure,
                ..
            }
        ));
        assert_eq!(session.state(), SessionState::Failed);
        let (phase, message) = session.failure().unwrap();
        assert_eq!(phase, Phase::Configure);
        assert!(message.contains("no reply"));
    }

    #[test]
    fn print_is_rejected_after_failure() {
        let mut session = PrintSession::attach(SilentTransport, quick_job());
        let img = GrayImage::from_pixel(8, 2, image::Luma([0]));
        let _ = session.print(&img);
        assert!(matches!(
            session.print(&img),
            Err(SessionError::InvalidState {
                state: SessionState::Failed
            })
        ));
        assert!(matches!(
            session.heartbeat(),
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[test]
    fn too_wide_image_fails_before_any_traffic() {
        let mut session = PrintSession::attach(SilentTransport, quick_job());
        let img = GrayImage::from_pixel(500, 2, image::Luma([0]));
        assert!(matches!(
            session.print(&img).unwrap_err(),
            SessionError::Image(ImageError::TooWide { width: 500, .. })
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.failure().unwrap().0, Phase::Connect);
    }

    #[test]
    fn cancel_parks_the_session() {
        let mut session = PrintSession::attach(SilentTransport, quick_job());
        session.cancel();
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.failure().unwrap().1, "cancelled");
        // idempotent
        session.cancel();
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn info_values_parse_per_key() {
        assert_eq!(parse_info(InfoKey::Battery, &[4]), InfoValue::Number(4));
        assert_eq!(
            parse_info(InfoKey::SoftwareVersion, &[0x02, 0x0B]),
            InfoValue::Version("5.23".into())
        );
        assert_eq!(
            parse_info(InfoKey::DeviceSerial, &[0xDE, 0xAD, 0x01]),
            InfoValue::Serial("dead01".into())
        );
    }

    #[test]
    fn heartbeat_layouts() {
        let mut long = vec![0u8; 13];
        long[9] = 1;
        long[10] = 80;
        long[11] = 2;
        long[12] = 3;
        assert_eq!(
            parse_heartbeat(&long),
            Heartbeat {
                closing_state: Some(1),
                power_level: Some(80),
                paper_state: Some(2),
                rfid_read_state: Some(3),
            }
        );

        let mut short = vec![0u8; 9];
        short[8] = 7;
        assert_eq!(
            parse_heartbeat(&short),
            Heartbeat {
                closing_state: Some(7),
                ..Heartbeat::default()
            }
        );

        assert_eq!(parse_heartbeat(&[0u8; 5]), Heartbeat::default());
    }

    #[test]
    fn rfid_reply_parses() {
        // no tag loaded
        assert_eq!(parse_rfid(&[0]), Some(None));

        let mut payload = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        payload.push(2);
        payload.extend_from_slice(b"AB");
        payload.push(3);
        payload.extend_from_slice(b"xyz");
        payload.extend_from_slice(&[0x01, 0x2C]); // total 300
        payload.extend_from_slice(&[0x00, 0x2A]); // used 42
        payload.push(1);
        let tag = parse_rfid(&payload).unwrap().unwrap();
        assert_eq!(tag.uuid, "1122334455667788");
        assert_eq!(tag.barcode, "AB");
        assert_eq!(tag.serial, "xyz");
        assert_eq!(tag.total_len, 300);
        assert_eq!(tag.used_len, 42);
        assert_eq!(tag.tag_type, 1);

        // truncated tail
        payload.pop();
        payload.pop();
        assert_eq!(parse_rfid(&payload), None);
    }
}

//! Vendor frame codec.
//!
//! Every protocol message travels as one frame:
//! `0x55 0x55 | type | len | payload | checksum | 0xAA 0xAA`
//! where `checksum = type ^ len ^ XOR(payload)`. The length is a single
//! byte, so payloads above 255 bytes cannot be framed and must be split
//! into multiple packets by the caller.

use thiserror::Error;

/// Frame header magic.
pub const HEADER: [u8; 2] = [0x55, 0x55];

/// Frame footer magic.
pub const FOOTER: [u8; 2] = [0xAA, 0xAA];

/// Largest payload that fits the single length byte.
pub const MAX_PAYLOAD: usize = 255;

/// Header + type + len + checksum + footer.
const FRAME_OVERHEAD: usize = 7;

/// Request/response type codes of the vendor protocol.
///
/// Captured from device traffic; identical across all supported models.
pub mod code {
    pub const START_PRINT: u8 = 0x01;
    pub const START_PAGE_PRINT: u8 = 0x03;
    pub const SET_DIMENSION: u8 = 0x13;
    pub const SET_QUANTITY: u8 = 0x15;
    pub const GET_RFID: u8 = 0x1A;
    pub const ALLOW_PRINT_CLEAR: u8 = 0x20;
    pub const SET_LABEL_DENSITY: u8 = 0x21;
    pub const SET_LABEL_TYPE: u8 = 0x23;
    pub const GET_INFO: u8 = 0x40;
    pub const PRINT_EMPTY_ROW: u8 = 0x84;
    pub const PRINT_BITMAP_ROW: u8 = 0x85;
    pub const GET_PRINT_STATUS: u8 = 0xA3;
    pub const HEARTBEAT: u8 = 0xDC;
    pub const END_PAGE_PRINT: u8 = 0xE3;
    pub const END_PRINT: u8 = 0xF3;

    /// Reply type the firmware sends when it rejects a request.
    pub const NAK: u8 = 0xDB;
    /// Reply type for requests the firmware does not implement.
    pub const NOT_SUPPORTED: u8 = 0x00;
}

/// Errors raised while framing or reassembling packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes for a complete frame; the caller must buffer more.
    #[error("incomplete frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    /// Header or footer magic did not match.
    #[error("bad frame magic")]
    BadMagic,
    /// The frame's checksum byte does not match the computed value.
    #[error("checksum mismatch: computed {computed:#04x}, frame carries {received:#04x}")]
    ChecksumMismatch { computed: u8, received: u8 },
    /// The payload cannot be framed; split it before encoding.
    #[error("payload of {len} bytes exceeds the {MAX_PAYLOAD}-byte frame limit")]
    PayloadTooLong { len: usize },
}

/// XOR checksum over the type code, length byte and payload.
pub fn checksum(type_code: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(type_code ^ payload.len() as u8, |acc, &b| acc ^ b)
}

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub type_code: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(type_code: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_code,
            payload: payload.into(),
        }
    }

    /// Serialize the packet into a wire frame.
    ///
    /// With `checksum_enabled` false the checksum byte is written as zero,
    /// which some firmware accepts on image-data packets.
    pub fn encode(&self, checksum_enabled: bool) -> Result<Vec<u8>, FrameError> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong { len });
        }
        let mut out = Vec::with_capacity(len + FRAME_OVERHEAD);
        out.extend_from_slice(&HEADER);
        out.push(self.type_code);
        out.push(len as u8);
        out.extend_from_slice(&self.payload);
        out.push(if checksum_enabled {
            checksum(self.type_code, &self.payload)
        } else {
            0
        });
        out.extend_from_slice(&FOOTER);
        Ok(out)
    }

    /// Decode exactly one frame from `bytes`, validating the checksum.
    ///
    /// For byte streams that may deliver partial or concatenated frames use
    /// [`PacketDecoder`] instead.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::Truncated {
                needed: FRAME_OVERHEAD,
                available: bytes.len(),
            });
        }
        if bytes[..2] != HEADER {
            return Err(FrameError::BadMagic);
        }
        let total = bytes[3] as usize + FRAME_OVERHEAD;
        if bytes.len() < total {
            return Err(FrameError::Truncated {
                needed: total,
                available: bytes.len(),
            });
        }
        if bytes[total - 2..total] != FOOTER {
            return Err(FrameError::BadMagic);
        }
        let type_code = bytes[2];
        let payload = bytes[4..total - 3].to_vec();
        let received = bytes[total - 3];
        let computed = checksum(type_code, &payload);
        if computed != received {
            return Err(FrameError::ChecksumMismatch { computed, received });
        }
        Ok(Self { type_code, payload })
    }
}

/// Resumable frame decoder.
///
/// Transports are not frame-aligned (BLE notifications in particular cap at
/// 20-244 bytes), so the decoder keeps undecoded bytes across calls. Feed
/// whatever arrived, then pull packets until [`next_packet`] returns
/// `Ok(None)`.
///
/// [`next_packet`]: PacketDecoder::next_packet
#[derive(Debug, Default)]
pub struct PacketDecoder {
    buf: Vec<u8>,
    verify_checksum: bool,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            verify_checksum: true,
        }
    }

    /// Disable or re-enable checksum validation on decoded frames.
    pub fn verify_checksum(mut self, enabled: bool) -> Self {
        self.verify_checksum = enabled;
        self
    }

    /// Append raw transport bytes to the reassembly buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Try to decode the next complete frame from the buffer.
    ///
    /// `Ok(None)` means more bytes are needed. `BadMagic` discards the bad
    /// prefix and rescans to the next header magic, so a later call can
    /// recover; `ChecksumMismatch` drops only the offending frame. Both are
    /// reported once per occurrence, never silently skipped.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, FrameError> {
        if !self.buf.is_empty() && self.buf[0] != HEADER[0] {
            self.resync(0);
            return Err(FrameError::BadMagic);
        }
        if self.buf.len() >= 2 && self.buf[1] != HEADER[1] {
            self.resync(1);
            return Err(FrameError::BadMagic);
        }
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let total = self.buf[3] as usize + FRAME_OVERHEAD;
        if self.buf.len() < total {
            return Ok(None);
        }
        if self.buf[total - 2..total] != FOOTER {
            // Header looked fine but the frame does not end where the
            // length byte claims; skip past the header and rescan.
            self.resync(2);
            return Err(FrameError::BadMagic);
        }
        let type_code = self.buf[2];
        let payload = self.buf[4..total - 3].to_vec();
        let received = self.buf[total - 3];
        self.buf.drain(..total);
        if self.verify_checksum {
            let computed = checksum(type_code, &payload);
            if computed != received {
                return Err(FrameError::ChecksumMismatch { computed, received });
            }
        }
        Ok(Some(Packet { type_code, payload }))
    }

    /// Drop bytes up to the next plausible header magic.
    ///
    /// A trailing lone `0x55` is kept since its partner byte may still be
    /// in flight.
    fn resync(&mut self, from: usize) {
        let next = (from..self.buf.len()).find(|&i| {
            self.buf[i] == HEADER[0] && (i + 1 == self.buf.len() || self.buf[i + 1] == HEADER[1])
        });
        match next {
            Some(i) => {
                self.buf.drain(..i);
            }
            None => self.buf.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Packet {
        Packet::new(code::SET_LABEL_DENSITY, vec![0x03])
    }

    #[test]
    fn round_trip() {
        let pkt = sample();
        let wire = pkt.encode(true).unwrap();
        assert_eq!(Packet::decode(&wire).unwrap(), pkt);
    }

    #[test]
    fn round_trip_empty_payload() {
        let pkt = Packet::new(0x42, Vec::new());
        let wire = pkt.encode(true).unwrap();
        assert_eq!(wire.len(), 7);
        assert_eq!(Packet::decode(&wire).unwrap(), pkt);
    }

    #[test]
    fn checksum_disabled_writes_zero_byte() {
        let wire = sample().encode(false).unwrap();
        assert_eq!(wire[wire.len() - 3], 0);
        assert_eq!(
            Packet::decode(&wire),
            Err(FrameError::ChecksumMismatch {
                computed: checksum(code::SET_LABEL_DENSITY, &[0x03]),
                received: 0,
            })
        );
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let pkt = Packet::new(0x85, vec![0u8; 256]);
        assert_eq!(
            pkt.encode(true),
            Err(FrameError::PayloadTooLong { len: 256 })
        );
    }

    #[test]
    fn max_payload_encodes() {
        let pkt = Packet::new(0x85, vec![0xAB; 255]);
        let wire = pkt.encode(true).unwrap();
        assert_eq!(Packet::decode(&wire).unwrap(), pkt);
    }

    #[test]
    fn decoder_reassembles_at_every_split_point() {
        let pkt = Packet::new(0x85, (0..40).collect::<Vec<u8>>());
        let wire = pkt.encode(true).unwrap();
        for split in 0..=wire.len() {
            let mut dec = PacketDecoder::new();
            dec.feed(&wire[..split]);
            let first = dec.next_packet().unwrap();
            dec.feed(&wire[split..]);
            let second = dec.next_packet().unwrap();
            let decoded = first.or(second)
                .unwrap_or_else(|| panic!("no packet for split at {split}"));
            assert_eq!(decoded, pkt);
            assert_eq!(dec.next_packet().unwrap(), None);
        }
    }

    #[test]
    fn decoder_reassembles_ble_sized_fragments() {
        // 244-byte frame delivered as 100/100/44-byte notifications.
        let pkt = Packet::new(0x85, vec![0x5A; 237]);
        let wire = pkt.encode(true).unwrap();
        assert_eq!(wire.len(), 244);

        let mut dec = PacketDecoder::new();
        dec.feed(&wire[..100]);
        assert_eq!(dec.next_packet().unwrap(), None);
        dec.feed(&wire[100..200]);
        assert_eq!(dec.next_packet().unwrap(), None);
        dec.feed(&wire[200..]);
        assert_eq!(dec.next_packet().unwrap(), Some(pkt));
    }

    #[test]
    fn decoder_handles_concatenated_frames() {
        let a = Packet::new(0x02, vec![1]);
        let b = Packet::new(0x04, vec![2, 3]);
        let mut wire = a.encode(true).unwrap();
        wire.extend(b.encode(true).unwrap());

        let mut dec = PacketDecoder::new();
        dec.feed(&wire);
        assert_eq!(dec.next_packet().unwrap(), Some(a));
        assert_eq!(dec.next_packet().unwrap(), Some(b));
        assert_eq!(dec.next_packet().unwrap(), None);
    }

    #[test]
    fn corrupting_any_byte_never_yields_a_false_positive() {
        let pkt = Packet::new(0x85, (0..20).collect::<Vec<u8>>());
        let wire = pkt.encode(true).unwrap();
        for i in 0..wire.len() {
            let mut bad = wire.clone();
            bad[i] ^= 0x01;
            let mut dec = PacketDecoder::new();
            dec.feed(&bad);
            match dec.next_packet() {
                Ok(Some(decoded)) => panic!("byte {i} corruption decoded as {decoded:?}"),
                // Ok(None) can only happen when the length byte was bumped
                // and the decoder is still waiting for phantom bytes.
                Ok(None) | Err(_) => {}
            }
        }
    }

    #[test]
    fn payload_corruption_is_a_checksum_mismatch() {
        let pkt = sample();
        let mut wire = pkt.encode(true).unwrap();
        wire[4] ^= 0xFF;
        assert!(matches!(
            Packet::decode(&wire),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn decoder_resynchronizes_after_garbage() {
        let pkt = sample();
        let mut wire = vec![0x00, 0x13, 0x37];
        wire.extend(pkt.encode(true).unwrap());

        let mut dec = PacketDecoder::new();
        dec.feed(&wire);
        assert_eq!(dec.next_packet(), Err(FrameError::BadMagic));
        assert_eq!(dec.next_packet().unwrap(), Some(pkt));
    }

    #[test]
    fn decoder_keeps_trailing_half_header_during_resync() {
        let pkt = sample();
        let mut dec = PacketDecoder::new();
        // Garbage ending in the first header byte, partner still in flight.
        dec.feed(&[0x01, 0x02, 0x55]);
        assert_eq!(dec.next_packet(), Err(FrameError::BadMagic));
        let wire = pkt.encode(true).unwrap();
        dec.feed(&wire[1..]);
        assert_eq!(dec.next_packet().unwrap(), Some(pkt));
    }

    #[test]
    fn checksum_verification_can_be_disabled() {
        let wire = sample().encode(false).unwrap();
        let mut dec = PacketDecoder::new().verify_checksum(false);
        dec.feed(&wire);
        assert_eq!(dec.next_packet().unwrap(), Some(sample()));
    }
}

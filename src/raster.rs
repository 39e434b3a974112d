//! Monochrome bitmap to row packet encoding.
//!
//! The printer consumes a label line by line: each bitmap row becomes one
//! `PRINT_BITMAP_ROW` packet carrying MSB-first packed pixels plus three
//! per-third black-pixel tallies the print head uses for energy
//! compensation. Rows without any black pixel can be shortened to a
//! `PRINT_EMPTY_ROW` packet.

use image::GrayImage;
use thiserror::Error;

use crate::model::{PrinterModel, Rotation};
use crate::packet::{Packet, code};

/// Luma values below this count as a mark (black).
const INK_THRESHOLD: u8 = 128;

/// Errors raised while validating or encoding a bitmap.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// The bitmap is wider than the model's print head.
    #[error("image is {width} px wide but {model} prints at most {max} px")]
    TooWide {
        width: u32,
        max: u32,
        model: PrinterModel,
    },
}

/// Check that the bitmap fits the model's head after rotation.
///
/// Cheap precondition that callers can run before opening any transport;
/// computed from the dimensions alone, no pixels are touched.
pub fn validate_width(
    img: &GrayImage,
    rotation: Rotation,
    model: PrinterModel,
) -> Result<(), ImageError> {
    let width = if rotation.swaps_axes() {
        img.height()
    } else {
        img.width()
    };
    let max = model.max_width_px();
    if width > max {
        return Err(ImageError::TooWide { width, max, model });
    }
    Ok(())
}

/// Rotate the bitmap clockwise before row iteration.
pub fn apply_rotation(img: &GrayImage, rotation: Rotation) -> GrayImage {
    match rotation {
        Rotation::None => img.clone(),
        Rotation::Cw90 => image::imageops::rotate90(img),
        Rotation::Cw180 => image::imageops::rotate180(img),
        Rotation::Cw270 => image::imageops::rotate270(img),
    }
}

/// Lazily encode the bitmap's rows as protocol packets, row 0 first.
///
/// Fails with [`ImageError::TooWide`] before producing anything if the
/// bitmap exceeds the model's maximum width. Rotation must already have
/// been applied; the encoder itself is rotation-agnostic.
pub fn encode_rows(
    img: &GrayImage,
    model: PrinterModel,
    blank_row_shortcut: bool,
) -> Result<RowPackets<'_>, ImageError> {
    let max = model.max_width_px();
    if img.width() > max {
        return Err(ImageError::TooWide {
            width: img.width(),
            max,
            model,
        });
    }
    Ok(RowPackets {
        img,
        row: 0,
        blank_row_shortcut,
    })
}

/// Iterator over encoded row packets. Created by [`encode_rows`].
#[derive(Debug)]
pub struct RowPackets<'a> {
    img: &'a GrayImage,
    row: u32,
    blank_row_shortcut: bool,
}

impl Iterator for RowPackets<'_> {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        if self.row >= self.img.height() {
            return None;
        }
        let y = self.row;
        self.row += 1;
        Some(encode_row(self.img, y, self.blank_row_shortcut))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.img.height() - self.row) as usize;
        (left, Some(left))
    }
}

fn encode_row(img: &GrayImage, y: u32, blank_row_shortcut: bool) -> Packet {
    let bits = pack_row_bits(img, y);
    if blank_row_shortcut && bits.iter().all(|&b| b == 0) {
        // row index, repeat count
        let mut payload = Vec::with_capacity(3);
        payload.extend_from_slice(&(y as u16).to_be_bytes());
        payload.push(1);
        return Packet::new(code::PRINT_EMPTY_ROW, payload);
    }
    // row index, per-third tallies, repeat count, packed pixels
    let mut payload = Vec::with_capacity(6 + bits.len());
    payload.extend_from_slice(&(y as u16).to_be_bytes());
    payload.extend_from_slice(&black_counts(img, y));
    payload.push(1);
    payload.extend_from_slice(&bits);
    Packet::new(code::PRINT_BITMAP_ROW, payload)
}

fn is_mark(img: &GrayImage, x: u32, y: u32) -> bool {
    img.get_pixel(x, y).0[0] < INK_THRESHOLD
}

/// Pack one row into bytes, leftmost pixel in the most significant bit.
fn pack_row_bits(img: &GrayImage, y: u32) -> Vec<u8> {
    let width = img.width();
    let mut out = Vec::with_capacity(width.div_ceil(8) as usize);
    for base in (0..width).step_by(8) {
        let mut byte = 0u8;
        for bit in 0..8 {
            let x = base + bit;
            if x < width && is_mark(img, x, y) {
                byte |= 0x80 >> bit;
            }
        }
        out.push(byte);
    }
    out
}

/// Black-pixel tally per horizontal third of the row.
///
/// The row splits at `width / 3` and `2 * width / 3`, remainder going to
/// the last span. Firmware uses these to budget print-head energy; this
/// side only has to reproduce the documented tally.
fn black_counts(img: &GrayImage, y: u32) -> [u8; 3] {
    let width = img.width();
    let mut counts = [0u8; 3];
    for x in 0..width {
        let third = if x < width / 3 {
            0
        } else if x < 2 * width / 3 {
            1
        } else {
            2
        };
        if is_mark(img, x, y) {
            counts[third] = counts[third].saturating_add(1);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use pretty_assertions::assert_eq;

    fn bitmap(width: u32, height: u32, black: &[(u32, u32)]) -> GrayImage {
        let mut img = GrayImage::from_pixel(width, height, Luma([255]));
        for &(x, y) in black {
            img.put_pixel(x, y, Luma([0]));
        }
        img
    }

    #[test]
    fn too_wide_fails_before_any_packet() {
        let img = bitmap(500, 4, &[]);
        let err = encode_rows(&img, PrinterModel::D11, true).unwrap_err();
        assert_eq!(
            err,
            ImageError::TooWide {
                width: 500,
                max: 96,
                model: PrinterModel::D11,
            }
        );
    }

    #[test]
    fn validate_width_accounts_for_rotation() {
        let img = bitmap(240, 120, &[]);
        // 240 px wide fails on D11 as-is, but fits after a 90° turn.
        assert!(validate_width(&img, Rotation::None, PrinterModel::D11).is_err());
        assert!(validate_width(&img, Rotation::Cw90, PrinterModel::B21).is_ok());
        assert_eq!(
            validate_width(&img, Rotation::Cw90, PrinterModel::D11),
            Err(ImageError::TooWide {
                width: 120,
                max: 96,
                model: PrinterModel::D11,
            })
        );
    }

    #[test]
    fn rows_come_out_in_ascending_order() {
        let img = bitmap(16, 5, &[(0, 0), (3, 2), (15, 4)]);
        let rows: Vec<Packet> = encode_rows(&img, PrinterModel::B21, false)
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 5);
        for (y, pkt) in rows.iter().enumerate() {
            assert_eq!(pkt.type_code, code::PRINT_BITMAP_ROW);
            let row = u16::from_be_bytes([pkt.payload[0], pkt.payload[1]]);
            assert_eq!(row as usize, y);
        }
    }

    #[test]
    fn bitmap_row_payload_layout() {
        // 24 px wide, marks at x = 0 and x = 9.
        let img = bitmap(24, 1, &[(0, 0), (9, 0)]);
        let pkt = encode_rows(&img, PrinterModel::B21, false)
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(pkt.type_code, code::PRINT_BITMAP_ROW);
        // row 0, thirds tally 1/1/0, repeat 1, bits 0x80 0x40 0x00
        assert_eq!(pkt.payload, vec![0, 0, 1, 1, 0, 1, 0x80, 0x40, 0x00]);
    }

    #[test]
    fn packing_is_msb_first_with_ragged_tail() {
        let img = bitmap(10, 1, &[(0, 0), (8, 0)]);
        assert_eq!(pack_row_bits(&img, 0), vec![0x80, 0x80]);
    }

    #[test]
    fn blank_rows_use_the_short_packet_when_enabled() {
        let img = bitmap(8, 2, &[(0, 1)]);
        let rows: Vec<Packet> = encode_rows(&img, PrinterModel::B21, true)
            .unwrap()
            .collect();
        assert_eq!(rows[0].type_code, code::PRINT_EMPTY_ROW);
        assert_eq!(rows[0].payload, vec![0, 0, 1]);
        assert_eq!(rows[1].type_code, code::PRINT_BITMAP_ROW);
    }

    #[test]
    fn blank_shortcut_off_keeps_full_encoding() {
        let img = bitmap(8, 1, &[]);
        let rows: Vec<Packet> = encode_rows(&img, PrinterModel::B21, false)
            .unwrap()
            .collect();
        assert_eq!(rows[0].type_code, code::PRINT_BITMAP_ROW);
        assert_eq!(rows[0].payload, vec![0, 0, 0, 0, 0, 1, 0x00]);
    }

    #[test]
    fn thirds_tally_counts_each_span() {
        // width 9: spans are x 0-2, 3-5, 6-8.
        let img = bitmap(9, 1, &[(0, 0), (1, 0), (4, 0), (8, 0)]);
        assert_eq!(black_counts(&img, 0), [2, 1, 1]);
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let img = bitmap(240, 120, &[(5, 7)]);
        let rotated = apply_rotation(&img, Rotation::Cw90);
        assert_eq!((rotated.width(), rotated.height()), (120, 240));
        // clockwise: (x, y) -> (h - 1 - y, x)
        assert!(is_mark(&rotated, 120 - 1 - 7, 5));
    }

    #[test]
    fn max_width_row_fits_one_frame() {
        let img = bitmap(384, 1, &[(0, 0)]);
        let pkt = encode_rows(&img, PrinterModel::B21, false)
            .unwrap()
            .next()
            .unwrap();
        // 6 header bytes + 48 data bytes stays well under the frame limit.
        assert_eq!(pkt.payload.len(), 6 + 48);
        assert!(pkt.encode(true).is_ok());
    }
}

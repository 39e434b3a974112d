//! Supported printer models and print job parameters.

use std::str::FromStr;
use std::time::Duration;

/// Default number of row packets coalesced per transport write.
const DEFAULT_BATCH_SIZE: usize = 10;

/// Largest permitted batch size.
pub const MAX_BATCH_SIZE: usize = 50;

/// Default time to wait for a control-packet acknowledgement.
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(3);

/// NIIMBOT printer models supported by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterModel {
    B1,
    B18,
    B21,
    D11,
    D110,
}

impl PrinterModel {
    /// Maximum printable width in pixels (8 px/mm head resolution).
    pub fn max_width_px(self) -> u32 {
        match self {
            Self::B1 | Self::B18 | Self::B21 => 384,
            Self::D11 | Self::D110 => 96,
        }
    }

    /// Highest density level the model's print head accepts.
    pub fn max_density(self) -> u8 {
        match self {
            Self::B1 | Self::B21 => 5,
            Self::B18 | Self::D11 | Self::D110 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::B1 => "B1",
            Self::B18 => "B18",
            Self::B21 => "B21",
            Self::D11 => "D11",
            Self::D110 => "D110",
        }
    }
}

impl std::fmt::Display for PrinterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PrinterModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "b1" => Ok(Self::B1),
            "b18" => Ok(Self::B18),
            "b21" => Ok(Self::B21),
            "d11" => Ok(Self::D11),
            "d110" => Ok(Self::D110),
            other => Err(format!(
                "unknown model {other:?} (expected b1, b18, b21, d11 or d110)"
            )),
        }
    }
}

/// Clockwise rotation applied to the bitmap before row encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Degrees represented by this rotation.
    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// Whether the rotation swaps the bitmap's width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

impl FromStr for Rotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Self::None),
            "90" => Ok(Self::Cw90),
            "180" => Ok(Self::Cw180),
            "270" => Ok(Self::Cw270),
            other => Err(format!(
                "unknown rotation {other:?} (expected 0, 90, 180 or 270)"
            )),
        }
    }
}

/// Parameters of one print job.
///
/// Constructed with [`PrintJob::new`] and adjusted with the builder-style
/// setters; out-of-range values are clamped to what the model supports.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub model: PrinterModel,
    /// Density level, 1 to the model's maximum.
    pub density: u8,
    /// Label type code, 1-3 (1 = gap label).
    pub label_type: u8,
    pub rotation: Rotation,
    /// Row packets per transport write, 1-50.
    pub batch_size: usize,
    /// Append the XOR checksum byte to row packets.
    ///
    /// Firmware accepts a zero-filled checksum on image data, but not all
    /// models are confirmed checksum-optional, so this stays on by default.
    pub row_checksums: bool,
    /// Emit the short empty-row packet for rows without black pixels.
    pub blank_row_shortcut: bool,
    /// How long to wait for each control-packet acknowledgement.
    pub reply_timeout: Duration,
}

impl PrintJob {
    pub fn new(model: PrinterModel) -> Self {
        Self {
            model,
            density: 3,
            label_type: 1,
            rotation: Rotation::None,
            batch_size: DEFAULT_BATCH_SIZE,
            row_checksums: true,
            blank_row_shortcut: true,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// Set the density level, clamping to the model's supported range.
    pub fn density(mut self, density: u8) -> Self {
        let max = self.model.max_density();
        if density > max {
            tracing::warn!(
                model = %self.model,
                requested = density,
                max,
                "density clamped to model maximum"
            );
        }
        self.density = density.clamp(1, max);
        self
    }

    /// Set the label type code (1-3).
    pub fn label_type(mut self, label_type: u8) -> Self {
        self.label_type = label_type.clamp(1, 3);
        self
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the row batch size, clamping to 1-50.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn row_checksums(mut self, enabled: bool) -> Self {
        self.row_checksums = enabled;
        self
    }

    pub fn blank_row_shortcut(mut self, enabled: bool) -> Self {
        self.blank_row_shortcut = enabled;
        self
    }

    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_width_table() {
        assert_eq!(PrinterModel::B21.max_width_px(), 384);
        assert_eq!(PrinterModel::D11.max_width_px(), 96);
    }

    #[test]
    fn density_clamped_to_model() {
        let job = PrintJob::new(PrinterModel::D11).density(5);
        assert_eq!(job.density, 3);

        let job = PrintJob::new(PrinterModel::B21).density(5);
        assert_eq!(job.density, 5);

        let job = PrintJob::new(PrinterModel::B21).density(0);
        assert_eq!(job.density, 1);
    }

    #[test]
    fn batch_size_clamped() {
        assert_eq!(PrintJob::new(PrinterModel::B21).batch_size(0).batch_size, 1);
        assert_eq!(
            PrintJob::new(PrinterModel::B21).batch_size(80).batch_size,
            MAX_BATCH_SIZE
        );
    }

    #[test]
    fn model_parses_case_insensitively() {
        assert_eq!("B21".parse::<PrinterModel>().unwrap(), PrinterModel::B21);
        assert_eq!("d110".parse::<PrinterModel>().unwrap(), PrinterModel::D110);
        assert!("x99".parse::<PrinterModel>().is_err());
    }

    #[test]
    fn rotation_axis_swap() {
        assert!(Rotation::Cw90.swaps_axes());
        assert!(!Rotation::Cw180.swaps_axes());
        assert_eq!("270".parse::<Rotation>().unwrap(), Rotation::Cw270);
    }
}

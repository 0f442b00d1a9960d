//! Host-side frame decoding.
//!
//! Decoding happens in two independent stages. [FrameDecoder::decode] turns
//! frame bytes back into physical resistances, and [DisplayScale] maps those
//! ohms onto the consumer's `0..=100` pressure scale. A node without data
//! stays [Reading::NoData] through both stages, so an omitted node can never
//! show up as a light touch.

use crate::config::ProtocolConfig;
use crate::grid::{Grid, Reading};
use crate::quantize::{DegenerateRange, QuantRange};

use nom::{
    error::Error,
    multi::count,
    number::complete::{le_f32, le_u16},
    sequence::tuple,
    Finish, IResult,
};
use std::{borrow::Cow, fmt};

/// The value a no-data node takes when a grid is flattened to floats.
pub const NO_SENSOR_MARKER: f32 = -1.0;

/// A frame that does not look like one of ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Wrong number of bytes for the configured grid.
    Length {
        /// bytes a frame should have
        expected: usize,
        /// bytes we got
        actual: usize,
    },
    /// The frame does not start with the magic marker.
    Magic {
        /// configured marker
        expected: u16,
        /// what was there instead
        found: u16,
    },
    /// A float payload whose length is not a whole number of `f32`s.
    Alignment {
        /// bytes we got
        len: usize,
    },
    /// The byte parser ran out of input.
    Truncated,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use FormatError as FE;
        let msg = match self {
            FE::Length { expected, actual } => {
                Cow::from(format!("expected {} bytes, got {}", expected, actual))
            }
            FE::Magic { expected, found } => {
                Cow::from(format!("bad magic: {:#06x}, expected {:#06x}", found, expected))
            }
            FE::Alignment { len } => {
                Cow::from(format!("{} bytes is not a whole number of floats", len))
            }
            FE::Truncated => Cow::from("frame ended early"),
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for FormatError {}

impl From<Error<&[u8]>> for FormatError {
    fn from(_: Error<&[u8]>) -> Self {
        FormatError::Truncated
    }
}

/// A decoded frame, resistances in ohms.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Wrapping frame counter from the header
    pub frame_id: u16,
    /// Physical readings
    pub grid: Grid,
}

impl DecodedFrame {
    /// The grid on the consumer's display scale.
    pub fn rescaled(&self, scale: &DisplayScale) -> Grid {
        scale.rescale_grid(&self.grid)
    }
}

fn parse_frame(input: &[u8], nodes: usize) -> IResult<&[u8], (u16, u16, Vec<u16>)> {
    tuple((le_u16, le_u16, count(le_u16, nodes)))(input)
}

/// Turns frame bytes into [DecodedFrame]s. Stateless, share it freely.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    rows: usize,
    cols: usize,
    magic: u16,
    range: QuantRange,
    no_data_threshold: f32,
}

impl FrameDecoder {
    /// A decoder for `protocol`.
    pub fn new(protocol: &ProtocolConfig) -> Result<Self, DegenerateRange> {
        Ok(Self {
            rows: protocol.rows,
            cols: protocol.cols,
            magic: protocol.magic,
            range: protocol.wire_range()?,
            no_data_threshold: protocol.no_data_threshold(),
        })
    }

    /// Size of a frame this decoder accepts
    pub fn frame_len(&self) -> usize {
        4 + 2 * self.rows * self.cols
    }

    /// Validate and decode one frame.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedFrame, FormatError> {
        if bytes.len() != self.frame_len() {
            return Err(FormatError::Length {
                expected: self.frame_len(),
                actual: bytes.len(),
            });
        }

        let (_rest, (magic, frame_id, samples)) =
            parse_frame(bytes, self.rows * self.cols).finish()?;
        if magic != self.magic {
            return Err(FormatError::Magic {
                expected: self.magic,
                found: magic,
            });
        }

        let cells = samples
            .into_iter()
            .map(|q| {
                let ohms = self.range.dequantize(q);
                if ohms <= self.no_data_threshold {
                    Reading::NoData
                } else {
                    Reading::Sensed(ohms)
                }
            })
            .collect();
        let grid = Grid::from_cells(self.rows, self.cols, cells).ok_or(FormatError::Truncated)?;

        Ok(DecodedFrame { frame_id, grid })
    }
}

/// Decodes an older, header-less payload of little-endian `f32`s.
///
/// If the payload holds exactly `rows × cols` values they come back as rows,
/// otherwise as a single row with everything in it. Non-positive values are
/// treated as "no sensor", as the old firmware sent `-1` for those.
pub fn decode_f32_payload(payload: &[u8], rows: usize, cols: usize) -> Result<Grid, FormatError> {
    if payload.len() % 4 != 0 {
        return Err(FormatError::Alignment { len: payload.len() });
    }
    let n = payload.len() / 4;
    let (_rest, values) = count(le_f32::<&[u8], Error<&[u8]>>, n)(payload).finish()?;
    let cells: Vec<Reading> = values
        .into_iter()
        .map(|v| if v > 0.0 { Reading::Sensed(v) } else { Reading::NoData })
        .collect();

    let (rows, cols) = if rows * cols == n { (rows, cols) } else { (1, n) };
    Grid::from_cells(rows, cols, cells).ok_or(FormatError::Truncated)
}

/// Maps physical ohms onto the consumer's pressure scale.
///
/// Lower resistance means more pressure, so the map is inverted: `in_max`
/// (resting) lands on `out_min` and `in_max`..`in_min` climbs towards
/// `out_max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayScale {
    /// Ohms that map to full pressure
    pub in_min: f32,
    /// Ohms that map to no pressure
    pub in_max: f32,
    /// Bottom of the display range
    pub out_min: f32,
    /// Top of the display range
    pub out_max: f32,
    /// Readings at or below this are no sensor. Must match the decoder's
    /// cutoff, see [DisplayScale::for_protocol].
    pub no_data_threshold: f32,
}

impl Default for DisplayScale {
    fn default() -> Self {
        Self {
            in_min: 700.0,
            in_max: 3700.0,
            out_min: 0.0,
            out_max: 100.0,
            no_data_threshold: ProtocolConfig::default().no_data_threshold(),
        }
    }
}

impl DisplayScale {
    /// A scale over `[in_min, in_max] -> [out_min, out_max]`.
    pub fn new(
        in_min: f32,
        in_max: f32,
        out_min: f32,
        out_max: f32,
    ) -> Result<Self, DegenerateRange> {
        QuantRange::new(in_min, in_max)?;
        QuantRange::new(out_min, out_max)?;
        Ok(Self {
            in_min,
            in_max,
            out_min,
            out_max,
            ..Self::default()
        })
    }

    /// The same scale, with the no-sensor cutoff `protocol`'s decoder uses.
    pub fn for_protocol(self, protocol: &ProtocolConfig) -> Self {
        Self {
            no_data_threshold: protocol.no_data_threshold(),
            ..self
        }
    }

    /// Rescale one reading. Anything at or below the no-sensor cutoff comes
    /// out as [Reading::NoData].
    pub fn rescale(&self, reading: Reading) -> Reading {
        match reading {
            Reading::Sensed(ohms) if ohms > self.no_data_threshold => {
                let t = (ohms - self.in_min) / (self.in_max - self.in_min);
                let scaled = (t * (self.out_max - self.out_min) + self.out_min)
                    .clamp(self.out_min, self.out_max);
                Reading::Sensed(self.out_max + self.out_min - scaled)
            }
            _ => Reading::NoData,
        }
    }

    /// Rescale a whole grid.
    pub fn rescale_grid(&self, grid: &Grid) -> Grid {
        let cells = grid.cells().iter().map(|r| self.rescale(*r)).collect();
        // same number of cells as the input, so the shape always fits
        Grid::from_cells(grid.rows(), grid.cols(), cells)
            .unwrap_or_else(|| Grid::filled(grid.rows(), grid.cols(), Reading::NoData))
    }
}

//! The binary frame: a little-endian `u16` magic, a wrapping `u16` frame id,
//! then one quantized `u16` per node in row-major order.
//!
//! ```text
//! +--------+----------+-----------+-----------+-----+
//! | EF BE  | id lo hi | s0 lo hi  | s1 lo hi  | ... |
//! +--------+----------+-----------+-----------+-----+
//! ```

use crate::config::ProtocolConfig;
use crate::grid::{Grid, Reading};
use crate::quantize::{DegenerateRange, QuantRange};

use std::fmt;

/// A frame before it is flattened into bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedFrame {
    /// frame start marker
    pub magic: u16,
    /// wrapping counter, only used to spot drops
    pub frame_id: u16,
    /// quantized samples, row-major
    pub samples: Vec<u16>,
}

impl QuantizedFrame {
    /// Serialized size in bytes
    pub fn len(&self) -> usize {
        4 + 2 * self.samples.len()
    }

    /// True if the frame carries no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Flatten the frame into its wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.frame_id.to_le_bytes());
        for sample in &self.samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }
}

/// Returned when a grid does not fit the frame layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The grid shape differs from the configured one.
    GridShape {
        /// `(rows, cols)` the encoder was built for
        expected: (usize, usize),
        /// `(rows, cols)` it was handed
        actual: (usize, usize),
    },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::GridShape { expected, actual } => write!(
                f,
                "cannot encode a {}x{} grid, frames are {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Quantizes grids into frames and stamps them with a frame id.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    magic: u16,
    shape: (usize, usize),
    range: QuantRange,
    no_data_value: f32,
    next_id: u16,
}

impl FrameEncoder {
    /// An encoder for `protocol`, starting at frame id 0.
    pub fn new(protocol: &ProtocolConfig) -> Result<Self, DegenerateRange> {
        Ok(Self {
            magic: protocol.magic,
            shape: (protocol.rows, protocol.cols),
            range: protocol.wire_range()?,
            no_data_value: protocol.no_data_value,
            next_id: 0,
        })
    }

    /// The id the next frame will carry.
    pub fn next_id(&self) -> u16 {
        self.next_id
    }

    /// Quantize `grid` into a frame. The frame id only advances on success.
    pub fn quantize(&mut self, grid: &Grid) -> Result<QuantizedFrame, EncodeError> {
        if grid.shape() != self.shape {
            return Err(EncodeError::GridShape {
                expected: self.shape,
                actual: grid.shape(),
            });
        }

        let samples = grid
            .cells()
            .iter()
            .map(|reading| match reading {
                Reading::Sensed(v) => self.range.quantize(*v),
                Reading::NoData => self.range.quantize(self.no_data_value),
            })
            .collect();

        let frame = QuantizedFrame {
            magic: self.magic,
            frame_id: self.next_id,
            samples,
        };
        self.next_id = self.next_id.wrapping_add(1);
        Ok(frame)
    }

    /// Quantize and serialize in one go.
    pub fn encode(&mut self, grid: &Grid) -> Result<Vec<u8>, EncodeError> {
        self.quantize(grid).map(|frame| frame.to_bytes())
    }
}

//! The protocol constants that the insole and the host have to agree on.
//!
//! None of this is negotiated over the link. Both ends load the same
//! [ProtocolConfig], either the built-in [Default] (the 12×8 reference
//! insole) or a RON file that looks like this:
//!
//! ```text
//! (
//!     rows: 12,
//!     cols: 8,
//!     omitted: [(0, 0), (0, 1), (0, 7), (1, 0)],
//!     magic: 48879,
//!     min_resistance: 1.0,
//!     max_resistance: 3700.0,
//!     no_data_value: -1.0,
//!     mtu: 20,
//!     warmup_cycles: 100,
//!     fragment_mode: Raw,
//! )
//! ```
//!
//! Configs are validated as soon as they are loaded, so a bad range blows up
//! at startup instead of quietly producing garbage frames.

use crate::grid::{Coord, NodeMask};
use crate::quantize::{DegenerateRange, QuantRange};

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::{Read, Write},
    path::Path,
    str::FromStr,
};

/// Frame header marker, `EF BE` on the wire.
pub const DEFAULT_MAGIC: u16 = 0xBEEF;

/// Bytes of header in front of the samples: magic and frame id.
pub const FRAME_HEADER_LEN: usize = 4;

/// Bytes of sequence number in front of each fragment in
/// [FragmentMode::Sequenced].
pub const SEQUENCE_HEADER_LEN: usize = 2;

/// Nodes of the reference insole that have no sensor behind them, due to the
/// curve of the sole.
pub const REFERENCE_OMITTED: [Coord; 14] = [
    (0, 0),
    (0, 1),
    (0, 7),
    (1, 0),
    (6, 7),
    (7, 7),
    (8, 6),
    (8, 7),
    (9, 6),
    (9, 7),
    (10, 6),
    (10, 7),
    (11, 6),
    (11, 7),
];

/// How frames are cut up for the link.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum FragmentMode {
    /// Fragments are bare slices of the frame, boundaries mean nothing.
    #[default]
    Raw,
    /// Every fragment starts with a little-endian `u16` sequence number so the
    /// receiver can throw away half-built frames after a lost fragment.
    Sequenced,
}

/// Everything both ends of the link need to agree on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProtocolConfig {
    /// Grid rows
    pub rows: usize,
    /// Grid columns
    pub cols: usize,
    /// Nodes without a physical sensor
    pub omitted: Vec<Coord>,
    /// Frame start marker
    pub magic: u16,
    /// Smallest resistance a calibrated node can report
    pub min_resistance: f32,
    /// Resting resistance, "no pressure"
    pub max_resistance: f32,
    /// Wire value reserved for nodes with no data, below `min_resistance`
    pub no_data_value: f32,
    /// Largest fragment the link will carry
    pub mtu: usize,
    /// Scan cycles spent learning the resting baseline
    pub warmup_cycles: u32,
    /// How fragments are framed
    #[serde(default)]
    pub fragment_mode: FragmentMode,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            rows: 12,
            cols: 8,
            omitted: REFERENCE_OMITTED.to_vec(),
            magic: DEFAULT_MAGIC,
            min_resistance: 1.0,
            max_resistance: 3700.0,
            no_data_value: -1.0,
            mtu: 20,
            warmup_cycles: 100,
            fragment_mode: FragmentMode::Raw,
        }
    }
}

/// Everything that can go wrong loading or validating a [ProtocolConfig].
#[derive(Debug)]
pub enum ConfigError {
    /// Reading or writing the config file failed.
    Io(std::io::Error),
    /// Serializing the config failed.
    Ron(ron::Error),
    /// Deserializing the config failed.
    RonSpanned(ron::de::SpannedError),
    /// One of the value ranges is empty or inverted.
    DegenerateRange(DegenerateRange),
    /// `rows` or `cols` is zero.
    EmptyGrid,
    /// An omitted coordinate does not fit in the grid.
    OmittedOutOfBounds(Coord),
    /// The MTU cannot carry a single payload byte in the chosen mode.
    MtuTooSmall {
        /// configured MTU
        mtu: usize,
        /// smallest usable MTU for the mode
        required: usize,
    },
    /// The no-data floor is too close to `min_resistance` for the decoder to
    /// tell them apart after quantization.
    NoDataFloor {
        /// configured floor
        no_data_value: f32,
        /// configured minimum resistance
        min_resistance: f32,
    },
    /// `warmup_cycles` is zero.
    ZeroWarmup,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConfigError as CE;
        let msg = match self {
            CE::Io(error) => Cow::from(format!("io error: {}", error)),
            CE::Ron(error) => Cow::from(format!("ron error: {}", error)),
            CE::RonSpanned(error) => Cow::from(format!("ron spanning error: {}", error)),
            CE::DegenerateRange(error) => Cow::from(error.to_string()),
            CE::EmptyGrid => Cow::from("grid must have at least one row and one column"),
            CE::OmittedOutOfBounds((r, c)) => {
                Cow::from(format!("omitted node ({}, {}) is outside the grid", r, c))
            }
            CE::MtuTooSmall { mtu, required } => Cow::from(format!(
                "mtu of {} bytes is too small, need at least {}",
                mtu, required
            )),
            CE::NoDataFloor {
                no_data_value,
                min_resistance,
            } => Cow::from(format!(
                "no-data value {} is not clearly below min resistance {}",
                no_data_value, min_resistance
            )),
            CE::ZeroWarmup => Cow::from("warmup_cycles must be at least 1"),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl From<DegenerateRange> for ConfigError {
    fn from(value: DegenerateRange) -> Self {
        Self::DegenerateRange(value)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl ProtocolConfig {
    /// Checks every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ConfigError::EmptyGrid);
        }
        if let Some(&coord) = self
            .omitted
            .iter()
            .find(|(r, c)| *r >= self.rows || *c >= self.cols)
        {
            return Err(ConfigError::OmittedOutOfBounds(coord));
        }

        QuantRange::new(self.min_resistance, self.max_resistance)?;
        let wire = self.wire_range()?;

        // The decoder splits "no data" from "sensed" halfway between the two,
        // which only works if a quantization step is smaller than that gap.
        if !(self.no_data_value < self.min_resistance)
            || wire.step() >= (self.min_resistance - self.no_data_value) / 2.0
        {
            return Err(ConfigError::NoDataFloor {
                no_data_value: self.no_data_value,
                min_resistance: self.min_resistance,
            });
        }

        let required = match self.fragment_mode {
            FragmentMode::Raw => 1,
            FragmentMode::Sequenced => SEQUENCE_HEADER_LEN + 1,
        };
        if self.mtu < required {
            return Err(ConfigError::MtuTooSmall {
                mtu: self.mtu,
                required,
            });
        }

        if self.warmup_cycles == 0 {
            return Err(ConfigError::ZeroWarmup);
        }

        Ok(())
    }

    /// The range samples are quantized over: from the no-data floor up to the
    /// resting resistance.
    pub fn wire_range(&self) -> Result<QuantRange, DegenerateRange> {
        QuantRange::new(self.no_data_value, self.max_resistance)
    }

    /// Decoded values at or below this are treated as "no data".
    pub fn no_data_threshold(&self) -> f32 {
        (self.no_data_value + self.min_resistance) / 2.0
    }

    /// Number of nodes in the grid
    pub fn node_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Size of one encoded frame in bytes, header included.
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + 2 * self.node_count()
    }

    /// The mask of omitted nodes
    pub fn node_mask(&self) -> NodeMask {
        NodeMask::new(self.rows, self.cols, &self.omitted)
    }

    /// The magic marker as it appears on the wire.
    pub fn magic_bytes(&self) -> [u8; 2] {
        self.magic.to_le_bytes()
    }

    /// Read a config from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut handle = File::open(path)?;
        Self::from_file(&mut handle)
    }

    /// Read a config from the [Read]able object provided.
    pub fn from_file(file: &mut impl Read) -> Result<Self, ConfigError> {
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        text.parse()
    }

    /// Write the config out to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let mut handle = File::create(path)?;
        self.to_file(&mut handle)
    }

    /// Write the config out to the [Write]able object provided, as pretty RON.
    pub fn to_file(&self, file: &mut impl Write) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ConfigError::Ron)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }
}

impl FromStr for ProtocolConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: ProtocolConfig = ron::de::from_str(s).map_err(ConfigError::RonSpanned)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn default_is_the_reference_insole() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.node_count(), 96);
        assert_eq!(config.frame_len(), 196);
        assert_eq!(config.magic_bytes(), [0xEF, 0xBE]);
        assert_eq!(config.node_mask().active_count(), 82);
        assert_eq!(config.no_data_threshold(), 0.0);
    }

    #[test]
    fn write_and_read_path() {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        let config = ProtocolConfig {
            fragment_mode: FragmentMode::Sequenced,
            warmup_cycles: 12,
            ..ProtocolConfig::default()
        };

        config.to_path(tempfile.path()).unwrap();
        let read_back = ProtocolConfig::from_path(tempfile.path()).unwrap();
        assert_eq!(config, read_back);
    }

    #[test]
    fn write_and_read_cursor() {
        let mut buf = Cursor::new(Vec::new());
        let config = ProtocolConfig::default();
        config.to_file(&mut buf).unwrap();
        buf.set_position(0);
        assert_eq!(ProtocolConfig::from_file(&mut buf).unwrap(), config);
    }

    #[test]
    fn fragment_mode_defaults_to_raw() {
        let text = "(rows: 2, cols: 2, omitted: [(1, 1)], magic: 48879, \
                    min_resistance: 1.0, max_resistance: 3700.0, no_data_value: -1.0, \
                    mtu: 20, warmup_cycles: 3)";
        let config: ProtocolConfig = text.parse().unwrap();
        assert_eq!(config.fragment_mode, FragmentMode::Raw);
        assert_eq!(config.frame_len(), 12);
    }

    #[test]
    fn degenerate_range_fails_at_load_time() {
        let config = ProtocolConfig {
            min_resistance: 3700.0,
            ..ProtocolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DegenerateRange(_))
        ));

        let config = ProtocolConfig {
            no_data_value: 5000.0,
            ..ProtocolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DegenerateRange(_))
        ));
    }

    #[test]
    fn rejects_bad_shapes() {
        let empty = ProtocolConfig {
            rows: 0,
            ..ProtocolConfig::default()
        };
        assert!(matches!(empty.validate(), Err(ConfigError::EmptyGrid)));

        let outside = ProtocolConfig {
            rows: 4,
            ..ProtocolConfig::default()
        };
        assert!(matches!(
            outside.validate(),
            Err(ConfigError::OmittedOutOfBounds((6, 7)))
        ));
    }

    #[test]
    fn rejects_tight_no_data_floor() {
        let config = ProtocolConfig {
            no_data_value: 0.99,
            ..ProtocolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoDataFloor { .. })
        ));
    }

    #[test]
    fn rejects_small_mtu_and_zero_warmup() {
        let config = ProtocolConfig {
            mtu: 2,
            fragment_mode: FragmentMode::Sequenced,
            ..ProtocolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MtuTooSmall { mtu: 2, required: 3 })
        ));

        let config = ProtocolConfig {
            warmup_cycles: 0,
            ..ProtocolConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroWarmup)));
    }

    #[test]
    fn garbage_text_is_a_ron_error() {
        assert!(matches!(
            "(rows: twelve)".parse::<ProtocolConfig>(),
            Err(ConfigError::RonSpanned(_))
        ));
    }
}

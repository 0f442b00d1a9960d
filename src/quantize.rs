//! The fixed-width codec that squeezes a bounded `f32` range into a `u16`
//! and back. Both ends of the link have to agree on the `(min, max)` pair,
//! it is never sent over the wire.

use std::fmt;

/// The largest quantized value, everything maps onto `0..=QUANT_MAX`.
pub const QUANT_MAX: u16 = u16::MAX;

/// Returned when someone tries to build a [QuantRange] where `max <= min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegenerateRange {
    /// The lower bound that was asked for
    pub min: f32,
    /// The upper bound that was asked for
    pub max: f32,
}

impl fmt::Display for DegenerateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "degenerate quantization range: max ({}) must be greater than min ({})",
            self.max, self.min
        )
    }
}

impl std::error::Error for DegenerateRange {}

/// Maps `x` linearly onto `[0, 65535]`, saturating at both ends.
///
/// A degenerate range (`max <= min`) quantizes everything to 0. Prefer
/// [QuantRange], which refuses to be built with such a range in the first
/// place.
pub fn quantize(x: f32, min: f32, max: f32) -> u16 {
    // `!(max > min)` also catches NaN bounds
    if !(max > min) {
        return 0;
    }
    let x = x.clamp(min, max) as f64;
    let (min, max) = (min as f64, max as f64);
    let scaled = ((x - min) / (max - min) * QUANT_MAX as f64).round();
    // NaN inputs fall through the clamp and `as` turns them into 0
    scaled.clamp(0.0, QUANT_MAX as f64) as u16
}

/// The inverse of the linear map in [quantize].
pub fn dequantize(q: u16, min: f32, max: f32) -> f32 {
    let (min, max) = (min as f64, max as f64);
    (min + (q as f64 / QUANT_MAX as f64) * (max - min)) as f32
}

/// A validated `(min, max)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantRange {
    min: f32,
    max: f32,
}

impl QuantRange {
    /// Checks the bounds once, so that per-frame calls never have to.
    pub fn new(min: f32, max: f32) -> Result<Self, DegenerateRange> {
        if max > min && min.is_finite() && max.is_finite() {
            Ok(Self { min, max })
        } else {
            Err(DegenerateRange { min, max })
        }
    }

    /// Lower bound
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound
    pub fn max(&self) -> f32 {
        self.max
    }

    /// The width of one quantization step, which is also the worst-case
    /// round trip error.
    pub fn step(&self) -> f32 {
        (self.max - self.min) / QUANT_MAX as f32
    }

    /// See [quantize]
    pub fn quantize(&self, x: f32) -> u16 {
        quantize(x, self.min, self.max)
    }

    /// See [dequantize]
    pub fn dequantize(&self, q: u16) -> f32 {
        dequantize(q, self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const MIN: f32 = -1.0;
    const MAX: f32 = 3700.0;

    #[test]
    fn round_trip_stays_within_one_step() {
        let mut rng = StdRng::seed_from_u64(7);
        let bound = (MAX - MIN) / QUANT_MAX as f32;
        for _ in 0..100_000 {
            let x: f32 = rng.gen_range(MIN..=MAX);
            let back = dequantize(quantize(x, MIN, MAX), MIN, MAX);
            assert!(
                (back - x).abs() <= bound,
                "{x} came back as {back}, off by more than {bound}"
            );
        }
    }

    #[test]
    fn round_trip_on_other_ranges() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let min: f32 = rng.gen_range(-1000.0..1000.0);
            let max: f32 = min + rng.gen_range(100.0..5000.0);
            let bound = (max - min) / QUANT_MAX as f32;
            for _ in 0..200 {
                let x: f32 = rng.gen_range(min..=max);
                let back = dequantize(quantize(x, min, max), min, max);
                // a little slack for f32 representation of the bounds
                assert!((back - x).abs() <= bound * 1.001);
            }
        }
    }

    #[test]
    fn saturates_at_both_ends() {
        assert_eq!(quantize(MIN - 1.0, MIN, MAX), 0);
        assert_eq!(quantize(MAX + 1.0, MIN, MAX), QUANT_MAX);
        assert_eq!(quantize(f32::NEG_INFINITY, MIN, MAX), 0);
        assert_eq!(quantize(f32::INFINITY, MIN, MAX), QUANT_MAX);
    }

    #[test]
    fn endpoints_are_exact() {
        assert_eq!(quantize(MIN, MIN, MAX), 0);
        assert_eq!(quantize(MAX, MIN, MAX), QUANT_MAX);
        assert_eq!(dequantize(0, MIN, MAX), MIN);
        assert_eq!(dequantize(QUANT_MAX, MIN, MAX), MAX);
    }

    #[test]
    fn degenerate_range_quantizes_to_zero() {
        assert_eq!(quantize(5.0, 10.0, 10.0), 0);
        assert_eq!(quantize(5.0, 10.0, 1.0), 0);
        assert_eq!(quantize(5.0, f32::NAN, 1.0), 0);
    }

    #[test]
    fn quant_range_refuses_bad_bounds() {
        assert!(QuantRange::new(0.0, 0.0).is_err());
        assert!(QuantRange::new(3.0, -3.0).is_err());
        assert!(QuantRange::new(f32::NAN, 1.0).is_err());
        assert!(QuantRange::new(0.0, f32::INFINITY).is_err());

        let range = QuantRange::new(MIN, MAX).unwrap();
        assert_eq!(range.quantize(MAX), QUANT_MAX);
        assert!((range.step() - 3701.0 / 65535.0).abs() < 1e-6);
    }
}

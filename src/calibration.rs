//! Per-node resting-baseline calibration.
//!
//! Every node of a cheap resistive insole rests at a slightly different
//! resistance. For the first `warmup_cycles` scans the engine only watches,
//! learning each node's resting average. After that it freezes and scales
//! every node so that its own resting value lands on `max_resistance`.
//! Frozen is forever, there is no way back to warming.

use crate::config::ProtocolConfig;
use crate::grid::{Grid, NodeMask, Reading};

use log::{debug, info};

/// Where the engine is in its one-way life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// Still collecting the baseline, `remaining` cycles to go.
    Warming {
        /// cycles left before freezing
        remaining: u32,
    },
    /// Baseline is fixed, readings are being normalized.
    Frozen,
}

/// What one node learned during warm-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeCalibration {
    /// Sum of the valid warm-up samples
    pub running_sum: f64,
    /// Number of valid warm-up samples
    pub running_count: u32,
    /// Mean resting resistance, set when the engine freezes
    pub resting_average: f32,
    /// Scale applied to every frozen reading
    pub multiplier: f32,
}

impl Default for NodeCalibration {
    fn default() -> Self {
        Self {
            running_sum: 0.0,
            running_count: 0,
            resting_average: 0.0,
            multiplier: 1.0,
        }
    }
}

/// Owns the calibration state of one insole.
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    mask: NodeMask,
    warmup_cycles: u32,
    cycles_seen: u32,
    frozen: bool,
    min_resistance: f32,
    max_resistance: f32,
    nodes: Vec<NodeCalibration>,
    last_raw: Vec<f32>,
}

impl CalibrationEngine {
    /// A fresh engine in the warming phase.
    pub fn new(protocol: &ProtocolConfig) -> Self {
        let n = protocol.node_count();
        Self {
            mask: protocol.node_mask(),
            warmup_cycles: protocol.warmup_cycles,
            cycles_seen: 0,
            frozen: false,
            min_resistance: protocol.min_resistance,
            max_resistance: protocol.max_resistance,
            nodes: vec![NodeCalibration::default(); n],
            last_raw: vec![protocol.max_resistance; n],
        }
    }

    /// The current phase
    pub fn phase(&self) -> CalibrationPhase {
        if self.frozen {
            CalibrationPhase::Frozen
        } else {
            CalibrationPhase::Warming {
                remaining: self.warmup_cycles - self.cycles_seen,
            }
        }
    }

    /// Has the baseline been fixed?
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The learned state of a node, by row-major index.
    pub fn node(&self, index: usize) -> Option<&NodeCalibration> {
        self.nodes.get(index)
    }

    /// The resting average of a sensed node once frozen. `None` while warming
    /// and for omitted nodes.
    pub fn resting_average(&self, index: usize) -> Option<f32> {
        if !self.frozen || self.mask.is_omitted_index(index) {
            return None;
        }
        self.nodes.get(index).map(|n| n.resting_average)
    }

    /// Runs one cycle's grid through the engine, in place, and returns the
    /// phase the engine is in afterwards.
    ///
    /// While warming the grid is only observed (apart from omitted nodes,
    /// which are always forced to [Reading::NoData]). The cycle that
    /// completes the warm-up freezes the engine but is not normalized itself,
    /// so callers should only transmit grids for which the engine was
    /// already frozen on entry; [CalibrationEngine::process] reports that.
    pub fn apply(&mut self, grid: &mut Grid) -> CalibrationPhase {
        debug_assert_eq!(grid.cells().len(), self.nodes.len());

        if self.frozen {
            self.normalize(grid);
        } else {
            self.observe(grid);
        }
        self.mask.apply(grid);
        self.phase()
    }

    /// Like [CalibrationEngine::apply], but returns `true` only if the grid
    /// came out normalized and is fit to transmit.
    pub fn process(&mut self, grid: &mut Grid) -> bool {
        let was_frozen = self.frozen;
        self.apply(grid);
        was_frozen
    }

    fn observe(&mut self, grid: &Grid) {
        for (i, reading) in grid.cells().iter().enumerate() {
            if self.mask.is_omitted_index(i) {
                continue;
            }
            let raw = reading.value().unwrap_or(self.max_resistance);
            self.last_raw[i] = raw;
            if raw < self.max_resistance {
                let node = &mut self.nodes[i];
                node.running_sum += raw as f64;
                node.running_count += 1;
            }
        }

        self.cycles_seen += 1;
        if self.cycles_seen >= self.warmup_cycles {
            self.freeze();
        }
    }

    fn freeze(&mut self) {
        let mut fallbacks = 0;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if self.mask.is_omitted_index(i) {
                node.multiplier = 1.0;
                continue;
            }
            node.resting_average = if node.running_count > 0 {
                (node.running_sum / node.running_count as f64) as f32
            } else {
                fallbacks += 1;
                self.last_raw[i]
            };
            node.multiplier = if node.resting_average > 0.0 {
                self.max_resistance / node.resting_average
            } else {
                1.0
            };
            debug!(
                "node {} rests at {:.1} ohms, multiplier {:.4}",
                i, node.resting_average, node.multiplier
            );
        }
        self.frozen = true;
        info!(
            "calibration frozen after {} cycles, {} nodes fell back to their last raw reading",
            self.cycles_seen, fallbacks
        );
    }

    fn normalize(&self, grid: &mut Grid) {
        for (i, cell) in grid.cells_mut().iter_mut().enumerate() {
            if self.mask.is_omitted_index(i) {
                continue;
            }
            let raw = match *cell {
                Reading::Sensed(v) if v > 0.0 => v,
                _ => self.max_resistance,
            };
            let scaled = raw.clamp(0.0, self.max_resistance) * self.nodes[i].multiplier;
            *cell = Reading::Sensed(scaled.clamp(self.min_resistance, self.max_resistance));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol(warmup: u32) -> ProtocolConfig {
        ProtocolConfig {
            rows: 2,
            cols: 2,
            omitted: vec![(1, 1)],
            warmup_cycles: warmup,
            ..ProtocolConfig::default()
        }
    }

    fn constant(v: f32) -> Grid {
        Grid::filled(2, 2, Reading::Sensed(v))
    }

    #[test]
    fn converges_after_exactly_warmup_cycles() {
        let mut engine = CalibrationEngine::new(&protocol(100));
        for cycle in 0..100 {
            assert!(!engine.is_frozen(), "froze early at cycle {cycle}");
            let mut grid = constant(1000.0);
            assert!(!engine.process(&mut grid));
        }
        assert_eq!(engine.phase(), CalibrationPhase::Frozen);
        assert_eq!(engine.resting_average(0), Some(1000.0));

        let mut grid = constant(1000.0);
        assert!(engine.process(&mut grid));
        match grid.get(0, 0) {
            Reading::Sensed(v) => assert!((v - 3700.0).abs() < 1e-2),
            other => panic!("expected a sensed value, got {other:?}"),
        }
    }

    #[test]
    fn warming_counts_down_and_leaves_grid_alone() {
        let mut engine = CalibrationEngine::new(&protocol(3));
        let mut grid = constant(1234.0);
        assert_eq!(
            engine.apply(&mut grid),
            CalibrationPhase::Warming { remaining: 2 }
        );
        assert_eq!(grid.get(0, 0), Reading::Sensed(1234.0));
        assert_eq!(grid.get(1, 1), Reading::NoData);
    }

    #[test]
    fn sentinel_samples_are_not_averaged() {
        let mut engine = CalibrationEngine::new(&protocol(4));
        for v in [800.0, 3700.0, 1200.0, 3700.0] {
            engine.apply(&mut constant(v));
        }
        assert_eq!(engine.resting_average(0), Some(1000.0));
        let node = engine.node(0).unwrap();
        assert_eq!(node.running_count, 2);
        assert!((node.multiplier - 3.7).abs() < 1e-5);
    }

    #[test]
    fn nodes_without_valid_samples_use_last_raw_reading() {
        let mut engine = CalibrationEngine::new(&protocol(2));
        engine.apply(&mut constant(3700.0));
        engine.apply(&mut constant(3700.0));
        assert_eq!(engine.resting_average(1), Some(3700.0));
        assert_eq!(engine.node(1).unwrap().multiplier, 1.0);
    }

    #[test]
    fn non_positive_rest_keeps_unit_multiplier() {
        let mut engine = CalibrationEngine::new(&protocol(1));
        let mut grid = constant(3700.0);
        grid.set(0, 1, Reading::Sensed(-5.0));
        engine.apply(&mut grid);
        // -5 counts as a valid sample, the average is negative
        assert_eq!(engine.node(1).unwrap().multiplier, 1.0);
    }

    #[test]
    fn frozen_output_is_clipped() {
        let mut engine = CalibrationEngine::new(&protocol(1));
        engine.apply(&mut constant(500.0));

        let mut grid = constant(1000.0);
        grid.set(0, 1, Reading::Sensed(0.0));
        grid.set(1, 0, Reading::Sensed(0.01));
        engine.apply(&mut grid);

        // 1000 * 7.4 saturates at rest
        assert_eq!(grid.get(0, 0), Reading::Sensed(3700.0));
        // zero reads as "no pressure"
        assert_eq!(grid.get(0, 1), Reading::Sensed(3700.0));
        // tiny readings are lifted to min_resistance
        assert_eq!(grid.get(1, 0), Reading::Sensed(1.0));
    }

    #[test]
    fn omitted_nodes_stay_no_data_in_every_phase() {
        let mut engine = CalibrationEngine::new(&protocol(2));
        for _ in 0..5 {
            let mut grid = constant(900.0);
            engine.apply(&mut grid);
            assert_eq!(grid.get(1, 1), Reading::NoData);
        }
        assert_eq!(engine.resting_average(3), None);
        assert_eq!(engine.node(3).unwrap().multiplier, 1.0);
    }

    #[test]
    fn frozen_state_never_changes() {
        let mut engine = CalibrationEngine::new(&protocol(2));
        engine.apply(&mut constant(1000.0));
        engine.apply(&mut constant(1000.0));
        let before = engine.node(0).copied();
        for _ in 0..50 {
            engine.apply(&mut constant(200.0));
        }
        assert_eq!(engine.node(0).copied(), before);
    }
}

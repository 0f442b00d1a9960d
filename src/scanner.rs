//! Multiplexed acquisition of the resistive grid.
//!
//! Each node sits in a voltage divider with a known reference resistor. The
//! scanner drives one row, selects one column, waits for the line to settle,
//! and turns the measured voltage back into a resistance. The electrical side
//! is behind [AnalogFrontEnd] so the same scanner runs against real hardware,
//! the simulator, or a test double.

use crate::config::ProtocolConfig;
use crate::grid::{Grid, NodeMask, Reading};

use log::trace;
use std::time::Duration;

/// The analog side of the grid: row/column multiplexers plus an ADC.
pub trait AnalogFrontEnd {
    /// Drive row `row`, releasing whichever row was driven before.
    fn select_row(&mut self, row: usize);

    /// Route column `col` to the ADC.
    fn select_col(&mut self, col: usize);

    /// Sample the currently selected node, in volts.
    fn read_voltage(&mut self) -> f32;
}

/// Electrical constants of the divider and the mux timing.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerConfig {
    /// Divider supply voltage
    pub supply_voltage: f32,
    /// Reference resistor in series with each node, ohms
    pub reference_ohms: f32,
    /// Below this the node is treated as open circuit
    pub guard_low: f32,
    /// Above this the node is treated as saturated
    pub guard_high: f32,
    /// Settling time after every row select and every column select
    pub settle: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            supply_voltage: 3.3,
            reference_ohms: 1000.0,
            guard_low: 0.05,
            guard_high: 3.25,
            settle: Duration::from_micros(20),
        }
    }
}

impl ScannerConfig {
    /// The node resistance for a measured divider voltage, or `None` if the
    /// voltage is in the open-circuit or saturation guard band, where the
    /// divider math divides by (nearly) zero.
    pub fn resistance(&self, voltage: f32) -> Option<f32> {
        if !(voltage > self.guard_low && voltage < self.guard_high) {
            return None;
        }
        Some(self.reference_ohms * (self.supply_voltage - voltage) / voltage)
    }

    /// The voltage a node of `ohms` would produce. Used by the simulator.
    pub fn voltage(&self, ohms: f32) -> f32 {
        self.supply_voltage * self.reference_ohms / (self.reference_ohms + ohms.max(0.0))
    }
}

/// Reads the whole grid once per call.
pub struct GridScanner<F: AnalogFrontEnd> {
    front_end: F,
    config: ScannerConfig,
    rows: usize,
    cols: usize,
    mask: NodeMask,
    min_resistance: f32,
    max_resistance: f32,
}

impl<F: AnalogFrontEnd> GridScanner<F> {
    /// A scanner for the grid described by `protocol`.
    pub fn new(front_end: F, config: ScannerConfig, protocol: &ProtocolConfig) -> Self {
        Self {
            front_end,
            config,
            rows: protocol.rows,
            cols: protocol.cols,
            mask: protocol.node_mask(),
            min_resistance: protocol.min_resistance,
            max_resistance: protocol.max_resistance,
        }
    }

    /// The electrical constants in use
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Borrow the front end, e.g. to steer a simulator.
    pub fn front_end(&self) -> &F {
        &self.front_end
    }

    /// Mutably borrow the front end.
    pub fn front_end_mut(&mut self) -> &mut F {
        &mut self.front_end
    }

    /// Scan every node in row-major order.
    ///
    /// Nodes in the guard band come back as the resting sentinel
    /// `Sensed(max_resistance)`. Omitted nodes always come back as
    /// [Reading::NoData], no matter what the ADC said.
    pub fn scan(&mut self) -> Grid {
        let mut grid = Grid::filled(self.rows, self.cols, Reading::Sensed(self.max_resistance));
        let mut faults = 0;

        for row in 0..self.rows {
            self.front_end.select_row(row);
            spin_sleep::sleep(self.config.settle);
            for col in 0..self.cols {
                self.front_end.select_col(col);
                spin_sleep::sleep(self.config.settle);

                let voltage = self.front_end.read_voltage();
                let ohms = match self.config.resistance(voltage) {
                    Some(ohms) => ohms.clamp(self.min_resistance, self.max_resistance),
                    None => {
                        faults += 1;
                        self.max_resistance
                    }
                };
                grid.set(row, col, Reading::Sensed(ohms));
            }
        }

        self.mask.apply(&mut grid);
        trace!("scan complete, {} nodes in the guard band", faults);
        grid
    }
}

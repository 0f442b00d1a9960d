//! A pretend insole, for running the whole link without hardware.
//!
//! [SimulatedInsole] is an [AnalogFrontEnd] whose nodes rest at slightly
//! different resistances (like real ones do) and respond to a walking gait
//! that rolls pressure from the heel to the toes. [SimulatedDevice] runs an
//! [InsoleDevice] on its own thread and feeds a lossy channel, so the host
//! side gets to see dropped fragments too.

use crate::config::ProtocolConfig;
use crate::device::{ChannelTransport, CycleOutcome, DeviceStats, InsoleDevice, Transport};
use crate::quantize::DegenerateRange;
use crate::scanner::{AnalogFrontEnd, ScannerConfig};

use log::{info, warn};
use rand::prelude::*;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

/// A grid of fake force-sensitive resistors.
pub struct SimulatedInsole {
    electrical: ScannerConfig,
    rows: usize,
    cols: usize,
    rest_ohms: Vec<f32>,
    load: Vec<f32>,
    noise_ohms: f32,
    open_circuit_chance: f64,
    row: usize,
    col: usize,
    rng: StdRng,
}

impl SimulatedInsole {
    /// An unloaded insole whose nodes rest somewhere around `rest_ohms`.
    pub fn new(
        protocol: &ProtocolConfig,
        electrical: ScannerConfig,
        rest_ohms: f32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = protocol.node_count();
        let rest = (0..n)
            .map(|_| rest_ohms * rng.gen_range(0.8..1.2))
            .collect();
        Self {
            electrical,
            rows: protocol.rows,
            cols: protocol.cols,
            rest_ohms: rest,
            load: vec![0.0; n],
            noise_ohms: 0.0,
            open_circuit_chance: 0.0,
            row: 0,
            col: 0,
            rng,
        }
    }

    /// Uniform noise of `±ohms` on every sample.
    pub fn set_noise(&mut self, ohms: f32) {
        self.noise_ohms = ohms.abs();
    }

    /// Probability that any one sample reads as an open circuit.
    pub fn set_open_circuit_chance(&mut self, chance: f64) {
        self.open_circuit_chance = chance.clamp(0.0, 1.0);
    }

    /// Load on one node, `0.0` (none) to `1.0` (full weight).
    pub fn set_load(&mut self, row: usize, col: usize, load: f32) {
        if row < self.rows && col < self.cols {
            self.load[row * self.cols + col] = load.clamp(0.0, 1.0);
        }
    }

    /// Take all weight off.
    pub fn clear_load(&mut self) {
        self.load.iter_mut().for_each(|l| *l = 0.0);
    }

    /// Load the insole like a foot at `phase` of a stride, `0.0..1.0`.
    ///
    /// The first 60% of the stride is stance: a band of pressure rolls from
    /// the heel (last row) to the toes (first row). The rest is swing, with
    /// the foot in the air.
    pub fn set_gait_phase(&mut self, phase: f32) {
        let phase = phase.rem_euclid(1.0);
        let stance = 0.6;
        if phase >= stance {
            self.clear_load();
            return;
        }
        let progress = phase / stance;
        let centre = (1.0 - progress) * (self.rows.saturating_sub(1)) as f32;
        for row in 0..self.rows {
            let distance = (row as f32 - centre).abs();
            let load = (1.0 - distance / 3.0).max(0.0);
            for col in 0..self.cols {
                self.set_load(row, col, load);
            }
        }
    }

    /// The resistance node `(row, col)` would have right now, before noise.
    pub fn ohms(&self, row: usize, col: usize) -> f32 {
        let i = row * self.cols + col;
        self.rest_ohms[i] * (1.0 - 0.85 * self.load[i])
    }
}

impl AnalogFrontEnd for SimulatedInsole {
    fn select_row(&mut self, row: usize) {
        self.row = row;
    }

    fn select_col(&mut self, col: usize) {
        self.col = col;
    }

    fn read_voltage(&mut self) -> f32 {
        if self.row >= self.rows || self.col >= self.cols {
            return 0.0;
        }
        if self.open_circuit_chance > 0.0 && self.rng.gen_bool(self.open_circuit_chance) {
            return 0.0;
        }
        let noise = if self.noise_ohms > 0.0 {
            self.rng.gen_range(-self.noise_ohms..self.noise_ohms)
        } else {
            0.0
        };
        self.electrical.voltage(self.ohms(self.row, self.col) + noise)
    }
}

/// A [Transport] over a radio that loses fragments now and then.
pub struct LossyTransport<T: Transport> {
    inner: T,
    drop_chance: f64,
    rng: StdRng,
    dropped: u64,
}

impl<T: Transport> LossyTransport<T> {
    /// Wraps `inner`, losing each fragment with probability `drop_chance`.
    pub fn new(inner: T, drop_chance: f64, seed: u64) -> Self {
        Self {
            inner,
            drop_chance: drop_chance.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
            dropped: 0,
        }
    }

    /// Change the loss rate
    pub fn set_drop_chance(&mut self, chance: f64) {
        self.drop_chance = chance.clamp(0.0, 1.0);
    }

    /// Fragments lost so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<T: Transport> Transport for LossyTransport<T> {
    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn send(&mut self, fragment: &[u8]) {
        if self.drop_chance > 0.0 && self.rng.gen_bool(self.drop_chance) {
            self.dropped += 1;
            return;
        }
        self.inner.send(fragment);
    }
}

enum Signal {
    DropChance(f64),
    Noise(f32),
    Walking(bool),
    Stop,
}

/// Knobs for a [SimulatedDevice].
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Resting resistance nodes are scattered around
    pub rest_ohms: f32,
    /// Scan rate in cycles per second
    pub scan_rate: f32,
    /// Seconds per stride
    pub stride_seconds: f32,
    /// Chance of losing a fragment
    pub drop_chance: f64,
    /// Sample noise, ohms
    pub noise_ohms: f32,
    /// RNG seed
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            rest_ohms: 1000.0,
            scan_rate: 50.0,
            stride_seconds: 1.2,
            drop_chance: 0.0,
            noise_ohms: 5.0,
            seed: 0x5013,
        }
    }
}

/// An [InsoleDevice] over a [SimulatedInsole], running on its own thread.
pub struct SimulatedDevice {
    handle: Option<thread::JoinHandle<DeviceStats>>,
    tx: Sender<Signal>,
}

impl SimulatedDevice {
    /// Start the device. Fragments show up on `fragments` until [stop] is
    /// called or the receiving end hangs up.
    ///
    /// [stop]: SimulatedDevice::stop
    pub fn spawn(
        protocol: &ProtocolConfig,
        settings: SimulationSettings,
        fragments: Sender<Vec<u8>>,
    ) -> Result<Self, DegenerateRange> {
        let (tx, rx) = mpsc::channel::<Signal>();

        let electrical = ScannerConfig::default();
        let mut insole = SimulatedInsole::new(
            protocol,
            electrical.clone(),
            settings.rest_ohms,
            settings.seed,
        );
        insole.set_noise(settings.noise_ohms);
        let transport = LossyTransport::new(
            ChannelTransport::new(fragments),
            settings.drop_chance,
            settings.seed.wrapping_add(1),
        );
        let mut device = InsoleDevice::new(insole, electrical, protocol, transport)?;

        let period = Duration::from_secs_f32(1.0 / settings.scan_rate.max(1.0));
        let phase_step = period.as_secs_f32() / settings.stride_seconds.max(0.1);

        let handle = thread::spawn(move || {
            let mut running = true;
            let mut walking = true;
            let mut phase = 0.0f32;
            let mut next = Instant::now();
            while running {
                while let Ok(received) = rx.try_recv() {
                    match received {
                        Signal::DropChance(chance) => {
                            device.transport_mut().set_drop_chance(chance)
                        }
                        Signal::Noise(ohms) => {
                            device.scanner_mut().front_end_mut().set_noise(ohms)
                        }
                        Signal::Walking(on) => walking = on,
                        Signal::Stop => running = false,
                    }
                }
                if !running {
                    break;
                }

                let insole = device.scanner_mut().front_end_mut();
                if walking {
                    insole.set_gait_phase(phase);
                    phase = (phase + phase_step).rem_euclid(1.0);
                } else {
                    insole.clear_load();
                }

                match device.cycle() {
                    Ok(CycleOutcome::Skipped) if !device.transport().is_ready() => {
                        info!("nobody is listening any more, simulated insole stopping");
                        running = false;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("simulated insole failed: {}", e);
                        running = false;
                    }
                }

                next += period;
                let now = Instant::now();
                if next > now {
                    spin_sleep::sleep(next - now);
                } else {
                    next = now;
                }
            }
            info!(
                "simulated insole done, {} fragments lost on the way",
                device.transport().dropped()
            );
            device.stats()
        });

        Ok(Self {
            handle: Some(handle),
            tx,
        })
    }

    /// Change how often fragments get lost.
    pub fn set_drop_chance(&self, chance: f64) {
        // the thread may already be gone, then there is nothing to adjust
        let _ = self.tx.send(Signal::DropChance(chance));
    }

    /// Change the sample noise, in ohms.
    pub fn set_noise(&self, ohms: f32) {
        let _ = self.tx.send(Signal::Noise(ohms));
    }

    /// Walk, or stand still with no load at all.
    pub fn set_walking(&self, walking: bool) {
        let _ = self.tx.send(Signal::Walking(walking));
    }

    /// Stop the device thread and collect its counters.
    pub fn stop(&mut self) -> Option<DeviceStats> {
        let _ = self.tx.send(Signal::Stop);
        self.handle.take().and_then(|thread| thread.join().ok())
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Reading;
    use crate::scanner::GridScanner;
    use std::sync::mpsc::channel;

    fn protocol() -> ProtocolConfig {
        ProtocolConfig {
            rows: 4,
            cols: 2,
            omitted: vec![],
            warmup_cycles: 2,
            ..ProtocolConfig::default()
        }
    }

    fn quiet() -> ScannerConfig {
        ScannerConfig {
            settle: Duration::ZERO,
            ..ScannerConfig::default()
        }
    }

    #[test]
    fn resting_nodes_scan_near_their_resistance() {
        let protocol = protocol();
        let insole = SimulatedInsole::new(&protocol, quiet(), 1000.0, 7);
        let expected: Vec<f32> = (0..4)
            .flat_map(|r| (0..2).map(move |c| (r, c)))
            .map(|(r, c)| insole.ohms(r, c))
            .collect();
        let mut scanner = GridScanner::new(insole, quiet(), &protocol);
        let grid = scanner.scan();
        for (cell, want) in grid.cells().iter().zip(expected) {
            assert!((800.0..=1200.0).contains(&want));
            match cell {
                Reading::Sensed(v) => assert!((v - want).abs() < 1.0, "{v} vs {want}"),
                Reading::NoData => panic!("resting node read as no data"),
            }
        }
    }

    #[test]
    fn gait_rolls_from_heel_to_toe() {
        let protocol = protocol();
        let mut insole = SimulatedInsole::new(&protocol, quiet(), 1000.0, 7);

        insole.set_gait_phase(0.0);
        assert!(insole.ohms(3, 0) < insole.ohms(0, 0));

        insole.set_gait_phase(0.59);
        assert!(insole.ohms(0, 0) < insole.ohms(3, 0));

        insole.set_gait_phase(0.8);
        let resting = SimulatedInsole::new(&protocol, quiet(), 1000.0, 7);
        assert_eq!(insole.ohms(2, 1), resting.ohms(2, 1));
    }

    #[test]
    fn open_circuit_reads_as_the_ceiling() {
        let protocol = protocol();
        let mut insole = SimulatedInsole::new(&protocol, quiet(), 1000.0, 7);
        insole.set_open_circuit_chance(1.0);
        let mut scanner = GridScanner::new(insole, quiet(), &protocol);
        let grid = scanner.scan();
        assert!(grid
            .cells()
            .iter()
            .all(|r| *r == Reading::Sensed(protocol.max_resistance)));
    }

    #[test]
    fn lossy_transport_counts_what_it_drops() {
        let (tx, rx) = channel();
        let mut lossy = LossyTransport::new(ChannelTransport::new(tx), 1.0, 1);
        lossy.send(&[1, 2, 3]);
        lossy.send(&[4]);
        assert_eq!(lossy.dropped(), 2);
        assert!(rx.try_recv().is_err());

        lossy.set_drop_chance(0.0);
        lossy.send(&[5]);
        assert_eq!(rx.try_recv().unwrap(), vec![5]);
    }

    #[test]
    fn device_thread_streams_until_stopped() {
        let protocol = protocol();
        let (tx, rx) = channel();
        let settings = SimulationSettings {
            scan_rate: 500.0,
            ..SimulationSettings::default()
        };
        let mut device = SimulatedDevice::spawn(&protocol, settings, tx).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(&first[..2], &protocol.magic_bytes());

        let stats = device.stop().unwrap();
        assert!(stats.frames_sent >= 1);
        assert!(device.stop().is_none());
    }
}

//! The insole side of the link: one scan, calibrate, encode, chunk and
//! transmit cycle at a time, each one run to completion before the next.
//!
//! Nothing is ever queued. If the link is not ready when a frame is done,
//! that frame is simply gone; the next scan is a fresh snapshot anyway.

use crate::calibration::{CalibrationEngine, CalibrationPhase};
use crate::chunker::Chunker;
use crate::config::ProtocolConfig;
use crate::frame::{EncodeError, FrameEncoder};
use crate::quantize::DegenerateRange;
use crate::scanner::{AnalogFrontEnd, GridScanner, ScannerConfig};

use log::{debug, trace};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

/// Where fragments go. Sending never blocks and never fails loudly.
pub trait Transport {
    /// Is anyone listening? A `false` here drops the whole cycle.
    fn is_ready(&self) -> bool;

    /// Hand one fragment to the radio.
    fn send(&mut self, fragment: &[u8]);
}

/// A [Transport] that pushes fragments into an mpsc channel, for running the
/// device and the host in one process.
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
    connected: bool,
}

impl ChannelTransport {
    /// A connected transport feeding `tx`.
    pub fn new(tx: Sender<Vec<u8>>) -> Self {
        Self {
            tx,
            connected: true,
        }
    }
}

impl Transport for ChannelTransport {
    fn is_ready(&self) -> bool {
        self.connected
    }

    fn send(&mut self, fragment: &[u8]) {
        // the receiving side hung up, behave like a dropped connection
        if self.tx.send(fragment.to_vec()).is_err() {
            self.connected = false;
        }
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Still learning the baseline, nothing sent.
    Warming {
        /// cycles left
        remaining: u32,
    },
    /// A frame went out.
    Sent {
        /// id of the frame
        frame_id: u16,
        /// number of fragments it took
        fragments: usize,
    },
    /// Calibrated, but the link was not ready, the frame was dropped.
    Skipped,
}

/// Counters over the life of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// cycles run
    pub cycles: u64,
    /// frames sent
    pub frames_sent: u64,
    /// frames dropped because the link was not ready
    pub frames_skipped: u64,
}

/// One insole: scanner, calibration, encoder, chunker and a transport.
pub struct InsoleDevice<F: AnalogFrontEnd, T: Transport> {
    scanner: GridScanner<F>,
    calibration: CalibrationEngine,
    encoder: FrameEncoder,
    chunker: Chunker,
    transport: T,
    stats: DeviceStats,
}

impl<F: AnalogFrontEnd, T: Transport> InsoleDevice<F, T> {
    /// Wire up a device. Fails only if the protocol's wire range is empty.
    pub fn new(
        front_end: F,
        scanner_config: ScannerConfig,
        protocol: &ProtocolConfig,
        transport: T,
    ) -> Result<Self, DegenerateRange> {
        Ok(Self {
            scanner: GridScanner::new(front_end, scanner_config, protocol),
            calibration: CalibrationEngine::new(protocol),
            encoder: FrameEncoder::new(protocol)?,
            chunker: Chunker::new(protocol),
            transport,
            stats: DeviceStats::default(),
        })
    }

    /// Counters so far
    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    /// The calibration engine, read-only
    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    /// The scanner, e.g. to steer a simulated front end.
    pub fn scanner_mut(&mut self) -> &mut GridScanner<F> {
        &mut self.scanner
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Run one full cycle.
    pub fn cycle(&mut self) -> Result<CycleOutcome, EncodeError> {
        self.stats.cycles += 1;
        let mut grid = self.scanner.scan();

        if !self.calibration.process(&mut grid) {
            let remaining = match self.calibration.phase() {
                CalibrationPhase::Warming { remaining } => remaining,
                CalibrationPhase::Frozen => 0,
            };
            trace!("warming up, {} cycles to go", remaining);
            return Ok(CycleOutcome::Warming { remaining });
        }

        if !self.transport.is_ready() {
            self.stats.frames_skipped += 1;
            trace!("link not ready, dropping this cycle");
            return Ok(CycleOutcome::Skipped);
        }

        let frame = self.encoder.quantize(&grid)?;
        let fragments = self.chunker.split(&frame.to_bytes());
        for fragment in &fragments {
            self.transport.send(fragment);
        }
        self.stats.frames_sent += 1;

        Ok(CycleOutcome::Sent {
            frame_id: frame.frame_id,
            fragments: fragments.len(),
        })
    }

    /// Run cycles back to back at `period`, `cycles` times or until
    /// `keep_going` says stop. Cycles that overrun the period start the next
    /// one immediately.
    pub fn run<P>(
        &mut self,
        period: Duration,
        cycles: Option<u64>,
        mut keep_going: P,
    ) -> Result<DeviceStats, EncodeError>
    where
        P: FnMut(&CycleOutcome) -> bool,
    {
        let mut next = Instant::now();
        let mut done = 0;
        while cycles.map_or(true, |n| done < n) {
            let outcome = self.cycle()?;
            done += 1;
            if !keep_going(&outcome) {
                break;
            }

            next += period;
            let now = Instant::now();
            if next > now {
                spin_sleep::sleep(next - now);
            } else {
                next = now;
            }
        }
        debug!("device stopped: {:?}", self.stats);
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FragmentMode;
    use std::sync::mpsc::channel;

    /// Every node reads the same voltage.
    struct Flat(f32);

    impl AnalogFrontEnd for Flat {
        fn select_row(&mut self, _row: usize) {}
        fn select_col(&mut self, _col: usize) {}
        fn read_voltage(&mut self) -> f32 {
            self.0
        }
    }

    /// Keeps everything it is handed.
    #[derive(Default)]
    struct Recorder {
        ready: bool,
        sent: Vec<Vec<u8>>,
    }

    impl Transport for Recorder {
        fn is_ready(&self) -> bool {
            self.ready
        }
        fn send(&mut self, fragment: &[u8]) {
            self.sent.push(fragment.to_vec());
        }
    }

    fn protocol() -> ProtocolConfig {
        ProtocolConfig {
            rows: 3,
            cols: 3,
            omitted: vec![(2, 2)],
            warmup_cycles: 5,
            ..ProtocolConfig::default()
        }
    }

    fn scanner_config() -> ScannerConfig {
        ScannerConfig {
            settle: Duration::ZERO,
            ..ScannerConfig::default()
        }
    }

    #[test]
    fn silent_while_warming() {
        let config = scanner_config();
        let v = config.voltage(1500.0);
        let recorder = Recorder {
            ready: true,
            ..Recorder::default()
        };
        let mut device = InsoleDevice::new(Flat(v), config, &protocol(), recorder).unwrap();

        for i in 0..5 {
            assert_eq!(
                device.cycle().unwrap(),
                CycleOutcome::Warming { remaining: 4 - i }
            );
        }
        assert!(device.transport().sent.is_empty());

        let outcome = device.cycle().unwrap();
        // 22 byte frame over a 20 byte MTU
        assert_eq!(
            outcome,
            CycleOutcome::Sent {
                frame_id: 0,
                fragments: 2
            }
        );
        assert_eq!(device.transport().sent.concat().len(), protocol().frame_len());
    }

    #[test]
    fn not_ready_drops_without_queueing() {
        let config = scanner_config();
        let v = config.voltage(1500.0);
        let protocol = ProtocolConfig {
            warmup_cycles: 1,
            ..protocol()
        };
        let mut device =
            InsoleDevice::new(Flat(v), config, &protocol, Recorder::default()).unwrap();
        device.cycle().unwrap();

        assert_eq!(device.cycle().unwrap(), CycleOutcome::Skipped);
        device.transport_mut().ready = true;
        // the skipped cycle did not use up a frame id and nothing was queued
        assert_eq!(
            device.cycle().unwrap(),
            CycleOutcome::Sent {
                frame_id: 0,
                fragments: 2
            }
        );
        assert_eq!(device.transport().sent.len(), 2);
        assert_eq!(device.stats().frames_skipped, 1);
    }

    #[test]
    fn channel_transport_fragments_by_mtu() {
        let config = scanner_config();
        let v = config.voltage(1500.0);
        let protocol = ProtocolConfig {
            warmup_cycles: 1,
            mtu: 8,
            fragment_mode: FragmentMode::Sequenced,
            ..protocol()
        };
        let (tx, rx) = channel();
        let mut device =
            InsoleDevice::new(Flat(v), config, &protocol, ChannelTransport::new(tx)).unwrap();

        device.cycle().unwrap();
        let outcome = device.cycle().unwrap();
        // 22 byte frame, 6 payload bytes per fragment
        assert_eq!(
            outcome,
            CycleOutcome::Sent {
                frame_id: 0,
                fragments: 4
            }
        );
        let got: Vec<Vec<u8>> = rx.try_iter().collect();
        assert_eq!(got.len(), 4);
        assert!(got.iter().all(|f| f.len() <= 8));
    }

    #[test]
    fn hung_up_channel_stops_sending() {
        let config = scanner_config();
        let v = config.voltage(1500.0);
        let protocol = ProtocolConfig {
            warmup_cycles: 1,
            ..protocol()
        };
        let (tx, rx) = channel();
        drop(rx);
        let mut device =
            InsoleDevice::new(Flat(v), config, &protocol, ChannelTransport::new(tx)).unwrap();
        device.cycle().unwrap();
        device.cycle().unwrap();
        assert_eq!(device.cycle().unwrap(), CycleOutcome::Skipped);
    }

    #[test]
    fn run_stops_after_requested_cycles() {
        let config = scanner_config();
        let v = config.voltage(1500.0);
        let recorder = Recorder {
            ready: true,
            ..Recorder::default()
        };
        let mut device = InsoleDevice::new(Flat(v), config, &protocol(), recorder).unwrap();
        let stats = device.run(Duration::ZERO, Some(8), |_| true).unwrap();
        assert_eq!(stats.cycles, 8);
        assert_eq!(stats.frames_sent, 3);
    }
}

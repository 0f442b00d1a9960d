//! Receive insole frames from a serial link or a simulated insole and print
//! them as pressure matrices.

use clap::Parser;
use solestream::{
    args::{CommandTask, SimulateCommand, SoleArgs},
    component::spawn_host_pipeline,
    config::ProtocolConfig,
    decoder::{DecodedFrame, DisplayScale, FormatError, NO_SENSOR_MARKER},
    link,
    sequence::{FrameSequence, SequenceEvent},
    simulator::{SimulatedDevice, SimulationSettings},
};

use log::{info, warn};
use std::{error::Error, io, path::PathBuf, sync::mpsc};

// Example:
// cargo run --bin solestream -- simulate --frames 20 --drop 0.05
// cargo run --bin solestream -- --config insole.ron receive --port /dev/ttyUSB0

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = SoleArgs::parse();

    let protocol = match &args.config {
        Some(path) => ProtocolConfig::from_path(path)?,
        None => ProtocolConfig::default(),
    };
    protocol.validate()?;
    let scale = DisplayScale::new(args.display_min, args.display_max, 0.0, 100.0)?
        .for_protocol(&protocol);

    match args.command {
        CommandTask::Config(cmd) => match cmd.outfile {
            Some(path) => protocol.to_path(path)?,
            None => protocol.to_file(&mut io::stdout())?,
        },
        CommandTask::Receive(cmd) => {
            let path = match cmd.port {
                Some(port) => PathBuf::from(port),
                None => ask_for_port()?,
            };
            let port = link::open_port(&path, cmd.baud)?;
            let (tx, rx) = mpsc::channel();
            let _reader = link::spawn_serial_reader(port, tx);
            let (decoded, _stages) = spawn_host_pipeline(&protocol, rx)?;
            print_frames(decoded, &scale, None);
        }
        CommandTask::Simulate(cmd) => simulate(&protocol, &scale, cmd)?,
    }

    Ok(())
}

fn ask_for_port() -> io::Result<PathBuf> {
    println!("Available devices:");
    for port in link::available_ports()? {
        println!("\t{}", port.to_string_lossy());
    }
    println!("Enter the device name: ");
    let mut device_name = String::new();
    io::stdin().read_line(&mut device_name)?;
    Ok(PathBuf::from(device_name.trim()))
}

fn simulate(
    protocol: &ProtocolConfig,
    scale: &DisplayScale,
    cmd: SimulateCommand,
) -> Result<(), Box<dyn Error>> {
    let settings = SimulationSettings {
        scan_rate: cmd.rate,
        drop_chance: cmd.drop_chance,
        seed: cmd.seed,
        ..SimulationSettings::default()
    };
    let (tx, rx) = mpsc::channel();
    let mut device = SimulatedDevice::spawn(protocol, settings, tx)?;
    let (decoded, stages) = spawn_host_pipeline(protocol, rx)?;

    let sequence = print_frames(decoded, scale, Some(cmd.frames));

    if let Some(stats) = device.stop() {
        info!("device: {:?}", stats);
    }
    for stage in stages {
        match stage.join() {
            Ok(Err(e)) => warn!("pipeline stage: {}", e),
            Err(_) => warn!("pipeline stage panicked"),
            Ok(Ok(())) => {}
        }
    }
    println!(
        "received {} frames, {} lost, delivery {:.1}%",
        sequence.received(),
        sequence.missed(),
        sequence.delivery_ratio() * 100.0
    );
    Ok(())
}

/// Print decoded frames until the pipeline closes or `limit` frames have
/// been shown.
fn print_frames(
    decoded: mpsc::Receiver<Result<DecodedFrame, FormatError>>,
    scale: &DisplayScale,
    limit: Option<u64>,
) -> FrameSequence {
    let mut sequence = FrameSequence::new();
    for result in decoded.iter() {
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                warn!("skipping bad frame: {}", e);
                continue;
            }
        };
        if let SequenceEvent::Gap { missed } = sequence.observe(frame.frame_id) {
            println!("-- {} frames lost --", missed);
        }
        println!("frame {}", frame.frame_id);
        for row in frame.rescaled(scale).to_marker_rows(NO_SENSOR_MARKER) {
            let cells: Vec<String> = row.iter().map(|v| format!("{:>6.1}", v)).collect();
            println!("{}", cells.join(""));
        }
        if limit.is_some_and(|n| sequence.received() >= n) {
            break;
        }
    }
    sequence
}

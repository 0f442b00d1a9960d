//! Live pressure heatmap of one insole in the terminal.

use clap::Parser;
use solestream::{
    component::spawn_host_pipeline,
    config::ProtocolConfig,
    decoder::DisplayScale,
    gui::{device_selector, join_worker, pressure_view, LinkChoice},
    link,
    simulator::{SimulatedDevice, SimulationSettings},
};

use log::{info, warn};
use std::{error::Error, path::PathBuf, sync::mpsc};

#[derive(Debug, Parser)]
#[clap(version, about)]
struct MonitorArgs {
    /// Protocol configuration in RON. The reference insole is used if absent
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Baud rate of the serial link
    #[arg(short = 'b', long = "baud", default_value_t = link::DEFAULT_BAUD)]
    baud: u32,

    /// Chance of the simulator losing each fragment, 0 to 1
    #[arg(short = 'd', long = "drop", default_value_t = 0.0)]
    drop_chance: f64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = MonitorArgs::parse();
    let protocol = match &args.config {
        Some(path) => ProtocolConfig::from_path(path)?,
        None => ProtocolConfig::default(),
    };

    let Some(choice) = device_selector(link::available_ports()?)? else {
        return Ok(());
    };

    let (tx, rx) = mpsc::channel();
    let mut simulator = None;
    match &choice {
        LinkChoice::Serial(path) => {
            let port = link::open_port(path, args.baud)?;
            link::spawn_serial_reader(port, tx);
        }
        LinkChoice::Simulator => {
            let settings = SimulationSettings {
                drop_chance: args.drop_chance,
                ..SimulationSettings::default()
            };
            simulator = Some(SimulatedDevice::spawn(&protocol, settings, tx)?);
        }
    }

    let (decoded, stages) = spawn_host_pipeline(&protocol, rx)?;
    let scale = DisplayScale::default().for_protocol(&protocol);
    let summary = pressure_view(decoded, scale)?;

    // a serial reader only notices the closed pipeline on its next read, so
    // only the simulator's stages are waited for
    if let Some(mut device) = simulator {
        device.stop();
        for stage in stages {
            if let Err(e) = join_worker(stage)? {
                warn!("pipeline stage: {}", e);
            }
        }
    }
    info!("monitor closed after {:?}", summary);
    println!(
        "{}: {} frames, {} lost, {} rejected",
        choice, summary.frames, summary.missed, summary.rejected
    );
    Ok(())
}

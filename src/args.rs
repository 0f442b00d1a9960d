//! Commandline argument parser using clap for SoleStream

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Flags shared by every task
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct SoleArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform
    pub command: CommandTask,

    /// Protocol configuration in RON. The reference insole is used if absent
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Resistance shown as full pressure, in ohms
    #[arg(long = "display-min", default_value_t = 700.0, global = true)]
    pub display_min: f32,

    /// Resistance shown as no pressure, in ohms
    #[arg(long = "display-max", default_value_t = 3700.0, global = true)]
    pub display_max: f32,
}

/// The task to run
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Receive frames from an insole over a serial port
    #[command(about)]
    Receive(ReceiveCommand),

    /// Run a simulated insole and receive its frames in-process
    #[command(about)]
    Simulate(SimulateCommand),

    /// Write the protocol configuration out as RON
    #[command(about)]
    Config(ConfigCommand),
}

/// Flags for `receive`
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct ReceiveCommand {
    /// Serial port to read, e.g. /dev/ttyUSB0. Lists ports and asks if absent
    #[arg(short = 'p', long = "port")]
    pub port: Option<String>,

    /// Baud rate of the serial link
    #[arg(short = 'b', long = "baud", default_value_t = 115200)]
    pub baud: u32,
}

/// Flags for `simulate`
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct SimulateCommand {
    /// Stop after this many decoded frames
    #[arg(short = 'n', long = "frames", default_value_t = 200)]
    pub frames: u64,

    /// Scan cycles per second
    #[arg(short = 'r', long = "rate", default_value_t = 50.0)]
    pub rate: f32,

    /// Chance of losing each fragment on the way, 0 to 1
    #[arg(short = 'd', long = "drop", default_value_t = 0.0)]
    pub drop_chance: f64,

    /// Seed for the simulated insole
    #[arg(short = 's', long = "seed", default_value_t = 0x5013)]
    pub seed: u64,
}

/// Flags for `config`
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct ConfigCommand {
    /// Filename for the configuration to be written to, stdout if absent
    #[arg(short = 'o', long = "out")]
    pub outfile: Option<PathBuf>,
}

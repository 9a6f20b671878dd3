//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Generate dynamic help text for the chip argument
fn chip_help() -> String {
    format!(
        "Chip type [available: {}]",
        rblisp_core::chip::chip_names()
    )
}

/// Device backend used to reach the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Serial port or the chip's USB CDC interface
    Serial,
    /// In-memory bootloader emulator for testing
    Dummy,
}

#[derive(Parser)]
#[command(name = "rblisp")]
#[command(author, version, about = "Bouffalo Lab ISP flasher", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device selection shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Chip type
    #[arg(short, long, help = chip_help())]
    pub chip: String,

    /// Serial port (auto-detected from the chip's USB id if not specified)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate (defaults to the chip's bootloader rate)
    #[arg(long)]
    pub baud: Option<u32>,

    /// Device backend
    #[arg(long, value_enum, default_value_t = Backend::Serial)]
    pub backend: Backend,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the eflash loader and start it on the chip
    Write {
        #[command(flatten)]
        device: DeviceArgs,

        /// Directory containing data/<chip>/ (defaults to the executable's directory)
        #[arg(long)]
        loader_dir: Option<PathBuf>,

        /// Firmware image
        input: PathBuf,
    },

    /// Show boot ROM version and chip id
    Info {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// List supported chip types
    ListChips,

    /// List serial ports
    ListPorts,
}

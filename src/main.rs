//! rblisp - Bouffalo Lab ISP flasher
//!
//! Talks to the ROM bootloader of Bouffalo Lab chips over a serial port or
//! the chip's own USB CDC interface, loads the eflash loader shipped in
//! `data/<chip>/` next to the executable and starts it.
//!
//! # Architecture
//!
//! - **rblisp-core** sequences a flashing run against the `DeviceSession`
//!   trait and owns the loader image reader and the chunked transfer
//! - **rblisp-serial** implements `DeviceSession` with the ISP protocol over
//!   `serialport`
//! - **rblisp-dummy** implements it in memory for testing
//!
//! Failures map to distinct process exit codes, see
//! `rblisp_core::Error::exit_code`.

mod backends;
mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }

    let result = match cli.command {
        Commands::Write {
            device,
            loader_dir,
            input,
        } => commands::run_write(&device, loader_dir.as_deref(), &input, running),
        Commands::Info { device } => commands::run_info(&device),
        Commands::ListChips => {
            commands::list_chips();
            Ok(())
        }
        Commands::ListPorts => commands::list_ports(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(e.as_ref()));
    }
}

/// Process exit code for a command error
fn exit_code(err: &(dyn std::error::Error + 'static)) -> i32 {
    match err.downcast_ref::<rblisp_core::Error>() {
        Some(e) => e.exit_code(),
        None => 1,
    }
}

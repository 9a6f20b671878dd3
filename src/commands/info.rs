//! Info command implementation

use rblisp_core::chip::ChipProfile;
use rblisp_core::flasher::Flasher;
use rblisp_core::observer::LogObserver;

use crate::backends;
use crate::cli::DeviceArgs;

/// Connect to the bootloader and print what it reports
pub fn run_info(device: &DeviceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let backend = device.backend;
    let baud = device.baud;

    let mut flasher = Flasher::new(LogObserver);
    let info = flasher.probe(&device.chip, device.port.as_deref(), |profile| {
        backends::init_session(backend, profile, baud)
    })?;

    // probe() already validated the selector
    if let Some(profile) = ChipProfile::find(&device.chip) {
        println!("Chip:            {}", profile.chip_type);
    }
    println!(
        "BootROM version: {}",
        info.rom_version
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(".")
    );
    println!(
        "Chip ID:         {}",
        info.chip_id
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<String>()
    );

    Ok(())
}

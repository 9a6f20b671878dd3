//! List commands implementation

use rblisp_core::chip::SUPPORTED_CHIPS;

use crate::backends;

/// List all supported chips and compiled-in backends
pub fn list_chips() {
    println!("Supported chips:");
    println!();
    println!(
        "{:<10} {:<8} {:>8} {:>10} {:>11}",
        "Name", "Family", "Chunk", "Baud", "USB ID"
    );
    println!("{}", "-".repeat(51));

    for chip in SUPPORTED_CHIPS {
        let usb_str = match chip.usb_id {
            Some((vid, pid)) => format!("{:04x}:{:04x}", vid, pid),
            None => "-".to_string(),
        };
        println!(
            "{:<10} {:<8} {:>8} {:>10} {:>11}",
            chip.type_str,
            chip.chip_type.to_string(),
            chip.chunk_size,
            chip.default_baud,
            usb_str
        );
    }

    println!();
    println!("Backends:");
    for b in backends::available_backends() {
        println!("  {:<8} - {}", b.name, b.description);
    }
}

/// List serial ports, marking those that look like a supported bootloader
#[cfg(feature = "serial")]
pub fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = rblisp_serial::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    for port in &ports {
        let usb_str = port
            .usb_id
            .map(|(vid, pid)| format!("{:04x}:{:04x}", vid, pid))
            .unwrap_or_default();
        let chip = SUPPORTED_CHIPS
            .iter()
            .find(|c| c.usb_id.is_some_and(|id| port.matches(id)))
            .map(|c| format!("[{}]", c.type_str))
            .unwrap_or_default();
        println!(
            "{:<20} {:<10} {:<24} {}",
            port.name,
            usb_str,
            port.product.as_deref().unwrap_or(""),
            chip
        );
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
pub fn list_ports() -> Result<(), Box<dyn std::error::Error>> {
    Err("serial backend not compiled in".into())
}

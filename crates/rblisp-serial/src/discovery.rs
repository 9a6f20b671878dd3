//! Serial port discovery

use rblisp_core::chip::ChipProfile;
use serialport::SerialPortType;

use crate::error::{IspError, Result};

/// A serial port found on the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS name of the port (`/dev/ttyACM0`, `COM3`, ...)
    pub name: String,
    /// USB vendor and product id, if the port is a USB device
    pub usb_id: Option<(u16, u16)>,
    /// USB product string, if reported
    pub product: Option<String>,
}

impl PortInfo {
    /// Whether this port belongs to a device with the given USB id
    pub fn matches(&self, usb_id: (u16, u16)) -> bool {
        self.usb_id == Some(usb_id)
    }
}

/// Enumerate the serial ports present on the system
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(info) => PortInfo {
                name: p.port_name,
                usb_id: Some((info.vid, info.pid)),
                product: info.product,
            },
            _ => PortInfo {
                name: p.port_name,
                usb_id: None,
                product: None,
            },
        })
        .collect())
}

/// Pick the first port with the given USB id
pub fn select_port(ports: &[PortInfo], usb_id: (u16, u16)) -> Option<&PortInfo> {
    ports.iter().find(|p| p.matches(usb_id))
}

/// Find the port a chip's ROM bootloader enumerates as
///
/// Returns the port name and whether it is the chip's own USB interface.
pub fn find_port(profile: &ChipProfile) -> Result<(String, bool)> {
    let usb_id = profile.usb_id.ok_or(IspError::PortNotFound)?;
    let ports = list_ports()?;
    let port = select_port(&ports, usb_id).ok_or(IspError::PortNotFound)?;
    log::debug!(
        "Found {} bootloader on {} ({:04X}:{:04X})",
        profile.chip_type,
        port.name,
        usb_id.0,
        usb_id.1
    );
    Ok((port.name.clone(), true))
}

/// Whether an explicitly named port is the chip's USB interface
///
/// Enumeration failures are treated as "not USB"; the port may still be a
/// plain UART adapter that the OS does not describe.
pub fn port_is_usb(name: &str, profile: &ChipProfile) -> bool {
    let Some(usb_id) = profile.usb_id else {
        return false;
    };
    match list_ports() {
        Ok(ports) => ports.iter().any(|p| p.name == name && p.matches(usb_id)),
        Err(e) => {
            log::debug!("Could not enumerate serial ports: {}", e);
            false
        }
    }
}

//! Chip profiles
//!
//! A profile describes everything the flashing sequence needs to know about
//! one chip family: how it is named on the command line, how large a single
//! segment-data transfer may be, and how its ISP bootloader is reached.

use std::fmt;

use crate::error::{Error, Result};

/// Largest payload accepted by a single segment-data command
///
/// The ISP receive buffer is 4 KiB and the command header takes 4 bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4092;

/// Chip family tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipType {
    /// BL702 / BL704 / BL706
    Bl70x,
}

/// Static description of a supported chip family
#[derive(Debug, Clone, PartialEq)]
pub struct ChipProfile {
    /// Family tag
    pub chip_type: ChipType,
    /// Name used on the command line and in the loader data directory
    pub type_str: &'static str,
    /// Maximum bytes per segment-data transfer
    pub chunk_size: usize,
    /// Handshake duration factor: `multiplier * baud / 10` sync bytes are sent
    pub handshake_byte_multiplier: f32,
    /// Crystal tag selecting the eflash loader variant
    pub default_xtal: &'static str,
    /// Baud rate used for the ISP connection
    pub default_baud: u32,
    /// USB VID/PID of the ROM bootloader's CDC interface, if it has one
    pub usb_id: Option<(u16, u16)>,
    /// Number of chip id bytes reported in the boot info
    pub chip_id_len: usize,
}

/// BL70x profile
pub static BL70X: ChipProfile = ChipProfile {
    chip_type: ChipType::Bl70x,
    type_str: "bl70x",
    chunk_size: DEFAULT_CHUNK_SIZE,
    handshake_byte_multiplier: 0.003,
    default_xtal: "32m",
    default_baud: 460_800,
    usb_id: Some((0xFFFF, 0xFFFF)),
    chip_id_len: 8,
};

/// All chip profiles this build knows about
pub static SUPPORTED_CHIPS: &[&ChipProfile] = &[&BL70X];

impl ChipProfile {
    /// Look up a profile by its command-line name (case-insensitive)
    pub fn find(name: &str) -> Option<&'static ChipProfile> {
        SUPPORTED_CHIPS
            .iter()
            .copied()
            .find(|p| p.type_str.eq_ignore_ascii_case(name))
    }

    /// Resolve a chip-type selector, failing with [`Error::InvalidChip`]
    pub fn resolve(name: &str) -> Result<&'static ChipProfile> {
        Self::find(name).ok_or_else(|| Error::InvalidChip(name.to_string()))
    }

    /// File name of the eflash loader for this profile
    pub fn loader_file_name(&self) -> String {
        format!("eflash_loader_{}.bin", self.default_xtal)
    }

    /// Number of sync bytes to send during a handshake at `baud`
    pub fn handshake_len(&self, baud: u32) -> usize {
        (self.handshake_byte_multiplier * baud as f32 / 10.0) as usize
    }
}

impl fmt::Display for ChipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bl70x => write!(f, "BL70x"),
        }
    }
}

/// Comma-separated list of supported chip names, for help texts
pub fn chip_names() -> String {
    SUPPORTED_CHIPS
        .iter()
        .map(|p| p.type_str)
        .collect::<Vec<_>>()
        .join(", ")
}

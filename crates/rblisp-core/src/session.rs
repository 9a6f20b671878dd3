//! Device session abstraction
//!
//! A [`DeviceSession`] is one live connection to the ROM bootloader of a
//! single device. The orchestrator drives it through a fixed sequence and
//! never shares it: every call blocks until the device has answered.
//!
//! Implementations live in the backend crates (`rblisp-serial`,
//! `rblisp-dummy`); this crate only consumes the trait.

use std::fmt;

use crate::error::DeviceError;

/// Size of the loader image header in bytes
pub const BOOT_HEADER_LEN: usize = 176;

/// Size of a segment header in bytes
pub const SEGMENT_HEADER_LEN: usize = 16;

/// Result type for device operations
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Bootloader identification, fetched once after the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootInfo {
    /// Boot ROM version, most significant part first
    pub rom_version: [u8; 4],
    /// Hardware identifier
    pub chip_id: [u8; 8],
}

impl fmt::Display for BootInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.rom_version;
        write!(f, "BootROM version {}.{}.{}.{}, ChipID: ", a, b, c, d)?;
        for byte in &self.chip_id {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Segment header as stored in the loader image and sent to the device
///
/// All fields are little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentHeader {
    /// Load address of the segment in device memory
    pub dest_addr: u32,
    /// Payload length in bytes; exactly this many bytes follow the header
    pub length: u32,
    /// Reserved, passed through unchanged
    pub reserved: u32,
    /// CRC32 of the header fields, checked by the device
    pub crc32: u32,
}

impl SegmentHeader {
    /// Decode a header from its 16-byte wire form
    pub fn from_bytes(bytes: &[u8; SEGMENT_HEADER_LEN]) -> Self {
        let word = |i: usize| {
            u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
        };
        Self {
            dest_addr: word(0),
            length: word(4),
            reserved: word(8),
            crc32: word(12),
        }
    }

    /// Encode the header into its 16-byte wire form
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_LEN] {
        let mut out = [0u8; SEGMENT_HEADER_LEN];
        out[0..4].copy_from_slice(&self.dest_addr.to_le_bytes());
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        out[8..12].copy_from_slice(&self.reserved.to_le_bytes());
        out[12..16].copy_from_slice(&self.crc32.to_le_bytes());
        out
    }
}

/// A connection to a device's ISP bootloader
///
/// Operations are order-dependent: `open`, `handshake`, `get_boot_info`,
/// `load_boot_header`, then per segment `load_segment_header` followed by
/// `load_segment_data` calls, then `check_image` and `run_image`. `close`
/// releases the transport; it is called exactly once after a successful
/// `open`, whatever happened in between.
pub trait DeviceSession {
    /// Open the transport, either on `port` or on an auto-discovered one
    fn open(&mut self, port: Option<&str>) -> DeviceResult<()>;

    /// Synchronise with the bootloader
    fn handshake(&mut self) -> DeviceResult<()>;

    /// Read the bootloader's version and chip identifier
    fn get_boot_info(&mut self) -> DeviceResult<BootInfo>;

    /// Submit the loader image header
    fn load_boot_header(&mut self, header: &[u8; BOOT_HEADER_LEN]) -> DeviceResult<()>;

    /// Announce the next segment
    fn load_segment_header(&mut self, header: &SegmentHeader) -> DeviceResult<()>;

    /// Submit one chunk of the current segment's payload
    fn load_segment_data(&mut self, data: &[u8]) -> DeviceResult<()>;

    /// Ask the device to verify the loaded image
    fn check_image(&mut self) -> DeviceResult<()>;

    /// Jump into the loaded image
    fn run_image(&mut self) -> DeviceResult<()>;

    /// Release the transport
    fn close(&mut self);
}

impl<S: DeviceSession + ?Sized> DeviceSession for Box<S> {
    fn open(&mut self, port: Option<&str>) -> DeviceResult<()> {
        (**self).open(port)
    }

    fn handshake(&mut self) -> DeviceResult<()> {
        (**self).handshake()
    }

    fn get_boot_info(&mut self) -> DeviceResult<BootInfo> {
        (**self).get_boot_info()
    }

    fn load_boot_header(&mut self, header: &[u8; BOOT_HEADER_LEN]) -> DeviceResult<()> {
        (**self).load_boot_header(header)
    }

    fn load_segment_header(&mut self, header: &SegmentHeader) -> DeviceResult<()> {
        (**self).load_segment_header(header)
    }

    fn load_segment_data(&mut self, data: &[u8]) -> DeviceResult<()> {
        (**self).load_segment_data(data)
    }

    fn check_image(&mut self) -> DeviceResult<()> {
        (**self).check_image()
    }

    fn run_image(&mut self) -> DeviceResult<()> {
        (**self).run_image()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<S: DeviceSession + ?Sized> DeviceSession for &mut S {
    fn open(&mut self, port: Option<&str>) -> DeviceResult<()> {
        (**self).open(port)
    }

    fn handshake(&mut self) -> DeviceResult<()> {
        (**self).handshake()
    }

    fn get_boot_info(&mut self) -> DeviceResult<BootInfo> {
        (**self).get_boot_info()
    }

    fn load_boot_header(&mut self, header: &[u8; BOOT_HEADER_LEN]) -> DeviceResult<()> {
        (**self).load_boot_header(header)
    }

    fn load_segment_header(&mut self, header: &SegmentHeader) -> DeviceResult<()> {
        (**self).load_segment_header(header)
    }

    fn load_segment_data(&mut self, data: &[u8]) -> DeviceResult<()> {
        (**self).load_segment_data(data)
    }

    fn check_image(&mut self) -> DeviceResult<()> {
        (**self).check_image()
    }

    fn run_image(&mut self) -> DeviceResult<()> {
        (**self).run_image()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

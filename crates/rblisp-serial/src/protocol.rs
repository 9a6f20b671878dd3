//! Bouffalo Lab ISP protocol constants and framing
//!
//! Every request is a 4-byte header followed by the payload:
//!
//! ```text
//! +-----+----------+--------+--------+-----------------+
//! | cmd | checksum | len lo | len hi | payload (len)   |
//! +-----+----------+--------+--------+-----------------+
//! ```
//!
//! The bootloader answers `OK` (optionally followed by a little-endian
//! `u16` length and that many bytes), `FL` followed by a `u16` error code,
//! or `PD` while it is still busy.

use rblisp_core::session::BootInfo;

use crate::error::{IspError, Result};

/// Read boot ROM version and chip id
pub const CMD_GET_BOOT_INFO: u8 = 0x10;
/// Load the 176-byte boot header
pub const CMD_LOAD_BOOT_HEADER: u8 = 0x11;
/// Load a 16-byte segment header
pub const CMD_LOAD_SEGMENT_HEADER: u8 = 0x17;
/// Load a chunk of segment data
pub const CMD_LOAD_SEGMENT_DATA: u8 = 0x18;
/// Verify the loaded image
pub const CMD_CHECK_IMAGE: u8 = 0x19;
/// Run the loaded image
pub const CMD_RUN_IMAGE: u8 = 0x1A;

/// Size of the request header
pub const HEADER_LEN: usize = 4;
/// Largest payload that fits in the 4 KiB receive buffer
pub const MAX_PAYLOAD: usize = 4096 - HEADER_LEN;

/// Success status
pub const RESPONSE_OK: [u8; 2] = *b"OK";
/// Failure status, followed by an error code
pub const RESPONSE_FAIL: [u8; 2] = *b"FL";
/// Busy status, the real answer follows later
pub const RESPONSE_PENDING: [u8; 2] = *b"PD";

/// Sync byte repeated during the handshake
pub const HANDSHAKE_BYTE: u8 = 0x55;
/// Sent before the sync bytes to reset a chip attached over USB CDC
pub const USB_RESET_MAGIC: &[u8] = b"BOUFFALOLAB5555RESET\0\0";

/// Offset of the boot ROM version in the boot info payload
pub const BOOT_INFO_VERSION_OFFSET: usize = 0;
/// Offset of the chip id in the boot info payload
pub const BOOT_INFO_CHIP_ID_OFFSET: usize = 12;

/// Checksum over the length field and the payload
pub fn checksum(payload: &[u8]) -> u8 {
    let len = payload.len() as u16;
    let sum = payload
        .iter()
        .fold(u32::from(len & 0xFF) + u32::from(len >> 8), |acc, &b| {
            acc + u32::from(b)
        });
    sum as u8
}

/// Build a complete request frame
pub fn encode_command(cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(IspError::PayloadTooLarge(payload.len()));
    }

    let len = payload.len() as u16;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(cmd);
    frame.push(checksum(payload));
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode a boot info response payload
///
/// `chip_id_len` is the number of id bytes the chip family reports.
pub fn parse_boot_info(payload: &[u8], chip_id_len: usize) -> Result<BootInfo> {
    let id_len = chip_id_len.min(8);
    let expected = BOOT_INFO_CHIP_ID_OFFSET + id_len;
    if payload.len() < expected {
        return Err(IspError::ShortResponse {
            command: CMD_GET_BOOT_INFO,
            expected,
            actual: payload.len(),
        });
    }

    let mut info = BootInfo::default();
    info.rom_version.copy_from_slice(
        &payload[BOOT_INFO_VERSION_OFFSET..BOOT_INFO_VERSION_OFFSET + 4],
    );
    info.chip_id[..id_len]
        .copy_from_slice(&payload[BOOT_INFO_CHIP_ID_OFFSET..BOOT_INFO_CHIP_ID_OFFSET + id_len]);
    Ok(info)
}

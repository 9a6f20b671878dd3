//! ISP device implementation
//!
//! [`Isp`] speaks the ROM bootloader protocol over any [`Transport`]. It
//! knows nothing about port discovery; see [`crate::SerialSession`] for
//! the `DeviceSession` wrapper used by the orchestrator.

use std::time::Duration;

use rblisp_core::chip::ChipProfile;
use rblisp_core::session::{BootInfo, SegmentHeader, BOOT_HEADER_LEN, SEGMENT_HEADER_LEN};

use crate::error::{IspError, Result};
use crate::protocol::*;
use crate::transport::Transport;

/// Number of handshake attempts before giving up
const HANDSHAKE_ATTEMPTS: usize = 5;
/// Time to wait for `OK` after the sync bytes
const HANDSHAKE_TIMEOUT_MS: u32 = 50;
/// Delay after the USB reset magic, while the chip re-enumerates its ROM
const USB_RESET_DELAY: Duration = Duration::from_millis(50);
/// Upper bound on consecutive `PD` answers for one command
const MAX_PENDING: usize = 1000;

/// Bouffalo ISP bootloader connection
pub struct Isp<T: Transport> {
    /// Transport layer
    transport: T,
    /// Chip family being programmed
    profile: &'static ChipProfile,
    /// Baud rate, used to size the handshake
    baud: u32,
    /// Whether the port is the chip's own USB CDC interface
    is_usb: bool,
}

impl<T: Transport> Isp<T> {
    /// Wrap an open transport
    pub fn new(transport: T, profile: &'static ChipProfile, baud: u32, is_usb: bool) -> Self {
        Self {
            transport,
            profile,
            baud,
            is_usb,
        }
    }

    /// Get the underlying transport back
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Synchronise with the bootloader
    ///
    /// Sends a burst of `0x55` sized for the current baud rate and waits for
    /// `OK`. Over USB the reset magic goes out first so the ROM restarts its
    /// ISP state machine.
    pub fn handshake(&mut self) -> Result<()> {
        let sync = vec![HANDSHAKE_BYTE; self.profile.handshake_len(self.baud).max(1)];

        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            self.transport.clear_input()?;

            if self.is_usb {
                self.transport.write(USB_RESET_MAGIC)?;
                self.transport.flush()?;
                std::thread::sleep(USB_RESET_DELAY);
            }

            self.transport.write(&sync)?;
            self.transport.flush()?;

            let mut resp = [0u8; 2];
            let n = self.read_with_timeout(&mut resp, HANDSHAKE_TIMEOUT_MS)?;
            if n == resp.len() && resp == RESPONSE_OK {
                log::debug!("isp: Handshake OK after {} attempt(s)", attempt);
                return Ok(());
            }

            log::debug!(
                "isp: Handshake attempt {} got {:02X?}",
                attempt,
                &resp[..n]
            );
        }

        Err(IspError::NoResponse)
    }

    /// Read boot ROM version and chip id
    pub fn get_boot_info(&mut self) -> Result<BootInfo> {
        let payload = self.command(CMD_GET_BOOT_INFO, &[], true)?;
        let info = parse_boot_info(&payload, self.profile.chip_id_len)?;
        log::debug!("isp: {}", info);
        Ok(info)
    }

    /// Load the boot header of the image to be run
    pub fn load_boot_header(&mut self, header: &[u8; BOOT_HEADER_LEN]) -> Result<()> {
        self.command(CMD_LOAD_BOOT_HEADER, header, false)?;
        Ok(())
    }

    /// Load a segment header
    ///
    /// The bootloader echoes the header back; a differing echo is logged
    /// but not treated as an error, the following data transfer will fail
    /// if the device really misunderstood it.
    pub fn load_segment_header(&mut self, header: &SegmentHeader) -> Result<()> {
        let raw = header.to_bytes();
        let echo = self.command(CMD_LOAD_SEGMENT_HEADER, &raw, true)?;
        if echo.len() >= SEGMENT_HEADER_LEN && echo[..SEGMENT_HEADER_LEN] != raw {
            log::warn!(
                "isp: Segment header echo differs: sent {:02X?}, got {:02X?}",
                raw,
                &echo[..SEGMENT_HEADER_LEN]
            );
        }
        Ok(())
    }

    /// Load one chunk of segment data
    pub fn load_segment_data(&mut self, data: &[u8]) -> Result<()> {
        self.command(CMD_LOAD_SEGMENT_DATA, data, false)?;
        Ok(())
    }

    /// Ask the bootloader to verify the loaded image
    pub fn check_image(&mut self) -> Result<()> {
        self.command(CMD_CHECK_IMAGE, &[], false)?;
        Ok(())
    }

    /// Jump into the loaded image
    pub fn run_image(&mut self) -> Result<()> {
        self.command(CMD_RUN_IMAGE, &[], false)?;
        Ok(())
    }

    // ---- Protocol implementation ----

    /// Send a command and wait for its response
    ///
    /// Returns the response payload when `expect_data` is set, an empty
    /// vector otherwise.
    fn command(&mut self, cmd: u8, payload: &[u8], expect_data: bool) -> Result<Vec<u8>> {
        let frame = encode_command(cmd, payload)?;
        log::trace!("isp: > cmd 0x{:02X}, {} byte payload", cmd, payload.len());
        self.transport.write(&frame)?;
        self.transport.flush()?;
        self.receive_response(cmd, expect_data)
    }

    fn receive_response(&mut self, cmd: u8, expect_data: bool) -> Result<Vec<u8>> {
        for _ in 0..MAX_PENDING {
            let mut status = [0u8; 2];
            self.transport.read(&mut status)?;

            match status {
                RESPONSE_OK => {
                    if !expect_data {
                        return Ok(Vec::new());
                    }
                    let mut len = [0u8; 2];
                    self.transport.read(&mut len)?;
                    let mut data = vec![0u8; u16::from_le_bytes(len) as usize];
                    self.transport.read(&mut data)?;
                    log::trace!("isp: < OK, {} bytes", data.len());
                    return Ok(data);
                }
                RESPONSE_FAIL => {
                    let mut code = [0u8; 2];
                    self.transport.read(&mut code)?;
                    let code = u16::from_le_bytes(code);
                    log::debug!("isp: Command 0x{:02X} failed with 0x{:04X}", cmd, code);
                    return Err(IspError::Failed(code));
                }
                RESPONSE_PENDING => {
                    log::trace!("isp: < PD");
                    continue;
                }
                response => {
                    return Err(IspError::InvalidResponse {
                        command: cmd,
                        response,
                    })
                }
            }
        }

        Err(IspError::NoResponse)
    }

    /// Fill `buf` from non-blocking reads until it is full or a read times out
    fn read_with_timeout(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .transport
                .read_nonblock(&mut buf[filled..], timeout_ms)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rblisp_core::chip::BL70X;
    use std::collections::VecDeque;

    /// Transport replaying scripted device output and capturing host output
    #[derive(Default)]
    struct MockTransport {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        clears: usize,
    }

    impl MockTransport {
        fn with_rx(rx: &[u8]) -> Self {
            Self {
                rx: rx.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.tx.extend_from_slice(data);
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            if self.rx.len() < buf.len() {
                return Err(IspError::NoResponse);
            }
            for b in buf.iter_mut() {
                *b = self.rx.pop_front().unwrap();
            }
            Ok(())
        }

        fn read_nonblock(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize> {
            let n = buf.len().min(self.rx.len());
            for b in buf[..n].iter_mut() {
                *b = self.rx.pop_front().unwrap();
            }
            Ok(n)
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn clear_input(&mut self) -> Result<()> {
            self.clears += 1;
            Ok(())
        }
    }

    fn isp(rx: &[u8]) -> Isp<MockTransport> {
        Isp::new(MockTransport::with_rx(rx), &BL70X, 460_800, false)
    }

    #[test]
    fn test_handshake_sends_sync_bytes() {
        let mut isp = isp(b"OK");
        isp.handshake().unwrap();

        let t = isp.into_transport();
        assert_eq!(t.tx.len(), 138);
        assert!(t.tx.iter().all(|&b| b == HANDSHAKE_BYTE));
        assert_eq!(t.clears, 1);
    }

    #[test]
    fn test_handshake_over_usb_sends_reset_magic() {
        let mut isp = Isp::new(MockTransport::with_rx(b"OK"), &BL70X, 460_800, true);
        isp.handshake().unwrap();

        let t = isp.into_transport();
        assert!(t.tx.starts_with(USB_RESET_MAGIC));
        assert_eq!(t.tx.len(), USB_RESET_MAGIC.len() + 138);
    }

    #[test]
    fn test_handshake_gives_up() {
        let mut isp = isp(b"");
        assert!(matches!(isp.handshake(), Err(IspError::NoResponse)));
        assert_eq!(isp.into_transport().clears, HANDSHAKE_ATTEMPTS);
    }

    #[test]
    fn test_get_boot_info() {
        let mut rx = b"OK".to_vec();
        rx.extend_from_slice(&24u16.to_le_bytes());
        let mut payload = [0u8; 24];
        payload[0..4].copy_from_slice(&[1, 0, 2, 7]);
        payload[12..20].copy_from_slice(&[0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7]);
        rx.extend_from_slice(&payload);

        let mut isp = isp(&rx);
        let info = isp.get_boot_info().unwrap();
        assert_eq!(info.rom_version, [1, 0, 2, 7]);
        assert_eq!(info.chip_id[7], 0xA7);
        assert_eq!(isp.into_transport().tx, vec![CMD_GET_BOOT_INFO, 0, 0, 0]);
    }

    #[test]
    fn test_load_boot_header_frame() {
        let mut isp = isp(b"OK");
        isp.load_boot_header(&[0x01; BOOT_HEADER_LEN]).unwrap();

        let tx = isp.into_transport().tx;
        assert_eq!(tx.len(), HEADER_LEN + BOOT_HEADER_LEN);
        assert_eq!(tx[0], CMD_LOAD_BOOT_HEADER);
        assert_eq!(&tx[2..4], &(BOOT_HEADER_LEN as u16).to_le_bytes());
    }

    #[test]
    fn test_load_segment_header_reads_echo() {
        let header = SegmentHeader {
            dest_addr: 0x2201_0000,
            length: 1234,
            reserved: 0,
            crc32: 0x1122_3344,
        };
        let mut rx = b"OK".to_vec();
        rx.extend_from_slice(&16u16.to_le_bytes());
        rx.extend_from_slice(&header.to_bytes());
        // Next response must still be readable, so the echo was consumed
        rx.extend_from_slice(b"OK");

        let mut isp = isp(&rx);
        isp.load_segment_header(&header).unwrap();
        isp.check_image().unwrap();
    }

    #[test]
    fn test_failure_code() {
        let mut rx = b"FL".to_vec();
        rx.extend_from_slice(&0x0204u16.to_le_bytes());
        let mut isp = isp(&rx);
        assert!(matches!(isp.run_image(), Err(IspError::Failed(0x0204))));
    }

    #[test]
    fn test_pending_then_ok() {
        let mut isp = isp(b"PDPDOK");
        isp.check_image().unwrap();
    }

    #[test]
    fn test_invalid_status() {
        let mut isp = isp(b"??");
        assert!(matches!(
            isp.load_segment_data(&[1, 2, 3]),
            Err(IspError::InvalidResponse {
                command: CMD_LOAD_SEGMENT_DATA,
                response: [b'?', b'?']
            })
        ));
    }

    #[test]
    fn test_oversized_chunk_is_not_sent() {
        let mut isp = isp(b"OK");
        assert!(matches!(
            isp.load_segment_data(&[0u8; MAX_PAYLOAD + 1]),
            Err(IspError::PayloadTooLarge(_))
        ));
        assert!(isp.into_transport().tx.is_empty());
    }

    #[test]
    fn test_silent_device() {
        let mut isp = isp(b"");
        assert!(matches!(isp.check_image(), Err(IspError::NoResponse)));
    }
}

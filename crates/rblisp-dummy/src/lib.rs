//! rblisp-dummy - In-memory ISP bootloader emulator for testing
//!
//! This crate provides a dummy device session that behaves like a chip's
//! ROM bootloader: it enforces the command order, checks that every
//! segment receives exactly the announced number of bytes, and keeps what
//! it was sent. It's useful for testing and development without real
//! hardware.

use rblisp_core::session::{
    BootInfo, DeviceResult, DeviceSession, SegmentHeader, BOOT_HEADER_LEN,
};
use rblisp_core::{DeviceError, Step};

/// Error code for a command sent before the handshake
pub const ERR_NOT_SYNCED: u16 = 0x0001;
/// Error code for a command sent out of order
pub const ERR_SEQUENCE: u16 = 0x0002;
/// Error code for segment data beyond the announced length
pub const ERR_SEGMENT_OVERFLOW: u16 = 0x0003;
/// Error code for an image check with incomplete segments
pub const ERR_IMAGE_INCOMPLETE: u16 = 0x0004;
/// Error code used for injected failures
pub const ERR_INJECTED: u16 = 0x00FF;

/// Configuration for the dummy bootloader
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Boot ROM version reported by `get_boot_info`
    pub rom_version: [u8; 4],
    /// Chip id reported by `get_boot_info`
    pub chip_id: [u8; 8],
    /// Make the given step fail with [`ERR_INJECTED`]
    pub fail_at: Option<Step>,
    /// Fail `open` as if no device were attached
    pub absent: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            rom_version: [1, 0, 2, 7],
            chip_id: [0x00, 0x00, 0x5A, 0x91, 0xC4, 0x0F, 0x02, 0x80],
            fail_at: None,
            absent: false,
        }
    }
}

/// A segment as received by the dummy bootloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSegment {
    /// Header announced for the segment
    pub header: SegmentHeader,
    /// Payload received so far
    pub data: Vec<u8>,
}

impl LoadedSegment {
    fn is_complete(&self) -> bool {
        self.data.len() == self.header.length as usize
    }
}

/// Dummy ISP bootloader
///
/// Emulates the ROM bootloader in memory for testing purposes.
#[derive(Debug, Default)]
pub struct DummyBootloader {
    config: DummyConfig,
    port: Option<String>,
    open: bool,
    synced: bool,
    boot_header: Option<[u8; BOOT_HEADER_LEN]>,
    segments: Vec<LoadedSegment>,
    checked: bool,
    running: bool,
    chunks: Vec<usize>,
    close_count: usize,
}

impl DummyBootloader {
    /// Create a new dummy bootloader with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Create a new dummy bootloader with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Port name passed to `open`, if any
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Boot header received, if any
    pub fn boot_header(&self) -> Option<&[u8; BOOT_HEADER_LEN]> {
        self.boot_header.as_ref()
    }

    /// Segments received so far
    pub fn segments(&self) -> &[LoadedSegment] {
        &self.segments
    }

    /// Sizes of all data chunks in the order they were received
    pub fn chunks(&self) -> &[usize] {
        &self.chunks
    }

    /// Whether the image was checked successfully
    pub fn checked(&self) -> bool {
        self.checked
    }

    /// Whether `run_image` was accepted
    pub fn running(&self) -> bool {
        self.running
    }

    /// How many times `close` was called
    pub fn close_count(&self) -> usize {
        self.close_count
    }

    fn enter(&self, step: Step) -> DeviceResult<()> {
        if !self.open {
            return Err(DeviceError::NotConnected);
        }
        if self.config.fail_at == Some(step) {
            log::debug!("dummy: Injected failure at {}", step);
            return Err(DeviceError::Rejected(ERR_INJECTED));
        }
        if step != Step::Handshake && !self.synced {
            return Err(DeviceError::Rejected(ERR_NOT_SYNCED));
        }
        Ok(())
    }

    fn current_segment(&mut self) -> Option<&mut LoadedSegment> {
        self.segments.last_mut().filter(|s| !s.is_complete())
    }

    fn all_segments_complete(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(LoadedSegment::is_complete)
    }
}

impl DeviceSession for DummyBootloader {
    fn open(&mut self, port: Option<&str>) -> DeviceResult<()> {
        if self.config.absent {
            return Err(DeviceError::PortNotFound);
        }
        log::debug!("dummy: Opened on {}", port.unwrap_or("<auto>"));
        self.port = port.map(str::to_string);
        self.open = true;
        Ok(())
    }

    fn handshake(&mut self) -> DeviceResult<()> {
        self.enter(Step::Handshake)?;
        self.synced = true;
        Ok(())
    }

    fn get_boot_info(&mut self) -> DeviceResult<BootInfo> {
        self.enter(Step::BootInfo)?;
        Ok(BootInfo {
            rom_version: self.config.rom_version,
            chip_id: self.config.chip_id,
        })
    }

    fn load_boot_header(&mut self, header: &[u8; BOOT_HEADER_LEN]) -> DeviceResult<()> {
        self.enter(Step::LoadBootHeader)?;
        self.boot_header = Some(*header);
        self.segments.clear();
        self.checked = false;
        Ok(())
    }

    fn load_segment_header(&mut self, header: &SegmentHeader) -> DeviceResult<()> {
        self.enter(Step::LoadSegmentHeader)?;
        if self.boot_header.is_none() || self.current_segment().is_some() {
            return Err(DeviceError::Rejected(ERR_SEQUENCE));
        }
        log::trace!(
            "dummy: Segment of {} bytes to 0x{:08X}",
            header.length,
            header.dest_addr
        );
        self.segments.push(LoadedSegment {
            header: *header,
            data: Vec::with_capacity(header.length as usize),
        });
        Ok(())
    }

    fn load_segment_data(&mut self, data: &[u8]) -> DeviceResult<()> {
        self.enter(Step::LoadSegmentData)?;
        let segment = self
            .current_segment()
            .ok_or(DeviceError::Rejected(ERR_SEQUENCE))?;
        if segment.data.len() + data.len() > segment.header.length as usize {
            return Err(DeviceError::Rejected(ERR_SEGMENT_OVERFLOW));
        }
        segment.data.extend_from_slice(data);
        self.chunks.push(data.len());
        Ok(())
    }

    fn check_image(&mut self) -> DeviceResult<()> {
        self.enter(Step::CheckImage)?;
        if !self.all_segments_complete() {
            return Err(DeviceError::Rejected(ERR_IMAGE_INCOMPLETE));
        }
        self.checked = true;
        Ok(())
    }

    fn run_image(&mut self) -> DeviceResult<()> {
        self.enter(Step::RunImage)?;
        if !self.checked {
            return Err(DeviceError::Rejected(ERR_SEQUENCE));
        }
        self.running = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.synced = false;
        self.close_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rblisp_core::chip::BL70X;
    use rblisp_core::flasher::{FlashConfig, Flasher};
    use rblisp_core::loader::loader_path;
    use rblisp_core::observer::NoObserver;
    use rblisp_core::Error;
    use tempfile::TempDir;

    fn header(len: u32) -> SegmentHeader {
        SegmentHeader {
            dest_addr: 0x2201_0000,
            length: len,
            reserved: 0,
            crc32: 0xDEAD_BEEF,
        }
    }

    /// Loader directory with an image of the given segments, plus a
    /// firmware input file
    fn setup(segment_lengths: &[u32]) -> (TempDir, FlashConfig) {
        let dir = tempfile::tempdir().unwrap();
        let path = loader_path(dir.path(), &BL70X);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut image = vec![0xA5; BOOT_HEADER_LEN];
        for (i, &len) in segment_lengths.iter().enumerate() {
            image.extend_from_slice(&header(len).to_bytes());
            image.extend((0..len).map(|b| (b as u8).wrapping_add(i as u8)));
        }
        std::fs::write(&path, image).unwrap();

        let input = dir.path().join("app.bin");
        std::fs::write(&input, b"firmware").unwrap();

        let mut config = FlashConfig::new("bl70x", input);
        config.port = Some("dummy0".to_string());
        config.loader_dir = Some(dir.path().to_path_buf());
        (dir, config)
    }

    #[test]
    fn test_flash_against_dummy() {
        let (_dir, config) = setup(&[10_000, 300]);
        let mut device = DummyBootloader::new_default();

        let summary = Flasher::new(NoObserver)
            .run(&config, |_| Ok(&mut device))
            .unwrap();

        assert_eq!(summary.segment_lengths, vec![10_000, 300]);
        assert_eq!(summary.boot_info.rom_version, [1, 0, 2, 7]);
        assert_eq!(device.port(), Some("dummy0"));
        assert_eq!(device.boot_header(), Some(&[0xA5; BOOT_HEADER_LEN]));
        assert_eq!(device.chunks(), &[4092, 4092, 1816, 300]);
        assert_eq!(device.segments()[1].data[0], 1);
        assert!(device.checked());
        assert!(device.running());
        assert_eq!(device.close_count(), 1);
    }

    #[test]
    fn test_injected_failure_closes_session() {
        let (_dir, config) = setup(&[100]);
        let mut device = DummyBootloader::new(DummyConfig {
            fail_at: Some(Step::CheckImage),
            ..Default::default()
        });

        let err = Flasher::new(NoObserver)
            .run(&config, |_| Ok(&mut device))
            .unwrap_err();

        assert_eq!(err.step(), Some(Step::CheckImage));
        assert!(!device.running());
        assert_eq!(device.close_count(), 1);
    }

    #[test]
    fn test_absent_device() {
        let (_dir, config) = setup(&[100]);
        let mut device = DummyBootloader::new(DummyConfig {
            absent: true,
            ..Default::default()
        });

        let err = Flasher::new(NoObserver)
            .run(&config, |_| Ok(&mut device))
            .unwrap_err();

        assert!(matches!(err, Error::Connection(DeviceError::PortNotFound)));
        assert_eq!(device.close_count(), 0);
    }

    #[test]
    fn test_requires_handshake() {
        let mut device = DummyBootloader::new_default();
        device.open(None).unwrap();
        assert_eq!(
            device.get_boot_info(),
            Err(DeviceError::Rejected(ERR_NOT_SYNCED))
        );
    }

    #[test]
    fn test_segment_overflow() {
        let mut device = DummyBootloader::new_default();
        device.open(None).unwrap();
        device.handshake().unwrap();
        device.load_boot_header(&[0; BOOT_HEADER_LEN]).unwrap();
        device.load_segment_header(&header(4)).unwrap();

        assert_eq!(
            device.load_segment_data(&[0; 5]),
            Err(DeviceError::Rejected(ERR_SEGMENT_OVERFLOW))
        );
        device.load_segment_data(&[0; 4]).unwrap();
        assert_eq!(
            device.load_segment_data(&[0]),
            Err(DeviceError::Rejected(ERR_SEQUENCE))
        );
    }

    #[test]
    fn test_check_requires_complete_segments() {
        let mut device = DummyBootloader::new_default();
        device.open(None).unwrap();
        device.handshake().unwrap();
        device.load_boot_header(&[0; BOOT_HEADER_LEN]).unwrap();
        device.load_segment_header(&header(8)).unwrap();
        device.load_segment_data(&[0; 4]).unwrap();

        assert_eq!(
            device.check_image(),
            Err(DeviceError::Rejected(ERR_IMAGE_INCOMPLETE))
        );
        assert_eq!(device.run_image(), Err(DeviceError::Rejected(ERR_SEQUENCE)));
    }
}

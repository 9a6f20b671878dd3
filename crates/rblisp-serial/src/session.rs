//! [`DeviceSession`] backed by a real serial port

use rblisp_core::chip::ChipProfile;
use rblisp_core::session::{
    BootInfo, DeviceResult, DeviceSession, SegmentHeader, BOOT_HEADER_LEN,
};
use rblisp_core::DeviceError;

use crate::device::Isp;
use crate::discovery;
use crate::transport::serial::SerialTransport;

/// Serial ISP session for one chip family
pub struct SerialSession {
    profile: &'static ChipProfile,
    baud: u32,
    isp: Option<Isp<SerialTransport>>,
}

impl SerialSession {
    /// Prepare a session; the port is opened by [`DeviceSession::open`]
    ///
    /// `baud` defaults to the chip's ROM bootloader rate.
    pub fn new(profile: &'static ChipProfile, baud: Option<u32>) -> DeviceResult<Self> {
        let baud = baud.unwrap_or(profile.default_baud);
        if baud == 0 {
            return Err(DeviceError::Io("baud rate must be non-zero".into()));
        }
        Ok(Self {
            profile,
            baud,
            isp: None,
        })
    }

    /// Baud rate the port is (or will be) opened at
    pub fn baud(&self) -> u32 {
        self.baud
    }

    fn isp(&mut self) -> DeviceResult<&mut Isp<SerialTransport>> {
        self.isp.as_mut().ok_or(DeviceError::NotConnected)
    }
}

impl DeviceSession for SerialSession {
    fn open(&mut self, port: Option<&str>) -> DeviceResult<()> {
        let (name, is_usb) = match port {
            Some(name) => (name.to_string(), discovery::port_is_usb(name, self.profile)),
            None => discovery::find_port(self.profile)?,
        };

        let transport = SerialTransport::open(&name, self.baud)?;
        log::debug!(
            "Using {} ({})",
            transport.name(),
            if is_usb { "USB" } else { "UART" }
        );
        self.isp = Some(Isp::new(transport, self.profile, self.baud, is_usb));
        Ok(())
    }

    fn handshake(&mut self) -> DeviceResult<()> {
        Ok(self.isp()?.handshake()?)
    }

    fn get_boot_info(&mut self) -> DeviceResult<BootInfo> {
        Ok(self.isp()?.get_boot_info()?)
    }

    fn load_boot_header(&mut self, header: &[u8; BOOT_HEADER_LEN]) -> DeviceResult<()> {
        Ok(self.isp()?.load_boot_header(header)?)
    }

    fn load_segment_header(&mut self, header: &SegmentHeader) -> DeviceResult<()> {
        Ok(self.isp()?.load_segment_header(header)?)
    }

    fn load_segment_data(&mut self, data: &[u8]) -> DeviceResult<()> {
        Ok(self.isp()?.load_segment_data(data)?)
    }

    fn check_image(&mut self) -> DeviceResult<()> {
        Ok(self.isp()?.check_image()?)
    }

    fn run_image(&mut self) -> DeviceResult<()> {
        Ok(self.isp()?.run_image()?)
    }

    fn close(&mut self) {
        if let Some(isp) = self.isp.take() {
            log::debug!("Closing {}", isp.into_transport().name());
        }
    }
}

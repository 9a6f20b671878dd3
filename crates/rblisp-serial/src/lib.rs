//! rblisp-serial - Bouffalo Lab ISP bootloader over serial ports
//!
//! This crate implements the ROM bootloader's In-System Programming
//! protocol and exposes it as a [`rblisp_core::session::DeviceSession`].
//!
//! # Protocol Overview
//!
//! After a sync burst of `0x55` bytes the bootloader accepts framed
//! commands (`cmd`, checksum, little-endian length, payload) and answers
//! each with `OK`, `FL` plus an error code, or `PD` while busy. Chips
//! attached through their own USB CDC interface additionally expect a
//! reset magic string before the sync burst.
//!
//! # Supported Transports
//!
//! - USB CDC: the port is found by the chip's USB id when none is given
//! - UART adapters: `/dev/ttyUSB0`, `COM3`, etc.
//!
//! # Example
//!
//! ```no_run
//! use rblisp_core::chip::BL70X;
//! use rblisp_serial::{Isp, SerialTransport};
//!
//! let transport = SerialTransport::open("/dev/ttyACM0", BL70X.default_baud)?;
//! let mut isp = Isp::new(transport, &BL70X, BL70X.default_baud, true);
//! isp.handshake()?;
//! println!("{}", isp.get_boot_info()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use device::Isp;
pub use discovery::{list_ports, PortInfo};
pub use error::{IspError, Result};
pub use session::SerialSession;
pub use transport::serial::SerialTransport;
pub use transport::Transport;

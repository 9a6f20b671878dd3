//! rblisp-core - Flashing orchestration for Bouffalo Lab ISP bootloaders
//!
//! This crate sequences a complete flashing run against a device's ROM
//! bootloader: handshake, boot info, eflash loader header, chunked segment
//! transfer, image check and execution. The device itself is reached
//! through the [`session::DeviceSession`] trait, implemented by the backend
//! crates (`rblisp-serial`, `rblisp-dummy`).
//!
//! # Example
//!
//! ```ignore
//! use rblisp_core::{flasher::{FlashConfig, Flasher}, observer::LogObserver};
//!
//! let config = FlashConfig::new("bl70x", "firmware.bin");
//! let mut flasher = Flasher::new(LogObserver);
//! flasher.run(&config, |profile| rblisp_serial::SerialSession::new(profile, None))?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod chip;
pub mod error;
pub mod flasher;
pub mod loader;
pub mod observer;
pub mod platform;
pub mod session;
pub mod transfer;

pub use error::{DeviceError, Error, Result, Step};

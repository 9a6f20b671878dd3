//! Backend registration and dispatch
//!
//! Backends are feature-gated; a backend that was not compiled in is still
//! accepted on the command line but fails to initialise.

use rblisp_core::chip::ChipProfile;
use rblisp_core::session::{DeviceResult, DeviceSession};
use rblisp_core::DeviceError;

use crate::cli::Backend;

/// Information about a backend
pub struct BackendInfo {
    /// Name as accepted by `--backend`
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "serial")]
    backends.push(BackendInfo {
        name: "serial",
        description: "ISP over a serial port or the chip's USB CDC interface",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        description: "In-memory bootloader emulator for testing",
    });

    backends
}

/// Create a device session for `profile` on the selected backend
#[allow(unused_variables)]
pub fn init_session(
    backend: Backend,
    profile: &'static ChipProfile,
    baud: Option<u32>,
) -> DeviceResult<Box<dyn DeviceSession>> {
    match backend {
        #[cfg(feature = "serial")]
        Backend::Serial => Ok(Box::new(rblisp_serial::SerialSession::new(profile, baud)?)),

        #[cfg(feature = "dummy")]
        Backend::Dummy => {
            log::info!("Using in-memory {} bootloader", profile.chip_type);
            Ok(Box::new(rblisp_dummy::DummyBootloader::new_default()))
        }

        #[allow(unreachable_patterns)]
        other => Err(DeviceError::Io(format!(
            "backend '{:?}' not compiled in",
            other
        ))),
    }
}

//! Error types for rblisp-core
//!
//! Every failure of a flashing run is terminal. The variants are kept
//! distinct so a front-end can tell exactly which step went wrong and map
//! it to an actionable message or exit code.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Device operation that was in progress when the device rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Bootloader handshake
    Handshake,
    /// Boot info retrieval
    BootInfo,
    /// Submitting the 176-byte loader header
    LoadBootHeader,
    /// Submitting a 16-byte segment header
    LoadSegmentHeader,
    /// Submitting one chunk of segment payload
    LoadSegmentData,
    /// Device-side integrity check of the loaded image
    CheckImage,
    /// Jumping into the loaded image
    RunImage,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake => write!(f, "handshake with device"),
            Self::BootInfo => write!(f, "get boot info"),
            Self::LoadBootHeader => write!(f, "load boot header"),
            Self::LoadSegmentHeader => write!(f, "load segment header"),
            Self::LoadSegmentData => write!(f, "load segment data"),
            Self::CheckImage => write!(f, "check image"),
            Self::RunImage => write!(f, "run image"),
        }
    }
}

/// Errors reported by a [`DeviceSession`](crate::session::DeviceSession)
///
/// Backends convert their own error types into this one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device did not answer in time
    #[error("no response from device")]
    NoResponse,

    /// The bootloader answered with a failure code
    #[error("device rejected the request (error code 0x{0:04X})")]
    Rejected(u16),

    /// The bootloader answered with something that is not a valid response
    #[error("invalid response from device: {0}")]
    InvalidResponse(String),

    /// An operation was attempted before the session was opened
    #[error("session is not connected")]
    NotConnected,

    /// Auto-discovery did not find a matching serial port
    #[error("no matching serial port found")]
    PortNotFound,

    /// Transport-level I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for DeviceError {
    fn from(e: io::Error) -> Self {
        DeviceError::Io(e.to_string())
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// The chip-type selector is not in the supported set
    #[error("Chip type is invalid: {0}")]
    InvalidChip(String),

    /// The firmware file to write does not exist
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The location of the running executable could not be determined
    #[error("Cannot determine executable location: {0}")]
    Resolution(#[source] io::Error),

    /// The loader image is missing at the resolved path
    #[error("Loader image not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The loader image ended before a declared structure was complete
    #[error("Loader image truncated while reading {what} ({expected} bytes expected)")]
    TruncatedFile {
        /// Structure being read
        what: &'static str,
        /// Number of bytes that were required
        expected: usize,
    },

    /// The loader image has a header but no segment records
    #[error("Loader image contains no segments")]
    NoSegments,

    /// The transfer chunk size must be non-zero
    #[error("Invalid transfer chunk size: {0}")]
    InvalidChunkSize(usize),

    /// The device session could not be initialised
    #[error("Failed to init device: {0}")]
    DeviceInit(#[source] DeviceError),

    /// The transport could not be opened
    #[error("Failed to open device: {0}")]
    Connection(#[source] DeviceError),

    /// The device rejected a step of the flashing sequence
    #[error("Failed to {step}: {source}")]
    Protocol {
        /// Step that failed
        step: Step,
        /// Underlying device error
        #[source]
        source: DeviceError,
    },

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The run was cancelled at a chunk boundary
    #[error("Operation cancelled by user")]
    Cancelled,
}

impl Error {
    /// Build a protocol error for `step`
    pub fn protocol(step: Step, source: DeviceError) -> Self {
        Error::Protocol { step, source }
    }

    /// The step that produced this error, for protocol failures
    pub fn step(&self) -> Option<Step> {
        match self {
            Error::Protocol { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Process exit code for this outcome
    ///
    /// Each failure category maps to its own code so scripts can react to
    /// it. Success is 0 and is not represented here.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidChip(_) | Error::InputNotFound(_) | Error::InvalidChunkSize(_) => 2,
            Error::Resolution(_) => 3,
            Error::FileNotFound(_) => 4,
            Error::TruncatedFile { .. } | Error::NoSegments => 5,
            Error::DeviceInit(_) => 6,
            Error::Connection(_) => 7,
            Error::Protocol { step, .. } => match step {
                Step::Handshake => 10,
                Step::BootInfo => 11,
                Step::LoadBootHeader => 12,
                Step::LoadSegmentHeader => 13,
                Step::LoadSegmentData => 14,
                Step::CheckImage => 15,
                Step::RunImage => 16,
            },
            Error::Io(_) => 20,
            Error::Cancelled => 130,
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_message_names_step() {
        let err = Error::protocol(Step::Handshake, DeviceError::NoResponse);
        assert_eq!(
            err.to_string(),
            "Failed to handshake with device: no response from device"
        );
        assert_eq!(err.step(), Some(Step::Handshake));
    }

    #[test]
    fn test_exit_codes_are_distinct_per_step() {
        let steps = [
            Step::Handshake,
            Step::BootInfo,
            Step::LoadBootHeader,
            Step::LoadSegmentHeader,
            Step::LoadSegmentData,
            Step::CheckImage,
            Step::RunImage,
        ];
        let mut codes: Vec<i32> = steps
            .iter()
            .map(|&s| Error::protocol(s, DeviceError::Rejected(1)).exit_code())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), steps.len());
        assert!(!codes.contains(&Error::FileNotFound(PathBuf::new()).exit_code()));
    }

    #[test]
    fn test_rejected_code_formatting() {
        assert_eq!(
            DeviceError::Rejected(0x0204).to_string(),
            "device rejected the request (error code 0x0204)"
        );
    }
}

//! Error types for ISP operations

use rblisp_core::DeviceError;
use thiserror::Error;

/// ISP-specific errors
#[derive(Debug, Error)]
pub enum IspError {
    /// Failed to open the serial port
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No serial port matched the chip's USB id
    #[error("No matching serial port found")]
    PortNotFound,

    /// Operation attempted on a closed session
    #[error("Not connected")]
    NotConnected,

    /// The bootloader did not answer in time
    #[error("No response from bootloader")]
    NoResponse,

    /// The bootloader answered `FL` with an error code
    #[error("Bootloader reported error 0x{0:04X}")]
    Failed(u16),

    /// The bootloader answered with an unknown status
    #[error("Invalid response {response:02X?} for command 0x{command:02X}")]
    InvalidResponse {
        /// Command that was sent
        command: u8,
        /// First two bytes received
        response: [u8; 2],
    },

    /// The response payload is shorter than the command requires
    #[error("Response to command 0x{command:02X} too short: {actual} bytes, need {expected}")]
    ShortResponse {
        /// Command that was sent
        command: u8,
        /// Required payload length
        expected: usize,
        /// Received payload length
        actual: usize,
    },

    /// Payload does not fit in one ISP frame
    #[error("Payload of {0} bytes exceeds the ISP frame limit")]
    PayloadTooLarge(usize),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),
}

/// Result type for ISP operations
pub type Result<T> = core::result::Result<T, IspError>;

impl From<std::io::Error> for IspError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => IspError::NoResponse,
            _ => IspError::IoError(e.to_string()),
        }
    }
}

impl From<IspError> for DeviceError {
    fn from(e: IspError) -> Self {
        match e {
            IspError::NoResponse => DeviceError::NoResponse,
            IspError::Failed(code) => DeviceError::Rejected(code),
            IspError::NotConnected => DeviceError::NotConnected,
            IspError::PortNotFound => DeviceError::PortNotFound,
            IspError::InvalidResponse { .. }
            | IspError::ShortResponse { .. }
            | IspError::PayloadTooLarge(_) => DeviceError::InvalidResponse(e.to_string()),
            IspError::ConnectionFailed(_) | IspError::IoError(_) | IspError::SerialError(_) => {
                DeviceError::Io(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_no_response() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        assert!(matches!(IspError::from(io), IspError::NoResponse));
        assert_eq!(
            DeviceError::from(IspError::NoResponse),
            DeviceError::NoResponse
        );
    }

    #[test]
    fn test_failure_code_is_preserved() {
        assert_eq!(
            DeviceError::from(IspError::Failed(0x0204)),
            DeviceError::Rejected(0x0204)
        );
    }
}

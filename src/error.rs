use std::fmt;

/// Status codes reported by camera operations.
///
/// These mirror the codes a depth camera SDK hands back from `open`, `grab`
/// and `enable_tracking`, so they print the way operators expect to read them
/// in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Generic failure with no more specific cause.
    Failure,
    /// No live sensor is attached.
    CameraNotDetected,
    /// The recording path is missing, unreadable or not a pose recording.
    InvalidSvoFile,
    /// The network source did not answer in time.
    ConnectionTimeout,
    /// A parameter value cannot be applied (e.g. zero fps).
    InvalidFunctionParameters,
    /// The source reports poses in a different coordinate system.
    InvalidCoordinateSystem,
    /// The recording has no frames left.
    EndOfSvoFileReached,
    /// A packet arrived but could not be decoded.
    CorruptedFrame,
    /// No frame arrived within one frame period.
    Timeout,
    /// The source went away (stream closed, device unplugged).
    CameraDisconnected,
    /// An operation needed an open camera.
    CameraNotInitialized,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Failure => "FAILURE",
            ErrorCode::CameraNotDetected => "CAMERA NOT DETECTED",
            ErrorCode::InvalidSvoFile => "INVALID SVO FILE",
            ErrorCode::ConnectionTimeout => "CONNECTION TIMEOUT",
            ErrorCode::InvalidFunctionParameters => "INVALID FUNCTION PARAMETERS",
            ErrorCode::InvalidCoordinateSystem => "INVALID COORDINATE SYSTEM",
            ErrorCode::EndOfSvoFileReached => "END OF SVOFILE REACHED",
            ErrorCode::CorruptedFrame => "CORRUPTED FRAME",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::CameraDisconnected => "CAMERA DISCONNECTED",
            ErrorCode::CameraNotInitialized => "CAMERA NOT INITIALIZED",
        };
        f.write_str(name)
    }
}

/// Errors raised by packet sources, the publisher and the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Device not found (VID={vid:04X} PID={pid:04X})")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("HID command failed: {0}")]
    HidCommand(String),

    #[error("Invalid source header")]
    InvalidHeader,

    #[error("Unsupported source version {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid response: expected prefix 0x01, got 0x{0:02x}")]
    InvalidResponse(u8),

    #[error("Command echo mismatch")]
    CommandMismatch,

    #[error("Packet stream stopped")]
    StreamStopped,

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Camera error: {0}")]
    Device(ErrorCode),
}

impl BridgeError {
    /// Collapse a transport-level error into the status code a camera
    /// operation reports for it.
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::Device(code) => *code,
            BridgeError::DeviceNotFound { .. } => ErrorCode::CameraNotDetected,
            BridgeError::InvalidHeader | BridgeError::UnsupportedVersion(_) => {
                ErrorCode::InvalidSvoFile
            }
            BridgeError::Timeout => ErrorCode::Timeout,
            BridgeError::StreamStopped => ErrorCode::CameraDisconnected,
            BridgeError::InvalidResponse(_) | BridgeError::CommandMismatch => {
                ErrorCode::CorruptedFrame
            }
            BridgeError::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                    ErrorCode::ConnectionTimeout
                }
                std::io::ErrorKind::NotFound | std::io::ErrorKind::UnexpectedEof => {
                    ErrorCode::InvalidSvoFile
                }
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted => ErrorCode::CameraDisconnected,
                _ => ErrorCode::Failure,
            },
            _ => ErrorCode::Failure,
        }
    }
}

impl From<ErrorCode> for BridgeError {
    fn from(code: ErrorCode) -> Self {
        BridgeError::Device(code)
    }
}

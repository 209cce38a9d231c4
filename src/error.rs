//! Error types for the music streamer

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used when deciding how to report a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File missing or unreadable
    ResourceUnavailable,
    /// Unrecognized extension, malformed container or unsupported encoding
    UnsupportedFormat,
    /// Source, buffer or output device failure
    Device,
    /// Invalid configuration
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Device(DeviceError::UnsupportedFormat(_)) => ErrorKind::UnsupportedFormat,
            Error::Device(_) => ErrorKind::Device,
            Error::Decode(DecodeError::UnreadableFile(_)) => ErrorKind::ResourceUnavailable,
            Error::Decode(_) => ErrorKind::UnsupportedFormat,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::ResourceUnavailable,
        }
    }
}

/// Audio hardware errors (sources, buffers, output device)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Invalid source: {0}")]
    InvalidSource(u32),

    #[error("Invalid buffer: {0}")]
    InvalidBuffer(u32),

    #[error("Buffer {0} is still queued on a source")]
    BufferInUse(u32),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Decoder errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Unreadable file: {0}")]
    UnreadableFile(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Seek failed: {0}")]
    SeekFailed(String),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        let missing: Error = DecodeError::UnreadableFile("a.ogg".into()).into();
        assert_eq!(missing.kind(), ErrorKind::ResourceUnavailable);

        let bad: Error = DecodeError::UnsupportedFormat("mp3".into()).into();
        assert_eq!(bad.kind(), ErrorKind::UnsupportedFormat);

        let device: Error = DeviceError::InvalidSource(3).into();
        assert_eq!(device.kind(), ErrorKind::Device);

        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn test_error_display() {
        let err: Error = DeviceError::BufferInUse(7).into();
        assert_eq!(err.to_string(), "Device error: Buffer 7 is still queued on a source");
    }
}

//! Error types for zip-append

use std::io;

/// Result type for zip-append operations
pub type Result<T> = std::result::Result<T, ZipAppendError>;

/// Error types that can occur while scanning or appending to an archive
#[derive(Debug)]
pub enum ZipAppendError {
    /// I/O error
    Io(io::Error),
    /// Missing or corrupt signature, truncated record, or inconsistent
    /// offsets. `offset` is the stream position the problem was detected at.
    MalformedArchive { offset: u64, message: String },
    /// ZIP64 markers, multi-disk fields, encryption bits, or a compression
    /// method other than store/deflate
    UnsupportedFeature(String),
    /// Entry not found in the archive
    EntryNotFound(String),
    /// Stored CRC-32 does not match the decompressed payload
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
    /// Appending would overflow a 16-bit count or a 32-bit size/offset field
    ArchiveLimitExceeded(String),
    /// A previous append failed mid-write; the appender refuses further
    /// operations so the corruption cannot compound
    Poisoned,
}

impl std::fmt::Display for ZipAppendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipAppendError::Io(e) => write!(f, "I/O error: {}", e),
            ZipAppendError::MalformedArchive { offset, message } => {
                write!(f, "Malformed archive at offset {}: {}", offset, message)
            }
            ZipAppendError::UnsupportedFeature(msg) => {
                write!(f, "Unsupported archive feature: {}", msg)
            }
            ZipAppendError::EntryNotFound(name) => write!(f, "Entry not found: {}", name),
            ZipAppendError::ChecksumMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "CRC-32 mismatch for {}: stored 0x{:08x}, computed 0x{:08x}",
                name, expected, actual
            ),
            ZipAppendError::ArchiveLimitExceeded(msg) => {
                write!(f, "Archive limit exceeded: {}", msg)
            }
            ZipAppendError::Poisoned => {
                write!(f, "Appender is poisoned by an earlier write failure")
            }
        }
    }
}

impl std::error::Error for ZipAppendError {}

impl From<io::Error> for ZipAppendError {
    fn from(err: io::Error) -> Self {
        ZipAppendError::Io(err)
    }
}

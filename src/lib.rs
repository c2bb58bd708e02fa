//! # zip-append: Incremental ZIP Appender
//!
//! `zip-append` grows an existing ZIP archive in place: each append writes the
//! new entry's local header and compressed payload over the old central
//! directory, then re-emits the directory and end-of-central-directory record
//! at the new tail. Prior payloads are never rewritten, total I/O stays O(n)
//! across n appends, and the file is a valid archive after every append.
//!
//! ## Features
//!
//! - **Append in place**: add entries to an existing archive without rewriting it
//! - **Always valid**: every completed append leaves a file any ZIP reader can parse
//! - **Directory scan**: enumerate and read back entries of an existing archive
//! - **Preserves foreign entries**: pre-existing directory records are re-emitted
//!   byte-for-byte, so attributes written by other tools survive
//!
//! ## Quick Start
//!
//! ### Appending to an archive
//!
//! ```no_run
//! use zip_append::ZipAppender;
//!
//! let file = std::fs::OpenOptions::new()
//!     .read(true)
//!     .write(true)
//!     .create(true)
//!     .open("results.zip")?;
//!
//! // an empty file starts a fresh archive
//! let mut appender = ZipAppender::new(file)?;
//! appender.append("samples/1.json", br#"{"id": 1}"#)?;
//! appender.append("samples/2.json", br#"{"id": 2}"#)?;
//! appender.close()?;
//! # Ok::<(), zip_append::ZipAppendError>(())
//! ```
//!
//! ### Reading an archive
//!
//! ```no_run
//! use zip_append::ZipScanner;
//!
//! let mut scanner = ZipScanner::new(std::fs::File::open("results.zip")?)?;
//! for name in scanner.list() {
//!     println!("{}", name);
//! }
//! let data = scanner.read("samples/1.json")?;
//! println!("{} bytes", data.len());
//! # Ok::<(), zip_append::ZipAppendError>(())
//! ```

pub mod appender;
pub mod error;
pub mod scanner;

pub use appender::ZipAppender;
pub use error::{Result, ZipAppendError};
pub use scanner::{ZipEntry, ZipScanner};

use std::io::{Read, Seek, Write};

/// Open a stream for appending, loading any existing directory.
///
/// A zero-length stream starts a fresh archive.
pub fn open_for_append<S: Read + Write + Seek>(stream: S) -> Result<ZipAppender<S>> {
    ZipAppender::new(stream)
}

/// Load the directory of an existing archive for enumeration and read-back
pub fn open_for_read<R: Read + Seek>(stream: R) -> Result<ZipScanner<R>> {
    ZipScanner::new(stream)
}

//! Incremental archive appender - streams new entries into an existing archive
//!
//! Each append overwrites the old central directory at the tail of the file
//! with the new entry's local header and payload, then re-emits the whole
//! directory and a fresh end-of-central-directory record. Prior payloads are
//! never rewritten, and the file is a valid archive after every append.

use crate::error::{Result, ZipAppendError};
use crate::scanner::{
    ZipEntry, ZipScanner, CENTRAL_DIRECTORY_SIGNATURE, CENTRAL_HEADER_LEN,
    END_OF_CENTRAL_DIRECTORY_SIGNATURE, LOCAL_FILE_HEADER_SIGNATURE, LOCAL_HEADER_LEN,
    METHOD_DEFLATED,
};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::debug;

/// DEFLATE level for appended entries
const COMPRESSION_LEVEL: u32 = 9;

/// Version needed to extract / version made by
const ZIP_VERSION: u16 = 20;

/// General purpose flag bit 11: filename is UTF-8
const FLAG_UTF8_NAME: u16 = 0x0800;

/// Most entries a 16-bit directory count can describe
const MAX_ENTRIES: usize = 0xFFFF;

/// Incremental appender over a read/write archive stream.
///
/// The appender owns the stream for its lifetime. A zero-length stream
/// starts a fresh archive; anything else must scan as a valid archive.
pub struct ZipAppender<S: Read + Write + Seek> {
    stream: S,
    entries: Vec<Vec<u8>>,
    cd_offset: u64,
    poisoned: bool,
}

impl<S: Read + Write + Seek> ZipAppender<S> {
    /// Open a stream for appending, loading any existing directory
    pub fn new(mut stream: S) -> Result<Self> {
        let size = stream.seek(SeekFrom::End(0))?;
        if size == 0 {
            debug!("starting a fresh archive");
            return Ok(ZipAppender {
                stream,
                entries: Vec::new(),
                cd_offset: 0,
                poisoned: false,
            });
        }
        Ok(Self::from_scanner(ZipScanner::new(stream)?))
    }

    /// Adopt the directory recovered by an existing scanner, without rescanning
    pub fn from_scanner(scanner: ZipScanner<S>) -> Self {
        let (stream, entries, cd_offset) = scanner.into_parts();
        ZipAppender {
            stream,
            entries: entries.into_iter().map(ZipEntry::into_raw).collect(),
            cd_offset,
            poisoned: false,
        }
    }

    /// Number of entries currently in the directory
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Append one entry, leaving the archive valid on return.
    ///
    /// Field-width limits are checked before the stream is touched, so an
    /// `ArchiveLimitExceeded` rejection leaves the archive exactly as it was.
    /// An I/O failure mid-write poisons the appender; every later call fails
    /// with `Poisoned` without touching the stream.
    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(ZipAppendError::Poisoned);
        }
        if self.entries.len() >= MAX_ENTRIES {
            return Err(ZipAppendError::ArchiveLimitExceeded(format!(
                "directory already holds {} entries",
                MAX_ENTRIES
            )));
        }
        if name.len() > u16::MAX as usize {
            return Err(ZipAppendError::ArchiveLimitExceeded(format!(
                "entry name is {} bytes, limit is {}",
                name.len(),
                u16::MAX
            )));
        }
        if data.len() as u64 > u32::MAX as u64 {
            return Err(ZipAppendError::ArchiveLimitExceeded(
                "payload does not fit a 32-bit size field".to_string(),
            ));
        }

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;
        if compressed.len() as u64 > u32::MAX as u64 {
            return Err(ZipAppendError::ArchiveLimitExceeded(
                "compressed payload does not fit a 32-bit size field".to_string(),
            ));
        }

        let name_bytes = name.as_bytes();
        let local_entry_len =
            (LOCAL_HEADER_LEN + name_bytes.len()) as u64 + compressed.len() as u64;
        let new_cd_offset = self.cd_offset + local_entry_len;
        let directory_size = self.entries.iter().map(|e| e.len() as u64).sum::<u64>()
            + (CENTRAL_HEADER_LEN + name_bytes.len()) as u64;
        if self.cd_offset > u32::MAX as u64
            || new_cd_offset > u32::MAX as u64
            || directory_size > u32::MAX as u64
        {
            return Err(ZipAppendError::ArchiveLimitExceeded(
                "archive offsets do not fit 32-bit fields".to_string(),
            ));
        }

        let crc = crc32fast::hash(data);
        match self.write_entry(name_bytes, &compressed, crc, data.len() as u32) {
            Ok(()) => {
                debug!(
                    name,
                    uncompressed = data.len(),
                    compressed = compressed.len(),
                    "appended entry"
                );
                Ok(())
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Flush and release the stream
    pub fn close(mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    fn write_entry(
        &mut self,
        name: &[u8],
        compressed: &[u8],
        crc: u32,
        uncompressed_size: u32,
    ) -> Result<()> {
        let local_header_offset = self.cd_offset as u32;
        self.stream.seek(SeekFrom::Start(self.cd_offset))?;

        // local file header
        self.stream
            .write_all(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes())?;
        self.stream.write_all(&ZIP_VERSION.to_le_bytes())?;
        self.stream.write_all(&FLAG_UTF8_NAME.to_le_bytes())?;
        self.stream.write_all(&METHOD_DEFLATED.to_le_bytes())?;
        self.stream.write_all(&0u16.to_le_bytes())?; // mod time
        self.stream.write_all(&0u16.to_le_bytes())?; // mod date
        self.stream.write_all(&crc.to_le_bytes())?;
        self.stream
            .write_all(&(compressed.len() as u32).to_le_bytes())?;
        self.stream.write_all(&uncompressed_size.to_le_bytes())?;
        self.stream
            .write_all(&(name.len() as u16).to_le_bytes())?;
        self.stream.write_all(&0u16.to_le_bytes())?; // extra len
        self.stream.write_all(name)?;

        self.stream.write_all(compressed)?;

        // new central directory entry, kept as one blob like those recovered on open
        let mut cde = Vec::with_capacity(CENTRAL_HEADER_LEN + name.len());
        cde.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        cde.extend_from_slice(&ZIP_VERSION.to_le_bytes()); // version made by
        cde.extend_from_slice(&ZIP_VERSION.to_le_bytes()); // version needed
        cde.extend_from_slice(&FLAG_UTF8_NAME.to_le_bytes());
        cde.extend_from_slice(&METHOD_DEFLATED.to_le_bytes());
        cde.extend_from_slice(&0u16.to_le_bytes()); // mod time
        cde.extend_from_slice(&0u16.to_le_bytes()); // mod date
        cde.extend_from_slice(&crc.to_le_bytes());
        cde.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        cde.extend_from_slice(&uncompressed_size.to_le_bytes());
        cde.extend_from_slice(&(name.len() as u16).to_le_bytes());
        cde.extend_from_slice(&0u16.to_le_bytes()); // extra len
        cde.extend_from_slice(&0u16.to_le_bytes()); // comment len
        cde.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        cde.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
        cde.extend_from_slice(&0u32.to_le_bytes()); // external attributes
        cde.extend_from_slice(&local_header_offset.to_le_bytes());
        cde.extend_from_slice(name);
        self.entries.push(cde);

        // re-emit the whole directory at the new tail
        let cd_offset = self.stream.stream_position()?;
        for entry in &self.entries {
            self.stream.write_all(entry)?;
        }
        let cd_size = self.stream.stream_position()? - cd_offset;

        self.stream
            .write_all(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())?;
        self.stream.write_all(&0u16.to_le_bytes())?; // disk number
        self.stream.write_all(&0u16.to_le_bytes())?; // disk with central directory
        self.stream
            .write_all(&(self.entries.len() as u16).to_le_bytes())?;
        self.stream
            .write_all(&(self.entries.len() as u16).to_le_bytes())?;
        self.stream.write_all(&(cd_size as u32).to_le_bytes())?;
        self.stream.write_all(&(cd_offset as u32).to_le_bytes())?;
        self.stream.write_all(&0u16.to_le_bytes())?; // comment len

        self.cd_offset = cd_offset;
        Ok(())
    }
}

impl<S: Read + Write + Seek> Drop for ZipAppender<S> {
    fn drop(&mut self) {
        let _ = self.stream.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::EOCD_LEN;
    use std::io::{self, Cursor};

    fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut appender = ZipAppender::new(&mut cursor).unwrap();
        for &(name, data) in files {
            appender.append(name, data).unwrap();
        }
        appender.close().unwrap();
        cursor.into_inner()
    }

    fn directory_offset(bytes: &[u8]) -> usize {
        let eocd = bytes.len() - EOCD_LEN;
        u32::from_le_bytes(bytes[eocd + 16..eocd + 20].try_into().unwrap()) as usize
    }

    #[test]
    fn fresh_stream_becomes_valid_archive() {
        let bytes = build_archive(&[
            ("one.txt", b"first" as &[u8]),
            ("two.txt", b"second"),
        ]);
        let mut scanner = ZipScanner::new(Cursor::new(bytes)).unwrap();
        assert_eq!(scanner.list(), ["one.txt", "two.txt"]);
        assert_eq!(scanner.read("one.txt").unwrap(), b"first");
        assert_eq!(scanner.read("two.txt").unwrap(), b"second");
    }

    #[test]
    fn append_preserves_existing_entries() {
        let original = build_archive(&[
            ("one.txt", b"first" as &[u8]),
            ("two.txt", b"second"),
        ]);
        let old_cd_offset = directory_offset(&original);

        let mut cursor = Cursor::new(original.clone());
        let mut appender = ZipAppender::new(&mut cursor).unwrap();
        assert_eq!(appender.entry_count(), 2);
        appender.append("three.txt", b"third").unwrap();
        appender.close().unwrap();
        let updated = cursor.into_inner();

        // prior payload region is byte-identical
        assert_eq!(&updated[..old_cd_offset], &original[..old_cd_offset]);

        let mut scanner = ZipScanner::new(Cursor::new(updated)).unwrap();
        assert_eq!(scanner.list(), ["one.txt", "two.txt", "three.txt"]);
        assert_eq!(scanner.read("one.txt").unwrap(), b"first");
        assert_eq!(scanner.read("two.txt").unwrap(), b"second");
        assert_eq!(scanner.read("three.txt").unwrap(), b"third");
    }

    #[test]
    fn reopen_without_append_leaves_file_untouched() {
        let original = build_archive(&[("one.txt", b"first" as &[u8])]);
        let mut cursor = Cursor::new(original.clone());
        let appender = ZipAppender::new(&mut cursor).unwrap();
        appender.close().unwrap();
        assert_eq!(cursor.into_inner(), original);
    }

    #[test]
    fn empty_payload_round_trips() {
        let bytes = build_archive(&[("empty.txt", b"" as &[u8])]);
        let mut scanner = ZipScanner::new(Cursor::new(bytes)).unwrap();
        let entry = scanner.find_entry("empty.txt").unwrap();
        assert_eq!(entry.uncompressed_size, 0);
        assert!(entry.compressed_size > 0);
        assert_eq!(scanner.read("empty.txt").unwrap(), b"");
    }

    #[test]
    fn unicode_name_round_trips() {
        let bytes = build_archive(&[("файл.txt", b"unicode content" as &[u8])]);
        let mut scanner = ZipScanner::new(Cursor::new(bytes)).unwrap();
        assert_eq!(scanner.list(), ["файл.txt"]);
        assert_eq!(scanner.read("файл.txt").unwrap(), b"unicode content");
    }

    #[test]
    fn large_payload_round_trips() {
        let content = b"Large content\n".repeat(1000);
        let bytes = build_archive(&[("large.txt", content.as_slice())]);
        let mut scanner = ZipScanner::new(Cursor::new(bytes)).unwrap();
        let entry = scanner.find_entry("large.txt").unwrap();
        assert!((entry.compressed_size as usize) < content.len());
        assert_eq!(scanner.read("large.txt").unwrap(), content);
    }

    #[test]
    fn oversized_name_is_rejected_without_writing() {
        let original = build_archive(&[("one.txt", b"first" as &[u8])]);
        let mut cursor = Cursor::new(original.clone());
        let mut appender = ZipAppender::new(&mut cursor).unwrap();

        let long_name = "n".repeat(70_000);
        assert!(matches!(
            appender.append(&long_name, b"data").err().unwrap(),
            ZipAppendError::ArchiveLimitExceeded(_)
        ));

        // the rejection is not poisoning; a valid append still works
        appender.append("two.txt", b"second").unwrap();
        appender.close().unwrap();

        let mut scanner = ZipScanner::new(Cursor::new(cursor.into_inner())).unwrap();
        assert_eq!(scanner.list(), ["one.txt", "two.txt"]);
    }

    #[test]
    fn full_directory_is_rejected() {
        let mut appender = ZipAppender::new(Cursor::new(Vec::new())).unwrap();
        appender.entries = vec![Vec::new(); MAX_ENTRIES];
        assert!(matches!(
            appender.append("one-too-many.txt", b"data").err().unwrap(),
            ZipAppendError::ArchiveLimitExceeded(_)
        ));
    }

    /// Stream whose writes fail once a byte budget is exhausted
    struct FailingStream {
        inner: Cursor<Vec<u8>>,
        budget: usize,
    }

    impl Read for FailingStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for FailingStream {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl Write for FailingStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.budget -= buf.len();
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn write_failure_poisons_the_appender() {
        let stream = FailingStream {
            inner: Cursor::new(Vec::new()),
            budget: 10,
        };
        let mut appender = ZipAppender::new(stream).unwrap();

        assert!(matches!(
            appender.append("a.txt", b"data").err().unwrap(),
            ZipAppendError::Io(_)
        ));
        assert!(matches!(
            appender.append("b.txt", b"data").err().unwrap(),
            ZipAppendError::Poisoned
        ));
    }
}

//! Archive directory scanner - recovers the central directory of an existing archive
//!
//! The scanner parses the end-of-central-directory record at the tail of the
//! stream, loads every central directory entry in order, and exposes named
//! lookup and read-back. Each entry's directory record is retained as raw
//! bytes so the appender can re-emit it verbatim.

use crate::error::{Result, ZipAppendError};
use flate2::read::DeflateDecoder;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use tracing::{debug, trace};

/// ZIP local file header signature
pub(crate) const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP central directory entry signature
pub(crate) const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
pub(crate) const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// Fixed portion of a local file header
pub(crate) const LOCAL_HEADER_LEN: usize = 30;

/// Fixed portion of a central directory entry
pub(crate) const CENTRAL_HEADER_LEN: usize = 46;

/// End of central directory record (zero-length comment)
pub(crate) const EOCD_LEN: usize = 22;

/// Compression method: stored (no compression)
pub(crate) const METHOD_STORED: u16 = 0;

/// Compression method: DEFLATE
pub(crate) const METHOD_DEFLATED: u16 = 8;

/// How far back from the end of the stream the EOCD signature is searched.
/// Archives with trailing comments longer than this window are rejected.
const EOCD_TAIL_WINDOW: u64 = 1024;

/// General purpose flag bit 0: entry payload is encrypted
const FLAG_ENCRYPTED: u16 = 0x0001;

/// Entry recovered from the archive's central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub compression_method: u16,
    pub crc32: u32,
    pub header_offset: u32,
    pub(crate) flags: u16,
    raw: Vec<u8>,
}

impl ZipEntry {
    /// The entry's central directory record exactly as stored in the archive
    pub fn raw_directory_record(&self) -> &[u8] {
        &self.raw
    }

    pub(crate) fn into_raw(self) -> Vec<u8> {
        self.raw
    }
}

/// Directory scanner over a seekable archive stream
pub struct ZipScanner<R> {
    stream: R,
    entries: Vec<ZipEntry>,
    cd_offset: u64,
}

impl<R: Read + Seek> ZipScanner<R> {
    /// Load the central directory of an existing archive
    pub fn new(mut stream: R) -> Result<Self> {
        let (entries, cd_offset) = load_directory(&mut stream)?;
        Ok(ZipScanner {
            stream,
            entries,
            cd_offset,
        })
    }

    /// Entry names in directory order
    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// All entries in directory order
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Read and decompress an entry's payload, verifying its CRC-32
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| ZipAppendError::EntryNotFound(name.to_string()))?
            .clone();

        if entry.flags & FLAG_ENCRYPTED != 0 {
            return Err(ZipAppendError::UnsupportedFeature(format!(
                "entry {} is encrypted",
                entry.name
            )));
        }
        if entry.compression_method != METHOD_STORED
            && entry.compression_method != METHOD_DEFLATED
        {
            return Err(ZipAppendError::UnsupportedFeature(format!(
                "compression method {}",
                entry.compression_method
            )));
        }

        let header_offset = entry.header_offset as u64;
        self.stream.seek(SeekFrom::Start(header_offset))?;
        let mut header = [0u8; LOCAL_HEADER_LEN];
        read_record(
            &mut self.stream,
            &mut header,
            header_offset,
            "local file header",
        )?;
        if u32_at(&header, 0) != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(malformed(
                header_offset,
                "invalid local file header signature",
            ));
        }

        let name_len = u16_at(&header, 26) as u64;
        let extra_len = u16_at(&header, 28) as u64;
        let data_offset = header_offset + LOCAL_HEADER_LEN as u64 + name_len + extra_len;
        self.stream.seek(SeekFrom::Start(data_offset))?;

        let mut compressed = vec![0u8; entry.compressed_size as usize];
        read_record(&mut self.stream, &mut compressed, data_offset, "entry payload")?;

        let data = if entry.compression_method == METHOD_DEFLATED {
            let mut decoder = DeflateDecoder::new(&compressed[..]);
            let mut decompressed = Vec::with_capacity(entry.uncompressed_size as usize);
            decoder.read_to_end(&mut decompressed)?;
            decompressed
        } else {
            compressed
        };

        let actual = crc32fast::hash(&data);
        if actual != entry.crc32 {
            return Err(ZipAppendError::ChecksumMismatch {
                name: entry.name,
                expected: entry.crc32,
                actual,
            });
        }

        Ok(data)
    }

    pub(crate) fn into_parts(self) -> (R, Vec<ZipEntry>, u64) {
        (self.stream, self.entries, self.cd_offset)
    }
}

/// Locate the EOCD and read every central directory entry in order
pub(crate) fn load_directory<R: Read + Seek>(stream: &mut R) -> Result<(Vec<ZipEntry>, u64)> {
    let eocd_pos = find_eocd(stream)?;
    stream.seek(SeekFrom::Start(eocd_pos))?;
    let mut eocd = [0u8; EOCD_LEN];
    read_record(stream, &mut eocd, eocd_pos, "end of central directory record")?;

    let disk_number = u16_at(&eocd, 4);
    let cd_disk = u16_at(&eocd, 6);
    let entries_on_disk = u16_at(&eocd, 8);
    let total_entries = u16_at(&eocd, 10);
    let cd_size = u32_at(&eocd, 12);
    let cd_offset = u32_at(&eocd, 16);

    if disk_number != 0 || cd_disk != 0 {
        return Err(ZipAppendError::UnsupportedFeature(
            "multi-disk archive".to_string(),
        ));
    }
    if total_entries == 0xFFFF || cd_size == 0xFFFF_FFFF || cd_offset == 0xFFFF_FFFF {
        return Err(ZipAppendError::UnsupportedFeature(
            "ZIP64 archive".to_string(),
        ));
    }
    if entries_on_disk != total_entries {
        return Err(malformed(eocd_pos, "entry counts disagree"));
    }
    if cd_offset as u64 + cd_size as u64 != eocd_pos {
        return Err(malformed(
            eocd_pos,
            "central directory does not end at the end-of-central-directory record",
        ));
    }

    stream.seek(SeekFrom::Start(cd_offset as u64))?;
    let mut entries = Vec::with_capacity(total_entries as usize);
    let mut pos = cd_offset as u64;
    for _ in 0..total_entries {
        let entry = read_directory_entry(stream, pos)?;
        pos += entry.raw.len() as u64;
        entries.push(entry);
    }

    debug!(
        entries = entries.len(),
        cd_offset, "loaded central directory"
    );
    Ok((entries, cd_offset as u64))
}

/// Scan the final `min(1024, file_size)` bytes for the EOCD signature.
/// The last occurrence wins; earlier matches can be entry payload bytes.
fn find_eocd<R: Read + Seek>(stream: &mut R) -> Result<u64> {
    let file_size = stream.seek(SeekFrom::End(0))?;
    let window = EOCD_TAIL_WINDOW.min(file_size);
    let search_start = file_size - window;
    stream.seek(SeekFrom::Start(search_start))?;
    let mut buffer = vec![0u8; window as usize];
    stream.read_exact(&mut buffer)?;

    for i in (0..buffer.len().saturating_sub(3)).rev() {
        if buffer[i] == 0x50
            && buffer[i + 1] == 0x4b
            && buffer[i + 2] == 0x05
            && buffer[i + 3] == 0x06
        {
            let pos = search_start + i as u64;
            trace!(pos, "located end of central directory signature");
            return Ok(pos);
        }
    }

    Err(malformed(
        file_size,
        &format!(
            "no end of central directory signature in the final {} bytes",
            window
        ),
    ))
}

fn read_directory_entry<R: Read>(stream: &mut R, pos: u64) -> Result<ZipEntry> {
    let mut header = [0u8; CENTRAL_HEADER_LEN];
    read_record(stream, &mut header, pos, "central directory entry")?;
    if u32_at(&header, 0) != CENTRAL_DIRECTORY_SIGNATURE {
        return Err(malformed(pos, "invalid central directory entry signature"));
    }

    let flags = u16_at(&header, 8);
    let compression_method = u16_at(&header, 10);
    let crc32 = u32_at(&header, 16);
    let compressed_size = u32_at(&header, 20);
    let uncompressed_size = u32_at(&header, 24);
    let name_len = u16_at(&header, 28) as usize;
    let extra_len = u16_at(&header, 30) as usize;
    let comment_len = u16_at(&header, 32) as usize;
    let header_offset = u32_at(&header, 42);

    if compressed_size == 0xFFFF_FFFF
        || uncompressed_size == 0xFFFF_FFFF
        || header_offset == 0xFFFF_FFFF
    {
        return Err(ZipAppendError::UnsupportedFeature("ZIP64 entry".to_string()));
    }

    let mut tail = vec![0u8; name_len + extra_len + comment_len];
    read_record(stream, &mut tail, pos, "central directory entry")?;
    let name = String::from_utf8_lossy(&tail[..name_len]).to_string();

    let mut raw = Vec::with_capacity(CENTRAL_HEADER_LEN + tail.len());
    raw.extend_from_slice(&header);
    raw.extend_from_slice(&tail);

    Ok(ZipEntry {
        name,
        compressed_size,
        uncompressed_size,
        compression_method,
        crc32,
        header_offset,
        flags,
        raw,
    })
}

/// Read a fixed-size record, reporting a short read as a malformed archive
fn read_record<R: Read>(stream: &mut R, buf: &mut [u8], offset: u64, what: &str) -> Result<()> {
    stream.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            malformed(offset, &format!("truncated {}", what))
        } else {
            ZipAppendError::Io(e)
        }
    })
}

fn malformed(offset: u64, message: &str) -> ZipAppendError {
    ZipAppendError::MalformedArchive {
        offset,
        message: message.to_string(),
    }
}

fn u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

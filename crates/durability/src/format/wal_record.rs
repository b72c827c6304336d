//! WAL segment file and record format.
//!
//! WAL segments are named `wal-NNNNNN.seg` where `NNNNNN` is a zero-padded segment number.
//!
//! # Segment Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Segment Header (32 bytes)          │
//! ├────────────────────────────────────┤
//! │ Record 1                           │
//! ├────────────────────────────────────┤
//! │ Record 2                           │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Payload (variable)      │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//!
//! Payload:
//! ┌──────────────┬──────────────┬──────────────────────────────────────────┐
//! │ LSN (8)      │ Timestamp (8)│ Entry (codec-encoded WalEntry)           │
//! └──────────────┴──────────────┴──────────────────────────────────────────┘
//! ```

use crc32fast::Hasher;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a WAL segment file: "CHRN"
pub const SEGMENT_MAGIC: [u8; 4] = *b"CHRN";

/// Current segment format version
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Size of segment header in bytes
pub const SEGMENT_HEADER_SIZE: usize = 32;

/// Current WAL record format version
pub const WAL_RECORD_FORMAT_VERSION: u8 = 1;

/// Fixed bytes inside a record payload before the entry: version + lsn + timestamp
const RECORD_FIXED_SIZE: usize = 1 + 8 + 8;

/// WAL segment header (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SegmentHeader {
    /// Magic bytes: "CHRN"
    pub magic: [u8; 4],

    /// Format version for forward compatibility
    pub format_version: u32,

    /// Segment number (monotonically increasing)
    pub segment_number: u64,

    /// Database UUID (for integrity checking across segments)
    pub database_uuid: [u8; 16],
}

impl SegmentHeader {
    /// Create a new segment header.
    pub fn new(segment_number: u64, database_uuid: [u8; 16]) -> Self {
        SegmentHeader {
            magic: SEGMENT_MAGIC,
            format_version: SEGMENT_FORMAT_VERSION,
            segment_number,
            database_uuid,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.segment_number.to_le_bytes());
        bytes[16..32].copy_from_slice(&self.database_uuid);
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8; SEGMENT_HEADER_SIZE]) -> Option<Self> {
        Some(SegmentHeader {
            magic: bytes[0..4].try_into().ok()?,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            segment_number: u64::from_le_bytes(bytes[8..16].try_into().ok()?),
            database_uuid: bytes[16..32].try_into().ok()?,
        })
    }

    /// Validate the header has correct magic bytes and a known version.
    pub fn is_valid(&self) -> bool {
        self.magic == SEGMENT_MAGIC && self.format_version == SEGMENT_FORMAT_VERSION
    }
}

fn invalid_data(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into())
}

/// WAL segment file handle.
///
/// A segment is a single WAL file containing multiple records.
/// Only the active segment is writable; closed segments are immutable.
pub struct WalSegment {
    file: File,
    segment_number: u64,
    /// Current write position (bytes from start)
    write_position: u64,
    path: PathBuf,
    closed: bool,
    database_uuid: [u8; 16],
}

impl WalSegment {
    /// Create a new WAL segment and write its header.
    ///
    /// The header is synced before returning.
    pub fn create(
        dir: &Path,
        segment_number: u64,
        database_uuid: [u8; 16],
    ) -> std::io::Result<Self> {
        let path = Self::segment_path(dir, segment_number);

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .read(true)
            .open(&path)?;

        let header = SegmentHeader::new(segment_number, database_uuid);
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        Ok(WalSegment {
            file,
            segment_number,
            write_position: SEGMENT_HEADER_SIZE as u64,
            path,
            closed: false,
            database_uuid,
        })
    }

    fn open_with(dir: &Path, segment_number: u64, writable: bool) -> std::io::Result<Self> {
        let path = Self::segment_path(dir, segment_number);

        let mut file = OpenOptions::new().read(true).write(writable).open(&path)?;

        let mut header_bytes = [0u8; SEGMENT_HEADER_SIZE];
        file.read_exact(&mut header_bytes)?;

        let header = SegmentHeader::from_bytes(&header_bytes)
            .ok_or_else(|| invalid_data("Invalid segment header"))?;

        if !header.is_valid() {
            return Err(invalid_data("Invalid segment magic bytes or version"));
        }

        if header.segment_number != segment_number {
            return Err(invalid_data(format!(
                "Segment number mismatch: expected {}, got {}",
                segment_number, header.segment_number
            )));
        }

        let write_position = file.seek(SeekFrom::End(0))?;

        Ok(WalSegment {
            file,
            segment_number,
            write_position,
            path,
            closed: !writable,
            database_uuid: header.database_uuid,
        })
    }

    /// Open an existing WAL segment for reading.
    pub fn open_read(dir: &Path, segment_number: u64) -> std::io::Result<Self> {
        Self::open_with(dir, segment_number, false)
    }

    /// Open an existing WAL segment for appending.
    pub fn open_append(dir: &Path, segment_number: u64) -> std::io::Result<Self> {
        Self::open_with(dir, segment_number, true)
    }

    /// Generate segment file path.
    ///
    /// Format: `wal-NNNNNN.seg` where NNNNNN is zero-padded segment number.
    pub fn segment_path(dir: &Path, segment_number: u64) -> PathBuf {
        dir.join(format!("wal-{:06}.seg", segment_number))
    }

    /// Parse a segment number out of a file name
    pub fn parse_segment_number(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix("wal-")?
            .strip_suffix(".seg")?
            .parse::<u64>()
            .ok()
    }

    /// Get segment number.
    pub fn segment_number(&self) -> u64 {
        self.segment_number
    }

    /// Get current segment size in bytes.
    pub fn size(&self) -> u64 {
        self.write_position
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get database UUID.
    pub fn database_uuid(&self) -> [u8; 16] {
        self.database_uuid
    }

    /// Write bytes to segment and update write position.
    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "Cannot write to closed segment",
            ));
        }

        self.file.write_all(data)?;
        self.write_position += data.len() as u64;
        Ok(())
    }

    /// Sync segment data to disk.
    pub fn sync(&mut self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    /// Mark segment as closed (immutable). Syncs before closing.
    pub fn close(&mut self) -> std::io::Result<()> {
        if !self.closed {
            self.file.sync_all()?;
            self.closed = true;
        }
        Ok(())
    }

    /// Check if segment is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read every byte after the header.
    pub fn read_body(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.file.seek(SeekFrom::Start(SEGMENT_HEADER_SIZE as u64))?;
        self.file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Truncate segment at the given position.
    ///
    /// Used during recovery to remove a torn tail record.
    pub fn truncate(&mut self, position: u64) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "Cannot truncate closed segment",
            ));
        }

        self.file.set_len(position)?;
        self.file.sync_all()?;
        self.write_position = position;
        self.file.seek(SeekFrom::Start(position))?;
        Ok(())
    }
}

/// One framed WAL record.
///
/// Each record is self-delimiting with a length prefix and CRC32 checksum.
/// Records are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Log sequence number, strictly increasing across segments
    pub lsn: u64,

    /// Write timestamp (microseconds since epoch)
    pub timestamp: u64,

    /// Codec-encoded `WalEntry`
    pub entry: Vec<u8>,
}

impl WalRecord {
    /// Create a new WAL record.
    pub fn new(lsn: u64, timestamp: u64, entry: Vec<u8>) -> Self {
        WalRecord {
            lsn,
            timestamp,
            entry,
        }
    }

    /// Serialize record to bytes.
    ///
    /// Format: length (4) + format_version (1) + lsn (8) + timestamp (8) + entry + crc32 (4)
    ///
    /// The length field contains the size of everything after it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(RECORD_FIXED_SIZE + self.entry.len());
        payload.push(WAL_RECORD_FORMAT_VERSION);
        payload.extend_from_slice(&self.lsn.to_le_bytes());
        payload.extend_from_slice(&self.timestamp.to_le_bytes());
        payload.extend_from_slice(&self.entry);

        let crc = Self::compute_crc(&payload);

        let total_len = payload.len() + 4;
        let mut record = Vec::with_capacity(4 + total_len);
        record.extend_from_slice(&(total_len as u32).to_le_bytes());
        record.extend_from_slice(&payload);
        record.extend_from_slice(&crc.to_le_bytes());

        record
    }

    /// Deserialize record from bytes.
    ///
    /// Returns (record, bytes_consumed) on success.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), WalRecordError> {
        let length = match bytes.get(0..4) {
            Some(prefix) => u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize,
            None => return Err(WalRecordError::InsufficientData),
        };

        if length < RECORD_FIXED_SIZE + 4 {
            return Err(WalRecordError::InvalidFormat);
        }

        if bytes.len() < 4 + length {
            return Err(WalRecordError::InsufficientData);
        }

        let payload = &bytes[4..length];
        let crc_bytes = &bytes[length..4 + length];
        let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let computed_crc = Self::compute_crc(payload);
        if computed_crc != stored_crc {
            return Err(WalRecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let format_version = payload[0];
        if format_version != WAL_RECORD_FORMAT_VERSION {
            return Err(WalRecordError::UnsupportedVersion(format_version));
        }

        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&payload[1..9]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&payload[9..17]);

        let record = WalRecord {
            lsn: u64::from_le_bytes(lsn),
            timestamp: u64::from_le_bytes(timestamp),
            entry: payload[RECORD_FIXED_SIZE..].to_vec(),
        };

        Ok((record, 4 + length))
    }

    fn compute_crc(data: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// WAL record parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalRecordError {
    /// Not enough data to parse record
    #[error("Insufficient data to parse record")]
    InsufficientData,

    /// Record format is invalid
    #[error("Invalid record format")]
    InvalidFormat,

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected checksum from record
        expected: u32,
        /// Computed checksum
        computed: u32,
    },

    /// Unsupported format version
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),
}

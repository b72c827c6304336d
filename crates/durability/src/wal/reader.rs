//! WAL reader for recovery and replay.
//!
//! Recovery reads every segment in order. A record cut short at the end of
//! the last segment is a torn write from a crash: it is reported through
//! [`TruncateInfo`] so the caller can cut it off. A last segment whose
//! header never fully reached disk (a crash during rotation) holds no
//! records and is reported as [`WalReadResult::headerless_segment`].
//! Anything else that does not parse is corruption and fails the read.

use crate::codec::StorageCodec;
use crate::format::{WalRecord, WalRecordError, WalSegment, SEGMENT_HEADER_SIZE};
use std::path::Path;

/// WAL reader for iterating over records in segments.
pub struct WalReader {
    codec: Box<dyn StorageCodec>,
}

impl WalReader {
    /// Create a new WAL reader.
    pub fn new(codec: Box<dyn StorageCodec>) -> Self {
        WalReader { codec }
    }

    /// Read all records from a single segment.
    ///
    /// Returns the records, the byte position where valid data ends and
    /// why reading stopped. Entries are returned codec-decoded.
    pub fn read_segment(
        &self,
        wal_dir: &Path,
        segment_number: u64,
    ) -> Result<(Vec<WalRecord>, u64, ReadStopReason), WalReaderError> {
        let mut segment = WalSegment::open_read(wal_dir, segment_number).map_err(|e| {
            WalReaderError::Io(format!("segment {}: {}", segment_number, e))
        })?;
        let buffer = segment
            .read_body()
            .map_err(|e| WalReaderError::Io(e.to_string()))?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        let mut stop_reason = ReadStopReason::EndOfData;

        while offset < buffer.len() {
            match WalRecord::from_bytes(&buffer[offset..]) {
                Ok((mut record, consumed)) => {
                    record.entry = self.codec.decode(&record.entry).map_err(|e| {
                        WalReaderError::Corrupted {
                            segment: segment_number,
                            offset: SEGMENT_HEADER_SIZE as u64 + offset as u64,
                            detail: e.to_string(),
                        }
                    })?;
                    records.push(record);
                    offset += consumed;
                }
                Err(WalRecordError::InsufficientData) => {
                    stop_reason = ReadStopReason::PartialRecord;
                    break;
                }
                Err(e) => {
                    return Err(WalReaderError::Corrupted {
                        segment: segment_number,
                        offset: SEGMENT_HEADER_SIZE as u64 + offset as u64,
                        detail: e.to_string(),
                    });
                }
            }
        }

        Ok((
            records,
            SEGMENT_HEADER_SIZE as u64 + offset as u64,
            stop_reason,
        ))
    }

    /// Read all records from all segments in a WAL directory.
    ///
    /// A missing directory reads as empty. LSNs must be strictly increasing
    /// across the whole log.
    pub fn read_all(&self, wal_dir: &Path) -> Result<WalReadResult, WalReaderError> {
        if !wal_dir.exists() {
            return Ok(WalReadResult::default());
        }

        let segments = self.list_segments(wal_dir)?;
        let mut result = WalReadResult::default();

        for (idx, &segment_number) in segments.iter().enumerate() {
            let is_last = idx + 1 == segments.len();
            if is_last && self.header_missing(wal_dir, segment_number)? {
                result.headerless_segment = Some(segment_number);
                break;
            }
            let (records, valid_end, stop_reason) = self.read_segment(wal_dir, segment_number)?;

            for record in records {
                if let Some(prev) = result.records.last() {
                    if record.lsn <= prev.lsn {
                        return Err(WalReaderError::Corrupted {
                            segment: segment_number,
                            offset: 0,
                            detail: format!(
                                "LSN {} does not follow LSN {}",
                                record.lsn, prev.lsn
                            ),
                        });
                    }
                }
                result.records.push(record);
            }

            if stop_reason == ReadStopReason::PartialRecord {
                if !is_last {
                    return Err(WalReaderError::Corrupted {
                        segment: segment_number,
                        offset: valid_end,
                        detail: "partial record in a sealed segment".to_string(),
                    });
                }
                let original_size = std::fs::metadata(WalSegment::segment_path(
                    wal_dir,
                    segment_number,
                ))
                .map_err(|e| WalReaderError::Io(e.to_string()))?
                .len();
                result.truncate_info = Some(TruncateInfo {
                    segment_number,
                    valid_end,
                    original_size,
                });
            }
            result.stop_reason = stop_reason;
        }

        Ok(result)
    }

    /// Whether a segment stops at or before the end of its header
    /// without a valid header. Such a segment cannot hold records.
    fn header_missing(&self, wal_dir: &Path, segment_number: u64) -> Result<bool, WalReaderError> {
        let len = std::fs::metadata(WalSegment::segment_path(wal_dir, segment_number))
            .map_err(|e| WalReaderError::Io(e.to_string()))?
            .len();
        Ok(match len.cmp(&(SEGMENT_HEADER_SIZE as u64)) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => WalSegment::open_read(wal_dir, segment_number).is_err(),
            std::cmp::Ordering::Greater => false,
        })
    }

    /// List all segment numbers in the WAL directory, sorted.
    pub fn list_segments(&self, wal_dir: &Path) -> Result<Vec<u64>, WalReaderError> {
        list_segment_numbers(wal_dir).map_err(|e| WalReaderError::Io(e.to_string()))
    }
}

pub(crate) fn list_segment_numbers(wal_dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut segments = Vec::new();
    for entry in std::fs::read_dir(wal_dir)? {
        let entry = entry?;
        if let Some(num) = entry
            .file_name()
            .to_str()
            .and_then(WalSegment::parse_segment_number)
        {
            segments.push(num);
        }
    }
    segments.sort_unstable();
    Ok(segments)
}

/// Why reading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadStopReason {
    /// Read every byte
    #[default]
    EndOfData,
    /// Partial record at the end of the last segment (expected after crash)
    PartialRecord,
}

/// Location of a torn tail that should be cut off before appending again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateInfo {
    /// Segment containing the torn record
    pub segment_number: u64,
    /// Byte position where valid data ends
    pub valid_end: u64,
    /// Segment size before truncation
    pub original_size: u64,
}

impl TruncateInfo {
    /// Bytes that will be discarded
    pub fn bytes_to_truncate(&self) -> u64 {
        self.original_size.saturating_sub(self.valid_end)
    }

    /// Cut the segment back to its last valid record.
    pub fn apply(&self, wal_dir: &Path) -> std::io::Result<()> {
        let mut segment = WalSegment::open_append(wal_dir, self.segment_number)?;
        segment.truncate(self.valid_end)
    }
}

/// Result of reading the whole WAL.
#[derive(Debug, Default)]
pub struct WalReadResult {
    /// Valid records in LSN order
    pub records: Vec<WalRecord>,
    /// Torn tail in the last segment, if any
    pub truncate_info: Option<TruncateInfo>,
    /// Last segment cut short inside its header, to be deleted
    pub headerless_segment: Option<u64>,
    /// Why reading of the last segment stopped
    pub stop_reason: ReadStopReason,
}

impl WalReadResult {
    /// LSN of the last valid record (0 when empty)
    pub fn last_lsn(&self) -> u64 {
        self.records.last().map(|r| r.lsn).unwrap_or(0)
    }
}

/// WAL reader errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalReaderError {
    /// I/O failure while reading segments
    #[error("WAL I/O error: {0}")]
    Io(String),

    /// A record failed verification somewhere other than a torn tail
    #[error("WAL segment {segment} corrupted at byte {offset}: {detail}")]
    Corrupted {
        /// Segment number
        segment: u64,
        /// Byte offset within the segment
        offset: u64,
        /// What failed
        detail: String,
    },
}

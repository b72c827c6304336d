//! WAL writer with durability mode support.
//!
//! The writer assigns log sequence numbers, frames entries into records,
//! appends them to the active segment and fsyncs according to the
//! configured mode.

use super::DurabilityMode;
use crate::codec::StorageCodec;
use crate::format::{WalRecord, WalSegment, SEGMENT_HEADER_SIZE};
use crate::wal::config::WalConfig;
use crate::wal::reader::list_segment_numbers;
use chronicle_core::Timestamp;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Cumulative WAL operation counters.
///
/// These counters accumulate over the lifetime of the WalWriter
/// and are never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalCounters {
    /// Total WAL record appends
    pub wal_appends: u64,
    /// Total sync/fsync calls
    pub sync_calls: u64,
    /// Total bytes written to WAL segments
    pub bytes_written: u64,
    /// Total nanoseconds spent in sync/fsync calls
    pub sync_nanos: u64,
}

/// WAL writer with configurable durability modes.
///
/// - `Cache`: records are dropped, no files are created
/// - `Always`: fsync after every record
/// - `Standard`: fsync after `batch_size` records, or once `interval_ms`
///   has elapsed when a flush thread calls [`WalWriter::sync_if_overdue`]
///
/// When the active segment would exceed the configured size, the writer
/// closes it and rotates to a new one. Closed segments are immutable.
///
/// A failed append leaves no bytes behind: the segment is cut back to
/// where the record started. If that cut fails too the writer refuses
/// every later append.
pub struct WalWriter {
    /// Active segment (None in Cache mode)
    segment: Option<WalSegment>,
    durability: DurabilityMode,
    wal_dir: PathBuf,
    database_uuid: [u8; 16],
    config: WalConfig,
    codec: Box<dyn StorageCodec>,

    next_lsn: u64,
    current_segment_number: u64,

    writes_since_sync: usize,
    last_sync_time: Instant,
    has_unsynced_data: bool,
    poisoned: bool,

    counters: WalCounters,

    #[cfg(test)]
    fail_next_sync: bool,
}

impl WalWriter {
    /// Create a new WAL writer.
    ///
    /// `next_lsn` is the sequence number of the next record, normally one
    /// past the last record recovered from `wal_dir`. The last existing
    /// segment is reopened for appending; if none exist, segment 1 is
    /// created.
    pub fn new(
        wal_dir: PathBuf,
        database_uuid: [u8; 16],
        durability: DurabilityMode,
        config: WalConfig,
        codec: Box<dyn StorageCodec>,
        next_lsn: u64,
    ) -> std::io::Result<Self> {
        let mut writer = WalWriter {
            segment: None,
            durability,
            wal_dir,
            database_uuid,
            config,
            codec,
            next_lsn: next_lsn.max(1),
            current_segment_number: 0,
            writes_since_sync: 0,
            last_sync_time: Instant::now(),
            has_unsynced_data: false,
            poisoned: false,
            counters: WalCounters::default(),
            #[cfg(test)]
            fail_next_sync: false,
        };

        if !durability.requires_wal() {
            return Ok(writer);
        }

        std::fs::create_dir_all(&writer.wal_dir)?;

        let (segment, number) = match list_segment_numbers(&writer.wal_dir)?.last() {
            Some(&num) => match WalSegment::open_append(&writer.wal_dir, num) {
                Ok(seg) => (seg, num),
                Err(e) => {
                    tracing::warn!(
                        target: "chronicle::wal",
                        segment = num,
                        error = %e,
                        "Cannot reopen last WAL segment, starting a new one"
                    );
                    let seg = WalSegment::create(&writer.wal_dir, num + 1, database_uuid)?;
                    (seg, num + 1)
                }
            },
            None => (WalSegment::create(&writer.wal_dir, 1, database_uuid)?, 1),
        };

        tracing::debug!(
            target: "chronicle::wal",
            segment = number,
            next_lsn = writer.next_lsn,
            mode = durability.name(),
            codec = writer.codec.codec_id(),
            "WAL writer opened"
        );

        writer.segment = Some(segment);
        writer.current_segment_number = number;
        Ok(writer)
    }

    /// Append one encoded entry to the WAL.
    ///
    /// Returns the LSN assigned to the record. In Cache mode nothing is
    /// written but an LSN is still assigned. On error the LSN is not used
    /// up and the segment holds no part of the record.
    pub fn append(&mut self, entry: &[u8]) -> std::io::Result<u64> {
        let lsn = self.next_lsn;

        if !self.durability.requires_wal() {
            self.next_lsn += 1;
            return Ok(lsn);
        }

        if self.poisoned {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "WAL writer disabled after a failed append could not be rolled back",
            ));
        }

        let record = WalRecord::new(lsn, Timestamp::now().as_micros(), self.codec.encode(entry));
        let bytes = record.to_bytes();

        let needs_rotation = match self.segment.as_ref() {
            Some(segment) => {
                segment.size() > SEGMENT_HEADER_SIZE as u64
                    && segment.size() + bytes.len() as u64 > self.config.segment_size
            }
            None => true,
        };
        if needs_rotation {
            self.rotate_segment()?;
        }

        let start = self.active_segment()?.size();
        if let Err(e) = self.write_record(&bytes) {
            self.roll_back(start, &e);
            return Err(e);
        }

        self.next_lsn += 1;
        self.counters.wal_appends += 1;
        self.counters.bytes_written += bytes.len() as u64;

        Ok(lsn)
    }

    fn write_record(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.active_segment()?.write(bytes)?;
        self.writes_since_sync += 1;
        self.has_unsynced_data = true;
        self.maybe_sync()
    }

    /// Cut the active segment back to `position` after a failed append.
    fn roll_back(&mut self, position: u64, cause: &std::io::Error) {
        let result = match self.segment.as_mut() {
            Some(segment) => segment.truncate(position),
            None => Ok(()),
        };
        match result {
            Ok(()) => tracing::warn!(
                target: "chronicle::wal",
                segment = self.current_segment_number,
                position,
                error = %cause,
                "WAL append failed, record rolled back"
            ),
            Err(e) => {
                tracing::error!(
                    target: "chronicle::wal",
                    segment = self.current_segment_number,
                    position,
                    error = %cause,
                    rollback_error = %e,
                    "WAL append failed and could not be rolled back"
                );
                self.poisoned = true;
            }
        }
    }

    fn active_segment(&mut self) -> std::io::Result<&mut WalSegment> {
        self.segment
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "WAL segment is not open"))
    }

    fn maybe_sync(&mut self) -> std::io::Result<()> {
        match self.durability {
            DurabilityMode::Always => self.sync_now(),
            DurabilityMode::Standard { batch_size, .. } => {
                if self.writes_since_sync >= batch_size {
                    self.sync_now()?;
                }
                Ok(())
            }
            DurabilityMode::Cache => Ok(()),
        }
    }

    fn sync_now(&mut self) -> std::io::Result<()> {
        #[cfg(test)]
        {
            if std::mem::take(&mut self.fail_next_sync) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected sync failure"));
            }
        }
        if let Some(ref mut segment) = self.segment {
            let start = Instant::now();
            segment.sync()?;
            self.counters.sync_calls += 1;
            self.counters.sync_nanos += start.elapsed().as_nanos() as u64;
        }
        self.writes_since_sync = 0;
        self.last_sync_time = Instant::now();
        self.has_unsynced_data = false;
        Ok(())
    }

    fn rotate_segment(&mut self) -> std::io::Result<()> {
        if let Some(ref mut segment) = self.segment {
            segment.close()?;
        }

        let next = self.current_segment_number + 1;
        let segment = WalSegment::create(&self.wal_dir, next, self.database_uuid)?;
        self.current_segment_number = next;

        tracing::debug!(
            target: "chronicle::wal",
            segment = self.current_segment_number,
            "Rotated WAL segment"
        );

        self.segment = Some(segment);
        self.writes_since_sync = 0;
        self.last_sync_time = Instant::now();
        self.has_unsynced_data = false;
        Ok(())
    }

    /// Force all written records to disk regardless of mode.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.sync_now()
    }

    /// Sync if the Standard interval has elapsed and there is unsynced data.
    ///
    /// Returns `true` if a sync was performed.
    pub fn sync_if_overdue(&mut self) -> std::io::Result<bool> {
        if !self.has_unsynced_data {
            return Ok(false);
        }

        if let DurabilityMode::Standard { interval_ms, .. } = self.durability {
            if self.last_sync_time.elapsed().as_millis() as u64 >= interval_ms {
                self.sync_now()?;
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// LSN the next record will receive.
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Current segment number (0 in Cache mode).
    pub fn current_segment(&self) -> u64 {
        self.current_segment_number
    }

    /// Current segment size in bytes.
    pub fn current_segment_size(&self) -> u64 {
        self.segment
            .as_ref()
            .map(|s| s.size())
            .unwrap_or(SEGMENT_HEADER_SIZE as u64)
    }

    /// Durability mode this writer was opened with.
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// Snapshot of cumulative WAL counters.
    pub fn counters(&self) -> WalCounters {
        self.counters.clone()
    }

    /// WAL directory path.
    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    /// Close the writer, ensuring all data is flushed.
    pub fn close(mut self) -> std::io::Result<()> {
        self.flush()?;
        if let Some(ref mut segment) = self.segment {
            segment.close()?;
        }
        Ok(())
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if self.has_unsynced_data {
            if let Some(ref mut segment) = self.segment {
                let _ = segment.sync();
            }
        }
    }
}

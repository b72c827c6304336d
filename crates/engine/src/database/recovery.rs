//! WAL replay on open
//!
//! Reads every segment, cuts off a torn tail, and re-applies each entry to
//! a fresh [`ShardedStore`] through the storage `restore*` paths, which
//! skip concurrency checks but still verify stream contiguity and position
//! order.

use chronicle_core::Result;
use chronicle_durability::{StorageCodec, WalEntry, WalReader, WalSegment};
use chronicle_storage::ShardedStore;
use std::path::Path;
use tracing::{info, warn};

/// Counts gathered while replaying the WAL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// WAL records read
    pub records: usize,
    /// Event commits restored
    pub commits: usize,
    /// Snapshot saves, removes and clears applied
    pub snapshot_ops: usize,
    /// Content syncs and removes applied
    pub content_ops: usize,
    /// Bytes cut from a torn tail
    pub truncated_bytes: u64,
    /// Last segment deleted because a crash cut its header short
    pub discarded_segment: Option<u64>,
    /// LSN of the last record replayed (0 when the WAL was empty)
    pub last_lsn: u64,
}

/// Replay the WAL under `wal_dir` into `storage`, decoding entries with `codec`.
pub(crate) fn replay(
    wal_dir: &Path,
    storage: &ShardedStore,
    codec: Box<dyn StorageCodec>,
) -> Result<RecoveryStats> {
    let reader = WalReader::new(codec);
    let result = reader.read_all(wal_dir)?;

    let mut stats = RecoveryStats {
        records: result.records.len(),
        last_lsn: result.last_lsn(),
        ..RecoveryStats::default()
    };

    if let Some(info) = &result.truncate_info {
        warn!(
            target: "chronicle::recovery",
            segment = info.segment_number,
            valid_end = info.valid_end,
            bytes = info.bytes_to_truncate(),
            "Truncating torn WAL tail"
        );
        info.apply(wal_dir)?;
        stats.truncated_bytes = info.bytes_to_truncate();
    }

    if let Some(segment) = result.headerless_segment {
        warn!(
            target: "chronicle::recovery",
            segment,
            "Removing WAL segment whose header was never written"
        );
        std::fs::remove_file(WalSegment::segment_path(wal_dir, segment))?;
        stats.discarded_segment = Some(segment);
    }

    for record in &result.records {
        match WalEntry::decode(&record.entry)? {
            WalEntry::EventCommitted(commit) => {
                storage.events().restore(commit)?;
                stats.commits += 1;
            }
            WalEntry::SnapshotSaved {
                collection,
                document_id,
                row,
            } => {
                storage.states().collection(&collection).restore(document_id, row);
                stats.snapshot_ops += 1;
            }
            WalEntry::SnapshotRemoved {
                collection,
                document_id,
            } => {
                storage
                    .states()
                    .collection(&collection)
                    .restore_remove(&document_id);
                stats.snapshot_ops += 1;
            }
            WalEntry::CollectionCleared { collection } => {
                storage.states().collection(&collection).restore_clear();
                stats.snapshot_ops += 1;
            }
            WalEntry::ContentSynced(row) => {
                storage.contents().restore(row);
                stats.content_ops += 1;
            }
            WalEntry::ContentRemoved { document_id } => {
                storage.contents().restore_remove(&document_id);
                stats.content_ops += 1;
            }
        }
    }

    info!(
        target: "chronicle::recovery",
        records = stats.records,
        commits = stats.commits,
        snapshot_ops = stats.snapshot_ops,
        content_ops = stats.content_ops,
        position = storage.events().position(),
        "Recovery complete"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::{
        DocumentId, Error, EventCommit, EventData, SnapshotRow, StreamName,
    };
    use chronicle_durability::{DurabilityMode, IdentityCodec, WalConfig, WalWriter};
    use serde_json::json;
    use tempfile::TempDir;

    fn write(wal_dir: &Path, entries: &[WalEntry]) {
        let mut writer = WalWriter::new(
            wal_dir.to_path_buf(),
            [0u8; 16],
            DurabilityMode::Always,
            WalConfig::for_testing(),
            Box::new(IdentityCodec),
            1,
        )
        .unwrap();
        for entry in entries {
            writer.append(&entry.encode().unwrap()).unwrap();
        }
        writer.close().unwrap();
    }

    fn commit(stream: &str, offset: u64, position: u64) -> WalEntry {
        let mut commit = EventCommit::new(
            StreamName::new(stream).unwrap(),
            offset,
            &[EventData::new("Happened", json!({}))],
        )
        .unwrap();
        commit.position = Some(position);
        WalEntry::EventCommitted(commit)
    }

    #[test]
    fn test_replay_rebuilds_all_tables() {
        let dir = TempDir::new().unwrap();
        let wal_dir = dir.path().join("wal");
        write(
            &wal_dir,
            &[
                commit("a", 0, 1),
                commit("b", 0, 2),
                commit("a", 1, 3),
                WalEntry::SnapshotSaved {
                    collection: "States_Apps".into(),
                    document_id: DocumentId::new("x"),
                    row: SnapshotRow::new(Some(b"{}".to_vec()), 3),
                },
                WalEntry::SnapshotSaved {
                    collection: "States_Apps".into(),
                    document_id: DocumentId::new("y"),
                    row: SnapshotRow::new(None, 0),
                },
                WalEntry::SnapshotRemoved {
                    collection: "States_Apps".into(),
                    document_id: DocumentId::new("y"),
                },
            ],
        );

        let storage = ShardedStore::new();
        let stats = replay(&wal_dir, &storage, Box::new(IdentityCodec)).unwrap();

        assert_eq!(stats.commits, 3);
        assert_eq!(stats.snapshot_ops, 3);
        assert_eq!(storage.events().position(), 3);
        assert_eq!(
            storage.events().stream_offset(&StreamName::new("a").unwrap()),
            Some(1)
        );
        let apps = storage.states().collection("States_Apps");
        assert_eq!(apps.get(&DocumentId::new("x")).unwrap().version, 3);
        assert!(apps.get(&DocumentId::new("y")).is_none());
    }

    #[test]
    fn test_gap_in_stream_is_corruption() {
        let dir = TempDir::new().unwrap();
        let wal_dir = dir.path().join("wal");
        write(&wal_dir, &[commit("a", 0, 1), commit("a", 2, 2)]);

        let err = replay(&wal_dir, &ShardedStore::new(), Box::new(IdentityCodec)).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_position_regression_is_corruption() {
        let dir = TempDir::new().unwrap();
        let wal_dir = dir.path().join("wal");
        write(&wal_dir, &[commit("a", 0, 2), commit("b", 0, 1)]);

        let err = replay(&wal_dir, &ShardedStore::new(), Box::new(IdentityCodec)).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }
}

//! Logical WAL entries
//!
//! One `WalEntry` is written for every mutation that becomes visible in
//! memory. Entries are MessagePack-encoded with field names so that
//! adding optional fields stays backward compatible.

use chronicle_core::{ContentRow, DocumentId, Error, EventCommit, Result, SnapshotRow};
use serde::{Deserialize, Serialize};

/// A single durable mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    /// A commit was appended to the event log. `position` is always set.
    EventCommitted(EventCommit),

    /// A snapshot row was written to a state collection
    SnapshotSaved {
        /// State collection name
        collection: String,
        /// Document key
        document_id: DocumentId,
        /// Row as stored
        row: SnapshotRow,
    },

    /// A snapshot row was deleted
    SnapshotRemoved {
        /// State collection name
        collection: String,
        /// Document key
        document_id: DocumentId,
    },

    /// Every row of a state collection was deleted
    CollectionCleared {
        /// State collection name
        collection: String,
    },

    /// A content row was written to ContentsAll (and mirrored or removed
    /// from ContentsPublished according to its status)
    ContentSynced(ContentRow),

    /// A content row was removed from both content tables
    ContentRemoved {
        /// Content id
        document_id: DocumentId,
    },
}

impl WalEntry {
    /// Encode to MessagePack.
    pub fn encode(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Decode from MessagePack.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::corruption(format!("WAL entry: {}", e)))
    }

    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            WalEntry::EventCommitted(_) => "event_committed",
            WalEntry::SnapshotSaved { .. } => "snapshot_saved",
            WalEntry::SnapshotRemoved { .. } => "snapshot_removed",
            WalEntry::CollectionCleared { .. } => "collection_cleared",
            WalEntry::ContentSynced(_) => "content_synced",
            WalEntry::ContentRemoved { .. } => "content_removed",
        }
    }
}

//! Raw snapshot rows of the `States_*` collections

use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// One row of a state collection
///
/// `document` is the serialized materialized state; `None` is a valid
/// tombstone and is distinct from the row not existing at all.
/// `version` counts the stream commits applied to build the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Serialized document, or `None` for a tombstone
    pub document: Option<Vec<u8>>,
    /// Number of commits applied
    pub version: u64,
    /// Last write instant
    pub updated_at: Timestamp,
}

impl SnapshotRow {
    /// Create a row stamped with the current time
    pub fn new(document: Option<Vec<u8>>, version: u64) -> Self {
        Self {
            document,
            version,
            updated_at: Timestamp::now(),
        }
    }

    /// Whether the row is a tombstone
    pub fn is_tombstone(&self) -> bool {
        self.document.is_none()
    }
}

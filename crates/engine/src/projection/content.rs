//! ContentProjection: content streams into `States_Contents` and the
//! content read models
//!
//! Every `content-{app}-{id}` stream is folded into a [`ContentState`]
//! snapshot whose version is the number of commits it reflects. After each
//! commit the snapshot is saved and the matching [`ContentRow`] is written
//! through [`ContentReadModel::sync`], carrying the same version.
//!
//! Redelivery is harmless: a commit already reflected by the snapshot
//! version is skipped, and a commit arriving ahead of the snapshot first
//! folds the commits it missed from the stream.

use super::Projection;
use crate::database::Database;
use crate::primitives::{ContentReadModel, EventLog, Snapshot, SnapshotStore};
use chronicle_core::{
    ContentRow, ContentScope, DocumentId, DomainId, EventCommit, EventData, Result, Status,
    StreamFilter, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Event type of [`ContentCreated`]
pub const CONTENT_CREATED: &str = "ContentCreated";
/// Event type of [`ContentUpdated`]
pub const CONTENT_UPDATED: &str = "ContentUpdated";
/// Event type of [`ContentStatusChanged`]
pub const CONTENT_STATUS_CHANGED: &str = "ContentStatusChanged";
/// Event type of a deletion (empty payload)
pub const CONTENT_DELETED: &str = "ContentDeleted";

/// Snapshot collection of content aggregates
pub const CONTENT_COLLECTION: &str = "States_Contents";

const PROJECTION_NAME: &str = "ContentProjection";
const STREAM_PREFIX: &str = "content-";

/// Payload of `ContentCreated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCreated {
    /// Owning app
    pub app_id: DomainId,
    /// Schema of the item
    pub schema_id: DomainId,
    /// Initial data
    pub data: serde_json::Value,
    /// Initial status, `Draft` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl ContentCreated {
    /// Wrap as an event
    pub fn to_event(&self) -> Result<EventData> {
        Ok(EventData::new(CONTENT_CREATED, serde_json::to_value(self)?))
    }
}

/// Payload of `ContentUpdated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdated {
    /// Replacement data
    pub data: serde_json::Value,
}

impl ContentUpdated {
    /// Wrap as an event
    pub fn to_event(&self) -> Result<EventData> {
        Ok(EventData::new(CONTENT_UPDATED, serde_json::to_value(self)?))
    }
}

/// Payload of `ContentStatusChanged`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStatusChanged {
    /// New status
    pub status: Status,
}

impl ContentStatusChanged {
    /// Wrap as an event
    pub fn to_event(&self) -> Result<EventData> {
        Ok(EventData::new(
            CONTENT_STATUS_CHANGED,
            serde_json::to_value(self)?,
        ))
    }
}

/// Materialized content aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentState {
    /// Owning app
    pub app_id: DomainId,
    /// Schema of the item
    pub schema_id: DomainId,
    /// Current workflow status
    pub status: Status,
    /// Current data
    pub data: serde_json::Value,
    /// Soft-delete flag; deleted items keep their last data
    pub is_deleted: bool,
    /// Commit time of `ContentCreated`
    pub created: Timestamp,
    /// Commit time of the last folded event
    pub last_modified: Timestamp,
}

impl ContentState {
    fn row(&self, id: &DocumentId, version: u64) -> ContentRow {
        ContentRow {
            document_id: id.clone(),
            app_id: self.app_id.clone(),
            schema_id: self.schema_id.clone(),
            status: self.status.clone(),
            data: self.data.clone(),
            version,
            is_deleted: self.is_deleted,
            created: self.created,
            last_modified: self.last_modified,
        }
    }
}

/// Fold one event into the state; `None` until the item is created
fn fold(
    id: &DocumentId,
    state: Option<ContentState>,
    event: &EventData,
    at: Timestamp,
) -> Result<Option<ContentState>> {
    match (event.event_type.as_str(), state) {
        (CONTENT_CREATED, None) => {
            let created: ContentCreated = serde_json::from_value(event.payload.clone())?;
            Ok(Some(ContentState {
                app_id: created.app_id,
                schema_id: created.schema_id,
                status: created.status.unwrap_or_default(),
                data: created.data,
                is_deleted: false,
                created: at,
                last_modified: at,
            }))
        }
        (CONTENT_CREATED, Some(state)) => {
            warn!(
                target: "chronicle::projection",
                document_id = %id,
                "Ignoring ContentCreated for an existing item"
            );
            Ok(Some(state))
        }
        (CONTENT_UPDATED, Some(mut state)) => {
            let updated: ContentUpdated = serde_json::from_value(event.payload.clone())?;
            state.data = updated.data;
            state.last_modified = at;
            Ok(Some(state))
        }
        (CONTENT_STATUS_CHANGED, Some(mut state)) => {
            let changed: ContentStatusChanged = serde_json::from_value(event.payload.clone())?;
            state.status = changed.status;
            state.last_modified = at;
            Ok(Some(state))
        }
        (CONTENT_DELETED, Some(mut state)) => {
            state.is_deleted = true;
            state.last_modified = at;
            Ok(Some(state))
        }
        (CONTENT_UPDATED | CONTENT_STATUS_CHANGED | CONTENT_DELETED, None) => {
            warn!(
                target: "chronicle::projection",
                document_id = %id,
                event_type = %event.event_type,
                "Ignoring event for an item that was never created"
            );
            Ok(None)
        }
        (_, state) => Ok(state),
    }
}

/// Projection maintaining `States_Contents`, `ContentsAll` and
/// `ContentsPublished`
pub struct ContentProjection {
    log: EventLog,
    states: SnapshotStore<ContentState>,
    contents: ContentReadModel,
}

impl ContentProjection {
    /// Create the projection over `db`
    pub fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self {
            log: EventLog::new(Arc::clone(&db)),
            states: SnapshotStore::with_collection_name(Arc::clone(&db), CONTENT_COLLECTION)?,
            contents: ContentReadModel::new(db),
        })
    }

    /// Snapshot of one content item
    pub fn state(&self, id: &DocumentId) -> Result<Option<Snapshot<ContentState>>> {
        self.states.load(id)
    }

    /// The read model this projection writes
    pub fn read_model(&self) -> &ContentReadModel {
        &self.contents
    }

    fn sync_row(&self, id: &DocumentId, state: &ContentState, version: u64) -> Result<()> {
        self.contents.sync(state.row(id, version))?;
        Ok(())
    }
}

impl Projection for ContentProjection {
    fn name(&self) -> &str {
        PROJECTION_NAME
    }

    fn filter(&self) -> StreamFilter {
        StreamFilter::prefix(STREAM_PREFIX)
    }

    fn apply(&self, commit: &EventCommit) -> Result<()> {
        let id = DocumentId::from(&commit.stream);
        let snapshot = self.states.load(&id)?;
        let stored = snapshot.as_ref().map_or(0, |s| s.version);
        let target = commit.offset + 1;

        if stored >= target {
            // Already folded; the row may still lag if a crash hit between
            // the snapshot save and the sync
            if let Some(Snapshot {
                document: Some(state),
                version,
                ..
            }) = snapshot
            {
                let row_version = self
                    .contents
                    .get(&id, ContentScope::All)
                    .map(|row| row.version);
                if row_version.map_or(true, |v| v < version) {
                    self.sync_row(&id, &state, version)?;
                }
            }
            return Ok(());
        }

        let missing = self
            .log
            .read_stream_commits(&commit.stream, stored, (target - stored) as usize);
        if missing.len() as u64 != target - stored {
            debug!(
                target: "chronicle::projection",
                document_id = %id,
                stored,
                target,
                found = missing.len(),
                "Stream shorter than expected, folding what is there"
            );
        }

        let mut state = snapshot.and_then(|s| s.document);
        for missed in missing.iter() {
            for event in missed.events()? {
                state = fold(&id, state, &event, missed.timestamp)?;
            }
            let version = missed.offset + 1;
            self.states.save(&id, state.as_ref(), version)?;
            if let Some(state) = &state {
                self.sync_row(&id, state, version)?;
            }
        }
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        let cleared = self.states.clear()?;
        debug!(target: "chronicle::projection", cleared, "Cleared content snapshots");
        Ok(())
    }
}

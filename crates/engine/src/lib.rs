//! Database engine for Chronicle
//!
//! This crate orchestrates all lower layers:
//! - Database: open/close, WAL replay on startup, conflict retry
//! - Primitives: EventLog, SnapshotStore, ContentReadModel
//! - Projections: checkpointed runners that build read models from the
//!   global log
//!
//! The engine is the only component that knows about:
//! - Cross-layer coordination (storage + WAL + recovery)
//! - Where checkpoints and read models live

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod primitives;
pub mod projection;

pub use database::{
    ChronicleConfig, Database, DatabaseStats, RecoveryStats, RetryConfig, RetrySection,
    CONFIG_FILE_NAME,
};
pub use primitives::{
    ContentReadModel, EventLog, Snapshot, SnapshotStore, STATE_COLLECTION_PREFIX,
};
pub use projection::{
    CatchUp, ConsumerState, ContentCreated, ContentProjection, ContentState,
    ContentStatusChanged, ContentUpdated, Projection, ProjectionRunner, RunnerHandle,
    CONTENT_COLLECTION, CONTENT_CREATED, CONTENT_DELETED, CONTENT_STATUS_CHANGED,
    CONTENT_UPDATED, DEFAULT_BATCH_SIZE, EVENT_CONSUMERS_COLLECTION,
};

pub use chronicle_core::{
    ContentRow, ContentScope, DocumentId, DomainId, Error, EventCommit, EventData,
    EventPosition, Result, Status, StoredEvent, StreamFilter, StreamName, Timestamp,
};
pub use chronicle_durability::DurabilityMode;
pub use chronicle_storage::SyncOutcome;

//! Core types for Chronicle
//!
//! This crate defines the foundational types shared by every layer:
//! - StreamName, DocumentId, DomainId, EventId: identifiers
//! - Timestamp: microsecond commit instants
//! - EventData, EventCommit, StreamFilter: the event log record model
//! - SnapshotRow: raw state-collection rows
//! - ContentRow, Status, ContentScope: content read-model rows
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod content;
pub mod error;
pub mod event;
pub mod snapshot;
pub mod timestamp;
pub mod types;

pub use content::{ContentRow, ContentScope, Status};
pub use error::{Error, Result};
pub use event::{EventCommit, EventData, EventPosition, StoredEvent, StreamFilter};
pub use snapshot::SnapshotRow;
pub use timestamp::Timestamp;
pub use types::{DocumentId, DomainId, EventId, StreamName};

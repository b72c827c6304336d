//! Chronicle - embedded event store
//!
//! Chronicle keeps an append-only event log of named streams, versioned
//! aggregate snapshots in `States_*` collections, and the `ContentsAll` /
//! `ContentsPublished` read models that projections build from the log.
//!
//! # Quick Start
//!
//! ```ignore
//! use chronicle::{Database, EventData, EventLog, StreamName};
//! use serde_json::json;
//!
//! let db = Database::open("./data")?;
//! let log = EventLog::new(db.clone());
//!
//! let stream = StreamName::new("content-app1-c1")?;
//! log.append(&stream, 0, &[EventData::new("ContentCreated", json!({}))])?;
//! assert_eq!(log.position().position, 1);
//! ```
//!
//! # Architecture
//!
//! - `chronicle-core`: identifiers, records, errors
//! - `chronicle-storage`: in-memory tables and the global sequencer
//! - `chronicle-durability`: segmented WAL
//! - `chronicle-engine`: the database, its typed front ends and projections
//!
//! Everything public lives in the engine and is re-exported here.

pub mod logging;

pub use chronicle_engine::*;

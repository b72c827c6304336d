//! Primitives layer for Chronicle
//!
//! Stateless facades over the Database engine:
//! - **EventLog**: append-only streams with a global position
//! - **SnapshotStore**: versioned aggregate state in `States_*` collections
//! - **ContentReadModel**: `ContentsAll` / `ContentsPublished`
//!
//! ## Design Principle: Stateless Facades
//!
//! Each primitive holds only an `Arc<Database>` and delegates to the
//! storage tables, so any number of handles on the same database are safe
//! and see the same data.

pub mod content;
pub mod event_log;
pub mod snapshot;

pub use content::ContentReadModel;
pub use event_log::EventLog;
pub use snapshot::{Snapshot, SnapshotStore, STATE_COLLECTION_PREFIX};

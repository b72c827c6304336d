//! Storage layer for Chronicle
//!
//! In-memory tables backing the event store. Every mutating call takes a
//! `persist` callback that runs while the relevant lock is held, so the
//! engine can write the WAL record before the change becomes visible and
//! abort the change if the write fails.
//!
//! - [`EventTable`]: commits by `(stream, offset)` plus global, position
//!   and timestamp indexes
//! - [`GlobalSequencer`]: the single global critical section assigning
//!   positions
//! - [`StateTable`]: named snapshot collections with version CAS
//! - [`ContentTables`]: `ContentsAll` / `ContentsPublished`
//! - [`ShardedStore`]: the three tables bundled together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod content_table;
pub mod event_table;
pub mod sequencer;
pub mod sharded;
pub mod state_table;

pub use content_table::{ContentTables, SyncOutcome};
pub use event_table::{EventTable, StreamLog};
pub use sequencer::GlobalSequencer;
pub use sharded::ShardedStore;
pub use state_table::{StateCollection, StateTable};

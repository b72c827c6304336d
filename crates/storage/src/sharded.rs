//! The complete in-memory store
//!
//! Bundles the event table, state collections and content tables. The
//! engine owns one `ShardedStore` per open database and rebuilds it from
//! the WAL on startup.

use crate::content_table::ContentTables;
use crate::event_table::EventTable;
use crate::state_table::StateTable;

/// In-memory store for one database
#[derive(Debug, Default)]
pub struct ShardedStore {
    events: EventTable,
    states: StateTable,
    contents: ContentTables,
}

impl ShardedStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// The event log table
    pub fn events(&self) -> &EventTable {
        &self.events
    }

    /// The state collections
    pub fn states(&self) -> &StateTable {
        &self.states
    }

    /// The content read-model tables
    pub fn contents(&self) -> &ContentTables {
        &self.contents
    }
}

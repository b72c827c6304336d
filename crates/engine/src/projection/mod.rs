//! Projections: read models built from the global log
//!
//! A [`Projection`] folds commits into some derived state. A
//! [`ProjectionRunner`] feeds it every matching commit after its stored
//! checkpoint, in position order, and advances the checkpoint in the
//! `EventConsumers` collection.
//!
//! Delivery is at least once: a crash between applying a batch and saving
//! the checkpoint redelivers that batch, so `apply` must be idempotent.
//! Read models lag the log until the next catch-up.

pub mod content;
mod runner;

pub use content::{
    ContentCreated, ContentProjection, ContentState, ContentStatusChanged, ContentUpdated,
    CONTENT_COLLECTION, CONTENT_CREATED, CONTENT_DELETED, CONTENT_STATUS_CHANGED,
    CONTENT_UPDATED,
};
pub use runner::{
    CatchUp, ConsumerState, ProjectionRunner, RunnerHandle, DEFAULT_BATCH_SIZE,
    EVENT_CONSUMERS_COLLECTION,
};

use chronicle_core::{EventCommit, Result, StreamFilter};

/// Something that consumes the global log
pub trait Projection: Send + Sync {
    /// Unique name, used as the checkpoint key
    fn name(&self) -> &str;

    /// Streams this projection wants to see
    fn filter(&self) -> StreamFilter {
        StreamFilter::All
    }

    /// Fold one commit. Called in position order; may see a commit again
    /// after a crash.
    fn apply(&self, commit: &EventCommit) -> Result<()>;

    /// Drop derived state before a rebuild from position 0
    fn reset(&self) -> Result<()> {
        Ok(())
    }
}

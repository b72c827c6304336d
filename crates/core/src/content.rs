//! Content read-model rows
//!
//! `ContentsAll` holds every content item; `ContentsPublished` holds the
//! subset that is published and not deleted. A row in the published table
//! is always an exact copy of its `ContentsAll` counterpart.

use crate::timestamp::Timestamp;
use crate::types::{DocumentId, DomainId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow status of a content item
///
/// Statuses are free-form workflow names; only [`Status::PUBLISHED`]
/// carries meaning for the read models.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Status(String);

impl Status {
    /// Status of a published item
    pub const PUBLISHED: &'static str = "Published";
    /// Initial status
    pub const DRAFT: &'static str = "Draft";
    /// Retired status
    pub const ARCHIVED: &'static str = "Archived";

    /// Create a status
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The published status
    pub fn published() -> Self {
        Self(Self::PUBLISHED.to_string())
    }

    /// The draft status
    pub fn draft() -> Self {
        Self(Self::DRAFT.to_string())
    }

    /// Whether this is the published status
    pub fn is_published(&self) -> bool {
        self.0 == Self::PUBLISHED
    }

    /// Borrow the status name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::draft()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which content table a query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentScope {
    /// `ContentsAll`
    #[default]
    All,
    /// `ContentsPublished`
    Published,
}

/// Denormalized content row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRow {
    /// Row key
    pub document_id: DocumentId,
    /// Owning app
    pub app_id: DomainId,
    /// Content schema
    pub schema_id: DomainId,
    /// Workflow status
    pub status: Status,
    /// Content data
    pub data: serde_json::Value,
    /// Source stream version, used for staleness detection
    pub version: u64,
    /// Soft-delete flag
    pub is_deleted: bool,
    /// Creation instant
    pub created: Timestamp,
    /// Last modification instant
    pub last_modified: Timestamp,
}

impl ContentRow {
    /// Whether the row belongs in `ContentsPublished`
    pub fn is_servable(&self) -> bool {
        self.status.is_published() && !self.is_deleted
    }
}

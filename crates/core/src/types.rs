//! Identifier types
//!
//! - StreamName: logical aggregate stream (e.g. `content-app1-c1`)
//! - EventId: unique id of one event commit
//! - DocumentId: key of a snapshot or read-model row
//! - DomainId: app, schema and content identifiers carried in rows

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length of a stream name in bytes
pub const MAX_STREAM_NAME_LENGTH: usize = 512;

/// Name of an event stream
///
/// One stream holds the ordered commits of one aggregate instance.
/// Names are non-empty, at most [`MAX_STREAM_NAME_LENGTH`] bytes, and
/// contain no control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamName(String);

impl StreamName {
    /// Create a validated stream name
    ///
    /// # Errors
    /// Returns `InvalidInput` for empty, oversized or control-character names.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_input("stream name must not be empty"));
        }
        if name.len() > MAX_STREAM_NAME_LENGTH {
            return Err(Error::invalid_input(format!(
                "stream name exceeds {} bytes",
                MAX_STREAM_NAME_LENGTH
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(Error::invalid_input(
                "stream name must not contain control characters",
            ));
        }
        Ok(Self(name))
    }

    /// Stream name for a content item: `content-{app}-{content}`
    ///
    /// # Errors
    /// Same rules as [`StreamName::new`] applied to the joined name.
    pub fn for_content(app_id: &DomainId, content_id: &DomainId) -> Result<Self> {
        Self::new(format!("content-{}-{}", app_id, content_id))
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Category prefix: the part before the first `-`
    pub fn category(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for StreamName {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        StreamName::new(value)
    }
}

/// Unique identifier of one event commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new random EventId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an EventId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get the raw bytes of this EventId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a snapshot row or read-model row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a document id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&StreamName> for DocumentId {
    fn from(value: &StreamName) -> Self {
        Self(value.as_str().to_string())
    }
}

/// Identifier of an app, schema or content item
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DomainId(String);

impl DomainId {
    /// Create a domain id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a random domain id
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DomainId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

//! Event log record model
//!
//! An [`EventCommit`] is one row of the event log: a batch of logical
//! [`EventData`] written atomically to a stream at a single offset. The
//! batch is kept as an opaque serialized payload; decoding happens on read
//! and fails loudly on corrupt bytes.
//!
//! ## Ordering
//!
//! - `offset` is contiguous from 0 within a stream
//! - `position` is assigned at commit, unique and strictly increasing
//!   across the whole log, starting at 1

use crate::error::{Error, Result};
use crate::timestamp::Timestamp;
use crate::types::{EventId, StreamName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One logical domain event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Event type name (e.g. `ContentCreated`)
    pub event_type: String,
    /// Envelope headers (actor, correlation ids, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, serde_json::Value>,
    /// Event body
    pub payload: serde_json::Value,
}

impl EventData {
    /// Create an event without headers
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            headers: BTreeMap::new(),
            payload,
        }
    }

    /// Attach a header
    pub fn with_header(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers.insert(name.into(), value);
        self
    }
}

/// A committed batch of events at one stream offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCommit {
    /// Unique commit id
    pub id: EventId,
    /// Stream this commit belongs to
    pub stream: StreamName,
    /// Offset within the stream
    pub offset: u64,
    /// Number of logical events in `payload`
    pub events_count: u32,
    /// Serialized `Vec<EventData>`
    pub payload: Vec<u8>,
    /// Commit instant
    pub timestamp: Timestamp,
    /// Global position; `None` until the commit is sequenced
    pub position: Option<u64>,
}

impl EventCommit {
    /// Build an unsequenced commit from a batch of events
    ///
    /// # Errors
    /// `InvalidInput` for an empty batch, `Serialization` if the batch
    /// cannot be encoded.
    pub fn new(stream: StreamName, offset: u64, events: &[EventData]) -> Result<Self> {
        if events.is_empty() {
            return Err(Error::invalid_input(format!(
                "append to '{}' carries no events",
                stream
            )));
        }
        let events_count = u32::try_from(events.len())
            .map_err(|_| Error::invalid_input("too many events in one commit"))?;
        let payload = serde_json::to_vec(events)?;
        Ok(Self {
            id: EventId::new(),
            stream,
            offset,
            events_count,
            payload,
            timestamp: Timestamp::now(),
            position: None,
        })
    }

    /// Decode the batched events
    ///
    /// # Errors
    /// `Serialization` when the payload is not a valid event batch or its
    /// length disagrees with `events_count`.
    pub fn events(&self) -> Result<Vec<EventData>> {
        let events: Vec<EventData> = serde_json::from_slice(&self.payload).map_err(|e| {
            Error::serialization(format!(
                "undecodable payload at {}@{}: {}",
                self.stream, self.offset, e
            ))
        })?;
        if events.len() != self.events_count as usize {
            return Err(Error::serialization(format!(
                "payload at {}@{} holds {} events, header says {}",
                self.stream,
                self.offset,
                events.len(),
                self.events_count
            )));
        }
        Ok(events)
    }

    /// Decode into one [`StoredEvent`] per logical event
    pub fn stored_events(&self) -> Result<Vec<StoredEvent>> {
        let position = self.position.unwrap_or(0);
        Ok(self
            .events()?
            .into_iter()
            .enumerate()
            .map(|(index, data)| StoredEvent {
                stream: self.stream.clone(),
                offset: self.offset,
                index: index as u32,
                position,
                timestamp: self.timestamp,
                data,
            })
            .collect())
    }

    /// Whether the commit has been assigned a global position
    pub fn is_sequenced(&self) -> bool {
        self.position.is_some()
    }
}

/// A decoded event together with its log coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Source stream
    pub stream: StreamName,
    /// Offset of the enclosing commit
    pub offset: u64,
    /// Index inside the commit batch
    pub index: u32,
    /// Global position of the enclosing commit
    pub position: u64,
    /// Commit instant
    pub timestamp: Timestamp,
    /// The event itself
    pub data: EventData,
}

/// The global position cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventPosition {
    /// Highest committed global position (0 for an empty log)
    pub position: u64,
}

/// Stream selection for global reads
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamFilter {
    /// Every stream
    #[default]
    All,
    /// Exactly one stream
    Stream(StreamName),
    /// Streams whose name starts with the prefix
    Prefix(String),
}

impl StreamFilter {
    /// Filter on a name prefix such as `content-`
    pub fn prefix(prefix: impl Into<String>) -> Self {
        StreamFilter::Prefix(prefix.into())
    }

    /// Whether the stream passes the filter
    pub fn matches(&self, stream: &StreamName) -> bool {
        match self {
            StreamFilter::All => true,
            StreamFilter::Stream(name) => name == stream,
            StreamFilter::Prefix(prefix) => stream.as_str().starts_with(prefix.as_str()),
        }
    }
}

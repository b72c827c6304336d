//! EventLog: append-only event streams with a global position
//!
//! ## Design Principles
//!
//! 1. **Optimistic per stream**: an append names the offset it expects to
//!    write. If another writer got there first the append fails with a
//!    conflict and nothing is written.
//!
//! 2. **One commit, one position**: each append stores one commit record
//!    (a batch of one or more events) and takes the next global position.
//!    Position assignment is the only global critical section.
//!
//! 3. **Watermark reads**: `read_all` never returns anything past the
//!    `EventPosition` watermark, so a consumer that remembers the last
//!    position it processed never skips a commit.
//!
//! ## Readers
//!
//! `read_*` methods decode payloads into [`StoredEvent`]s and fail with a
//! serialization error if a payload is corrupt. The `*_commits` variants
//! return the raw records without decoding.

use crate::database::Database;
use chronicle_core::{
    EventCommit, EventData, EventPosition, Result, StoredEvent, StreamFilter, StreamName,
    Timestamp,
};
use chronicle_durability::WalEntry;
use std::sync::Arc;
use tracing::debug;

fn decode_all<'a, I>(commits: I) -> Result<Vec<StoredEvent>>
where
    I: IntoIterator<Item = &'a Arc<EventCommit>>,
{
    let mut events = Vec::new();
    for commit in commits {
        events.extend(commit.stored_events()?);
    }
    Ok(events)
}

/// Append-only event log
///
/// ## Example
///
/// ```rust,ignore
/// let log = EventLog::new(db.clone());
/// let stream = StreamName::new("content-app1-c1")?;
///
/// log.append(&stream, 0, &[EventData::new("ContentCreated", json!({}))])?;
/// assert!(log.append(&stream, 0, &events).unwrap_err().is_conflict());
/// assert_eq!(log.position().position, 1);
/// ```
#[derive(Clone)]
pub struct EventLog {
    db: Arc<Database>,
}

impl EventLog {
    /// Create a handle over the database's event table
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The database this log writes to
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // ========== Writes ==========

    /// Append `events` as one commit at `expected_offset`
    ///
    /// Returns the committed offset.
    ///
    /// # Errors
    /// - `Conflict` when `expected_offset` is not the stream's next free
    ///   offset (0 for a new stream)
    /// - `InvalidInput` for an empty batch
    /// - WAL failures, in which case nothing is committed
    pub fn append(
        &self,
        stream: &StreamName,
        expected_offset: u64,
        events: &[EventData],
    ) -> Result<u64> {
        self.append_inner(stream, Some(expected_offset), events)
            .map(|commit| commit.offset)
    }

    /// Append at the next free offset without an expectation
    ///
    /// Returns the committed offset.
    pub fn append_any(&self, stream: &StreamName, events: &[EventData]) -> Result<u64> {
        self.append_inner(stream, None, events)
            .map(|commit| commit.offset)
    }

    /// Like [`EventLog::append`] but returns the whole stored commit
    pub fn append_commit(
        &self,
        stream: &StreamName,
        expected_offset: u64,
        events: &[EventData],
    ) -> Result<Arc<EventCommit>> {
        self.append_inner(stream, Some(expected_offset), events)
    }

    fn append_inner(
        &self,
        stream: &StreamName,
        expected: Option<u64>,
        events: &[EventData],
    ) -> Result<Arc<EventCommit>> {
        self.db.check_open()?;
        let commit = self
            .db
            .storage()
            .events()
            .append(stream, expected, events, |commit| {
                self.db.persist(&WalEntry::EventCommitted(commit.clone()))
            })?;
        debug!(
            target: "chronicle::events",
            stream = %stream,
            offset = commit.offset,
            position = commit.position.unwrap_or(0),
            events = commit.events_count,
            "Appended commit"
        );
        Ok(commit)
    }

    // ========== Stream reads ==========

    /// Events of `stream` from commit offset `from_offset` on
    ///
    /// Empty when the stream does not exist or is exhausted.
    pub fn read_stream(&self, stream: &StreamName, from_offset: u64) -> Result<Vec<StoredEvent>> {
        decode_all(&self.read_stream_commits(stream, from_offset, usize::MAX))
    }

    /// Raw commits of `stream` from `from_offset`, at most `limit`
    pub fn read_stream_commits(
        &self,
        stream: &StreamName,
        from_offset: u64,
        limit: usize,
    ) -> Vec<Arc<EventCommit>> {
        self.db
            .storage()
            .events()
            .read_stream(stream, from_offset, limit)
    }

    /// Events of `stream` committed after global position `after`
    pub fn read_stream_after_position(
        &self,
        stream: &StreamName,
        after: u64,
    ) -> Result<Vec<StoredEvent>> {
        decode_all(
            &self
                .db
                .storage()
                .events()
                .read_stream_after_position(stream, after, usize::MAX),
        )
    }

    /// Events of `stream` committed at or after `since`
    pub fn read_stream_since(
        &self,
        stream: &StreamName,
        since: Timestamp,
    ) -> Result<Vec<StoredEvent>> {
        decode_all(
            &self
                .db
                .storage()
                .events()
                .read_stream_since(stream, since, usize::MAX),
        )
    }

    // ========== Global reads ==========

    /// Events of up to `limit` commits with position greater than `after`
    ///
    /// Commits come in strictly increasing position order and never past
    /// the current [`EventPosition`].
    pub fn read_all(
        &self,
        after: u64,
        filter: &StreamFilter,
        limit: usize,
    ) -> Result<Vec<StoredEvent>> {
        decode_all(&self.read_all_commits(after, filter, limit))
    }

    /// Raw commits with position greater than `after`, at most `limit`
    pub fn read_all_commits(
        &self,
        after: u64,
        filter: &StreamFilter,
        limit: usize,
    ) -> Vec<Arc<EventCommit>> {
        self.db.storage().events().read_all(after, filter, limit)
    }

    /// Events of the newest `limit` matching commits, newest first
    pub fn read_all_reverse(&self, filter: &StreamFilter, limit: usize) -> Result<Vec<StoredEvent>> {
        let commits = self.db.storage().events().read_all_reverse(filter, limit);
        let mut events = Vec::new();
        for commit in &commits {
            events.extend(commit.stored_events()?.into_iter().rev());
        }
        Ok(events)
    }

    /// Commit at a global position
    pub fn get_by_position(&self, position: u64) -> Option<Arc<EventCommit>> {
        self.db.storage().events().get_by_position(position)
    }

    // ========== Metadata ==========

    /// Highest committed offset of `stream`, `None` for an empty stream
    pub fn stream_offset(&self, stream: &StreamName) -> Option<u64> {
        self.db.storage().events().stream_offset(stream)
    }

    /// Offset the next append to `stream` must name
    pub fn next_offset(&self, stream: &StreamName) -> u64 {
        self.stream_offset(stream).map_or(0, |offset| offset + 1)
    }

    /// Non-empty streams, sorted, optionally narrowed to a name prefix
    pub fn streams(&self, prefix: Option<&str>) -> Vec<StreamName> {
        self.db.storage().events().streams(prefix)
    }

    /// The `EventPosition` counter
    pub fn position(&self) -> EventPosition {
        EventPosition {
            position: self.db.storage().events().position(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::Error;
    use serde_json::json;

    fn setup() -> EventLog {
        EventLog::new(Database::ephemeral())
    }

    fn stream(name: &str) -> StreamName {
        StreamName::new(name).unwrap()
    }

    fn events(n: usize) -> Vec<EventData> {
        (0..n)
            .map(|i| EventData::new("Counted", json!({ "i": i })))
            .collect()
    }

    #[test]
    fn test_append_at_next_offset() {
        let log = setup();
        let s = stream("content-app1-c1");

        assert_eq!(log.append(&s, 0, &events(1)).unwrap(), 0);
        assert_eq!(log.append(&s, 1, &events(2)).unwrap(), 1);
        assert_eq!(log.stream_offset(&s), Some(1));
        assert_eq!(log.next_offset(&s), 2);
        assert_eq!(log.position().position, 2);
    }

    #[test]
    fn test_conflict_writes_nothing() {
        let log = setup();
        let s = stream("a");
        log.append(&s, 0, &events(1)).unwrap();

        for expected in [0, 2, 7] {
            let err = log.append(&s, expected, &events(1)).unwrap_err();
            assert!(matches!(err, Error::Conflict { actual: 1, .. }));
        }
        assert_eq!(log.position().position, 1);
        assert_eq!(log.read_stream(&s, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_conflict_on_missing_stream_does_not_create_it() {
        let log = setup();
        let s = stream("ghost");
        assert!(log.append(&s, 3, &events(1)).unwrap_err().is_conflict());
        assert!(log.streams(None).is_empty());
        assert_eq!(log.stream_offset(&s), None);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let log = setup();
        let err = log.append(&stream("a"), 0, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(log.position().position, 0);
    }

    #[test]
    fn test_append_any() {
        let log = setup();
        let s = stream("a");
        assert_eq!(log.append_any(&s, &events(1)).unwrap(), 0);
        assert_eq!(log.append_any(&s, &events(1)).unwrap(), 1);
        assert_eq!(log.append(&s, 2, &events(1)).unwrap(), 2);
    }

    #[test]
    fn test_read_stream_flattens_batches() {
        let log = setup();
        let s = stream("a");
        log.append(&s, 0, &events(2)).unwrap();
        log.append(&s, 1, &events(3)).unwrap();

        let all = log.read_stream(&s, 0).unwrap();
        let coords: Vec<(u64, u32)> = all.iter().map(|e| (e.offset, e.index)).collect();
        assert_eq!(coords, vec![(0, 0), (0, 1), (1, 0), (1, 1), (1, 2)]);

        let tail = log.read_stream(&s, 1).unwrap();
        assert_eq!(tail.len(), 3);
        assert!(log.read_stream(&s, 2).unwrap().is_empty());
        assert!(log.read_stream(&stream("missing"), 0).unwrap().is_empty());
    }

    #[test]
    fn test_read_all_with_filter_and_limit() {
        let log = setup();
        log.append(&stream("content-a-1"), 0, &events(1)).unwrap();
        log.append(&stream("apps-a"), 0, &events(1)).unwrap();
        log.append(&stream("content-a-2"), 0, &events(1)).unwrap();
        log.append(&stream("content-a-1"), 1, &events(1)).unwrap();

        let content = log
            .read_all(0, &StreamFilter::prefix("content-"), usize::MAX)
            .unwrap();
        let positions: Vec<u64> = content.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 3, 4]);

        let page = log.read_all_commits(1, &StreamFilter::All, 2);
        let positions: Vec<u64> = page.iter().map(|c| c.position.unwrap()).collect();
        assert_eq!(positions, vec![2, 3]);

        assert!(log.read_all(4, &StreamFilter::All, 10).unwrap().is_empty());

        let only = StreamFilter::Stream(stream("apps-a"));
        assert_eq!(log.read_all(0, &only, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_read_all_reverse() {
        let log = setup();
        let s = stream("a");
        log.append(&s, 0, &events(1)).unwrap();
        log.append(&s, 1, &events(2)).unwrap();

        let newest = log.read_all_reverse(&StreamFilter::All, 1).unwrap();
        let coords: Vec<(u64, u32)> = newest.iter().map(|e| (e.position, e.index)).collect();
        assert_eq!(coords, vec![(2, 1), (2, 0)]);
    }

    #[test]
    fn test_read_stream_since_and_after_position() {
        let log = setup();
        let a = stream("a");
        let b = stream("b");
        log.append(&a, 0, &events(1)).unwrap();
        log.append(&b, 0, &events(1)).unwrap();
        let third = log.append_commit(&a, 1, &events(1)).unwrap();

        let since = log.read_stream_since(&a, third.timestamp).unwrap();
        assert!(since.iter().all(|e| e.timestamp >= third.timestamp));
        assert!(since.iter().any(|e| e.offset == 1));

        let after = log.read_stream_after_position(&a, 1).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].position, 3);

        assert_eq!(log.get_by_position(2).unwrap().stream, b);
        assert!(log.get_by_position(4).is_none());
    }

    #[test]
    fn test_streams_listing() {
        let log = setup();
        log.append(&stream("content-x-2"), 0, &events(1)).unwrap();
        log.append(&stream("content-x-1"), 0, &events(1)).unwrap();
        log.append(&stream("schemas-x"), 0, &events(1)).unwrap();

        assert_eq!(
            log.streams(Some("content-")),
            vec![stream("content-x-1"), stream("content-x-2")]
        );
        assert_eq!(log.streams(None).len(), 3);
    }
}

//! Event table: the append-only log
//!
//! # Layout
//!
//! - `streams`: one [`StreamLog`] per stream, sharded by DashMap. The
//!   stream's write lock is held for the whole append, which makes the
//!   offset check and the insert a single compare-and-swap.
//! - `global`: commits keyed by global position (the `Position` index).
//! - per stream, commits are ordered by offset; positions are increasing
//!   along that order too, so `(stream, position)` lookups are a binary
//!   search. `(stream, timestamp)` has its own ordered index because wall
//!   clocks may step backwards.
//!
//! Lock order is always stream log, then sequencer, then `global`.

use crate::sequencer::GlobalSequencer;
use chronicle_core::{Error, EventCommit, EventData, Result, StreamFilter, StreamName, Timestamp};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

/// Commits of one stream in offset order
#[derive(Debug, Default)]
pub struct StreamLog {
    commits: Vec<Arc<EventCommit>>,
    by_timestamp: BTreeSet<(Timestamp, u64)>,
}

impl StreamLog {
    /// Offset the next commit must take
    #[inline]
    pub fn next_offset(&self) -> u64 {
        self.commits.len() as u64
    }

    /// Whether the stream holds no commits
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    fn push(&mut self, commit: Arc<EventCommit>) {
        debug_assert_eq!(commit.offset, self.next_offset());
        self.by_timestamp.insert((commit.timestamp, commit.offset));
        self.commits.push(commit);
    }

    fn from_offset(&self, from: u64, limit: usize) -> Vec<Arc<EventCommit>> {
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(self.commits.len());
        self.commits[start..].iter().take(limit).cloned().collect()
    }

    fn after_position(&self, after: u64, limit: usize) -> Vec<Arc<EventCommit>> {
        let start = self
            .commits
            .partition_point(|c| c.position.unwrap_or(0) <= after);
        self.commits[start..].iter().take(limit).cloned().collect()
    }

    fn since(&self, since: Timestamp, limit: usize) -> Vec<Arc<EventCommit>> {
        let mut offsets: Vec<u64> = self
            .by_timestamp
            .range((since, 0)..)
            .map(|(_, offset)| *offset)
            .collect();
        offsets.sort_unstable();
        offsets
            .into_iter()
            .take(limit)
            .filter_map(|offset| self.commits.get(offset as usize).cloned())
            .collect()
    }
}

/// The event log table
#[derive(Debug, Default)]
pub struct EventTable {
    streams: DashMap<StreamName, Arc<RwLock<StreamLog>>>,
    global: RwLock<BTreeMap<u64, Arc<EventCommit>>>,
    sequencer: GlobalSequencer,
}

impl EventTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn stream_handle(&self, stream: &StreamName) -> Option<Arc<RwLock<StreamLog>>> {
        self.streams.get(stream).map(|entry| Arc::clone(entry.value()))
    }

    fn stream_handle_or_create(&self, stream: &StreamName) -> Arc<RwLock<StreamLog>> {
        Arc::clone(self.streams.entry(stream.clone()).or_default().value())
    }

    /// Append a batch of events
    ///
    /// With `expected = Some(offset)` the commit only succeeds when
    /// `offset` is the stream's next free offset; otherwise nothing is
    /// written and a conflict carrying the next free offset is returned.
    /// `expected = None` appends at the next free offset.
    ///
    /// `persist` runs inside the global critical section after the
    /// position is assigned. If it fails the commit is discarded.
    pub fn append<F>(
        &self,
        stream: &StreamName,
        expected: Option<u64>,
        events: &[EventData],
        persist: F,
    ) -> Result<Arc<EventCommit>>
    where
        F: FnOnce(&EventCommit) -> Result<()>,
    {
        // A conflicting write to an unknown stream must not create it
        if let Some(expected) = expected {
            if expected != 0 && !self.streams.contains_key(stream) {
                return Err(Error::conflict(stream.as_str(), expected, 0));
            }
        }

        let handle = self.stream_handle_or_create(stream);
        let mut guard = handle.write();
        let next = guard.next_offset();
        if let Some(expected) = expected {
            if expected != next {
                return Err(Error::conflict(stream.as_str(), expected, next));
            }
        }

        let commit = EventCommit::new(stream.clone(), next, events)?;
        let log = &mut *guard;
        self.sequencer.sequence(move |position| {
            let mut commit = commit;
            commit.position = Some(position);
            persist(&commit)?;
            let commit = Arc::new(commit);
            log.push(Arc::clone(&commit));
            self.global.write().insert(position, Arc::clone(&commit));
            Ok(commit)
        })
    }

    /// Re-insert a sequenced commit read back from the WAL
    ///
    /// Fails with `Corruption` if the commit breaks stream contiguity or
    /// global ordering.
    pub fn restore(&self, commit: EventCommit) -> Result<()> {
        let position = commit.position.ok_or_else(|| {
            Error::corruption(format!(
                "unsequenced commit {}@{} in log",
                commit.stream, commit.offset
            ))
        })?;
        let handle = self.stream_handle_or_create(&commit.stream);
        let mut guard = handle.write();
        if commit.offset != guard.next_offset() {
            return Err(Error::corruption(format!(
                "stream {} resumes at offset {}, expected {}",
                commit.stream,
                commit.offset,
                guard.next_offset()
            )));
        }
        let log = &mut *guard;
        self.sequencer.restore(position, move || {
            let commit = Arc::new(commit);
            log.push(Arc::clone(&commit));
            self.global.write().insert(position, commit);
            Ok(())
        })
    }

    /// Commits of `stream` starting at `from_offset`, in offset order
    pub fn read_stream(&self, stream: &StreamName, from_offset: u64, limit: usize) -> Vec<Arc<EventCommit>> {
        match self.stream_handle(stream) {
            Some(handle) => handle.read().from_offset(from_offset, limit),
            None => Vec::new(),
        }
    }

    /// Commits of `stream` with position greater than `after`
    pub fn read_stream_after_position(
        &self,
        stream: &StreamName,
        after: u64,
        limit: usize,
    ) -> Vec<Arc<EventCommit>> {
        match self.stream_handle(stream) {
            Some(handle) => handle.read().after_position(after, limit),
            None => Vec::new(),
        }
    }

    /// Commits of `stream` stamped at or after `since`, in offset order
    pub fn read_stream_since(&self, stream: &StreamName, since: Timestamp, limit: usize) -> Vec<Arc<EventCommit>> {
        match self.stream_handle(stream) {
            Some(handle) => handle.read().since(since, limit),
            None => Vec::new(),
        }
    }

    /// Commits with position in `(after, watermark]`, in position order
    pub fn read_all(&self, after: u64, filter: &StreamFilter, limit: usize) -> Vec<Arc<EventCommit>> {
        let watermark = self.sequencer.committed();
        if after >= watermark {
            return Vec::new();
        }
        self.global
            .read()
            .range((Bound::Excluded(after), Bound::Included(watermark)))
            .map(|(_, commit)| commit)
            .filter(|commit| filter.matches(&commit.stream))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Newest commits first, up to the watermark
    pub fn read_all_reverse(&self, filter: &StreamFilter, limit: usize) -> Vec<Arc<EventCommit>> {
        let watermark = self.sequencer.committed();
        self.global
            .read()
            .range(..=watermark)
            .rev()
            .map(|(_, commit)| commit)
            .filter(|commit| filter.matches(&commit.stream))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Commit at a global position
    pub fn get_by_position(&self, position: u64) -> Option<Arc<EventCommit>> {
        if position > self.sequencer.committed() {
            return None;
        }
        self.global.read().get(&position).cloned()
    }

    /// Highest offset of `stream`, or `None` for an empty stream
    pub fn stream_offset(&self, stream: &StreamName) -> Option<u64> {
        self.stream_handle(stream)
            .and_then(|handle| handle.read().next_offset().checked_sub(1))
    }

    /// Non-empty streams, sorted, optionally restricted to a name prefix
    pub fn streams(&self, prefix: Option<&str>) -> Vec<StreamName> {
        let mut names: Vec<StreamName> = self
            .streams
            .iter()
            .filter(|entry| prefix.map_or(true, |p| entry.key().as_str().starts_with(p)))
            .filter(|entry| !entry.value().read().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of non-empty streams
    pub fn stream_count(&self) -> usize {
        self.streams
            .iter()
            .filter(|entry| !entry.value().read().is_empty())
            .count()
    }

    /// Number of committed records
    pub fn commit_count(&self) -> usize {
        self.global.read().len()
    }

    /// The EventPosition counter: highest committed position
    pub fn position(&self) -> u64 {
        self.sequencer.committed()
    }
}

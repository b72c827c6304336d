//! Projection runner: checkpointed catch-up, on demand or on a thread

use super::Projection;
use crate::database::Database;
use crate::primitives::{EventLog, SnapshotStore};
use chronicle_core::{DocumentId, Error, Result};
use parking_lot::{Condvar, Mutex as ParkingMutex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of commits read per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Collection holding one checkpoint per projection.
pub const EVENT_CONSUMERS_COLLECTION: &str = "EventConsumers";

/// Stored checkpoint of one projection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerState {
    /// Last global position fully handled
    pub position: u64,
    /// Total commits applied since the last reset
    #[serde(default)]
    pub applied: u64,
    /// Message of the last failed `apply`, cleared on the next success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one [`ProjectionRunner::catch_up`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUp {
    /// Commits applied during this call
    pub applied: usize,
    /// Checkpoint position afterwards
    pub position: u64,
}

/// Drives one projection over the global log
///
/// ## Example
///
/// ```rust,ignore
/// let runner = Arc::new(ProjectionRunner::new(db.clone(), Arc::new(ContentProjection::new(db.clone())?))?);
/// runner.catch_up()?;
///
/// let handle = runner.spawn(Duration::from_millis(100))?;
/// // ...
/// handle.stop();
/// ```
pub struct ProjectionRunner {
    projection: Arc<dyn Projection>,
    log: EventLog,
    checkpoints: SnapshotStore<ConsumerState>,
    batch_size: usize,
    /// Serializes catch-up calls on this runner
    running: ParkingMutex<()>,
}

impl ProjectionRunner {
    /// Create a runner for `projection`
    pub fn new(db: Arc<Database>, projection: Arc<dyn Projection>) -> Result<Self> {
        if projection.name().trim().is_empty() {
            return Err(Error::invalid_input("projection name cannot be empty"));
        }
        Ok(Self {
            projection,
            log: EventLog::new(Arc::clone(&db)),
            checkpoints: SnapshotStore::with_collection_name(db, EVENT_CONSUMERS_COLLECTION)?,
            batch_size: DEFAULT_BATCH_SIZE,
            running: ParkingMutex::new(()),
        })
    }

    /// Set the number of commits read per batch (minimum 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Name of the driven projection
    pub fn name(&self) -> &str {
        self.projection.name()
    }

    fn checkpoint_id(&self) -> DocumentId {
        DocumentId::new(self.projection.name())
    }

    /// Stored checkpoint, default when the projection never ran
    pub fn state(&self) -> Result<ConsumerState> {
        Ok(self.load_checkpoint()?.0)
    }

    fn load_checkpoint(&self) -> Result<(ConsumerState, Option<u64>)> {
        match self.checkpoints.load(&self.checkpoint_id())? {
            Some(snapshot) => Ok((snapshot.document.unwrap_or_default(), Some(snapshot.version))),
            None => Ok((ConsumerState::default(), None)),
        }
    }

    fn save_checkpoint(&self, state: &ConsumerState, version: &mut Option<u64>) -> Result<()> {
        let next = version.map_or(0, |v| v + 1);
        self.checkpoints
            .save(&self.checkpoint_id(), Some(state), next)?;
        *version = Some(next);
        Ok(())
    }

    /// Apply every matching commit after the checkpoint
    ///
    /// Reads in batches up to the current `EventPosition`, saving the
    /// checkpoint after each batch. If `apply` fails, progress up to the
    /// failing commit is saved along with the error, and the error is
    /// returned; the next call retries that commit.
    pub fn catch_up(&self) -> Result<CatchUp> {
        let _running = self.running.lock();
        let (mut state, mut version) = self.load_checkpoint()?;
        let filter = self.projection.filter();
        let mut applied = 0usize;
        let mut dirty = version.is_none();

        loop {
            let watermark = self.log.position().position;
            let batch = self
                .log
                .read_all_commits(state.position, &filter, self.batch_size);
            let exhausted = batch.len() < self.batch_size;

            for commit in &batch {
                let position = commit.position.unwrap_or(state.position);
                if let Err(e) = self.projection.apply(commit) {
                    warn!(
                        target: "chronicle::projection",
                        projection = self.name(),
                        position,
                        stream = %commit.stream,
                        error = %e,
                        "Projection failed to apply commit"
                    );
                    state.error = Some(e.to_string());
                    self.save_checkpoint(&state, &mut version)?;
                    return Err(e);
                }
                state.position = position;
                state.applied += 1;
                state.error = None;
                applied += 1;
                dirty = true;
            }

            // Nothing matching is left below the watermark seen before the
            // read, so the checkpoint can skip the filtered-out tail
            if exhausted && watermark > state.position {
                state.position = watermark;
                dirty = true;
            }

            if dirty {
                self.save_checkpoint(&state, &mut version)?;
                dirty = false;
            }

            if exhausted {
                break;
            }
        }

        if applied > 0 {
            debug!(
                target: "chronicle::projection",
                projection = self.name(),
                applied,
                position = state.position,
                "Projection caught up"
            );
        }

        Ok(CatchUp {
            applied,
            position: state.position,
        })
    }

    /// Reset the projection and its checkpoint to position 0
    ///
    /// The next catch-up replays the whole log.
    pub fn reset(&self) -> Result<()> {
        let _running = self.running.lock();
        self.projection.reset()?;
        let (_, mut version) = self.load_checkpoint()?;
        self.save_checkpoint(&ConsumerState::default(), &mut version)?;
        info!(target: "chronicle::projection", projection = self.name(), "Projection reset");
        Ok(())
    }

    /// [`ProjectionRunner::spawn`] with the database's `projection_poll_ms`
    pub fn start(self: Arc<Self>) -> Result<RunnerHandle> {
        let poll_interval = self.log.database().config().projection_poll_interval();
        self.spawn(poll_interval)
    }

    /// Run catch-up on a background thread every `poll_interval`
    ///
    /// Errors are logged and retried on the next tick. The thread stops
    /// when the returned handle is stopped or dropped.
    pub fn spawn(self: Arc<Self>, poll_interval: Duration) -> Result<RunnerHandle> {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let name = format!("chronicle-projection-{}", self.name());

        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                info!(target: "chronicle::projection", projection = self.name(), "Projection runner started");
                loop {
                    if let Err(e) = self.catch_up() {
                        warn!(
                            target: "chronicle::projection",
                            projection = self.name(),
                            error = %e,
                            "Catch-up failed, retrying"
                        );
                    }
                    if thread_signal.wait(poll_interval) {
                        break;
                    }
                }
                info!(target: "chronicle::projection", projection = self.name(), "Projection runner stopped");
            })
            .map_err(|e| Error::storage(format!("failed to spawn projection thread: {}", e)))?;

        Ok(RunnerHandle {
            signal,
            handle: Some(handle),
        })
    }
}

#[derive(Default)]
struct StopSignal {
    stopped: ParkingMutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    /// Sleep up to `timeout`; true once stop was requested
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.cond.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }
}

/// Handle to a background projection thread
pub struct RunnerHandle {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Stop the thread and wait for it to finish its current catch-up
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::{EventCommit, EventData, StreamFilter, StreamName};
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    /// Records every position it sees
    struct Recorder {
        filter: StreamFilter,
        seen: ParkingMutex<Vec<u64>>,
        fail_at: AtomicU64,
    }

    impl Recorder {
        fn new(filter: StreamFilter) -> Arc<Self> {
            Arc::new(Self {
                filter,
                seen: ParkingMutex::new(Vec::new()),
                fail_at: AtomicU64::new(0),
            })
        }
    }

    impl Projection for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn filter(&self) -> StreamFilter {
            self.filter.clone()
        }

        fn apply(&self, commit: &EventCommit) -> Result<()> {
            let position = commit.position.unwrap_or(0);
            if self.fail_at.load(Ordering::SeqCst) == position {
                return Err(Error::invalid_input("boom"));
            }
            self.seen.lock().push(position);
            Ok(())
        }

        fn reset(&self) -> Result<()> {
            self.seen.lock().clear();
            Ok(())
        }
    }

    fn append(log: &EventLog, stream: &str) {
        log.append_any(
            &StreamName::new(stream).unwrap(),
            &[EventData::new("E", json!({}))],
        )
        .unwrap();
    }

    #[test]
    fn test_catch_up_in_position_order_with_batches() {
        let db = Database::ephemeral();
        let log = EventLog::new(db.clone());
        for i in 0..7 {
            append(&log, &format!("s-{}", i % 3));
        }

        let recorder = Recorder::new(StreamFilter::All);
        let runner = ProjectionRunner::new(db, recorder.clone())
            .unwrap()
            .with_batch_size(3);

        let result = runner.catch_up().unwrap();
        assert_eq!(result, CatchUp { applied: 7, position: 7 });
        assert_eq!(*recorder.seen.lock(), (1..=7).collect::<Vec<_>>());

        assert_eq!(runner.catch_up().unwrap().applied, 0);
        append(&log, "s-0");
        assert_eq!(runner.catch_up().unwrap(), CatchUp { applied: 1, position: 8 });
        assert_eq!(runner.state().unwrap().applied, 8);
    }

    #[test]
    fn test_filtered_tail_advances_checkpoint() {
        let db = Database::ephemeral();
        let log = EventLog::new(db.clone());
        append(&log, "content-a-1");
        append(&log, "apps-a");
        append(&log, "apps-a");

        let recorder = Recorder::new(StreamFilter::prefix("content-"));
        let runner = ProjectionRunner::new(db, recorder.clone()).unwrap();

        assert_eq!(runner.catch_up().unwrap(), CatchUp { applied: 1, position: 3 });
        assert_eq!(*recorder.seen.lock(), vec![1]);
    }

    #[test]
    fn test_failure_saves_progress_and_error() {
        let db = Database::ephemeral();
        let log = EventLog::new(db.clone());
        for _ in 0..4 {
            append(&log, "s");
        }

        let recorder = Recorder::new(StreamFilter::All);
        recorder.fail_at.store(3, Ordering::SeqCst);
        let runner = ProjectionRunner::new(db, recorder.clone()).unwrap();

        assert!(runner.catch_up().is_err());
        let state = runner.state().unwrap();
        assert_eq!(state.position, 2);
        assert!(state.error.unwrap().contains("boom"));

        recorder.fail_at.store(0, Ordering::SeqCst);
        assert_eq!(runner.catch_up().unwrap().applied, 2);
        assert_eq!(*recorder.seen.lock(), vec![1, 2, 3, 4]);
        assert!(runner.state().unwrap().error.is_none());
    }

    #[test]
    fn test_checkpoint_shared_across_runners() {
        let db = Database::ephemeral();
        let log = EventLog::new(db.clone());
        append(&log, "s");
        append(&log, "s");

        let first = Recorder::new(StreamFilter::All);
        ProjectionRunner::new(db.clone(), first).unwrap().catch_up().unwrap();

        let second = Recorder::new(StreamFilter::All);
        let runner = ProjectionRunner::new(db, second.clone()).unwrap();
        append(&log, "s");
        runner.catch_up().unwrap();
        assert_eq!(*second.seen.lock(), vec![3]);
    }

    #[test]
    fn test_reset_replays_everything() {
        let db = Database::ephemeral();
        let log = EventLog::new(db.clone());
        append(&log, "s");
        append(&log, "t");

        let recorder = Recorder::new(StreamFilter::All);
        let runner = ProjectionRunner::new(db, recorder.clone()).unwrap();
        runner.catch_up().unwrap();
        runner.reset().unwrap();
        assert!(recorder.seen.lock().is_empty());
        assert_eq!(runner.state().unwrap().position, 0);

        assert_eq!(runner.catch_up().unwrap().applied, 2);
    }

    #[test]
    fn test_background_runner_follows_appends() {
        let db = Database::ephemeral();
        let log = EventLog::new(db.clone());
        let recorder = Recorder::new(StreamFilter::All);
        let runner = Arc::new(ProjectionRunner::new(db, recorder.clone()).unwrap());

        let handle = runner.spawn(Duration::from_millis(5)).unwrap();
        for _ in 0..5 {
            append(&log, "s");
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while recorder.seen.lock().len() < 5 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.stop();
        assert_eq!(*recorder.seen.lock(), vec![1, 2, 3, 4, 5]);
    }
}

//! Database struct and open/close logic
//!
//! This module provides the main Database struct that orchestrates:
//! - Storage initialization
//! - WAL opening and replay on startup
//! - The `persist` hook every mutation goes through
//! - Conflict retry
//!
//! Every mutation in the store is applied by a storage table while its
//! lock is held. The table calls back into [`Database::persist`] to write
//! the WAL entry first; if that fails, the mutation is abandoned and the
//! error returned.

pub mod config;
mod recovery;
mod retry;

pub use config::{ChronicleConfig, RetrySection, CONFIG_FILE_NAME};
pub use recovery::RecoveryStats;
pub use retry::RetryConfig;

use chronicle_core::{ContentScope, Error, Result};
use chronicle_durability::{
    DurabilityMode, IdentityCodec, WalCounters, WalEntry, WalReader, WalSegment, WalWriter,
};
use chronicle_storage::ShardedStore;
use parking_lot::Mutex as ParkingMutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Controls where data is stored (orthogonal to durability)
///
/// | PersistenceMode | DurabilityMode | Behavior |
/// |-----------------|----------------|----------|
/// | Ephemeral | (ignored) | No files, data lost on drop |
/// | Disk | Cache | Directory and lock only, no WAL records |
/// | Disk | Standard | WAL, periodic fsync |
/// | Disk | Always | WAL, fsync per write |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PersistenceMode {
    /// No disk files at all
    Ephemeral,
    /// Data directory with WAL and lock file
    #[default]
    Disk,
}

/// Point-in-time counters for the whole store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Streams with at least one commit
    pub streams: usize,
    /// Total event commits
    pub commits: usize,
    /// Current `EventPosition`
    pub position: u64,
    /// Row count per snapshot collection, sorted by name
    pub collections: Vec<(String, usize)>,
    /// Rows in `ContentsAll`
    pub contents_all: usize,
    /// Rows in `ContentsPublished`
    pub contents_published: usize,
    /// WAL counters (None for ephemeral databases)
    pub wal: Option<WalCounters>,
}

/// The event store
///
/// Create one with [`Database::open`] or [`Database::ephemeral`], then
/// wrap it in the typed front ends: [`crate::EventLog`],
/// [`crate::SnapshotStore`], [`crate::ContentReadModel`].
pub struct Database {
    /// Data directory path (empty for ephemeral databases)
    data_dir: PathBuf,

    storage: Arc<ShardedStore>,

    /// Segmented WAL writer, None for ephemeral databases
    wal_writer: Option<Arc<ParkingMutex<WalWriter>>>,

    persistence_mode: PersistenceMode,

    durability_mode: DurabilityMode,

    config: ChronicleConfig,

    /// What replay found on open
    recovery: RecoveryStats,

    /// Cleared by `shutdown`; writes are rejected afterwards
    accepting_writes: AtomicBool,

    /// Shutdown signal for the background WAL flush thread (Standard mode only)
    flush_shutdown: Arc<AtomicBool>,

    flush_handle: ParkingMutex<Option<std::thread::JoinHandle<()>>>,

    /// Exclusive lock file preventing a second process (or a second open in
    /// this process) from using the same directory. None for ephemeral
    /// databases.
    _lock_file: Option<std::fs::File>,
}

impl Database {
    /// Open the database at `path`, replaying its WAL
    ///
    /// Reads `chronicle.toml` from the data directory, creating a default
    /// one if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        ChronicleConfig::write_default_if_missing(&config_path)?;
        let cfg = ChronicleConfig::from_file(&config_path)?;

        Self::open_inner(data_dir, cfg)
    }

    /// Open the database at `path` with an explicit configuration
    ///
    /// The config is written to `chronicle.toml` so later `open` calls pick
    /// up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cfg: ChronicleConfig) -> Result<Arc<Self>> {
        cfg.validate()?;

        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        cfg.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;

        Self::open_inner(data_dir, cfg)
    }

    fn open_inner(data_dir: PathBuf, cfg: ChronicleConfig) -> Result<Arc<Self>> {
        let durability_mode = cfg.durability_mode()?;
        let wal_config = cfg.wal_config()?;
        let codec = cfg.storage_codec()?;

        let canonical_path = data_dir.canonicalize()?;

        let lock_path = canonical_path.join(".lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| Error::storage(format!("failed to open lock file: {}", e)))?;
        fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
            Error::storage(format!(
                "database at '{}' is already in use",
                canonical_path.display()
            ))
        })?;

        let wal_dir = canonical_path.join("wal");
        let storage = ShardedStore::new();
        let recovery = recovery::replay(&wal_dir, &storage, cfg.storage_codec()?)?;

        let wal_writer = WalWriter::new(
            wal_dir.clone(),
            database_uuid(&wal_dir),
            durability_mode,
            wal_config,
            codec,
            recovery.last_lsn + 1,
        )?;

        let wal_arc = Arc::new(ParkingMutex::new(wal_writer));
        let flush_shutdown = Arc::new(AtomicBool::new(false));

        let flush_handle = if let DurabilityMode::Standard { interval_ms, .. } = durability_mode {
            let wal = Arc::clone(&wal_arc);
            let shutdown = Arc::clone(&flush_shutdown);
            let interval = std::time::Duration::from_millis(interval_ms);

            let handle = std::thread::Builder::new()
                .name("chronicle-wal-flush".to_string())
                .spawn(move || {
                    while !shutdown.load(Ordering::Relaxed) {
                        std::thread::sleep(interval);
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = wal.lock().sync_if_overdue() {
                            warn!(target: "chronicle::wal", error = %e, "Background WAL sync failed");
                        }
                    }
                })
                .map_err(|e| Error::storage(format!("failed to spawn WAL flush thread: {}", e)))?;
            Some(handle)
        } else {
            None
        };

        info!(
            target: "chronicle::db",
            path = %canonical_path.display(),
            durability = durability_mode.name(),
            position = storage.events().position(),
            "Database opened"
        );

        Ok(Arc::new(Self {
            data_dir: canonical_path,
            storage: Arc::new(storage),
            wal_writer: Some(wal_arc),
            persistence_mode: PersistenceMode::Disk,
            durability_mode,
            config: cfg,
            recovery,
            accepting_writes: AtomicBool::new(true),
            flush_shutdown,
            flush_handle: ParkingMutex::new(flush_handle),
            _lock_file: Some(lock_file),
        }))
    }

    /// Create a database with no disk I/O
    ///
    /// Nothing is written anywhere and everything is lost on drop. Each
    /// call returns an independent instance.
    pub fn ephemeral() -> Arc<Self> {
        Arc::new(Self {
            data_dir: PathBuf::new(),
            storage: Arc::new(ShardedStore::new()),
            wal_writer: None,
            persistence_mode: PersistenceMode::Ephemeral,
            durability_mode: DurabilityMode::Cache,
            config: ChronicleConfig::with_durability("cache"),
            recovery: RecoveryStats::default(),
            accepting_writes: AtomicBool::new(true),
            flush_shutdown: Arc::new(AtomicBool::new(false)),
            flush_handle: ParkingMutex::new(None),
            _lock_file: None,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub(crate) fn storage(&self) -> &ShardedStore {
        &self.storage
    }

    /// Whether this database has no data directory
    pub fn is_ephemeral(&self) -> bool {
        self.persistence_mode == PersistenceMode::Ephemeral
    }

    /// Data directory (empty for ephemeral databases)
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Durability mode in effect
    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }

    /// Configuration the database was opened with
    pub fn config(&self) -> &ChronicleConfig {
        &self.config
    }

    /// What WAL replay found when the database was opened
    pub fn recovery_stats(&self) -> &RecoveryStats {
        &self.recovery
    }

    /// False after `shutdown`
    pub fn is_open(&self) -> bool {
        self.accepting_writes.load(Ordering::SeqCst)
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    /// Point-in-time counters across all tables
    pub fn stats(&self) -> DatabaseStats {
        let events = self.storage.events();
        let contents = self.storage.contents();
        DatabaseStats {
            streams: events.stream_count(),
            commits: events.commit_count(),
            position: events.position(),
            collections: self.storage.states().sizes(),
            contents_all: contents.count(ContentScope::All),
            contents_published: contents.count(ContentScope::Published),
            wal: self.wal_writer.as_ref().map(|w| w.lock().counters()),
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write one entry to the WAL
    ///
    /// Called by storage tables from inside their locks, so the WAL order
    /// matches the order changes become visible.
    pub(crate) fn persist(&self, entry: &WalEntry) -> Result<()> {
        self.check_open()?;
        if let Some(ref wal) = self.wal_writer {
            let bytes = entry.encode()?;
            let lsn = wal.lock().append(&bytes)?;
            debug!(target: "chronicle::wal", lsn, kind = entry.kind(), "WAL append");
        }
        Ok(())
    }

    /// Force buffered WAL records to disk
    ///
    /// No-op for ephemeral databases.
    pub fn flush(&self) -> Result<()> {
        if let Some(ref wal) = self.wal_writer {
            wal.lock().flush()?;
        }
        Ok(())
    }

    // ========================================================================
    // Retry
    // ========================================================================

    /// Run `f`, retrying with backoff while it fails with a conflict
    ///
    /// Any other error, or a conflict after `config.max_retries` retries,
    /// is returned as is. `f` must re-read whatever state it bases its
    /// expectation on.
    pub fn retry_on_conflict<T, F>(&self, config: &RetryConfig, mut f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match f() {
                Err(e) if e.is_conflict() && attempt < config.max_retries => {
                    let delay = config.calculate_delay(attempt);
                    debug!(
                        target: "chronicle::db",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after conflict"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// [`Database::retry_on_conflict`] with the configured `[retry]` defaults
    pub fn retry<T, F>(&self, f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let config = self.config.retry_config();
        self.retry_on_conflict(&config, f)
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop accepting writes, stop the flush thread and flush the WAL
    ///
    /// Reads keep working. Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        self.accepting_writes.store(false, Ordering::SeqCst);

        self.flush_shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.flush_handle.lock().take() {
            let _ = handle.join();
        }

        self.flush()?;
        info!(target: "chronicle::db", path = %self.data_dir.display(), "Database shut down");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.flush_shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.flush_handle.lock().take() {
            let _ = handle.join();
        }
        if let Err(e) = self.flush() {
            warn!(target: "chronicle::db", error = %e, "Final WAL flush failed");
        }
    }
}

/// UUID stamped into segment headers: taken from the first existing
/// segment, or freshly generated for a new database.
fn database_uuid(wal_dir: &Path) -> [u8; 16] {
    let reader = WalReader::new(Box::new(IdentityCodec));
    reader
        .list_segments(wal_dir)
        .ok()
        .and_then(|segments| segments.first().copied())
        .and_then(|first| WalSegment::open_read(wal_dir, first).ok())
        .map(|segment| segment.database_uuid())
        .unwrap_or_else(|| *uuid::Uuid::new_v4().as_bytes())
}

// ============================================================================
// Tests
// ============================================================================

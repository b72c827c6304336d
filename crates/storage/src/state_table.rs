//! State collections (`States_*`)
//!
//! Each collection maps document ids to [`SnapshotRow`]s. Saves are a
//! compare-and-swap on the row version performed under the DashMap shard
//! lock of the document, so unrelated documents never contend.
//!
//! Version rule: a new document accepts any version; an existing one only
//! accepts `stored.version + 1`.
//!
//! Saves and removes hold a shared collection guard; `clear` holds it
//! exclusively, so no write is logged after a clear yet wiped by it.

use chronicle_core::{DocumentId, Error, Result, SnapshotRow};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// One named snapshot collection
#[derive(Debug)]
pub struct StateCollection {
    name: String,
    rows: DashMap<DocumentId, SnapshotRow>,
    writers: RwLock<()>,
}

impl StateCollection {
    /// Create an empty collection
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: DashMap::new(),
            writers: RwLock::new(()),
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current row for `id`
    pub fn get(&self, id: &DocumentId) -> Option<SnapshotRow> {
        self.rows.get(id).map(|row| row.value().clone())
    }

    /// Compare-and-swap write of a row
    ///
    /// Returns the committed version. `persist` runs while the document's
    /// shard is locked; if it fails nothing changes.
    pub fn save<F>(
        &self,
        id: &DocumentId,
        document: Option<Vec<u8>>,
        version: u64,
        persist: F,
    ) -> Result<u64>
    where
        F: FnOnce(&SnapshotRow) -> Result<()>,
    {
        let _guard = self.writers.read();
        match self.rows.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let accepted = entry.get().version.saturating_add(1);
                if version != accepted {
                    return Err(Error::conflict(id.as_str(), version, accepted));
                }
                let row = SnapshotRow::new(document, version);
                persist(&row)?;
                entry.insert(row);
            }
            Entry::Vacant(entry) => {
                let row = SnapshotRow::new(document, version);
                persist(&row)?;
                entry.insert(row);
            }
        }
        Ok(version)
    }

    /// Delete a row; returns whether it existed
    pub fn remove<F>(&self, id: &DocumentId, persist: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        let _guard = self.writers.read();
        match self.rows.entry(id.clone()) {
            Entry::Occupied(entry) => {
                persist()?;
                entry.remove();
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    /// Drop every row; returns how many were removed
    ///
    /// Waits for in-flight saves and removes, and blocks new ones until
    /// the rows are gone.
    pub fn clear<F>(&self, persist: F) -> Result<usize>
    where
        F: FnOnce() -> Result<()>,
    {
        let _guard = self.writers.write();
        persist()?;
        let removed = self.rows.len();
        self.rows.clear();
        Ok(removed)
    }

    /// Unconditional write used by WAL replay
    pub fn restore(&self, id: DocumentId, row: SnapshotRow) {
        self.rows.insert(id, row);
    }

    /// Unconditional delete used by WAL replay
    pub fn restore_remove(&self, id: &DocumentId) {
        self.rows.remove(id);
    }

    /// Unconditional clear used by WAL replay
    pub fn restore_clear(&self) {
        self.rows.clear();
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All document ids, sorted
    pub fn ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self.rows.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }
}

/// All state collections, created lazily by name
#[derive(Debug, Default)]
pub struct StateTable {
    collections: DashMap<String, Arc<StateCollection>>,
}

impl StateTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection by name, created on first use
    pub fn collection(&self, name: &str) -> Arc<StateCollection> {
        if let Some(existing) = self.collections.get(name) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.collections
                .entry(name.to_string())
                .or_insert_with(|| {
                    debug!(target: "chronicle::storage", collection = name, "Created state collection");
                    Arc::new(StateCollection::new(name))
                })
                .value(),
        )
    }

    /// Collection by name if it exists
    pub fn get(&self, name: &str) -> Option<Arc<StateCollection>> {
        self.collections.get(name).map(|c| Arc::clone(c.value()))
    }

    /// Names and row counts of all collections, sorted by name
    pub fn sizes(&self) -> Vec<(String, usize)> {
        let mut sizes: Vec<(String, usize)> = self
            .collections
            .iter()
            .map(|c| (c.key().clone(), c.value().len()))
            .collect();
        sizes.sort();
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(_: &SnapshotRow) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_first_save_accepts_any_version() {
        let coll = StateCollection::new("Contents");
        let id = DocumentId::from("c1");
        assert_eq!(coll.save(&id, Some(b"{}".to_vec()), 5, ok).unwrap(), 5);
        assert_eq!(coll.get(&id).unwrap().version, 5);
    }

    #[test]
    fn test_save_requires_next_version() {
        let coll = StateCollection::new("Contents");
        let id = DocumentId::from("c1");
        coll.save(&id, Some(b"1".to_vec()), 1, ok).unwrap();

        for stale in [0, 1, 3] {
            let err = coll.save(&id, Some(b"x".to_vec()), stale, ok).unwrap_err();
            assert!(err.is_conflict());
        }
        assert_eq!(coll.get(&id).unwrap().document, Some(b"1".to_vec()));

        assert_eq!(coll.save(&id, Some(b"2".to_vec()), 2, ok).unwrap(), 2);
    }

    #[test]
    fn test_tombstone_is_distinct_from_missing() {
        let coll = StateCollection::new("Contents");
        let id = DocumentId::from("c1");
        assert!(coll.get(&id).is_none());

        coll.save(&id, None, 1, ok).unwrap();
        let row = coll.get(&id).unwrap();
        assert!(row.is_tombstone());
        assert_eq!(row.version, 1);
    }

    #[test]
    fn test_persist_failure_leaves_row_untouched() {
        let coll = StateCollection::new("Contents");
        let id = DocumentId::from("c1");
        coll.save(&id, Some(b"1".to_vec()), 1, ok).unwrap();

        let err = coll
            .save(&id, Some(b"2".to_vec()), 2, |_| Err(Error::storage("io")))
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(coll.get(&id).unwrap().version, 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let coll = StateCollection::new("Contents");
        for i in 0..3 {
            coll.save(&DocumentId::new(format!("c{}", i)), None, 1, ok).unwrap();
        }
        assert!(coll.remove(&DocumentId::from("c0"), || Ok(())).unwrap());
        assert!(!coll.remove(&DocumentId::from("c0"), || Ok(())).unwrap());
        assert_eq!(coll.ids(), vec![DocumentId::from("c1"), DocumentId::from("c2")]);

        assert_eq!(coll.clear(|| Ok(())).unwrap(), 2);
        assert!(coll.is_empty());
    }

    #[test]
    fn test_clear_excludes_concurrent_saves() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::mpsc;
        use std::time::Duration;

        let coll = Arc::new(StateCollection::new("Contents"));
        let (entered, wait_entered) = mpsc::channel();
        let (release, wait_release) = mpsc::channel::<()>();
        let saved_during_clear = Arc::new(AtomicBool::new(false));

        let clearing = {
            let coll = Arc::clone(&coll);
            std::thread::spawn(move || {
                coll.clear(|| {
                    entered.send(()).unwrap();
                    wait_release.recv().unwrap();
                    Ok(())
                })
                .unwrap()
            })
        };
        wait_entered.recv().unwrap();

        let saving = {
            let coll = Arc::clone(&coll);
            let flag = Arc::clone(&saved_during_clear);
            std::thread::spawn(move || {
                coll.save(&DocumentId::from("late"), None, 1, |_| {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!saved_during_clear.load(Ordering::SeqCst));
        release.send(()).unwrap();

        assert_eq!(clearing.join().unwrap(), 0);
        saving.join().unwrap();
        // The save was ordered after the clear, so it survives it
        assert_eq!(coll.get(&DocumentId::from("late")).unwrap().version, 1);
    }

    #[test]
    fn test_collections_are_isolated() {
        let table = StateTable::new();
        let id = DocumentId::from("x");
        table.collection("Apps").save(&id, None, 1, ok).unwrap();

        assert!(table.collection("Schemas").get(&id).is_none());
        assert!(Arc::ptr_eq(&table.collection("Apps"), &table.get("Apps").unwrap()));
        assert_eq!(
            table.sizes(),
            vec![("Apps".to_string(), 1), ("Schemas".to_string(), 0)]
        );
    }
}

//! SnapshotStore: versioned aggregate state in `States_*` collections
//!
//! ## Design Principles
//!
//! 1. **Versioned Updates**: a document's version counts the stream
//!    commits folded into it.
//! 2. **CAS Semantics**: a new document accepts any version; an existing
//!    one only `stored + 1`. Anything else is a conflict.
//! 3. **Typed documents**: `T` is stored as JSON bytes. A stored `None`
//!    (tombstone) is distinct from a missing document.

use crate::database::Database;
use chronicle_core::{DocumentId, Error, Result, SnapshotRow, Timestamp};
use chronicle_durability::WalEntry;
use chronicle_storage::StateCollection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Prefix every aggregate state collection carries
pub const STATE_COLLECTION_PREFIX: &str = "States_";

/// A loaded snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// Decoded document, `None` for a tombstone
    pub document: Option<T>,
    /// Committed version
    pub version: u64,
    /// Last write instant
    pub updated_at: Timestamp,
}

/// Typed handle over one state collection
///
/// ## Example
///
/// ```rust,ignore
/// let apps: SnapshotStore<AppState> = SnapshotStore::new(db.clone(), "Apps")?;
/// apps.save(&id, Some(&state), 1)?;
/// let snapshot = apps.load(&id)?.unwrap();
/// assert_eq!(snapshot.version, 1);
/// ```
pub struct SnapshotStore<T> {
    db: Arc<Database>,
    collection: Arc<StateCollection>,
    _document: PhantomData<fn() -> T>,
}

impl<T> Clone for SnapshotStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            collection: Arc::clone(&self.collection),
            _document: PhantomData,
        }
    }
}

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open the collection `States_<name>`
    ///
    /// A name that already carries the prefix is used as is.
    pub fn new(db: Arc<Database>, name: &str) -> Result<Self> {
        let full = if name.starts_with(STATE_COLLECTION_PREFIX) {
            name.to_string()
        } else {
            format!("{}{}", STATE_COLLECTION_PREFIX, name)
        };
        Self::with_collection_name(db, &full)
    }

    /// Open a collection by its exact name
    pub fn with_collection_name(db: Arc<Database>, name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("collection name cannot be empty"));
        }
        let collection = db.storage().states().collection(name);
        Ok(Self {
            db,
            collection,
            _document: PhantomData,
        })
    }

    /// Collection name
    pub fn name(&self) -> &str {
        self.collection.name()
    }

    /// Load a snapshot; `Ok(None)` when the document was never saved
    ///
    /// # Errors
    /// `Serialization` when the stored bytes do not decode as `T`.
    pub fn load(&self, id: &DocumentId) -> Result<Option<Snapshot<T>>> {
        let row = match self.collection.get(id) {
            Some(row) => row,
            None => return Ok(None),
        };
        let document = match &row.document {
            Some(bytes) => Some(serde_json::from_slice(bytes).map_err(|e| {
                Error::serialization(format!(
                    "snapshot {}/{} does not decode: {}",
                    self.name(),
                    id,
                    e
                ))
            })?),
            None => None,
        };
        Ok(Some(Snapshot {
            document,
            version: row.version,
            updated_at: row.updated_at,
        }))
    }

    /// Stored row without decoding
    pub fn load_raw(&self, id: &DocumentId) -> Option<SnapshotRow> {
        self.collection.get(id)
    }

    /// Version of a stored document
    pub fn version(&self, id: &DocumentId) -> Option<u64> {
        self.collection.get(id).map(|row| row.version)
    }

    /// Compare-and-swap write; returns the committed version
    ///
    /// # Errors
    /// `Conflict` with `actual` set to the version that would have been
    /// accepted.
    pub fn save(&self, id: &DocumentId, document: Option<&T>, version: u64) -> Result<u64> {
        self.db.check_open()?;
        let bytes = match document {
            Some(doc) => Some(serde_json::to_vec(doc)?),
            None => None,
        };
        self.collection.save(id, bytes, version, |row| {
            self.db.persist(&WalEntry::SnapshotSaved {
                collection: self.name().to_string(),
                document_id: id.clone(),
                row: row.clone(),
            })
        })
    }

    /// Delete a document; returns whether it existed
    pub fn remove(&self, id: &DocumentId) -> Result<bool> {
        self.db.check_open()?;
        self.collection.remove(id, || {
            self.db.persist(&WalEntry::SnapshotRemoved {
                collection: self.name().to_string(),
                document_id: id.clone(),
            })
        })
    }

    /// Delete every document; returns how many were removed
    pub fn clear(&self) -> Result<usize> {
        self.db.check_open()?;
        self.collection.clear(|| {
            self.db.persist(&WalEntry::CollectionCleared {
                collection: self.name().to_string(),
            })
        })
    }

    /// Number of stored documents (tombstones included)
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Stored ids, sorted
    pub fn ids(&self) -> Vec<DocumentId> {
        self.collection.ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
        label: String,
    }

    fn counter(count: u32) -> Counter {
        Counter {
            count,
            label: format!("c{}", count),
        }
    }

    fn setup() -> SnapshotStore<Counter> {
        SnapshotStore::new(Database::ephemeral(), "Counters").unwrap()
    }

    #[test]
    fn test_collection_naming() {
        let db = Database::ephemeral();
        let a: SnapshotStore<Counter> = SnapshotStore::new(db.clone(), "Apps").unwrap();
        let b: SnapshotStore<Counter> = SnapshotStore::new(db.clone(), "States_Apps").unwrap();
        assert_eq!(a.name(), "States_Apps");
        assert_eq!(b.name(), "States_Apps");
        assert!(SnapshotStore::<Counter>::with_collection_name(db, " ").is_err());
    }

    #[test]
    fn test_save_then_load() {
        let store = setup();
        let id = DocumentId::new("d1");

        assert_eq!(store.save(&id, Some(&counter(1)), 5).unwrap(), 5);
        let snapshot = store.load(&id).unwrap().unwrap();
        assert_eq!(snapshot.document, Some(counter(1)));
        assert_eq!(snapshot.version, 5);
    }

    #[test]
    fn test_missing_is_none_tombstone_is_some() {
        let store = setup();
        let id = DocumentId::new("d1");
        assert!(store.load(&id).unwrap().is_none());

        store.save(&id, None, 0).unwrap();
        let snapshot = store.load(&id).unwrap().unwrap();
        assert!(snapshot.document.is_none());
        assert_eq!(snapshot.version, 0);
    }

    #[test]
    fn test_version_cas() {
        let store = setup();
        let id = DocumentId::new("d1");
        store.save(&id, Some(&counter(1)), 1).unwrap();

        for stale in [0, 1, 3] {
            let err = store.save(&id, Some(&counter(9)), stale).unwrap_err();
            assert!(matches!(err, Error::Conflict { actual: 2, .. }));
        }
        assert_eq!(store.save(&id, Some(&counter(2)), 2).unwrap(), 2);
        assert_eq!(store.load(&id).unwrap().unwrap().document, Some(counter(2)));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = setup();
        store.save(&DocumentId::new("a"), Some(&counter(1)), 1).unwrap();
        store.save(&DocumentId::new("b"), Some(&counter(1)), 1).unwrap();

        assert!(store.remove(&DocumentId::new("a")).unwrap());
        assert!(!store.remove(&DocumentId::new("a")).unwrap());
        assert_eq!(store.ids(), vec![DocumentId::new("b")]);

        // A removed document starts over at any version
        store.save(&DocumentId::new("a"), Some(&counter(1)), 7).unwrap();
        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_collections_are_independent() {
        let db = Database::ephemeral();
        let a: SnapshotStore<Counter> = SnapshotStore::new(db.clone(), "A").unwrap();
        let b: SnapshotStore<Counter> = SnapshotStore::new(db, "B").unwrap();
        let id = DocumentId::new("same");

        a.save(&id, Some(&counter(1)), 1).unwrap();
        assert!(b.load(&id).unwrap().is_none());
        b.save(&id, Some(&counter(5)), 9).unwrap();
        assert_eq!(a.version(&id), Some(1));
    }

    #[test]
    fn test_undecodable_document_fails_load() {
        let db = Database::ephemeral();
        let raw: SnapshotStore<String> = SnapshotStore::new(db.clone(), "Mixed").unwrap();
        raw.save(&DocumentId::new("x"), Some(&"text".to_string()), 1).unwrap();

        let typed: SnapshotStore<Counter> = SnapshotStore::new(db, "Mixed").unwrap();
        assert!(matches!(
            typed.load(&DocumentId::new("x")),
            Err(Error::Serialization(_))
        ));
    }
}

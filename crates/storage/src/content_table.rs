//! Content read models: `ContentsAll` and `ContentsPublished`
//!
//! Both tables live behind one lock and are only ever written by
//! [`ContentTables::sync`] (or its replay twin), which upserts the
//! `ContentsAll` row and then re-derives the `ContentsPublished` entry from
//! it. The published table can therefore never hold data that differs from
//! `ContentsAll`.

use chronicle_core::{ContentRow, ContentScope, DocumentId, DomainId, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Result of a [`ContentTables::sync`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The row was written
    Applied,
    /// A newer version is already stored; nothing was written
    Stale {
        /// Version currently stored
        current: u64,
    },
}

#[derive(Debug, Default)]
struct Tables {
    all: BTreeMap<DocumentId, ContentRow>,
    published: BTreeMap<DocumentId, ContentRow>,
}

impl Tables {
    fn apply(&mut self, row: ContentRow) {
        if row.is_servable() {
            self.published.insert(row.document_id.clone(), row.clone());
        } else {
            self.published.remove(&row.document_id);
        }
        self.all.insert(row.document_id.clone(), row);
    }

    fn table(&self, scope: ContentScope) -> &BTreeMap<DocumentId, ContentRow> {
        match scope {
            ContentScope::All => &self.all,
            ContentScope::Published => &self.published,
        }
    }
}

/// The pair of content tables
#[derive(Debug, Default)]
pub struct ContentTables {
    inner: RwLock<Tables>,
}

impl ContentTables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a row into `ContentsAll` and re-derive `ContentsPublished`
    ///
    /// Rows older than the stored version are ignored. An equal version
    /// overwrites, so redelivered projections are idempotent.
    pub fn sync<F>(&self, row: ContentRow, persist: F) -> Result<SyncOutcome>
    where
        F: FnOnce(&ContentRow) -> Result<()>,
    {
        let mut tables = self.inner.write();
        if let Some(existing) = tables.all.get(&row.document_id) {
            if existing.version > row.version {
                return Ok(SyncOutcome::Stale {
                    current: existing.version,
                });
            }
        }
        persist(&row)?;
        tables.apply(row);
        Ok(SyncOutcome::Applied)
    }

    /// Physically remove a row from both tables
    pub fn remove<F>(&self, id: &DocumentId, persist: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut tables = self.inner.write();
        if !tables.all.contains_key(id) {
            return Ok(false);
        }
        persist()?;
        tables.all.remove(id);
        tables.published.remove(id);
        Ok(true)
    }

    /// Unconditional upsert used by WAL replay
    pub fn restore(&self, row: ContentRow) {
        self.inner.write().apply(row);
    }

    /// Unconditional delete used by WAL replay
    pub fn restore_remove(&self, id: &DocumentId) {
        let mut tables = self.inner.write();
        tables.all.remove(id);
        tables.published.remove(id);
    }

    /// Row by id from the chosen table
    pub fn get(&self, id: &DocumentId, scope: ContentScope) -> Option<ContentRow> {
        self.inner.read().table(scope).get(id).cloned()
    }

    /// Rows of an app, optionally narrowed to one schema, in id order
    pub fn query(
        &self,
        app_id: &DomainId,
        schema_id: Option<&DomainId>,
        scope: ContentScope,
    ) -> Vec<ContentRow> {
        self.inner
            .read()
            .table(scope)
            .values()
            .filter(|row| &row.app_id == app_id)
            .filter(|row| schema_id.map_or(true, |s| &row.schema_id == s))
            .cloned()
            .collect()
    }

    /// Row count of the chosen table
    pub fn count(&self, scope: ContentScope) -> usize {
        self.inner.read().table(scope).len()
    }

    /// Recompute `ContentsPublished` from `ContentsAll`
    ///
    /// Returns the number of published rows.
    pub fn rebuild_published(&self) -> usize {
        let mut tables = self.inner.write();
        let published: BTreeMap<DocumentId, ContentRow> = tables
            .all
            .values()
            .filter(|row| row.is_servable())
            .map(|row| (row.document_id.clone(), row.clone()))
            .collect();
        tables.published = published;
        tables.published.len()
    }

    /// Ids whose published entry disagrees with `ContentsAll`
    ///
    /// Covers missing, extra and differing rows. Empty when consistent.
    pub fn divergent(&self) -> Vec<DocumentId> {
        let tables = self.inner.read();
        let mut ids: Vec<DocumentId> = tables
            .all
            .values()
            .filter(|row| {
                let published = tables.published.get(&row.document_id);
                match (row.is_servable(), published) {
                    (true, Some(p)) => p != *row,
                    (true, None) => true,
                    (false, Some(_)) => true,
                    (false, None) => false,
                }
            })
            .map(|row| row.document_id.clone())
            .collect();
        ids.extend(
            tables
                .published
                .keys()
                .filter(|id| !tables.all.contains_key(*id))
                .cloned(),
        );
        ids.sort();
        ids.dedup();
        ids
    }
}

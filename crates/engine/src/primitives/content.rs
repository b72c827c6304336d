//! ContentReadModel: the `ContentsAll` / `ContentsPublished` tables
//!
//! `ContentsPublished` is a pure function of `ContentsAll`: it holds
//! exactly the rows whose status is published and that are not deleted.
//! Both tables are only ever written by [`ContentReadModel::sync`] and
//! [`ContentReadModel::remove`], which update them under one lock.

use crate::database::Database;
use chronicle_core::{ContentRow, ContentScope, DocumentId, DomainId, Error, Result};
use chronicle_durability::WalEntry;
use chronicle_storage::SyncOutcome;
use std::sync::Arc;
use tracing::{debug, warn};

/// Read model over content rows
#[derive(Clone)]
pub struct ContentReadModel {
    db: Arc<Database>,
}

impl ContentReadModel {
    /// Create a handle over the database's content tables
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Upsert a row and re-derive its published entry
    ///
    /// A row older than the stored one is ignored and reported as
    /// [`SyncOutcome::Stale`]; an equal version overwrites.
    pub fn sync(&self, row: ContentRow) -> Result<SyncOutcome> {
        self.db.check_open()?;
        let id = row.document_id.clone();
        let version = row.version;
        let outcome = self.db.storage().contents().sync(row, |row| {
            self.db.persist(&WalEntry::ContentSynced(row.clone()))
        })?;
        if let SyncOutcome::Stale { current } = outcome {
            debug!(
                target: "chronicle::content",
                document_id = %id,
                version,
                current,
                "Ignoring stale content row"
            );
        }
        Ok(outcome)
    }

    /// Remove a row from both tables; returns whether it existed
    pub fn remove(&self, id: &DocumentId) -> Result<bool> {
        self.db.check_open()?;
        self.db.storage().contents().remove(id, || {
            self.db.persist(&WalEntry::ContentRemoved {
                document_id: id.clone(),
            })
        })
    }

    /// Row by id from the chosen table
    pub fn get(&self, id: &DocumentId, scope: ContentScope) -> Option<ContentRow> {
        self.db.storage().contents().get(id, scope)
    }

    /// Rows of an app, optionally one schema only, in id order
    pub fn query(
        &self,
        app_id: &DomainId,
        schema_id: Option<&DomainId>,
        scope: ContentScope,
    ) -> Vec<ContentRow> {
        self.db.storage().contents().query(app_id, schema_id, scope)
    }

    /// Row count of the chosen table
    pub fn count(&self, scope: ContentScope) -> usize {
        self.db.storage().contents().count(scope)
    }

    /// Recompute `ContentsPublished` from `ContentsAll`
    ///
    /// Returns the number of published rows. Nothing is written to the WAL:
    /// replay derives the published table from the synced rows.
    pub fn rebuild_published(&self) -> usize {
        let published = self.db.storage().contents().rebuild_published();
        debug!(target: "chronicle::content", published, "Rebuilt ContentsPublished");
        published
    }

    /// Ids whose published entry disagrees with `ContentsAll`
    pub fn divergent(&self) -> Vec<DocumentId> {
        self.db.storage().contents().divergent()
    }

    /// Check that `ContentsPublished` is exactly the servable part of
    /// `ContentsAll`
    ///
    /// # Errors
    /// `Corruption` naming the first divergent ids.
    pub fn verify(&self) -> Result<()> {
        let divergent = self.divergent();
        if divergent.is_empty() {
            return Ok(());
        }
        warn!(
            target: "chronicle::content",
            count = divergent.len(),
            "ContentsPublished diverges from ContentsAll"
        );
        let sample: Vec<&str> = divergent.iter().take(5).map(|id| id.as_str()).collect();
        Err(Error::corruption(format!(
            "{} content rows diverge between ContentsAll and ContentsPublished: {}",
            divergent.len(),
            sample.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::{Status, Timestamp};
    use serde_json::json;

    fn row(id: &str, status: Status, version: u64) -> ContentRow {
        ContentRow {
            document_id: DocumentId::new(id),
            app_id: DomainId::new("app1"),
            schema_id: DomainId::new("blog"),
            status,
            data: json!({"title": {"iv": id}}),
            version,
            is_deleted: false,
            created: Timestamp::from_micros(10),
            last_modified: Timestamp::from_micros(10 + version),
        }
    }

    fn setup() -> ContentReadModel {
        ContentReadModel::new(Database::ephemeral())
    }

    #[test]
    fn test_published_row_mirrors() {
        let model = setup();
        model.sync(row("c1", Status::published(), 1)).unwrap();
        model.sync(row("c2", Status::draft(), 1)).unwrap();

        let id = DocumentId::new("c1");
        assert_eq!(
            model.get(&id, ContentScope::Published),
            model.get(&id, ContentScope::All)
        );
        assert!(model
            .get(&DocumentId::new("c2"), ContentScope::Published)
            .is_none());
        assert_eq!(model.count(ContentScope::All), 2);
        assert_eq!(model.count(ContentScope::Published), 1);
        model.verify().unwrap();
    }

    #[test]
    fn test_unpublish_and_delete_leave_published() {
        let model = setup();
        model.sync(row("c1", Status::published(), 1)).unwrap();
        model.sync(row("c1", Status::draft(), 2)).unwrap();
        assert_eq!(model.count(ContentScope::Published), 0);

        model.sync(row("c1", Status::published(), 3)).unwrap();
        let mut deleted = row("c1", Status::published(), 4);
        deleted.is_deleted = true;
        model.sync(deleted).unwrap();

        assert_eq!(model.count(ContentScope::Published), 0);
        assert!(model.get(&DocumentId::new("c1"), ContentScope::All).unwrap().is_deleted);
        model.verify().unwrap();
    }

    #[test]
    fn test_stale_rows_ignored() {
        let model = setup();
        model.sync(row("c1", Status::published(), 5)).unwrap();
        assert_eq!(
            model.sync(row("c1", Status::draft(), 4)).unwrap(),
            SyncOutcome::Stale { current: 5 }
        );
        assert!(model
            .get(&DocumentId::new("c1"), ContentScope::Published)
            .is_some());
        assert_eq!(
            model.sync(row("c1", Status::published(), 5)).unwrap(),
            SyncOutcome::Applied
        );
    }

    #[test]
    fn test_query_by_app_and_schema() {
        let model = setup();
        model.sync(row("c1", Status::published(), 1)).unwrap();
        let mut other_schema = row("c2", Status::published(), 1);
        other_schema.schema_id = DomainId::new("pages");
        model.sync(other_schema).unwrap();
        let mut other_app = row("c3", Status::published(), 1);
        other_app.app_id = DomainId::new("app2");
        model.sync(other_app).unwrap();

        let app1 = DomainId::new("app1");
        assert_eq!(model.query(&app1, None, ContentScope::All).len(), 2);
        let blog = DomainId::new("blog");
        let rows = model.query(&app1, Some(&blog), ContentScope::Published);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document_id, DocumentId::new("c1"));
    }

    #[test]
    fn test_remove_from_both_tables() {
        let model = setup();
        model.sync(row("c1", Status::published(), 1)).unwrap();
        assert!(model.remove(&DocumentId::new("c1")).unwrap());
        assert!(!model.remove(&DocumentId::new("c1")).unwrap());
        assert_eq!(model.count(ContentScope::All), 0);
        assert_eq!(model.count(ContentScope::Published), 0);
    }

    #[test]
    fn test_rebuild_published() {
        let model = setup();
        model.sync(row("c1", Status::published(), 1)).unwrap();
        model.sync(row("c2", Status::published(), 1)).unwrap();
        model.sync(row("c3", Status::new("Archived"), 1)).unwrap();
        assert_eq!(model.rebuild_published(), 2);
        model.verify().unwrap();
    }
}

//! Versioned taxonomy snapshots keyed by an external snapshot id.

use rusqlite::types::Value;
use serde_json::json;

use crate::dbc::Dbc;
use crate::errors::Result;
use crate::ids::Id;
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::query::Filter;
use crate::template::{BaseRecord, Entity, Repo};

/// A serialized taxonomy build. Snapshots are replaced or removed, never
/// soft-deleted.
#[derive(Clone, Debug, PartialEq)]
pub struct TaxonomySnapshot {
    /// Shared columns.
    pub base: BaseRecord,
    /// External key.
    pub snapshot_id: String,
    /// Owning user for personal taxonomies.
    pub user_id: Option<Id>,
    /// Snapshot kind.
    pub kind: String,
    /// Monotonic build version.
    pub version: i64,
    /// Serialized taxonomy.
    pub payload: serde_json::Value,
}

impl TaxonomySnapshot {
    /// Unsaved version-1 snapshot.
    pub fn new(snapshot_id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            base: BaseRecord::default(),
            snapshot_id: snapshot_id.into(),
            user_id: None,
            kind: kind.into(),
            version: 1,
            payload: json!({}),
        }
    }
}

impl Entity for TaxonomySnapshot {
    const TABLE: &'static str = "taxonomy_snapshots";
    const NAME: &'static str = "taxonomy_snapshot";
    const FIELDS: &'static [&'static str] = &["snapshot_id", "user_id", "kind", "version", "payload"];
    const NATURAL_KEY: &'static [&'static str] = &["snapshot_id"];
    const UPSERT_COLUMNS: &'static [&'static str] = &["user_id", "kind", "version", "payload"];
    const SOFT_DELETE: bool = false;

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseRecord {
        &mut self.base
    }

    fn has_natural_key(&self) -> bool {
        !self.snapshot_id.is_empty()
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            columns::text(&self.snapshot_id),
            columns::opt_id(self.user_id.as_ref()),
            columns::text(&self.kind),
            Value::Integer(self.version),
            columns::json(&self.payload),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            base,
            snapshot_id: row.text()?,
            user_id: row.opt_id()?,
            kind: row.text()?,
            version: row.int()?,
            payload: row.json()?,
        })
    }
}

impl Repo<TaxonomySnapshot> {
    /// The snapshot stored under `snapshot_id`, or `None`.
    pub fn get_by_snapshot_id(&self, dbc: &Dbc<'_>, snapshot_id: &str) -> Result<Option<TaxonomySnapshot>> {
        self.logger
            .call("get_by_snapshot_id", format_args!("snapshot={snapshot_id}"), || {
                if snapshot_id.is_empty() {
                    return Ok(None);
                }
                let filter = Filter::new().eq("snapshot_id", columns::text(snapshot_id));
                Ok(self.list_where(dbc, filter, "id", Some(1))?.into_iter().next())
            })
    }

    /// Physically remove the given snapshots.
    pub fn full_delete_by_snapshot_ids(&self, dbc: &Dbc<'_>, snapshot_ids: &[String]) -> Result<usize> {
        let count = snapshot_ids.len();
        self.logger
            .call("full_delete_by_snapshot_ids", format_args!("snapshots={count}"), || {
                let keys: Vec<Value> = snapshot_ids
                    .iter()
                    .filter(|s| !s.is_empty())
                    .map(|s| columns::text(s))
                    .collect();
                if keys.is_empty() {
                    return Ok(0);
                }
                self.full_delete_where(dbc, Filter::new().any_of("snapshot_id", keys))
            })
    }
}

/// Repo for [`TaxonomySnapshot`].
pub type TaxonomySnapshotRepo = Repo<TaxonomySnapshot>;

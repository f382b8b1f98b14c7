//! Nodes of a path's outline (children of [`Path`](super::Path)).

use rusqlite::types::Value;
use serde_json::json;

use crate::dbc::Dbc;
use crate::errors::Result;
use crate::ids::Id;
use crate::logging::IdSet;
use crate::sqlite::columns::{self, RowReader};
use crate::template::{BaseRecord, Entity, Repo, SoftDeletable, id_filter};

/// One node in a path outline, unique per `(path_id, position)`.
#[derive(Clone, Debug, PartialEq)]
pub struct PathNode {
    /// Shared columns.
    pub base: BaseRecord,
    /// Parent path.
    pub path_id: Id,
    /// Enclosing node, if nested.
    pub parent_node_id: Option<Id>,
    /// Zero-based position within the path.
    pub position: i64,
    /// Display title.
    pub title: String,
    /// Node kind.
    pub kind: String,
    /// Unlock conditions.
    pub gating: serde_json::Value,
}

impl PathNode {
    /// Unsaved top-level node.
    pub fn new(path_id: Id, position: i64, title: impl Into<String>) -> Self {
        Self {
            base: BaseRecord::default(),
            path_id,
            parent_node_id: None,
            position,
            title: title.into(),
            kind: "lesson".to_string(),
            gating: json!({}),
        }
    }
}

impl Entity for PathNode {
    const TABLE: &'static str = "path_nodes";
    const NAME: &'static str = "path_node";
    const FIELDS: &'static [&'static str] =
        &["path_id", "parent_node_id", "position", "title", "kind", "gating"];
    const NATURAL_KEY: &'static [&'static str] = &["path_id", "position"];
    const UPSERT_COLUMNS: &'static [&'static str] = &["parent_node_id", "title", "kind", "gating"];

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseRecord {
        &mut self.base
    }

    fn has_natural_key(&self) -> bool {
        !self.path_id.is_nil() && self.position >= 0
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            columns::id(&self.path_id),
            columns::opt_id(self.parent_node_id.as_ref()),
            Value::Integer(self.position),
            columns::text(&self.title),
            columns::text(&self.kind),
            columns::json(&self.gating),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            base,
            path_id: row.id()?,
            parent_node_id: row.opt_id()?,
            position: row.int()?,
            title: row.text()?,
            kind: row.text()?,
            gating: row.json()?,
        })
    }
}

impl SoftDeletable for PathNode {}

impl Repo<PathNode> {
    /// Live nodes of the given paths, ordered `(path_id, position, id)`.
    pub fn get_by_path_ids(&self, dbc: &Dbc<'_>, path_ids: &[Id]) -> Result<Vec<PathNode>> {
        self.logger
            .call("get_by_path_ids", format_args!("paths={}", IdSet(path_ids)), || {
                match id_filter("path_id", path_ids) {
                    Some(filter) => self.list_where(dbc, filter, "path_id, position, id", None),
                    None => Ok(Vec::new()),
                }
            })
    }

    /// Soft-delete every live node of the given paths.
    pub fn soft_delete_by_path_ids(&self, dbc: &Dbc<'_>, path_ids: &[Id]) -> Result<usize> {
        self.logger
            .call("soft_delete_by_path_ids", format_args!("paths={}", IdSet(path_ids)), || {
                match id_filter("path_id", path_ids) {
                    Some(filter) => self.soft_delete_where(dbc, filter),
                    None => Ok(0),
                }
            })
    }

    /// Physically remove every node of the given paths.
    pub fn full_delete_by_path_ids(&self, dbc: &Dbc<'_>, path_ids: &[Id]) -> Result<usize> {
        self.logger
            .call("full_delete_by_path_ids", format_args!("paths={}", IdSet(path_ids)), || {
                match id_filter("path_id", path_ids) {
                    Some(filter) => self.full_delete_where(dbc, filter),
                    None => Ok(0),
                }
            })
    }
}

/// Repo for [`PathNode`].
pub type PathNodeRepo = Repo<PathNode>;

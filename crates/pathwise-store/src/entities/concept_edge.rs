//! Typed, directed edges between concepts.

use rusqlite::types::Value;
use serde_json::json;

use crate::dbc::Dbc;
use crate::errors::Result;
use crate::ids::Id;
use crate::logging::IdSet;
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::query::Filter;
use crate::template::{BaseRecord, Entity, Repo, SoftDeletable, id_filter};

/// Directed relation `from → to` of one type, unique per
/// `(from_concept_id, to_concept_id, edge_type)` among live rows.
#[derive(Clone, Debug, PartialEq)]
pub struct ConceptEdge {
    /// Shared columns.
    pub base: BaseRecord,
    /// Source concept.
    pub from_concept_id: Id,
    /// Target concept.
    pub to_concept_id: Id,
    /// Relation type (`prerequisite`, `related`, ...).
    pub edge_type: String,
    /// Relation strength.
    pub strength: f64,
    /// Supporting evidence document.
    pub evidence: serde_json::Value,
}

impl ConceptEdge {
    /// Unsaved edge with strength 1.
    pub fn new(from_concept_id: Id, to_concept_id: Id, edge_type: impl Into<String>) -> Self {
        Self {
            base: BaseRecord::default(),
            from_concept_id,
            to_concept_id,
            edge_type: edge_type.into(),
            strength: 1.0,
            evidence: json!({}),
        }
    }
}

impl Entity for ConceptEdge {
    const TABLE: &'static str = "concept_edges";
    const NAME: &'static str = "concept_edge";
    const FIELDS: &'static [&'static str] =
        &["from_concept_id", "to_concept_id", "edge_type", "strength", "evidence"];
    const NATURAL_KEY: &'static [&'static str] = &["from_concept_id", "to_concept_id", "edge_type"];
    const UPSERT_COLUMNS: &'static [&'static str] = &["strength", "evidence"];

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseRecord {
        &mut self.base
    }

    fn has_natural_key(&self) -> bool {
        !self.from_concept_id.is_nil() && !self.to_concept_id.is_nil() && !self.edge_type.is_empty()
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            columns::id(&self.from_concept_id),
            columns::id(&self.to_concept_id),
            columns::text(&self.edge_type),
            Value::Real(self.strength),
            columns::json(&self.evidence),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            base,
            from_concept_id: row.id()?,
            to_concept_id: row.id()?,
            edge_type: row.text()?,
            strength: row.real()?,
            evidence: row.json()?,
        })
    }
}

impl SoftDeletable for ConceptEdge {}

/// Edges touching any of `ids` on either side.
fn either_side(ids: &[Id]) -> Option<Filter> {
    let ids: Vec<Id> = ids.iter().filter(|id| !id.is_nil()).copied().collect();
    if ids.is_empty() {
        return None;
    }
    let marks = vec!["?"; ids.len()].join(", ");
    let values: Vec<Value> = ids.iter().map(columns::id).collect();
    let clause = format!("from_concept_id IN ({marks}) OR to_concept_id IN ({marks})");
    Some(Filter::new().raw(&clause, values.iter().chain(&values).cloned()))
}

impl Repo<ConceptEdge> {
    /// Live outgoing edges, ordered `(from_concept_id, edge_type, to_concept_id)`.
    pub fn get_by_from_ids(&self, dbc: &Dbc<'_>, from_ids: &[Id]) -> Result<Vec<ConceptEdge>> {
        self.logger
            .call("get_by_from_ids", format_args!("from={}", IdSet(from_ids)), || {
                match id_filter("from_concept_id", from_ids) {
                    Some(filter) => self.list_where(
                        dbc,
                        filter,
                        "from_concept_id, edge_type, to_concept_id, id",
                        None,
                    ),
                    None => Ok(Vec::new()),
                }
            })
    }

    /// Live incoming edges, ordered `(to_concept_id, edge_type, from_concept_id)`.
    pub fn get_by_to_ids(&self, dbc: &Dbc<'_>, to_ids: &[Id]) -> Result<Vec<ConceptEdge>> {
        self.logger
            .call("get_by_to_ids", format_args!("to={}", IdSet(to_ids)), || {
                match id_filter("to_concept_id", to_ids) {
                    Some(filter) => self.list_where(
                        dbc,
                        filter,
                        "to_concept_id, edge_type, from_concept_id, id",
                        None,
                    ),
                    None => Ok(Vec::new()),
                }
            })
    }

    /// Live edges touching any of the concepts, ordered `(created_at, id)`.
    pub fn get_by_concept_ids(&self, dbc: &Dbc<'_>, concept_ids: &[Id]) -> Result<Vec<ConceptEdge>> {
        self.logger
            .call("get_by_concept_ids", format_args!("concepts={}", IdSet(concept_ids)), || {
                match either_side(concept_ids) {
                    Some(filter) => self.list_where(dbc, filter, "created_at, id", None),
                    None => Ok(Vec::new()),
                }
            })
    }

    /// Soft-delete every live edge touching any of the concepts.
    pub fn soft_delete_by_concept_ids(&self, dbc: &Dbc<'_>, concept_ids: &[Id]) -> Result<usize> {
        self.logger.call(
            "soft_delete_by_concept_ids",
            format_args!("concepts={}", IdSet(concept_ids)),
            || either_side(concept_ids).map_or(Ok(0), |f| self.soft_delete_where(dbc, f)),
        )
    }

    /// Physically remove every edge touching any of the concepts.
    pub fn full_delete_by_concept_ids(&self, dbc: &Dbc<'_>, concept_ids: &[Id]) -> Result<usize> {
        self.logger.call(
            "full_delete_by_concept_ids",
            format_args!("concepts={}", IdSet(concept_ids)),
            || either_side(concept_ids).map_or(Ok(0), |f| self.full_delete_where(dbc, f)),
        )
    }
}

/// Repo for [`ConceptEdge`].
pub type ConceptEdgeRepo = Repo<ConceptEdge>;

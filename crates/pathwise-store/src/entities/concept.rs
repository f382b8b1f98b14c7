//! Concepts, scoped by a tagged `(scope, scope_id)` owner.

use std::fmt;

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::dbc::Dbc;
use crate::errors::{Result, StoreError};
use crate::ids::Id;
use crate::logging::{IdSet, OneId};
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::query::Filter;
use crate::template::{BaseRecord, Entity, Repo, SoftDeletable, id_filter};

/// Owner kind of a scoped row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// Shared by everyone; the scope id is `None`.
    Global,
    /// Owned by a path.
    Path,
    /// Owned by a course.
    Course,
    /// Owned by a lesson.
    Lesson,
    /// Private to a user.
    User,
}

impl ScopeKind {
    /// Stored discriminator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Path => "path",
            Self::Course => "course",
            Self::Lesson => "lesson",
            Self::User => "user",
        }
    }

    /// Parse a stored discriminator.
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "global" => Self::Global,
            "path" => Self::Path,
            "course" => Self::Course,
            "lesson" => Self::Lesson,
            "user" => Self::User,
            _ => return None,
        })
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of knowledge, unique per `(scope, scope_id, key)` among live rows.
/// Two `None` scope ids are equal for uniqueness and lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct Concept {
    /// Shared columns.
    pub base: BaseRecord,
    /// Owner kind.
    pub scope: ScopeKind,
    /// Owner id; `None` for global concepts.
    pub scope_id: Option<Id>,
    /// Stable key within the scope.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Short description.
    pub summary: String,
    /// Parent in the concept tree.
    pub parent_id: Option<Id>,
    /// Order among siblings.
    pub sort_index: i64,
    /// Opaque embedding vector.
    pub embedding: Option<Vec<u8>>,
}

impl Concept {
    /// Unsaved concept.
    pub fn new(
        scope: ScopeKind,
        scope_id: Option<Id>,
        key: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            base: BaseRecord::default(),
            scope,
            scope_id,
            key: key.into(),
            name: name.into(),
            summary: String::new(),
            parent_id: None,
            sort_index: 0,
            embedding: None,
        }
    }
}

impl Entity for Concept {
    const TABLE: &'static str = "concepts";
    const NAME: &'static str = "concept";
    const FIELDS: &'static [&'static str] = &[
        "scope",
        "scope_id",
        "key",
        "name",
        "summary",
        "parent_id",
        "sort_index",
        "embedding",
    ];
    const NATURAL_KEY: &'static [&'static str] = &["scope", "scope_id", "key"];
    const UPSERT_COLUMNS: &'static [&'static str] =
        &["name", "summary", "parent_id", "sort_index", "embedding"];
    const NULLABLE_KEY: bool = true;

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseRecord {
        &mut self.base
    }

    /// Non-empty key, and a scope id for every scope except global.
    fn has_natural_key(&self) -> bool {
        !self.key.is_empty()
            && match self.scope {
                ScopeKind::Global => true,
                _ => self.scope_id.is_some_and(|id| !id.is_nil()),
            }
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            columns::text(self.scope.as_str()),
            columns::opt_id(self.scope_id.as_ref()),
            columns::text(&self.key),
            columns::text(&self.name),
            columns::text(&self.summary),
            columns::opt_id(self.parent_id.as_ref()),
            Value::Integer(self.sort_index),
            columns::opt_blob(self.embedding.as_deref()),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        let raw = row.text()?;
        let scope = ScopeKind::parse(&raw)
            .ok_or_else(|| StoreError::corrupt(Self::TABLE, "scope", format!("unknown scope {raw:?}")))?;
        Ok(Self {
            base,
            scope,
            scope_id: row.opt_id()?,
            key: row.text()?,
            name: row.text()?,
            summary: row.text()?,
            parent_id: row.opt_id()?,
            sort_index: row.int()?,
            embedding: row.opt_blob()?,
        })
    }
}

impl SoftDeletable for Concept {}

fn scope_filter(scope: ScopeKind, scope_id: Option<Id>) -> Filter {
    Filter::new()
        .eq("scope", columns::text(scope.as_str()))
        .is("scope_id", columns::opt_id(scope_id.as_ref()))
}

impl Repo<Concept> {
    /// Live concepts of one scope, ordered `(sort_index, key)`.
    pub fn get_by_scope(&self, dbc: &Dbc<'_>, scope: ScopeKind, scope_id: Option<Id>) -> Result<Vec<Concept>> {
        let owner = scope_id.unwrap_or_default();
        self.logger.call(
            "get_by_scope",
            format_args!("scope={scope} scope_id={}", OneId(&owner)),
            || self.list_where(dbc, scope_filter(scope, scope_id), "sort_index, key, id", None),
        )
    }

    /// Live concepts of one scope with the given keys, ordered by key.
    pub fn get_by_scope_and_keys(
        &self,
        dbc: &Dbc<'_>,
        scope: ScopeKind,
        scope_id: Option<Id>,
        keys: &[String],
    ) -> Result<Vec<Concept>> {
        let owner = scope_id.unwrap_or_default();
        let count = keys.len();
        self.logger.call(
            "get_by_scope_and_keys",
            format_args!("scope={scope} scope_id={} keys={count}", OneId(&owner)),
            || {
                let keys: Vec<Value> = keys
                    .iter()
                    .filter(|k| !k.is_empty())
                    .map(|k| columns::text(k))
                    .collect();
                if keys.is_empty() {
                    return Ok(Vec::new());
                }
                let filter = scope_filter(scope, scope_id).any_of("key", keys);
                self.list_where(dbc, filter, "key, id", None)
            },
        )
    }

    /// Live children of the given concepts, ordered `(parent_id, sort_index, key)`.
    pub fn get_by_parent_ids(&self, dbc: &Dbc<'_>, parent_ids: &[Id]) -> Result<Vec<Concept>> {
        self.logger.call(
            "get_by_parent_ids",
            format_args!("parents={}", IdSet(parent_ids)),
            || match id_filter("parent_id", parent_ids) {
                Some(filter) => self.list_where(dbc, filter, "parent_id, sort_index, key, id", None),
                None => Ok(Vec::new()),
            },
        )
    }

    /// Soft-delete every live concept of one scope.
    pub fn soft_delete_by_scope(&self, dbc: &Dbc<'_>, scope: ScopeKind, scope_id: Option<Id>) -> Result<usize> {
        let owner = scope_id.unwrap_or_default();
        self.logger.call(
            "soft_delete_by_scope",
            format_args!("scope={scope} scope_id={}", OneId(&owner)),
            || self.soft_delete_where(dbc, scope_filter(scope, scope_id)),
        )
    }

    /// Physically remove every concept of one scope.
    pub fn full_delete_by_scope(&self, dbc: &Dbc<'_>, scope: ScopeKind, scope_id: Option<Id>) -> Result<usize> {
        let owner = scope_id.unwrap_or_default();
        self.logger.call(
            "full_delete_by_scope",
            format_args!("scope={scope} scope_id={}", OneId(&owner)),
            || self.full_delete_where(dbc, scope_filter(scope, scope_id)),
        )
    }
}

/// Repo for [`Concept`].
pub type ConceptRepo = Repo<Concept>;

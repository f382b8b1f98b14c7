//! Entity repo template.
//!
//! An entity describes its table once through [`Entity`]: column lists,
//! natural tuple, upsert whitelist and row codec. [`Repo<E>`] then provides
//! the uniform operation set for every entity, and each entity module adds
//! its own finders in an inherent `impl Repo<ThatEntity>` block.
//!
//! Rules every operation follows:
//! - reads never write;
//! - nil ids, empty id sets and empty field maps are no-ops, not errors;
//! - every list states its `ORDER BY`;
//! - soft-deleted rows are invisible to every read except
//!   [`Repo::get_by_ids_unscoped`].

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::dbc::Dbc;
use crate::errors::{Result, StoreError};
use crate::ids::Id;
use crate::logging::{IdSet, OneId, RepoLogger};
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::engine;
use crate::sqlite::query::Filter;
use crate::store::Store;
use crate::tx::TxOptions;

/// Columns every table starts with, in select order.
pub const BASE_COLUMNS: &[&str] = &["id", "created_at", "updated_at", "deleted_at"];

/// Largest `IN (...)` list bound in one statement.
const MAX_IN_LIST: usize = 500;

/// Identity, timestamps and soft-delete marker shared by every entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BaseRecord {
    /// Primary key. Nil until first written.
    pub id: Id,
    /// First insertion. Zero until first written.
    pub created_at: DateTime<Utc>,
    /// Last mutation.
    pub updated_at: DateTime<Utc>,
    /// Set when the row is logically deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl BaseRecord {
    /// Whether the row is logically deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Table description and row codec for one entity.
pub trait Entity: Clone + Send + Sized + 'static {
    /// Table name.
    const TABLE: &'static str;
    /// Entity name used in logs and errors.
    const NAME: &'static str;
    /// Non-base columns, in bind and read order.
    const FIELDS: &'static [&'static str];
    /// Natural tuple backing upserts and ignore-duplicates.
    const NATURAL_KEY: &'static [&'static str];
    /// Columns overwritten when an upsert hits an existing tuple.
    const UPSERT_COLUMNS: &'static [&'static str];
    /// The natural tuple contains a nullable column.
    const NULLABLE_KEY: bool = false;
    /// Reads filter on `deleted_at`.
    const SOFT_DELETE: bool = true;

    /// Shared columns.
    fn base(&self) -> &BaseRecord;
    /// Shared columns, mutable.
    fn base_mut(&mut self) -> &mut BaseRecord;

    /// Whether the natural tuple is complete (parent ids set, keys
    /// non-empty). Rows failing this are skipped by upsert paths.
    fn has_natural_key(&self) -> bool {
        true
    }

    /// Bound values for [`Entity::FIELDS`], in order.
    fn field_values(&self) -> Vec<Value>;

    /// Rebuild an entity from its base record and field columns.
    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self>;
}

/// Entities that expose soft-delete operations.
pub trait SoftDeletable: Entity {}

/// Options for constructing a repo.
#[derive(Clone, Debug)]
pub struct RepoConfig {
    /// Store handle.
    pub store: Store,
    /// Logger handle.
    pub logger: RepoLogger,
}

impl RepoConfig {
    /// Bundle a store and logger.
    pub fn new(store: Store, logger: RepoLogger) -> Self {
        Self { store, logger }
    }
}

/// Repository for one entity type.
#[derive(Debug)]
pub struct Repo<E> {
    pub(crate) store: Store,
    pub(crate) logger: RepoLogger,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repo<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            logger: self.logger.clone(),
            _entity: PhantomData,
        }
    }
}

fn live_ids(ids: &[Id]) -> Vec<Id> {
    ids.iter().filter(|id| !id.is_nil()).copied().collect()
}

fn id_values(ids: &[Id]) -> Vec<Value> {
    ids.iter().map(columns::id).collect()
}

/// `column IN (ids)` over the non-nil ids, or `None` when none remain.
pub(crate) fn id_filter(column: &str, ids: &[Id]) -> Option<Filter> {
    let ids = live_ids(ids);
    if ids.is_empty() {
        None
    } else {
        Some(Filter::new().any_of(column, id_values(&ids)))
    }
}

impl<E: Entity> Repo<E> {
    /// Build a repo.
    pub fn new(config: RepoConfig) -> Self {
        Self {
            store: config.store,
            logger: config.logger,
            _entity: PhantomData,
        }
    }

    /// Build a repo whose logger is named after the table.
    pub fn with_store(store: Store) -> Self {
        Self::new(RepoConfig::new(store, RepoLogger::new(E::TABLE)))
    }

    /// The store handle.
    pub fn store(&self) -> &Store {
        &self.store
    }

    // ─── Writes ─────────────────────────────────────────────────────────────

    /// Insert every row, all-or-nothing. Fills ids and timestamps.
    pub fn create(&self, dbc: &Dbc<'_>, rows: Vec<E>) -> Result<Vec<E>> {
        let count = rows.len();
        let mut rows = rows;
        self.logger.call("create", format_args!("rows={count}"), || {
            if rows.is_empty() {
                return Ok(());
            }
            let now = self.store.now();
            for row in &mut rows {
                engine::stamp_new(row.base_mut(), now);
            }
            self.store.transact(dbc, TxOptions::serializable(), |tx| {
                tx.exec(|conn| engine::insert_all(conn, &rows))
            })
        })?;
        Ok(rows)
    }

    /// Insert rows whose natural tuple is not already live. Returns the
    /// number inserted.
    pub fn create_ignore_duplicates(&self, dbc: &Dbc<'_>, rows: Vec<E>) -> Result<usize> {
        let count = rows.len();
        self.logger
            .call("create_ignore_duplicates", format_args!("rows={count}"), || {
                let now = self.store.now();
                let mut rows: Vec<E> = rows.into_iter().filter(E::has_natural_key).collect();
                if rows.is_empty() {
                    return Ok(0);
                }
                for row in &mut rows {
                    engine::stamp_new(row.base_mut(), now);
                }
                self.store.transact(dbc, TxOptions::serializable(), |tx| {
                    tx.exec(|conn| engine::insert_ignoring(conn, &mut rows))
                })
            })
    }

    /// Insert-or-update on the natural tuple. The stored id and timestamps
    /// are written back into `row`. When nothing live matches and `row.id`
    /// names a stored row, the insert gets a fresh id.
    pub fn upsert(&self, dbc: &Dbc<'_>, row: &mut E) -> Result<()> {
        let id = row.base().id;
        self.logger.call("upsert", format_args!("id={}", OneId(&id)), || {
            if !row.has_natural_key() {
                return Ok(());
            }
            engine::stamp_new(row.base_mut(), self.store.now());
            self.store.transact(dbc, TxOptions::serializable(), |tx| {
                tx.exec(|conn| {
                    if E::NULLABLE_KEY {
                        engine::upsert_by_lookup(conn, row)
                    } else {
                        engine::upsert_on_conflict(conn, row)
                    }
                })
            })
        })
    }

    /// Replace every mutable column of the live row `row.id`. A nil id is a
    /// no-op. `created_at` and `deleted_at` are never touched.
    pub fn update(&self, dbc: &Dbc<'_>, row: &mut E) -> Result<()> {
        let id = row.base().id;
        self.logger.call("update", format_args!("id={}", OneId(&id)), || {
            if id.is_nil() {
                return Ok(());
            }
            let now = self.store.now();
            let mut sets: Vec<String> = E::FIELDS.iter().map(|c| format!("{c} = ?")).collect();
            sets.push("updated_at = max(updated_at, ?)".to_string());
            let mut params = row.field_values();
            params.push(columns::ts(&now));
            let filter = self.scoped(Filter::new().eq("id", columns::id(&id)));
            params.extend_from_slice(filter.params());
            let sql = format!(
                "UPDATE {} SET {}{} RETURNING updated_at",
                E::TABLE,
                sets.join(", "),
                filter.sql()
            );

            let stored: Option<String> = dbc.exec(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params_from_iter(params.iter()))?;
                Ok(match rows.next()? {
                    Some(r) => Some(r.get(0)?),
                    None => None,
                })
            })?;
            if let Some(raw) = stored {
                row.base_mut().updated_at = crate::time::decode(&raw)
                    .ok_or_else(|| StoreError::corrupt(E::TABLE, "updated_at", "invalid timestamp"))?;
            }
            Ok(())
        })
    }

    /// Merge the named columns into the live row `id`. Injects
    /// `updated_at = now` unless the map sets it; `updated_at` never moves
    /// backwards. Protected or unknown columns are rejected.
    pub fn update_fields(&self, dbc: &Dbc<'_>, id: Id, fields: Fields) -> Result<()> {
        let count = fields.len();
        self.logger.call(
            "update_fields",
            format_args!("id={} columns={count}", OneId(&id)),
            || {
                if id.is_nil() || fields.is_empty() {
                    return Ok(());
                }
                for column in fields.columns() {
                    if column != "updated_at" && !E::FIELDS.contains(&column) {
                        return Err(StoreError::InvalidArgument(format!(
                            "column {column} is not assignable on {}",
                            E::NAME
                        )));
                    }
                }
                let fields = if fields.contains("updated_at") {
                    fields
                } else {
                    fields.set_time("updated_at", Some(self.store.now()))
                };

                let sets: Vec<String> = fields
                    .columns()
                    .map(|c| match c {
                        "updated_at" => "updated_at = max(updated_at, ?)".to_string(),
                        _ => format!("{c} = ?"),
                    })
                    .collect();
                let filter = self.scoped(Filter::new().eq("id", columns::id(&id)));
                let mut params: Vec<Value> = fields.into_values();
                params.extend_from_slice(filter.params());
                let sql = format!("UPDATE {} SET {}{}", E::TABLE, sets.join(", "), filter.sql());
                dbc.exec(|conn| {
                    let _ = conn.execute(&sql, params_from_iter(params.iter()))?;
                    Ok(())
                })
            },
        )
    }

    /// Physically remove rows by id, including soft-deleted ones.
    pub fn full_delete_by_ids(&self, dbc: &Dbc<'_>, ids: &[Id]) -> Result<usize> {
        self.logger
            .call("full_delete_by_ids", format_args!("ids={}", IdSet(ids)), || {
                let ids = live_ids(ids);
                let mut removed = 0;
                for chunk in ids.chunks(MAX_IN_LIST) {
                    removed += self.full_delete_where(dbc, Filter::new().any_of("id", id_values(chunk)))?;
                }
                Ok(removed)
            })
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    /// Live rows with the given ids, ordered `(created_at, id)`.
    pub fn get_by_ids(&self, dbc: &Dbc<'_>, ids: &[Id]) -> Result<Vec<E>> {
        self.logger
            .call("get_by_ids", format_args!("ids={}", IdSet(ids)), || {
                self.fetch_by_ids(dbc, ids, true)
            })
    }

    /// Rows with the given ids, soft-deleted ones included.
    pub fn get_by_ids_unscoped(&self, dbc: &Dbc<'_>, ids: &[Id]) -> Result<Vec<E>> {
        self.logger
            .call("get_by_ids_unscoped", format_args!("ids={}", IdSet(ids)), || {
                self.fetch_by_ids(dbc, ids, false)
            })
    }

    /// One live row, or `None`.
    pub fn get_by_id(&self, dbc: &Dbc<'_>, id: Id) -> Result<Option<E>> {
        self.logger.call("get_by_id", format_args!("id={}", OneId(&id)), || {
            Ok(self.fetch_by_ids(dbc, &[id], true)?.into_iter().next())
        })
    }

    fn fetch_by_ids(&self, dbc: &Dbc<'_>, ids: &[Id], live_only: bool) -> Result<Vec<E>> {
        let ids = live_ids(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IN_LIST) {
            let filter = Filter::new().any_of("id", id_values(chunk));
            let filter = if live_only { self.scoped(filter) } else { filter };
            out.extend(self.query(dbc, &filter, "created_at, id", None)?);
        }
        if ids.len() > MAX_IN_LIST {
            out.sort_by(|a, b| {
                (a.base().created_at, a.base().id).cmp(&(b.base().created_at, b.base().id))
            });
        }
        Ok(out)
    }

    // ─── Building blocks for entity finders ─────────────────────────────────

    /// Add the live-row predicate when the entity is soft-deletable.
    pub(crate) fn scoped(&self, filter: Filter) -> Filter {
        if E::SOFT_DELETE { filter.live() } else { filter }
    }

    /// Live rows matching `filter`, in `order_by` order.
    pub(crate) fn list_where(
        &self,
        dbc: &Dbc<'_>,
        filter: Filter,
        order_by: &str,
        limit: Option<i64>,
    ) -> Result<Vec<E>> {
        self.query(dbc, &self.scoped(filter), order_by, limit)
    }

    /// Number of live rows matching `filter`.
    pub(crate) fn count_where(&self, dbc: &Dbc<'_>, filter: Filter) -> Result<i64> {
        let filter = self.scoped(filter);
        let sql = format!("SELECT COUNT(*) FROM {}{}", E::TABLE, filter.sql());
        dbc.exec(|conn| {
            Ok(conn.query_row(&sql, params_from_iter(filter.params()), |r| r.get(0))?)
        })
    }

    /// Physically remove every row matching `filter`.
    pub(crate) fn full_delete_where(&self, dbc: &Dbc<'_>, filter: Filter) -> Result<usize> {
        let sql = format!("DELETE FROM {}{}", E::TABLE, filter.sql());
        dbc.exec(|conn| Ok(conn.execute(&sql, params_from_iter(filter.params()))?))
    }

    fn query(
        &self,
        dbc: &Dbc<'_>,
        filter: &Filter,
        order_by: &str,
        limit: Option<i64>,
    ) -> Result<Vec<E>> {
        let mut sql = format!(
            "SELECT {} FROM {}{} ORDER BY {order_by}",
            engine::select_list::<E>(),
            E::TABLE,
            filter.sql()
        );
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ");
            sql.push_str(&limit.to_string());
        }
        dbc.exec(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(filter.params()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(engine::read_row::<E>(row)?);
            }
            Ok(out)
        })
    }
}

impl<E: SoftDeletable> Repo<E> {
    /// Mark live rows deleted. `updated_at` is left alone.
    pub fn soft_delete_by_ids(&self, dbc: &Dbc<'_>, ids: &[Id]) -> Result<usize> {
        self.logger
            .call("soft_delete_by_ids", format_args!("ids={}", IdSet(ids)), || {
                let ids = live_ids(ids);
                let mut deleted = 0;
                for chunk in ids.chunks(MAX_IN_LIST) {
                    deleted += self.soft_delete_where(dbc, Filter::new().any_of("id", id_values(chunk)))?;
                }
                Ok(deleted)
            })
    }

    /// Mark every live row matching `filter` deleted.
    pub(crate) fn soft_delete_where(&self, dbc: &Dbc<'_>, filter: Filter) -> Result<usize> {
        let filter = filter.live();
        let sql = format!("UPDATE {} SET deleted_at = ?{}", E::TABLE, filter.sql());
        let mut params = vec![columns::ts(&self.store.now())];
        params.extend_from_slice(filter.params());
        dbc.exec(|conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
    }
}

// ─── Field maps ─────────────────────────────────────────────────────────────

/// Column/value map for [`Repo::update_fields`]. Later sets of the same
/// column replace earlier ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column to a raw value.
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column.to_string(), value)),
        }
        self
    }

    /// Set a text column.
    #[must_use]
    pub fn set_text(self, column: &str, value: &str) -> Self {
        self.set(column, columns::text(value))
    }

    /// Set an identifier column (`None` writes `NULL`).
    #[must_use]
    pub fn set_id(self, column: &str, value: Option<Id>) -> Self {
        self.set(column, columns::opt_id(value.as_ref()))
    }

    /// Set an instant column (`None` writes `NULL`).
    #[must_use]
    pub fn set_time(self, column: &str, value: Option<DateTime<Utc>>) -> Self {
        self.set(column, columns::opt_ts(value.as_ref()))
    }

    /// Set a JSON column.
    #[must_use]
    pub fn set_json(self, column: &str, value: &serde_json::Value) -> Self {
        self.set(column, columns::json(value))
    }

    /// Number of columns set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no column is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `column` is set.
    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(c, _)| c == column)
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    fn into_values(self) -> Vec<Value> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }
}

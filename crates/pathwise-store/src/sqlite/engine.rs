//! Upsert engine: the shared `INSERT … ON CONFLICT` machinery.
//!
//! Statements are built from each entity's declared column lists
//! ([`Entity::FIELDS`], [`Entity::NATURAL_KEY`], [`Entity::UPSERT_COLUMNS`]).
//! Every function takes a `&Connection`; the caller decides whether that is a
//! pooled connection or an open transaction.
//!
//! Conflict handling:
//! - Natural tuples without nullable columns use a targeted
//!   `ON CONFLICT(<tuple>)`, adding `WHERE deleted_at IS NULL` so the
//!   partial unique index is selected.
//! - Tuples with a nullable column are backed by an expression index that
//!   cannot be named as a conflict target. Ignore-duplicates uses a
//!   target-less `ON CONFLICT DO NOTHING`; upsert falls back to
//!   find-then-update-or-insert on the same connection.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};

use crate::errors::{Result, StoreError};
use crate::ids::{Id, new_id};
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::query::Filter;
use crate::template::{BASE_COLUMNS, BaseRecord, Entity};
use crate::time;

const STAMP_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

/// Stored identity and timestamps of a written row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Stamp {
    pub(crate) id: Id,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Stamp {
    fn read(row: &Row<'_>, table: &'static str) -> Result<Self> {
        let mut r = RowReader::new(row, table, STAMP_COLUMNS, 0);
        Ok(Self {
            id: r.id()?,
            created_at: r.ts()?,
            updated_at: r.ts()?,
        })
    }

    fn apply(self, base: &mut BaseRecord) {
        base.id = self.id;
        base.created_at = self.created_at;
        base.updated_at = self.updated_at;
    }
}

// ─── Statement building ─────────────────────────────────────────────────────

/// `id, created_at, updated_at, deleted_at, <fields>`
pub(crate) fn select_list<E: Entity>() -> String {
    BASE_COLUMNS
        .iter()
        .chain(E::FIELDS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql<E: Entity>() -> String {
    let count = BASE_COLUMNS.len() + E::FIELDS.len();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        E::TABLE,
        select_list::<E>(),
        vec!["?"; count].join(", ")
    )
}

fn keyed_by_id<E: Entity>() -> bool {
    E::NATURAL_KEY == ["id"]
}

/// Conflict clause naming the natural tuple and, for partial indexes, the
/// live-row predicate.
pub(crate) fn conflict_target<E: Entity>() -> String {
    if E::NULLABLE_KEY {
        return "ON CONFLICT".to_string();
    }
    let cols = E::NATURAL_KEY.join(", ");
    if E::SOFT_DELETE && !keyed_by_id::<E>() {
        format!("ON CONFLICT({cols}) WHERE deleted_at IS NULL")
    } else {
        format!("ON CONFLICT({cols})")
    }
}

fn upsert_sql<E: Entity>() -> String {
    let mut sets: Vec<String> = E::UPSERT_COLUMNS
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    sets.push("updated_at = max(updated_at, excluded.updated_at)".to_string());
    format!(
        "{} {} DO UPDATE SET {} RETURNING id, created_at, updated_at",
        insert_sql::<E>(),
        conflict_target::<E>(),
        sets.join(", ")
    )
}

// ─── Row values ─────────────────────────────────────────────────────────────

/// Bound values in `select_list` order.
pub(crate) fn row_values<E: Entity>(row: &E) -> Vec<Value> {
    let base = row.base();
    let mut values = Vec::with_capacity(BASE_COLUMNS.len() + E::FIELDS.len());
    values.push(columns::id(&base.id));
    values.push(columns::ts(&base.created_at));
    values.push(columns::ts(&base.updated_at));
    values.push(columns::opt_ts(base.deleted_at.as_ref()));
    values.extend(row.field_values());
    values
}

/// Value of a non-base column, looked up by name.
pub(crate) fn field_value<E: Entity>(row: &E, column: &str) -> Result<Value> {
    if column == "id" {
        return Ok(columns::id(&row.base().id));
    }
    let idx = E::FIELDS.iter().position(|c| *c == column).ok_or_else(|| {
        StoreError::InvalidArgument(format!("{} has no column {column}", E::NAME))
    })?;
    row.field_values()
        .into_iter()
        .nth(idx)
        .ok_or_else(|| StoreError::InvalidArgument(format!("{} has no value for {column}", E::NAME)))
}

/// Decode one row selected with [`select_list`].
pub(crate) fn read_row<E: Entity>(row: &Row<'_>) -> Result<E> {
    let mut r = RowReader::new(row, E::TABLE, BASE_COLUMNS, 0);
    let base = BaseRecord {
        id: r.id()?,
        created_at: r.ts()?,
        updated_at: r.ts()?,
        deleted_at: r.opt_ts()?,
    };
    let mut fields = RowReader::new(row, E::TABLE, E::FIELDS, BASE_COLUMNS.len());
    E::read_fields(base, &mut fields)
}

/// Identifier defaulting and timestamp hygiene for a row about to be written.
pub(crate) fn stamp_new(base: &mut BaseRecord, now: DateTime<Utc>) {
    if base.id.is_nil() {
        base.id = new_id();
    }
    if time::is_zero(&base.created_at) {
        base.created_at = now;
    }
    base.updated_at = now.max(base.created_at);
}

/// `col IS ?` for every natural-tuple column, restricted to live rows.
pub(crate) fn natural_key_filter<E: Entity>(row: &E) -> Result<Filter> {
    let mut filter = Filter::new();
    for col in E::NATURAL_KEY {
        filter = filter.is(col, field_value(row, col)?);
    }
    Ok(if E::SOFT_DELETE { filter.live() } else { filter })
}

// ─── Execution ──────────────────────────────────────────────────────────────

/// Insert every row; the first constraint failure aborts.
pub(crate) fn insert_all<E: Entity>(conn: &Connection, rows: &[E]) -> Result<()> {
    let mut stmt = conn.prepare(&insert_sql::<E>())?;
    for row in rows {
        let _ = stmt.execute(params_from_iter(row_values(row)))?;
    }
    Ok(())
}

/// Give `row` a fresh id when its current one already names a stored row.
///
/// Natural-tuple indexes only cover live rows, so a caller reusing the id of
/// a soft-deleted row would otherwise collide on the primary key instead of
/// the tuple. Roots keyed by `id` keep their id.
pub(crate) fn release_taken_id<E: Entity>(conn: &Connection, row: &mut E) -> Result<()> {
    if keyed_by_id::<E>() {
        return Ok(());
    }
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", E::TABLE);
    let taken: bool = conn.query_row(&sql, [columns::id(&row.base().id)], |r| r.get(0))?;
    if taken {
        row.base_mut().id = new_id();
    }
    Ok(())
}

/// Insert rows whose natural tuple is free; returns how many were inserted.
pub(crate) fn insert_ignoring<E: Entity>(conn: &Connection, rows: &mut [E]) -> Result<usize> {
    let sql = format!("{} {} DO NOTHING", insert_sql::<E>(), conflict_target::<E>());
    let mut stmt = conn.prepare(&sql)?;
    let mut inserted = 0;
    for row in rows {
        release_taken_id(conn, row)?;
        inserted += stmt.execute(params_from_iter(row_values(row)))?;
    }
    Ok(inserted)
}

/// Single-statement upsert; writes the stored identity back into `row`.
/// The caller must hold a write transaction on `conn`.
pub(crate) fn upsert_on_conflict<E: Entity>(conn: &Connection, row: &mut E) -> Result<()> {
    release_taken_id(conn, row)?;
    let mut stmt = conn.prepare(&upsert_sql::<E>())?;
    let mut rows = stmt.query(params_from_iter(row_values(row)))?;
    let stamp = match rows.next()? {
        Some(stored) => Stamp::read(stored, E::TABLE)?,
        None => return Err(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows)),
    };
    stamp.apply(row.base_mut());
    Ok(())
}

/// Find-then-update-or-insert for tuples with nullable columns. The caller
/// must hold a write transaction on `conn`.
pub(crate) fn upsert_by_lookup<E: Entity>(conn: &Connection, row: &mut E) -> Result<()> {
    let key = natural_key_filter(row)?;
    let found = query_stamp(
        conn,
        &format!("SELECT id, created_at, updated_at FROM {}{} LIMIT 1", E::TABLE, key.sql()),
        key.params(),
        E::TABLE,
    )?;

    let Some(existing) = found else {
        release_taken_id(conn, row)?;
        insert_all(conn, std::slice::from_ref(row))?;
        return Ok(());
    };

    let mut sets: Vec<String> = E::UPSERT_COLUMNS.iter().map(|c| format!("{c} = ?")).collect();
    sets.push("updated_at = max(updated_at, ?)".to_string());
    let mut params = E::UPSERT_COLUMNS
        .iter()
        .map(|c| field_value(row, c))
        .collect::<Result<Vec<_>>>()?;
    params.push(columns::ts(&row.base().updated_at));
    params.push(columns::id(&existing.id));

    let stamp = query_stamp(
        conn,
        &format!(
            "UPDATE {} SET {} WHERE id = ? RETURNING id, created_at, updated_at",
            E::TABLE,
            sets.join(", ")
        ),
        &params,
        E::TABLE,
    )?
    .unwrap_or(existing);
    stamp.apply(row.base_mut());
    Ok(())
}

fn query_stamp(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    table: &'static str,
) -> Result<Option<Stamp>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    rows.next()?.map(|row| Stamp::read(row, table)).transpose()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

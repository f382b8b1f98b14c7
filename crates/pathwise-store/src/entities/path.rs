//! Learning paths (aggregate root) and the view-count mutator.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use serde_json::json;

use crate::dbc::Dbc;
use crate::errors::Result;
use crate::ids::Id;
use crate::logging::OneId;
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::query::{Filter, clamp_limit};
use crate::template::{BaseRecord, Entity, Repo, SoftDeletable};
use crate::time;

/// A learning path owned by one user.
#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    /// Shared columns.
    pub base: BaseRecord,
    /// Owning user.
    pub owner_id: Id,
    /// Display title.
    pub title: String,
    /// Lifecycle status (`draft`, `ready`, ...).
    pub status: String,
    /// Deduplicated view counter. Only [`Repo::record_view`] moves it.
    pub view_count: i64,
    /// Last recorded view.
    pub last_viewed_at: Option<DateTime<Utc>>,
    /// Free-form metadata document.
    pub metadata: serde_json::Value,
}

impl Path {
    /// Unsaved path with empty metadata.
    pub fn new(owner_id: Id, title: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            base: BaseRecord::default(),
            owner_id,
            title: title.into(),
            status: status.into(),
            view_count: 0,
            last_viewed_at: None,
            metadata: json!({}),
        }
    }
}

impl Entity for Path {
    const TABLE: &'static str = "paths";
    const NAME: &'static str = "path";
    const FIELDS: &'static [&'static str] = &[
        "owner_id",
        "title",
        "status",
        "view_count",
        "last_viewed_at",
        "metadata",
    ];
    const NATURAL_KEY: &'static [&'static str] = &["id"];
    const UPSERT_COLUMNS: &'static [&'static str] = &["title", "status", "metadata"];

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseRecord {
        &mut self.base
    }

    fn has_natural_key(&self) -> bool {
        !self.owner_id.is_nil()
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            columns::id(&self.owner_id),
            columns::text(&self.title),
            columns::text(&self.status),
            Value::Integer(self.view_count),
            columns::opt_ts(self.last_viewed_at.as_ref()),
            columns::json(&self.metadata),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            base,
            owner_id: row.id()?,
            title: row.text()?,
            status: row.text()?,
            view_count: row.int()?,
            last_viewed_at: row.opt_ts()?,
            metadata: row.json()?,
        })
    }
}

impl SoftDeletable for Path {}

/// Outcome of [`Repo::record_view`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewRecord {
    /// Counter after the call.
    pub view_count: i64,
    /// `last_viewed_at` after the call.
    pub last_viewed_at: Option<DateTime<Utc>>,
    /// Whether a live path owned by the user was found.
    pub applied: bool,
}

const VIEW_COLUMNS: &[&str] = &["view_count", "last_viewed_at"];

impl Repo<Path> {
    /// Live paths of one owner, oldest first.
    pub fn list_by_owner(&self, dbc: &Dbc<'_>, owner_id: Id, limit: Option<i64>) -> Result<Vec<Path>> {
        self.logger
            .call("list_by_owner", format_args!("owner={}", OneId(&owner_id)), || {
                if owner_id.is_nil() {
                    return Ok(Vec::new());
                }
                self.list_where(
                    dbc,
                    Filter::new().eq("owner_id", columns::id(&owner_id)),
                    "created_at, id",
                    Some(clamp_limit(limit)),
                )
            })
    }

    /// Record a view of `path_id` by its owner. The counter moves only when
    /// the previous view is older than `window` (or there was none, or the
    /// window is not positive). `last_viewed_at` always moves to now and
    /// `updated_at` is left alone.
    pub fn record_view(
        &self,
        dbc: &Dbc<'_>,
        user_id: Id,
        path_id: Id,
        window: Duration,
    ) -> Result<ViewRecord> {
        self.logger.call(
            "record_view",
            format_args!("user={} path={}", OneId(&user_id), OneId(&path_id)),
            || {
                if user_id.is_nil() || path_id.is_nil() {
                    return Ok(ViewRecord::default());
                }
                let now = self.store.now();
                let always = window <= Duration::zero();
                let cutoff = now
                    .checked_sub_signed(window)
                    .map(|t| time::encode(&t))
                    .unwrap_or_default();

                let params = [
                    Value::Integer(i64::from(always)),
                    Value::Text(cutoff),
                    columns::ts(&now),
                    columns::id(&path_id),
                    columns::id(&user_id),
                ];
                dbc.exec(|conn| {
                    let mut stmt = conn.prepare(
                        "UPDATE paths
                         SET view_count = view_count + CASE
                               WHEN ? OR last_viewed_at IS NULL OR last_viewed_at <= ? THEN 1
                               ELSE 0 END,
                             last_viewed_at = ?
                         WHERE id = ? AND owner_id = ? AND deleted_at IS NULL
                         RETURNING view_count, last_viewed_at",
                    )?;
                    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
                    let Some(row) = rows.next()? else {
                        return Ok(ViewRecord::default());
                    };
                    let mut r = RowReader::new(row, Path::TABLE, VIEW_COLUMNS, 0);
                    Ok(ViewRecord {
                        view_count: r.int()?,
                        last_viewed_at: r.opt_ts()?,
                        applied: true,
                    })
                })
            },
        )
    }

    /// Soft-delete every live path of one owner.
    pub fn soft_delete_by_owner(&self, dbc: &Dbc<'_>, owner_id: Id) -> Result<usize> {
        self.logger
            .call("soft_delete_by_owner", format_args!("owner={}", OneId(&owner_id)), || {
                if owner_id.is_nil() {
                    return Ok(0);
                }
                self.soft_delete_where(dbc, Filter::new().eq("owner_id", columns::id(&owner_id)))
            })
    }

    /// Physically remove every path of one owner.
    pub fn full_delete_by_owner(&self, dbc: &Dbc<'_>, owner_id: Id) -> Result<usize> {
        self.logger
            .call("full_delete_by_owner", format_args!("owner={}", OneId(&owner_id)), || {
                if owner_id.is_nil() {
                    return Ok(0);
                }
                self.full_delete_where(dbc, Filter::new().eq("owner_id", columns::id(&owner_id)))
            })
    }
}

/// Repo for [`Path`].
pub type PathRepo = Repo<Path>;

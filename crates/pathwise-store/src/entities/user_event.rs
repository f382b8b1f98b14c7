//! Append-only user event log.
//!
//! Events are ingested idempotently on `(user_id, client_event_id)` and read
//! back per user in `(created_at, id)` order. Consumers page through a stream
//! with [`Repo::list_after_cursor`], remembering the last `(created_at, id)`
//! pair they processed.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use serde_json::json;

use crate::dbc::Dbc;
use crate::errors::Result;
use crate::ids::Id;
use crate::logging::OneId;
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::query::{Filter, clamp_limit};
use crate::template::{BaseRecord, Entity, Repo, SoftDeletable};

/// One client-reported learning event.
#[derive(Clone, Debug, PartialEq)]
pub struct UserEvent {
    /// Shared columns. `created_at` is the ingestion instant and orders the
    /// stream.
    pub base: BaseRecord,
    /// Reporting user.
    pub user_id: Id,
    /// Client-side idempotency key.
    pub client_event_id: String,
    /// Event type.
    pub event_type: String,
    /// Client session, if any.
    pub session_id: Option<String>,
    /// When the client says the event happened.
    pub occurred_at: DateTime<Utc>,
    /// Event body.
    pub payload: serde_json::Value,
}

impl UserEvent {
    /// Unsaved event with an empty payload.
    pub fn new(
        user_id: Id,
        client_event_id: impl Into<String>,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            base: BaseRecord::default(),
            user_id,
            client_event_id: client_event_id.into(),
            event_type: event_type.into(),
            session_id: None,
            occurred_at,
            payload: json!({}),
        }
    }
}

impl Entity for UserEvent {
    const TABLE: &'static str = "user_events";
    const NAME: &'static str = "user_event";
    const FIELDS: &'static [&'static str] = &[
        "user_id",
        "client_event_id",
        "event_type",
        "session_id",
        "occurred_at",
        "payload",
    ];
    const NATURAL_KEY: &'static [&'static str] = &["user_id", "client_event_id"];
    const UPSERT_COLUMNS: &'static [&'static str] = &[];

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseRecord {
        &mut self.base
    }

    fn has_natural_key(&self) -> bool {
        !self.user_id.is_nil() && !self.client_event_id.is_empty()
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            columns::id(&self.user_id),
            columns::text(&self.client_event_id),
            columns::text(&self.event_type),
            columns::opt_text(self.session_id.as_deref()),
            columns::ts(&self.occurred_at),
            columns::json(&self.payload),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            base,
            user_id: row.id()?,
            client_event_id: row.text()?,
            event_type: row.text()?,
            session_id: row.opt_text()?,
            occurred_at: row.ts()?,
            payload: row.json()?,
        })
    }
}

impl SoftDeletable for UserEvent {}

/// Predicate for "strictly after `(created_at, id)`", or `None` to read from
/// the start of the stream.
fn after(created_at: Option<DateTime<Utc>>, id: Option<Id>) -> Option<(&'static str, Vec<Value>)> {
    let created_at = created_at.filter(|t| !crate::time::is_zero(t))?;
    let t = columns::ts(&created_at);
    Some(match id.filter(|id| !id.is_nil()) {
        Some(id) => (
            "created_at > ? OR (created_at = ? AND id > ?)",
            vec![t.clone(), t, columns::id(&id)],
        ),
        None => ("created_at > ?", vec![t]),
    })
}

impl Repo<UserEvent> {
    /// Live events of `user_id` strictly after the cursor, ascending by
    /// `(created_at, id)`. Without `after_created_at` the stream is read from
    /// the start; with only `after_created_at`, events at exactly that instant
    /// are skipped.
    pub fn list_after_cursor(
        &self,
        dbc: &Dbc<'_>,
        user_id: Id,
        after_created_at: Option<DateTime<Utc>>,
        after_id: Option<Id>,
        limit: Option<i64>,
    ) -> Result<Vec<UserEvent>> {
        let after_id_log = after_id.unwrap_or_default();
        self.logger.call(
            "list_after_cursor",
            format_args!(
                "user={} after_id={} limit={limit:?}",
                OneId(&user_id),
                OneId(&after_id_log)
            ),
            || {
                if user_id.is_nil() {
                    return Ok(Vec::new());
                }
                let mut filter = Filter::new().eq("user_id", columns::id(&user_id));
                if let Some((clause, values)) = after(after_created_at, after_id) {
                    filter = filter.raw(clause, values);
                }
                self.list_where(dbc, filter, "created_at, id", Some(clamp_limit(limit)))
            },
        )
    }

    /// Number of live events of one user.
    pub fn count_by_user(&self, dbc: &Dbc<'_>, user_id: Id) -> Result<i64> {
        self.logger
            .call("count_by_user", format_args!("user={}", OneId(&user_id)), || {
                if user_id.is_nil() {
                    return Ok(0);
                }
                self.count_where(dbc, Filter::new().eq("user_id", columns::id(&user_id)))
            })
    }
}

/// Repo for [`UserEvent`].
pub type UserEventRepo = Repo<UserEvent>;

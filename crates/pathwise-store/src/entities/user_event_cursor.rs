//! Per-consumer read positions in a user's event stream.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;

use crate::dbc::Dbc;
use crate::errors::{Result, StoreError};
use crate::ids::{Id, redact_id};
use crate::logging::OneId;
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::query::Filter;
use crate::template::{BaseRecord, Entity, Repo};

/// Last `(created_at, id)` a consumer processed for one user. Cursor rows
/// are never soft-deleted.
#[derive(Clone, Debug, PartialEq)]
pub struct UserEventCursor {
    /// Shared columns.
    pub base: BaseRecord,
    /// Stream owner.
    pub user_id: Id,
    /// Consumer name.
    pub consumer: String,
    /// `created_at` of the last processed event.
    pub last_created_at: Option<DateTime<Utc>>,
    /// Id of the last processed event.
    pub last_event_id: Option<Id>,
}

impl UserEventCursor {
    /// Cursor at the start of the stream.
    pub fn new(user_id: Id, consumer: impl Into<String>) -> Self {
        Self {
            base: BaseRecord::default(),
            user_id,
            consumer: consumer.into(),
            last_created_at: None,
            last_event_id: None,
        }
    }

    /// Move the cursor to an event.
    pub fn advance_to(&mut self, created_at: DateTime<Utc>, event_id: Id) {
        self.last_created_at = Some(created_at);
        self.last_event_id = Some(event_id);
    }
}

impl Entity for UserEventCursor {
    const TABLE: &'static str = "user_event_cursors";
    const NAME: &'static str = "user_event_cursor";
    const FIELDS: &'static [&'static str] = &["user_id", "consumer", "last_created_at", "last_event_id"];
    const NATURAL_KEY: &'static [&'static str] = &["user_id", "consumer"];
    const UPSERT_COLUMNS: &'static [&'static str] = &["last_created_at", "last_event_id"];
    const SOFT_DELETE: bool = false;

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseRecord {
        &mut self.base
    }

    fn has_natural_key(&self) -> bool {
        !self.user_id.is_nil() && !self.consumer.is_empty()
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            columns::id(&self.user_id),
            columns::text(&self.consumer),
            columns::opt_ts(self.last_created_at.as_ref()),
            columns::opt_id(self.last_event_id.as_ref()),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            base,
            user_id: row.id()?,
            consumer: row.text()?,
            last_created_at: row.opt_ts()?,
            last_event_id: row.opt_id()?,
        })
    }
}

impl Repo<UserEventCursor> {
    /// The cursor of `consumer` for `user_id`, or `None`.
    pub fn find(&self, dbc: &Dbc<'_>, user_id: Id, consumer: &str) -> Result<Option<UserEventCursor>> {
        self.logger
            .call("find", format_args!("user={} consumer={consumer}", OneId(&user_id)), || {
                if user_id.is_nil() || consumer.is_empty() {
                    return Ok(None);
                }
                let filter = Filter::new()
                    .eq("user_id", columns::id(&user_id))
                    .eq("consumer", columns::text(consumer));
                Ok(self.list_where(dbc, filter, "id", Some(1))?.into_iter().next())
            })
    }

    /// The cursor of `consumer` for `user_id`. A missing cursor is
    /// [`StoreError::NotFound`].
    pub fn get(&self, dbc: &Dbc<'_>, user_id: Id, consumer: &str) -> Result<UserEventCursor> {
        self.find(dbc, user_id, consumer)?
            .ok_or_else(|| StoreError::NotFound {
                entity: UserEventCursor::NAME,
                key: format!("{}/{consumer}", redact_id(&user_id)),
            })
    }
}

/// Repo for [`UserEventCursor`].
pub type UserEventCursorRepo = Repo<UserEventCursor>;

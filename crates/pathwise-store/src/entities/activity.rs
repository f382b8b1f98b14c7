//! Activities (aggregate root).

use rusqlite::types::Value;
use serde_json::json;

use crate::dbc::Dbc;
use crate::errors::Result;
use crate::ids::Id;
use crate::logging::OneId;
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::query::{Filter, clamp_limit};
use crate::template::{BaseRecord, Entity, Repo, SoftDeletable};

/// A unit of learning work: a reading, an exercise, a quiz.
#[derive(Clone, Debug, PartialEq)]
pub struct Activity {
    /// Shared columns.
    pub base: BaseRecord,
    /// Owning user.
    pub owner_id: Id,
    /// Activity kind.
    pub kind: String,
    /// Display title.
    pub title: String,
    /// Lifecycle status.
    pub status: String,
    /// Estimated effort.
    pub estimated_minutes: Option<i64>,
    /// Body document.
    pub content: serde_json::Value,
}

impl Activity {
    /// Unsaved activity with empty content.
    pub fn new(owner_id: Id, kind: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            base: BaseRecord::default(),
            owner_id,
            kind: kind.into(),
            title: title.into(),
            status: "draft".to_string(),
            estimated_minutes: None,
            content: json!({}),
        }
    }
}

impl Entity for Activity {
    const TABLE: &'static str = "activities";
    const NAME: &'static str = "activity";
    const FIELDS: &'static [&'static str] = &[
        "owner_id",
        "kind",
        "title",
        "status",
        "estimated_minutes",
        "content",
    ];
    const NATURAL_KEY: &'static [&'static str] = &["id"];
    const UPSERT_COLUMNS: &'static [&'static str] =
        &["kind", "title", "status", "estimated_minutes", "content"];

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
            columns::text(&self.kind),
            columns::text(&self.title),
            columns::text(&self.status),
            self.estimated_minutes.map_or(Value::Null, Value::Integer),
            columns::json(&self.content),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            base,
            owner_id: row.id()?,
            kind: row.text()?,
            title: row.text()?,
            status: row.text()?,
            estimated_minutes: row.opt_int()?,
            content: row.json()?,
        })
    }
}

impl SoftDeletable for Activity {}

impl Repo<Activity> {
    /// Live activities of one owner, oldest first.
    pub fn list_by_owner(
        &self,
        dbc: &Dbc<'_>,
        owner_id: Id,
        limit: Option<i64>,
    ) -> Result<Vec<Activity>> {
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

    /// Live activities in any of `statuses`, oldest first.
    pub fn list_by_status(
        &self,
        dbc: &Dbc<'_>,
        statuses: &[String],
        limit: Option<i64>,
    ) -> Result<Vec<Activity>> {
        let count = statuses.len();
        self.logger
            .call("list_by_status", format_args!("statuses={count}"), || {
                if statuses.is_empty() {
                    return Ok(Vec::new());
                }
                let values = statuses.iter().map(|s| columns::text(s)).collect();
                self.list_where(
                    dbc,
                    Filter::new().any_of("status", values),
                    "created_at, id",
                    Some(clamp_limit(limit)),
                )
            })
    }

    /// Soft-delete every live activity of one owner.
    pub fn soft_delete_by_owner(&self, dbc: &Dbc<'_>, owner_id: Id) -> Result<usize> {
        self.logger
            .call("soft_delete_by_owner", format_args!("owner={}", OneId(&owner_id)), || {
                if owner_id.is_nil() {
                    return Ok(0);
                }
                self.soft_delete_where(dbc, Filter::new().eq("owner_id", columns::id(&owner_id)))
            })
    }

    /// Physically remove every activity of one owner.
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

/// Repo for [`Activity`].
pub type ActivityRepo = Repo<Activity>;

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::ids::new_id;
    use crate::template::Fields;
    use crate::testutil;
    use assert_matches::assert_matches;
    use chrono::Duration;

    #[test]
    fn update_replaces_fields_and_advances_updated_at() {
        let (store, clock) = testutil::store();
        let repo = ActivityRepo::with_store(store.clone());
        let dbc = store.dbc();
        let mut activity = repo
            .create(&dbc, vec![Activity::new(new_id(), "quiz", "Ownership")])
            .unwrap()
            .remove(0);

        clock.advance(Duration::seconds(30));
        activity.title = "Borrowing".into();
        activity.estimated_minutes = Some(15);
        repo.update(&dbc, &mut activity).unwrap();
        assert_eq!(activity.base.updated_at, store.now());

        let stored = repo.get_by_id(&dbc, activity.base.id).unwrap().unwrap();
        assert_eq!(stored.title, "Borrowing");
        assert_eq!(stored.estimated_minutes, Some(15));
        assert_eq!(stored.base.created_at, testutil::t0());
    }

    #[test]
    fn update_with_nil_id_is_noop() {
        let (store, _) = testutil::store();
        let repo = ActivityRepo::with_store(store.clone());
        let mut activity = Activity::new(new_id(), "quiz", "x");
        repo.update(&store.dbc(), &mut activity).unwrap();
        assert!(activity.base.id.is_nil());
    }

    #[test]
    fn update_fields_merges_and_rejects_protected_columns() {
        let (store, clock) = testutil::store();
        let repo = ActivityRepo::with_store(store.clone());
        let dbc = store.dbc();
        let id = repo
            .create(&dbc, vec![Activity::new(new_id(), "quiz", "Traits")])
            .unwrap()[0]
            .base
            .id;

        clock.advance(Duration::seconds(5));
        repo.update_fields(&dbc, id, Fields::new().set_text("status", "ready"))
            .unwrap();
        let stored = repo.get_by_id(&dbc, id).unwrap().unwrap();
        assert_eq!(stored.status, "ready");
        assert_eq!(stored.title, "Traits");
        assert_eq!(stored.base.updated_at, store.now());

        for column in ["id", "created_at", "deleted_at", "nope"] {
            let err = repo
                .update_fields(&dbc, id, Fields::new().set_text(column, "x"))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }

        repo.update_fields(&dbc, id, Fields::new()).unwrap();
        repo.update_fields(&dbc, Id::nil(), Fields::new().set_text("title", "x"))
            .unwrap();
    }

    #[test]
    fn list_by_status_filters_and_ignores_empty() {
        let (store, _) = testutil::store();
        let repo = ActivityRepo::with_store(store.clone());
        let dbc = store.dbc();
        let owner = new_id();
        let mut ready = Activity::new(owner, "quiz", "a");
        ready.status = "ready".into();
        repo.create(&dbc, vec![ready, Activity::new(owner, "quiz", "b")])
            .unwrap();

        let found = repo
            .list_by_status(&dbc, &["ready".to_string()], None)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "a");
        assert!(repo.list_by_status(&dbc, &[], None).unwrap().is_empty());
    }

    #[test]
    fn create_duplicate_id_is_unique_violation_and_atomic() {
        let (store, _) = testutil::store();
        let repo = ActivityRepo::with_store(store.clone());
        let dbc = store.dbc();
        let owner = new_id();
        let first = repo
            .create(&dbc, vec![Activity::new(owner, "quiz", "a")])
            .unwrap()
            .remove(0);

        let mut dup = Activity::new(owner, "quiz", "dup");
        dup.base.id = first.base.id;
        let err = repo
            .create(&dbc, vec![Activity::new(owner, "quiz", "fresh"), dup])
            .unwrap_err();
        assert_matches!(err, crate::errors::StoreError::UniqueViolation(_));
        assert_eq!(repo.list_by_owner(&dbc, owner, None).unwrap().len(), 1);
    }

    #[test]
    fn update_fields_never_moves_updated_at_backwards() {
        let (store, clock) = testutil::store();
        let repo = ActivityRepo::with_store(store.clone());
        let dbc = store.dbc();
        let id = repo
            .create(&dbc, vec![Activity::new(new_id(), "quiz", "Ownership")])
            .unwrap()[0]
            .base
            .id;

        clock.advance(Duration::minutes(5));
        repo.update_fields(&dbc, id, Fields::new().set_text("title", "Moves")).unwrap();
        let advanced = repo.get_by_id(&dbc, id).unwrap().unwrap().base.updated_at;
        assert_eq!(advanced, store.now());

        let stale = testutil::t0() - Duration::days(1);
        repo.update_fields(
            &dbc,
            id,
            Fields::new().set_text("title", "Stale").set_time("updated_at", Some(stale)),
        )
        .unwrap();
        let stored = repo.get_by_id(&dbc, id).unwrap().unwrap();
        assert_eq!(stored.title, "Stale");
        assert_eq!(stored.base.updated_at, advanced);
    }
}

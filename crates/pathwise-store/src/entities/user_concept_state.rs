//! Per-user mastery state, one row per `(user_id, concept_id)`.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;

use crate::dbc::Dbc;
use crate::errors::Result;
use crate::ids::Id;
use crate::logging::{IdSet, OneId};
use crate::sqlite::columns::{self, RowReader};
use crate::sqlite::query::{Filter, clamp_limit};
use crate::template::{BaseRecord, Entity, Repo, SoftDeletable, id_filter};

/// What the system believes a user knows about one concept.
#[derive(Clone, Debug, PartialEq)]
pub struct UserConceptState {
    /// Shared columns.
    pub base: BaseRecord,
    /// Learner.
    pub user_id: Id,
    /// Concept being tracked.
    pub concept_id: Id,
    /// Mastery estimate in `[0, 1]`.
    pub mastery: f64,
    /// Confidence in the estimate, `[0, 1]`.
    pub confidence: f64,
    /// Number of attempts seen.
    pub attempts: i64,
    /// Last evidence instant.
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl UserConceptState {
    /// Fresh state with no evidence.
    pub fn new(user_id: Id, concept_id: Id) -> Self {
        Self {
            base: BaseRecord::default(),
            user_id,
            concept_id,
            mastery: 0.0,
            confidence: 0.0,
            attempts: 0,
            last_seen_at: None,
        }
    }
}

impl Entity for UserConceptState {
    const TABLE: &'static str = "user_concept_states";
    const NAME: &'static str = "user_concept_state";
    const FIELDS: &'static [&'static str] =
        &["user_id", "concept_id", "mastery", "confidence", "attempts", "last_seen_at"];
    const NATURAL_KEY: &'static [&'static str] = &["user_id", "concept_id"];
    const UPSERT_COLUMNS: &'static [&'static str] = &["mastery", "confidence", "attempts", "last_seen_at"];

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseRecord {
        &mut self.base
    }

    fn has_natural_key(&self) -> bool {
        !self.user_id.is_nil() && !self.concept_id.is_nil()
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            columns::id(&self.user_id),
            columns::id(&self.concept_id),
            Value::Real(self.mastery),
            Value::Real(self.confidence),
            Value::Integer(self.attempts),
            columns::opt_ts(self.last_seen_at.as_ref()),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            base,
            user_id: row.id()?,
            concept_id: row.id()?,
            mastery: row.real()?,
            confidence: row.real()?,
            attempts: row.int()?,
            last_seen_at: row.opt_ts()?,
        })
    }
}

impl SoftDeletable for UserConceptState {}

impl Repo<UserConceptState> {
    /// Live states of one user for the given concepts, ordered by concept.
    pub fn get_by_user_and_concept_ids(
        &self,
        dbc: &Dbc<'_>,
        user_id: Id,
        concept_ids: &[Id],
    ) -> Result<Vec<UserConceptState>> {
        self.logger.call(
            "get_by_user_and_concept_ids",
            format_args!("user={} concepts={}", OneId(&user_id), IdSet(concept_ids)),
            || {
                if user_id.is_nil() {
                    return Ok(Vec::new());
                }
                let Some(concepts) = id_filter("concept_id", concept_ids) else {
                    return Ok(Vec::new());
                };
                let filter = Filter::new().eq("user_id", columns::id(&user_id)).and(concepts);
                self.list_where(dbc, filter, "concept_id, id", None)
            },
        )
    }

    /// Live states of one user, ordered by concept.
    pub fn list_by_user(&self, dbc: &Dbc<'_>, user_id: Id, limit: Option<i64>) -> Result<Vec<UserConceptState>> {
        self.logger
            .call("list_by_user", format_args!("user={}", OneId(&user_id)), || {
                if user_id.is_nil() {
                    return Ok(Vec::new());
                }
                self.list_where(
                    dbc,
                    Filter::new().eq("user_id", columns::id(&user_id)),
                    "concept_id, id",
                    Some(clamp_limit(limit)),
                )
            })
    }

    /// Soft-delete every live state of one user.
    pub fn soft_delete_by_user(&self, dbc: &Dbc<'_>, user_id: Id) -> Result<usize> {
        self.logger
            .call("soft_delete_by_user", format_args!("user={}", OneId(&user_id)), || {
                if user_id.is_nil() {
                    return Ok(0);
                }
                self.soft_delete_where(dbc, Filter::new().eq("user_id", columns::id(&user_id)))
            })
    }

    /// Physically remove every state of one user.
    pub fn full_delete_by_user(&self, dbc: &Dbc<'_>, user_id: Id) -> Result<usize> {
        self.logger
            .call("full_delete_by_user", format_args!("user={}", OneId(&user_id)), || {
                if user_id.is_nil() {
                    return Ok(0);
                }
                self.full_delete_where(dbc, Filter::new().eq("user_id", columns::id(&user_id)))
            })
    }
}

/// Repo for [`UserConceptState`].
pub type UserConceptStateRepo = Repo<UserConceptState>;

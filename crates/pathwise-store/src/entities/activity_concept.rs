//! Activity ↔ concept join rows.

use rusqlite::types::Value;

use crate::dbc::Dbc;
use crate::errors::Result;
use crate::ids::Id;
use crate::logging::IdSet;
use crate::sqlite::columns::{self, RowReader};
use crate::template::{BaseRecord, Entity, Repo, SoftDeletable, id_filter};

/// Tags an activity with a concept it teaches or assesses.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityConcept {
    /// Shared columns.
    pub base: BaseRecord,
    /// Tagged activity.
    pub activity_id: Id,
    /// Tagged concept.
    pub concept_id: Id,
    /// How the activity relates to the concept.
    pub role: String,
    /// Relative weight.
    pub weight: f64,
}

impl ActivityConcept {
    /// Unsaved link with weight 1.
    pub fn new(activity_id: Id, concept_id: Id, role: impl Into<String>) -> Self {
        Self {
            base: BaseRecord::default(),
            activity_id,
            concept_id,
            role: role.into(),
            weight: 1.0,
        }
    }
}

impl Entity for ActivityConcept {
    const TABLE: &'static str = "activity_concepts";
    const NAME: &'static str = "activity_concept";
    const FIELDS: &'static [&'static str] = &["activity_id", "concept_id", "role", "weight"];
    const NATURAL_KEY: &'static [&'static str] = &["activity_id", "concept_id"];
    const UPSERT_COLUMNS: &'static [&'static str] = &["role", "weight"];

    fn base(&self) -> &BaseRecord {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseRecord {
        &mut self.base
    }

    fn has_natural_key(&self) -> bool {
        !self.activity_id.is_nil() && !self.concept_id.is_nil()
    }

    fn field_values(&self) -> Vec<Value> {
        vec![
            columns::id(&self.activity_id),
            columns::id(&self.concept_id),
            columns::text(&self.role),
            Value::Real(self.weight),
        ]
    }

    fn read_fields(base: BaseRecord, row: &mut RowReader<'_, '_>) -> Result<Self> {
        Ok(Self {
            base,
            activity_id: row.id()?,
            concept_id: row.id()?,
            role: row.text()?,
            weight: row.real()?,
        })
    }
}

impl SoftDeletable for ActivityConcept {}

impl Repo<ActivityConcept> {
    /// Live links of the given activities, ordered `(activity_id, concept_id)`.
    pub fn get_by_activity_ids(&self, dbc: &Dbc<'_>, activity_ids: &[Id]) -> Result<Vec<ActivityConcept>> {
        self.logger.call(
            "get_by_activity_ids",
            format_args!("activities={}", IdSet(activity_ids)),
            || match id_filter("activity_id", activity_ids) {
                Some(filter) => self.list_where(dbc, filter, "activity_id, concept_id, id", None),
                None => Ok(Vec::new()),
            },
        )
    }

    /// Live links of the given concepts, ordered `(concept_id, activity_id)`.
    pub fn get_by_concept_ids(&self, dbc: &Dbc<'_>, concept_ids: &[Id]) -> Result<Vec<ActivityConcept>> {
        self.logger.call(
            "get_by_concept_ids",
            format_args!("concepts={}", IdSet(concept_ids)),
            || match id_filter("concept_id", concept_ids) {
                Some(filter) => self.list_where(dbc, filter, "concept_id, activity_id, id", None),
                None => Ok(Vec::new()),
            },
        )
    }

    /// Soft-delete every live link of the given activities.
    pub fn soft_delete_by_activity_ids(&self, dbc: &Dbc<'_>, activity_ids: &[Id]) -> Result<usize> {
        self.logger.call(
            "soft_delete_by_activity_ids",
            format_args!("activities={}", IdSet(activity_ids)),
            || id_filter("activity_id", activity_ids).map_or(Ok(0), |f| self.soft_delete_where(dbc, f)),
        )
    }

    /// Soft-delete every live link of the given concepts.
    pub fn soft_delete_by_concept_ids(&self, dbc: &Dbc<'_>, concept_ids: &[Id]) -> Result<usize> {
        self.logger.call(
            "soft_delete_by_concept_ids",
            format_args!("concepts={}", IdSet(concept_ids)),
            || id_filter("concept_id", concept_ids).map_or(Ok(0), |f| self.soft_delete_where(dbc, f)),
        )
    }

    /// Physically remove every link of the given activities.
    pub fn full_delete_by_activity_ids(&self, dbc: &Dbc<'_>, activity_ids: &[Id]) -> Result<usize> {
        self.logger.call(
            "full_delete_by_activity_ids",
            format_args!("activities={}", IdSet(activity_ids)),
            || id_filter("activity_id", activity_ids).map_or(Ok(0), |f| self.full_delete_where(dbc, f)),
        )
    }

    /// Physically remove every link of the given concepts.
    pub fn full_delete_by_concept_ids(&self, dbc: &Dbc<'_>, concept_ids: &[Id]) -> Result<usize> {
        self.logger.call(
            "full_delete_by_concept_ids",
            format_args!("concepts={}", IdSet(concept_ids)),
            || id_filter("concept_id", concept_ids).map_or(Ok(0), |f| self.full_delete_where(dbc, f)),
        )
    }
}

/// Repo for [`ActivityConcept`].
pub type ActivityConceptRepo = Repo<ActivityConcept>;

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::entities::{Activity, ActivityRepo, Concept, ConceptRepo, ScopeKind};
    use crate::ids::new_id;
    use crate::testutil;

    #[test]
    fn links_upsert_and_read_from_both_sides() {
        let (store, _) = testutil::store();
        let dbc = store.dbc();
        let activity = ActivityRepo::with_store(store.clone())
            .create(&dbc, vec![Activity::new(new_id(), "quiz", "q")])
            .unwrap()
            .remove(0);
        let concepts = ConceptRepo::with_store(store.clone())
            .create(
                &dbc,
                vec![
                    Concept::new(ScopeKind::Global, None, "a", "A"),
                    Concept::new(ScopeKind::Global, None, "b", "B"),
                ],
            )
            .unwrap();

        let repo = ActivityConceptRepo::with_store(store.clone());
        let a = activity.base.id;
        let rows = concepts
            .iter()
            .map(|c| ActivityConcept::new(a, c.base.id, "teaches"))
            .collect();
        assert_eq!(repo.create_ignore_duplicates(&dbc, rows).unwrap(), 2);

        let mut again = ActivityConcept::new(a, concepts[0].base.id, "assesses");
        again.weight = 0.5;
        repo.upsert(&dbc, &mut again).unwrap();

        let by_activity = repo.get_by_activity_ids(&dbc, &[a]).unwrap();
        assert_eq!(by_activity.len(), 2);
        let by_concept = repo.get_by_concept_ids(&dbc, &[concepts[0].base.id]).unwrap();
        assert_eq!(by_concept.len(), 1);
        assert_eq!(by_concept[0].role, "assesses");
        assert!((by_concept[0].weight - 0.5).abs() < f64::EPSILON);

        assert_eq!(repo.soft_delete_by_concept_ids(&dbc, &[concepts[1].base.id]).unwrap(), 1);
        assert_eq!(repo.get_by_activity_ids(&dbc, &[a]).unwrap().len(), 1);
        assert_eq!(repo.full_delete_by_activity_ids(&dbc, &[a]).unwrap(), 2);
    }

    #[test]
    fn rows_without_both_sides_are_skipped() {
        let (store, _) = testutil::store();
        let repo = ActivityConceptRepo::with_store(store.clone());
        let dbc = store.dbc();
        let rows = vec![ActivityConcept::new(Id::nil(), new_id(), "teaches")];
        assert_eq!(repo.create_ignore_duplicates(&dbc, rows).unwrap(), 0);

        let mut row = ActivityConcept::new(new_id(), Id::nil(), "teaches");
        repo.upsert(&dbc, &mut row).unwrap();
        assert!(row.base.id.is_nil());
    }
}

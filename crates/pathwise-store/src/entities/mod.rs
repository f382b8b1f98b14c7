//! Concrete entities and their repos.
//!
//! Each module declares one table through [`Entity`](crate::template::Entity)
//! and adds the entity's finders to [`Repo`](crate::template::Repo).

mod activity;
mod activity_concept;
mod concept;
mod concept_edge;
mod path;
mod path_node;
mod taxonomy_snapshot;
mod user_concept_state;
mod user_event;
mod user_event_cursor;

pub use activity::{Activity, ActivityRepo};
pub use activity_concept::{ActivityConcept, ActivityConceptRepo};
pub use concept::{Concept, ConceptRepo, ScopeKind};
pub use concept_edge::{ConceptEdge, ConceptEdgeRepo};
pub use path::{Path, PathRepo, ViewRecord};
pub use path_node::{PathNode, PathNodeRepo};
pub use taxonomy_snapshot::{TaxonomySnapshot, TaxonomySnapshotRepo};
pub use user_concept_state::{UserConceptState, UserConceptStateRepo};
pub use user_event::{UserEvent, UserEventRepo};
pub use user_event_cursor::{UserEventCursor, UserEventCursorRepo};

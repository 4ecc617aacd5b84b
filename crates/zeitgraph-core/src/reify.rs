use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::entity::{CanonicalEntity, EntityType};
use crate::relationship::{Assertion, RelationMention};
use crate::report::{ContextRole, DropReason, DroppedContext, ReferenceRole, UnresolvedReference};
use crate::resolve::MentionMap;

/// Output of reifying a set of relations. Every input relation lands in
/// exactly one of `assertions` or `unresolved`.
#[derive(Debug, Clone, Default)]
pub struct Reification {
    pub assertions: Vec<Assertion>,
    pub unresolved: Vec<UnresolvedReference>,
    pub dropped_contexts: Vec<DroppedContext>,
}

/// Turns relation mentions into assertion nodes over canonical entities.
pub struct Reifier<'a> {
    mention_map: &'a MentionMap,
    types: HashMap<Uuid, EntityType>,
}

impl<'a> Reifier<'a> {
    #[must_use]
    pub fn new(mention_map: &'a MentionMap, entities: &[CanonicalEntity]) -> Self {
        Self {
            mention_map,
            types: entities.iter().map(|e| (e.entity_id, e.entity_type)).collect(),
        }
    }

    pub fn reify(&self, relations: &[RelationMention]) -> Reification {
        let mut out = Reification::default();

        for relation in relations {
            match self.reify_one(relation, &mut out.dropped_contexts) {
                Ok(assertion) => out.assertions.push(assertion),
                Err(rejected) => {
                    tracing::warn!(
                        relation = %rejected.relation_id,
                        missing = %rejected.missing_mention_id,
                        "Rejected relation with unresolved {:?}",
                        rejected.role
                    );
                    out.unresolved.push(rejected);
                }
            }
        }

        tracing::info!(
            relations = relations.len(),
            assertions = out.assertions.len(),
            rejected = out.unresolved.len(),
            "Reified relations"
        );
        out
    }

    fn reify_one(
        &self,
        relation: &RelationMention,
        dropped: &mut Vec<DroppedContext>,
    ) -> Result<Assertion, UnresolvedReference> {
        let endpoint = |mention_id: &str, role: ReferenceRole| {
            self.mention_map
                .get(mention_id)
                .ok_or_else(|| UnresolvedReference {
                    relation_id: relation.relation_id.clone(),
                    missing_mention_id: mention_id.to_string(),
                    role,
                })
        };
        let subject_id = endpoint(&relation.subject_mention_id, ReferenceRole::Subject)?;
        let object_id = endpoint(&relation.object_mention_id, ReferenceRole::Object)?;

        let mut context = |mention_id: Option<&String>, role: ContextRole, expected: EntityType| {
            let mention_id = mention_id?;
            let reason = match self.mention_map.get(mention_id) {
                Some(id) if self.types.get(&id) == Some(&expected) => return Some(id),
                Some(id) => self
                    .types
                    .get(&id)
                    .map_or(DropReason::Unresolved, |t| DropReason::WrongType(*t)),
                None => DropReason::Unresolved,
            };
            tracing::debug!(
                relation = %relation.relation_id,
                mention = %mention_id,
                "Dropped {role:?} context"
            );
            dropped.push(DroppedContext {
                relation_id: relation.relation_id.clone(),
                mention_id: mention_id.clone(),
                role,
                reason,
            });
            None
        };

        let context_time_id = context(
            relation.context_time_mention_id.as_ref(),
            ContextRole::Time,
            EntityType::Time,
        );
        let context_location_id = context(
            relation.context_location_mention_id.as_ref(),
            ContextRole::Location,
            EntityType::Location,
        );

        Ok(Assertion {
            assertion_id: relation.relation_id.clone(),
            predicate: relation.predicate.clone(),
            confidence: relation.confidence,
            sources: BTreeSet::from([relation.source.clone()]),
            subject_id,
            object_id,
            context_time_id,
            context_location_id,
        })
    }
}

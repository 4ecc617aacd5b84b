use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One extracted subject-predicate-object fact, referencing entity mentions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMention {
    pub relation_id: String,
    pub subject_mention_id: String,
    pub predicate: String,
    pub object_mention_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_time_mention_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_location_mention_id: Option<String>,
    pub confidence: f64,
    pub source: String,
}

impl RelationMention {
    #[must_use]
    pub fn new(
        relation_id: impl Into<String>,
        subject_mention_id: impl Into<String>,
        predicate: impl Into<String>,
        object_mention_id: impl Into<String>,
        confidence: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            relation_id: relation_id.into(),
            subject_mention_id: subject_mention_id.into(),
            predicate: predicate.into(),
            object_mention_id: object_mention_id.into(),
            context_time_mention_id: None,
            context_location_mention_id: None,
            confidence: confidence.clamp(0.0, 1.0),
            source: source.into(),
        }
    }

    /// Empty ids count as absent.
    #[must_use]
    pub fn with_time(mut self, mention_id: impl Into<String>) -> Self {
        self.context_time_mention_id = Some(mention_id.into()).filter(|id| !id.is_empty());
        self
    }

    /// Empty ids count as absent.
    #[must_use]
    pub fn with_location(mut self, mention_id: impl Into<String>) -> Self {
        self.context_location_mention_id = Some(mention_id.into()).filter(|id| !id.is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    SubjectOf,
    ObjectIs,
    HasTemporalContext,
    HasSpatialContext,
}

impl EdgeKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SubjectOf => "SUBJECT_OF",
            Self::ObjectIs => "OBJECT_IS",
            Self::HasTemporalContext => "HAS_TEMPORAL_CONTEXT",
            Self::HasSpatialContext => "HAS_SPATIAL_CONTEXT",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binary edge between a canonical entity and an assertion node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionEdge {
    pub kind: EdgeKind,
    pub entity_id: Uuid,
    pub assertion_id: String,
}

impl AssertionEdge {
    /// `SUBJECT_OF` points from the entity to the assertion; the others point
    /// from the assertion to the entity.
    #[must_use]
    pub const fn points_to_assertion(&self) -> bool {
        matches!(self.kind, EdgeKind::SubjectOf)
    }
}

/// The reified form of one relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub assertion_id: String,
    pub predicate: String,
    pub confidence: f64,
    pub sources: BTreeSet<String>,
    pub subject_id: Uuid,
    pub object_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_time_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_location_id: Option<Uuid>,
}

impl Assertion {
    #[must_use]
    pub fn edges(&self) -> Vec<AssertionEdge> {
        let edge = |kind, entity_id| AssertionEdge {
            kind,
            entity_id,
            assertion_id: self.assertion_id.clone(),
        };

        let mut edges = vec![
            edge(EdgeKind::SubjectOf, self.subject_id),
            edge(EdgeKind::ObjectIs, self.object_id),
        ];
        if let Some(time_id) = self.context_time_id {
            edges.push(edge(EdgeKind::HasTemporalContext, time_id));
        }
        if let Some(location_id) = self.context_location_id {
            edges.push(edge(EdgeKind::HasSpatialContext, location_id));
        }
        edges
    }

    #[must_use]
    pub fn sources_joined(&self, delimiter: &str) -> String {
        self.sources
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(delimiter)
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{CanonicalEntity, EntityType};
use crate::relationship::Assertion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedReason {
    MissingType,
    MissingText,
    DuplicateId,
    InvalidConfidence,
    InvalidRecord,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingType => "missing entity type",
            Self::MissingText => "missing entity text",
            Self::DuplicateId => "duplicate mention id",
            Self::InvalidConfidence => "confidence is not a finite number",
            Self::InvalidRecord => "record does not have the entity shape",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedMention {
    pub mention_id: Option<String>,
    pub article_id: String,
    pub reason: MalformedReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationDefect {
    MissingPredicate,
    InvalidRecord,
}

impl fmt::Display for RelationDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingPredicate => "missing predicate",
            Self::InvalidRecord => "record does not have the relation shape",
        })
    }
}

/// A relation record that could not become a relation mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedRelation {
    pub relation_id: String,
    pub article_id: String,
    pub reason: RelationDefect,
}

/// An input file of a directory that could not be read or parsed. The
/// remaining files are still integrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRole {
    Subject,
    Object,
}

/// A relation rejected because its subject or object has no canonical entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub relation_id: String,
    pub missing_mention_id: String,
    pub role: ReferenceRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRole {
    Time,
    Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "found")]
pub enum DropReason {
    Unresolved,
    WrongType(EntityType),
}

/// A context reference that was omitted from an otherwise retained assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedContext {
    pub relation_id: String,
    pub mention_id: String,
    pub role: ContextRole,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Geocode,
    Date,
}

impl LookupKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Geocode => "geocode",
            Self::Date => "date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentFailure {
    pub entity_id: Uuid,
    pub kind: LookupKind,
    pub query: String,
    pub error: String,
}

/// Summary of the integrated graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationStats {
    pub entities_by_type: BTreeMap<EntityType, usize>,
    pub total_entities: usize,
    pub total_assertions: usize,
    pub locations_with_coordinates: usize,
    pub locations_without_coordinates: usize,
    pub times_with_dates: usize,
    pub times_without_dates: usize,
    pub assertions_with_time: usize,
    pub assertions_with_location: usize,
}

impl IntegrationStats {
    #[must_use]
    pub fn compute(entities: &[CanonicalEntity], assertions: &[Assertion]) -> Self {
        let mut stats = Self {
            total_entities: entities.len(),
            total_assertions: assertions.len(),
            ..Self::default()
        };

        for entity in entities {
            *stats.entities_by_type.entry(entity.entity_type).or_default() += 1;

            match entity.entity_type {
                EntityType::Location => {
                    if entity.spatial().is_some_and(|s| s.has_coordinates()) {
                        stats.locations_with_coordinates += 1;
                    } else {
                        stats.locations_without_coordinates += 1;
                    }
                }
                EntityType::Time => {
                    if entity.temporal().is_some_and(|t| t.has_dates()) {
                        stats.times_with_dates += 1;
                    } else {
                        stats.times_without_dates += 1;
                    }
                }
                _ => {}
            }
        }

        stats.assertions_with_time = assertions
            .iter()
            .filter(|a| a.context_time_id.is_some())
            .count();
        stats.assertions_with_location = assertions
            .iter()
            .filter(|a| a.context_location_id.is_some())
            .count();

        stats
    }

    pub fn log(&self) {
        tracing::info!(
            entities = self.total_entities,
            assertions = self.total_assertions,
            locations_with_coordinates = self.locations_with_coordinates,
            locations_without_coordinates = self.locations_without_coordinates,
            times_with_dates = self.times_with_dates,
            times_without_dates = self.times_without_dates,
            "Integration complete"
        );
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl fmt::Display for IntegrationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total unique entities: {}", self.total_entities)?;
        writeln!(f, "Total assertions: {}", self.total_assertions)?;
        writeln!(f, "Entity types:")?;
        for (entity_type, count) in &self.entities_by_type {
            writeln!(f, "  {entity_type}: {count}")?;
        }

        let locations = self.locations_with_coordinates + self.locations_without_coordinates;
        if locations > 0 {
            writeln!(
                f,
                "Locations with coordinates: {} ({:.1}%)",
                self.locations_with_coordinates,
                percent(self.locations_with_coordinates, locations)
            )?;
        }

        let times = self.times_with_dates + self.times_without_dates;
        if times > 0 {
            writeln!(
                f,
                "Time entities with dates: {} ({:.1}%)",
                self.times_with_dates,
                percent(self.times_with_dates, times)
            )?;
        }

        if self.total_assertions > 0 {
            writeln!(
                f,
                "Assertions with time context: {} ({:.1}%)",
                self.assertions_with_time,
                percent(self.assertions_with_time, self.total_assertions)
            )?;
            writeln!(
                f,
                "Assertions with location context: {} ({:.1}%)",
                self.assertions_with_location,
                percent(self.assertions_with_location, self.total_assertions)
            )?;
        }

        Ok(())
    }
}

/// Per-record problems collected over one run. None of these abort the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub skipped_files: Vec<SkippedFile>,
    pub malformed_mentions: Vec<MalformedMention>,
    pub malformed_relations: Vec<MalformedRelation>,
    pub unresolved_references: Vec<UnresolvedReference>,
    pub dropped_contexts: Vec<DroppedContext>,
    pub enrichment_failures: Vec<EnrichmentFailure>,
    pub stats: IntegrationStats,
}

impl RunReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped_files.is_empty()
            && self.malformed_mentions.is_empty()
            && self.malformed_relations.is_empty()
            && self.unresolved_references.is_empty()
            && self.dropped_contexts.is_empty()
            && self.enrichment_failures.is_empty()
    }

    pub fn rejected_relation_ids(&self) -> impl Iterator<Item = &str> {
        self.unresolved_references
            .iter()
            .map(|r| r.relation_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityMention, SpatialAttributes};
    use std::collections::BTreeSet;

    fn entity(entity_type: EntityType, text: &str) -> CanonicalEntity {
        CanonicalEntity::from_mention(&EntityMention::new(
            format!("a#{text}"),
            "a",
            entity_type,
            text,
            0.9,
        ))
        .freeze()
    }

    #[test]
    fn test_stats_counts_enrichment_coverage() {
        let mut vienna = entity(EntityType::Location, "Vienna");
        vienna.attach_spatial(SpatialAttributes {
            latitude: Some(48.2),
            longitude: Some(16.37),
            ..SpatialAttributes::default()
        });
        let atlantis = entity(EntityType::Location, "Atlantis");
        let date = entity(EntityType::Time, "someday");
        let person = entity(EntityType::Person, "Joffre");

        let assertion = Assertion {
            assertion_id: "a#R0".into(),
            predicate: "visited".into(),
            confidence: 0.8,
            sources: BTreeSet::from(["a".to_string()]),
            subject_id: person.entity_id,
            object_id: vienna.entity_id,
            context_time_id: Some(date.entity_id),
            context_location_id: None,
        };

        let stats = IntegrationStats::compute(&[vienna, atlantis, date, person], &[assertion]);

        assert_eq!(stats.total_entities, 4);
        assert_eq!(stats.entities_by_type[&EntityType::Location], 2);
        assert_eq!(stats.locations_with_coordinates, 1);
        assert_eq!(stats.locations_without_coordinates, 1);
        assert_eq!(stats.times_without_dates, 1);
        assert_eq!(stats.assertions_with_time, 1);
        assert_eq!(stats.assertions_with_location, 0);

        let summary = stats.to_string();
        assert!(summary.contains("Locations with coordinates: 1 (50.0%)"));
    }

    #[test]
    fn test_empty_report_is_clean() {
        let mut report = RunReport::new();
        assert!(report.is_clean());

        report.unresolved_references.push(UnresolvedReference {
            relation_id: "a#R3".into(),
            missing_mention_id: "a#E9".into(),
            role: ReferenceRole::Subject,
        });
        assert!(!report.is_clean());
        assert_eq!(report.rejected_relation_ids().collect::<Vec<_>>(), vec!["a#R3"]);
    }

    #[test]
    fn test_skipped_file_is_not_clean() {
        let report = RunReport {
            skipped_files: vec![SkippedFile {
                path: "broken.json".into(),
                error: "expected value".into(),
            }],
            ..RunReport::default()
        };
        assert!(!report.is_clean());
    }
}

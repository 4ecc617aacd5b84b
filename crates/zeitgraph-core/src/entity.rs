use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::normalize;

/// Namespace for deterministic canonical entity ids.
const ENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_4c0e_93d2_5b7a_8e41_2f6c_d0b9_7e35);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Event,
    Concept,
    Time,
    Artifact,
    Sentiment,
    /// Extraction produced a type label outside the closed set.
    Unknown,
}

impl EntityType {
    pub const ALL: [Self; 9] = [
        Self::Person,
        Self::Organization,
        Self::Location,
        Self::Event,
        Self::Concept,
        Self::Time,
        Self::Artifact,
        Self::Sentiment,
        Self::Unknown,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Location => "LOCATION",
            Self::Event => "EVENT",
            Self::Concept => "CONCEPT",
            Self::Time => "TIME",
            Self::Artifact => "ARTIFACT",
            Self::Sentiment => "SENTIMENT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Node label used by the graph store. Always one of a fixed set.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.as_str()
    }

    /// Whether mentions of this type may ever be merged with each other.
    #[must_use]
    pub const fn is_mergeable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Parse an extraction label, mapping anything unrecognized to `Unknown`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PERSON" => Ok(Self::Person),
            "ORGANIZATION" | "ORGANISATION" => Ok(Self::Organization),
            "LOCATION" => Ok(Self::Location),
            "EVENT" => Ok(Self::Event),
            "CONCEPT" => Ok(Self::Concept),
            "TIME" => Ok(Self::Time),
            "ARTIFACT" => Ok(Self::Artifact),
            "SENTIMENT" => Ok(Self::Sentiment),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(crate::Error::InvalidEntityType(s.to_string())),
        }
    }
}

/// One extraction of an entity from one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub mention_id: String,
    pub article_id: String,
    pub entity_type: EntityType,
    pub surface_text: String,
    pub normalized_text: String,
    pub confidence: f64,
    pub source: String,
}

impl EntityMention {
    #[must_use]
    pub fn new(
        mention_id: impl Into<String>,
        article_id: impl Into<String>,
        entity_type: EntityType,
        surface_text: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let article_id = article_id.into();
        let surface_text = surface_text.into();
        Self {
            mention_id: mention_id.into(),
            source: article_id.clone(),
            article_id,
            normalized_text: normalize(entity_type, &surface_text),
            entity_type,
            surface_text,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Normalize from an extractor-provided canonical form instead of the
    /// surface text (e.g. `1915-04-05` for "5. April 1915").
    #[must_use]
    pub fn normalized_from(mut self, hint: &str) -> Self {
        let normalized = normalize(self.entity_type, hint);
        if !normalized.is_empty() {
            self.normalized_text = normalized;
        }
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialAttributes {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub display_name: Option<String>,
    pub location_type: Option<String>,
    pub importance: Option<f64>,
    pub osm_id: Option<String>,
    pub bounding_box: Option<BoundingBox>,
}

impl SpatialAttributes {
    #[must_use]
    pub const fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Precision {
    Day,
    Month,
    Year,
    Range,
    Unknown,
}

impl Precision {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Month => "MONTH",
            Self::Year => "YEAR",
            Self::Range => "RANGE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeType {
    Point,
    Period,
    Unknown,
}

impl TimeType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "POINT",
            Self::Period => "PERIOD",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalAttributes {
    pub precision: Precision,
    pub time_type: TimeType,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub date_reliability: f64,
}

impl TemporalAttributes {
    /// Build a dated span. The endpoints are reordered if necessary so that
    /// `start_date <= end_date` always holds.
    #[must_use]
    pub fn span(
        precision: Precision,
        time_type: TimeType,
        start: NaiveDate,
        end: NaiveDate,
        date_reliability: f64,
    ) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        Self {
            precision,
            time_type,
            start_date: Some(start),
            end_date: Some(end),
            date_reliability: date_reliability.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub const fn has_dates(&self) -> bool {
        self.start_date.is_some()
    }
}

/// Type-specific payload of a canonical entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Attributes {
    #[default]
    None,
    Spatial(SpatialAttributes),
    Temporal(TemporalAttributes),
}

/// The merged representation of every mention judged to denote one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub entity_id: Uuid,
    pub entity_type: EntityType,
    pub text: String,
    pub normalized: String,
    pub confidence: f64,
    pub sources: BTreeSet<String>,
    pub mention_ids: BTreeSet<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl CanonicalEntity {
    /// Open a new cluster record from its first mention. The id is assigned
    /// by [`CanonicalEntity::freeze`].
    #[must_use]
    pub fn from_mention(mention: &EntityMention) -> Self {
        Self {
            entity_id: Uuid::nil(),
            entity_type: mention.entity_type,
            text: mention.surface_text.clone(),
            normalized: mention.normalized_text.clone(),
            confidence: mention.confidence,
            sources: BTreeSet::from([mention.source.clone()]),
            mention_ids: BTreeSet::from([mention.mention_id.clone()]),
            attributes: Attributes::None,
        }
    }

    /// Merge a further mention of the same cluster.
    ///
    /// The representative is the highest-confidence mention; ties go to the
    /// lexicographically smallest normalized text. Callers guarantee the
    /// types match.
    #[allow(clippy::float_cmp)]
    pub fn absorb(&mut self, mention: &EntityMention) {
        debug_assert_eq!(self.entity_type, mention.entity_type);

        let replaces = mention.confidence > self.confidence
            || (mention.confidence == self.confidence
                && mention.normalized_text < self.normalized);

        if replaces {
            self.text.clone_from(&mention.surface_text);
            self.normalized.clone_from(&mention.normalized_text);
            self.confidence = mention.confidence;
        }

        self.sources.insert(mention.source.clone());
        self.mention_ids.insert(mention.mention_id.clone());
    }

    /// Assign the run-stable id once every mention has been absorbed.
    #[must_use]
    pub fn freeze(mut self) -> Self {
        let anchor = self.mention_ids.iter().next().map_or("", String::as_str);
        let key = format!("{}|{}|{}", self.entity_type, self.normalized, anchor);
        self.entity_id = Uuid::new_v5(&ENTITY_NAMESPACE, key.as_bytes());
        self
    }

    #[must_use]
    pub fn sources_joined(&self, delimiter: &str) -> String {
        self.sources
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(delimiter)
    }

    #[must_use]
    pub const fn spatial(&self) -> Option<&SpatialAttributes> {
        match &self.attributes {
            Attributes::Spatial(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn temporal(&self) -> Option<&TemporalAttributes> {
        match &self.attributes {
            Attributes::Temporal(t) => Some(t),
            _ => None,
        }
    }

    /// Returns `false` and leaves the entity untouched unless it is a LOCATION.
    pub fn attach_spatial(&mut self, spatial: SpatialAttributes) -> bool {
        if self.entity_type != EntityType::Location {
            return false;
        }
        self.attributes = Attributes::Spatial(spatial);
        true
    }

    /// Returns `false` and leaves the entity untouched unless it is a TIME.
    pub fn attach_temporal(&mut self, temporal: TemporalAttributes) -> bool {
        if self.entity_type != EntityType::Time {
            return false;
        }
        self.attributes = Attributes::Temporal(temporal);
        true
    }
}

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::entity::{EntityMention, EntityType};
use crate::relationship::RelationMention;
use crate::report::{
    MalformedMention, MalformedReason, MalformedRelation, RelationDefect, SkippedFile,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid extraction JSON in {path}: {source}")]
    InvalidJson {
        path: String,
        source: serde_json::Error,
    },
    #[error("Unsupported extraction layout in {0}: expected an article object or a map of articles")]
    UnsupportedLayout(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Entity record as emitted by the extraction step. Every field is optional
/// here, and text fields of the wrong JSON type read as absent, so that the
/// record is reported for what it lacks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntity {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "text_only")]
    pub entity_type: Option<String>,
    #[serde(default, deserialize_with = "text_only")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "text_only")]
    pub normalized: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRelation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "text_only")]
    pub predicate: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub object: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub context_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub context_location: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// One article's records, kept as raw JSON so each converts on its own.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleExtraction {
    #[serde(default)]
    pub entities: Vec<Value>,
    #[serde(default)]
    pub relations: Vec<Value>,
}

/// Accepts ids written as strings or bare numbers.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn text_only<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Mentions and relations of a whole corpus, with article-scoped ids.
#[derive(Debug, Clone, Default)]
pub struct ExtractionBatch {
    pub mentions: Vec<EntityMention>,
    pub relations: Vec<RelationMention>,
    pub malformed_mentions: Vec<MalformedMention>,
    pub malformed_relations: Vec<MalformedRelation>,
    pub skipped_files: Vec<SkippedFile>,
    seen_mentions: HashSet<String>,
}

impl ExtractionBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn article_count(&self) -> usize {
        self.mentions
            .iter()
            .map(|m| m.article_id.as_str())
            .chain(self.relations.iter().map(|r| r.source.as_str()))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Adds a mention unless its id was already taken, in which case the
    /// duplicate is reported as malformed.
    pub fn push_mention(&mut self, mention: EntityMention) {
        if self.seen_mentions.insert(mention.mention_id.clone()) {
            self.mentions.push(mention);
        } else {
            self.reject_mention(MalformedMention {
                mention_id: Some(mention.mention_id),
                article_id: mention.article_id,
                reason: MalformedReason::DuplicateId,
            });
        }
    }

    pub fn push_relation(&mut self, relation: RelationMention) {
        self.relations.push(relation);
    }

    fn reject_relation(&mut self, malformed: MalformedRelation) {
        tracing::warn!(
            article = %malformed.article_id,
            relation = %malformed.relation_id,
            "Excluding malformed relation: {}",
            malformed.reason
        );
        self.malformed_relations.push(malformed);
    }

    fn skip_file(&mut self, path: &Path, error: &IngestError) {
        tracing::warn!("Skipping {}: {error}", path.display());
        self.skipped_files.push(SkippedFile {
            path: path.display().to_string(),
            error: error.to_string(),
        });
    }

    fn reject_mention(&mut self, malformed: MalformedMention) {
        tracing::warn!(
            article = %malformed.article_id,
            mention = ?malformed.mention_id,
            "Excluding malformed mention: {}",
            malformed.reason
        );
        self.malformed_mentions.push(malformed);
    }

    pub fn merge(&mut self, other: Self) {
        for mention in other.mentions {
            self.push_mention(mention);
        }
        self.relations.extend(other.relations);
        self.malformed_mentions.extend(other.malformed_mentions);
        self.malformed_relations.extend(other.malformed_relations);
        self.skipped_files.extend(other.skipped_files);
    }
}

fn scoped_id(article_id: &str, local_id: &str) -> String {
    format!("{article_id}#{local_id}")
}

/// Convert one article's raw extraction into mentions and relations.
pub fn parse_article(article_id: &str, article: &ArticleExtraction, batch: &mut ExtractionBatch) {
    for (index, record) in article.entities.iter().enumerate() {
        let local_id = record_id(record).unwrap_or_else(|| format!("@{index}"));
        let mention_id = scoped_id(article_id, &local_id);

        let raw = match RawEntity::deserialize(record) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(mention = %mention_id, "Unreadable entity record: {e}");
                batch.reject_mention(MalformedMention {
                    mention_id: Some(mention_id),
                    article_id: article_id.to_string(),
                    reason: MalformedReason::InvalidRecord,
                });
                continue;
            }
        };

        let reason = match (&raw.entity_type, &raw.text, raw.confidence) {
            (None, _, _) => Some(MalformedReason::MissingType),
            (Some(t), _, _) if t.trim().is_empty() => Some(MalformedReason::MissingType),
            (_, None, _) => Some(MalformedReason::MissingText),
            (_, Some(text), _) if text.trim().is_empty() => Some(MalformedReason::MissingText),
            (_, _, Some(c)) if !c.is_finite() => Some(MalformedReason::InvalidConfidence),
            _ => None,
        };

        if let Some(reason) = reason {
            batch.reject_mention(MalformedMention {
                mention_id: Some(mention_id),
                article_id: article_id.to_string(),
                reason,
            });
            continue;
        }

        let (Some(type_label), Some(text)) = (&raw.entity_type, &raw.text) else {
            continue;
        };

        let entity_type = EntityType::from_label(type_label);
        if entity_type == EntityType::Unknown {
            tracing::debug!(mention = %mention_id, label = %type_label, "Unrecognized entity type");
        }

        let mut mention = EntityMention::new(
            mention_id,
            article_id,
            entity_type,
            text.trim(),
            raw.confidence.unwrap_or(0.0),
        );
        if let Some(hint) = raw.normalized.as_deref().filter(|h| !h.trim().is_empty()) {
            mention = mention.normalized_from(hint);
        }

        batch.push_mention(mention);
    }

    for (index, record) in article.relations.iter().enumerate() {
        let relation_id = scoped_id(article_id, &format!("R{index}"));

        let raw = match RawRelation::deserialize(record) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(relation = %relation_id, "Unreadable relation record: {e}");
                batch.reject_relation(MalformedRelation {
                    relation_id,
                    article_id: article_id.to_string(),
                    reason: RelationDefect::InvalidRecord,
                });
                continue;
            }
        };

        let Some(predicate) = raw.predicate.as_deref().map(str::trim).filter(|p| !p.is_empty())
        else {
            batch.reject_relation(MalformedRelation {
                relation_id,
                article_id: article_id.to_string(),
                reason: RelationDefect::MissingPredicate,
            });
            continue;
        };

        let reference = |local: &Option<String>| {
            local
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| scoped_id(article_id, id))
        };

        let mut relation = RelationMention::new(
            relation_id,
            reference(&raw.subject).unwrap_or_default(),
            predicate,
            reference(&raw.object).unwrap_or_default(),
            raw.confidence.filter(|c| c.is_finite()).unwrap_or(0.0),
            article_id,
        );
        if let Some(time) = reference(&raw.context_time) {
            relation = relation.with_time(time);
        }
        if let Some(location) = reference(&raw.context_location) {
            relation = relation.with_location(location);
        }

        batch.push_relation(relation);
    }
}

fn is_article(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.contains_key("entities") || o.contains_key("relations"))
}

/// Parse an extraction document.
///
/// Two layouts are accepted: a single article object, whose id is `prefix`,
/// or a map from article id to article object, whose ids are prefixed with
/// `prefix_` when a prefix is given.
pub fn parse_batch(
    json: &str,
    prefix: Option<&str>,
    origin: &str,
) -> IngestResult<ExtractionBatch> {
    let value: Value = serde_json::from_str(json).map_err(|source| IngestError::InvalidJson {
        path: origin.to_string(),
        source,
    })?;

    let into_article = |value: Value| {
        serde_json::from_value::<ArticleExtraction>(value).map_err(|source| {
            IngestError::InvalidJson {
                path: origin.to_string(),
                source,
            }
        })
    };

    let mut batch = ExtractionBatch::new();

    if is_article(&value) {
        let article = into_article(value)?;
        parse_article(prefix.unwrap_or(origin), &article, &mut batch);
        return Ok(batch);
    }

    let Value::Object(articles) = value else {
        return Err(IngestError::UnsupportedLayout(origin.to_string()));
    };

    for (article_id, article) in articles {
        if !article.is_object() {
            return Err(IngestError::UnsupportedLayout(origin.to_string()));
        }
        let article_id = match prefix {
            Some(prefix) => format!("{prefix}_{article_id}"),
            None => article_id,
        };
        let article = into_article(article)?;
        parse_article(&article_id, &article, &mut batch);
    }

    Ok(batch)
}

/// Read an extraction file, or every `.json` file of a directory in name
/// order. Articles from a directory are prefixed with their file stem.
///
/// A single file that cannot be read is an error. Inside a directory, such a
/// file is recorded in `skipped_files` and the others are still read.
pub async fn read_path(path: &Path) -> IngestResult<ExtractionBatch> {
    if !path.is_dir() {
        let content = tokio::fs::read_to_string(path).await?;
        let stem = file_stem(path);
        let origin = path.to_string_lossy();
        let single = serde_json::from_str::<Value>(&content)
            .map(|v| is_article(&v))
            .unwrap_or(false);
        let prefix = single.then_some(stem.as_str());
        return parse_batch(&content, prefix, &origin);
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file = entry.path();
        if file.is_file() && file.extension().is_some_and(|ext| ext == "json") {
            files.push(file);
        }
    }
    files.sort();

    let mut batch = ExtractionBatch::new();
    for file in files {
        let stem = file_stem(&file);
        let parsed = match tokio::fs::read_to_string(&file).await {
            Ok(content) => parse_batch(&content, Some(&stem), &file.to_string_lossy()),
            Err(e) => Err(IngestError::from(e)),
        };
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                batch.skip_file(&file, &e);
                continue;
            }
        };
        tracing::debug!(
            file = %file.display(),
            mentions = parsed.mentions.len(),
            relations = parsed.relations.len(),
            "Parsed extraction file"
        );
        batch.merge(parsed);
    }

    Ok(batch)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI: &str = r#"{
        "art1": {
            "entities": [
                {"id": "E1", "type": "PERSON", "text": "Wilhelm II.", "confidence": 0.9},
                {"id": "E2", "type": "LOCATION", "text": "Wien", "normalized": "Vienna", "confidence": 0.95},
                {"id": "E3", "type": "TIME", "text": "5. April 1915", "normalized": "1915-04-05", "confidence": 0.8},
                {"id": "E4", "text": "no type", "confidence": 0.5},
                {"id": 5, "type": "weapon", "text": "Dicke Bertha", "confidence": 0.6}
            ],
            "relations": [
                {"subject": "E1", "predicate": "visited", "object": "E2", "context_time": "E3", "confidence": 0.7},
                {"subject": "E1", "object": "E2", "confidence": 0.7}
            ]
        },
        "art2": {
            "entities": [{"id": "E1", "type": "person", "text": "Wilhelm 2", "confidence": 0.8}],
            "relations": []
        }
    }"#;

    #[test]
    fn test_parse_multi_article_document() {
        let batch = parse_batch(MULTI, None, "test").unwrap();

        assert_eq!(batch.mentions.len(), 5);
        assert_eq!(batch.malformed_mentions.len(), 1);
        assert_eq!(batch.malformed_mentions[0].reason, MalformedReason::MissingType);
        assert_eq!(batch.malformed_mentions[0].mention_id.as_deref(), Some("art1#E4"));

        let vienna = batch.mentions.iter().find(|m| m.mention_id == "art1#E2").unwrap();
        assert_eq!(vienna.surface_text, "Wien");
        assert_eq!(vienna.normalized_text, "vienna");

        let date = batch.mentions.iter().find(|m| m.mention_id == "art1#E3").unwrap();
        assert_eq!(date.normalized_text, "1915-04-05");

        let bertha = batch.mentions.iter().find(|m| m.mention_id == "art1#5").unwrap();
        assert_eq!(bertha.entity_type, EntityType::Unknown);

        let wilhelm = batch.mentions.iter().find(|m| m.mention_id == "art2#E1").unwrap();
        assert_eq!(wilhelm.entity_type, EntityType::Person);
        assert_eq!(wilhelm.source, "art2");
        assert_eq!(batch.article_count(), 2);
    }

    #[test]
    fn test_relations_are_scoped_and_contexts_kept() {
        let batch = parse_batch(MULTI, None, "test").unwrap();

        assert_eq!(batch.relations.len(), 1);
        assert_eq!(batch.malformed_relations.len(), 1);
        assert_eq!(batch.malformed_relations[0].relation_id, "art1#R1");
        assert_eq!(batch.malformed_relations[0].reason, RelationDefect::MissingPredicate);

        let visit = &batch.relations[0];
        assert_eq!(visit.relation_id, "art1#R0");
        assert_eq!(visit.subject_mention_id, "art1#E1");
        assert_eq!(visit.object_mention_id, "art1#E2");
        assert_eq!(visit.context_time_mention_id.as_deref(), Some("art1#E3"));
        assert_eq!(visit.context_location_mention_id, None);
    }

    #[test]
    fn test_single_article_uses_prefix() {
        let json = r#"{"entities": [{"id": "E1", "type": "EVENT", "text": "Battle of Ypres", "confidence": 0.9}]}"#;
        let batch = parse_batch(json, Some("NZZ_19150405"), "NZZ_19150405.json").unwrap();

        assert_eq!(batch.mentions[0].mention_id, "NZZ_19150405#E1");
        assert_eq!(batch.mentions[0].article_id, "NZZ_19150405");
    }

    #[test]
    fn test_duplicate_mention_ids_are_reported() {
        let json = r#"{"entities": [
            {"id": "E1", "type": "PERSON", "text": "Joffre", "confidence": 0.9},
            {"id": "E1", "type": "PERSON", "text": "Foch", "confidence": 0.9}
        ]}"#;
        let batch = parse_batch(json, Some("a"), "a.json").unwrap();

        assert_eq!(batch.mentions.len(), 1);
        assert_eq!(batch.mentions[0].surface_text, "Joffre");
        assert_eq!(batch.malformed_mentions[0].reason, MalformedReason::DuplicateId);
    }

    #[test]
    fn test_bad_records_do_not_reject_their_article() {
        let json = r#"{
            "art1": {
                "entities": [
                    {"id": "E1", "type": "PERSON", "text": "Joffre", "confidence": 0.9},
                    {"id": "E2", "type": "PERSON", "text": 42, "confidence": 0.9},
                    {"id": "E3", "type": "PERSON", "text": "Haig", "confidence": "high"},
                    "just a string"
                ],
                "relations": [
                    {"subject": "E1", "predicate": "met", "object": "E3", "confidence": "sure"},
                    {"subject": "E1", "predicate": "commanded", "object": "E1", "confidence": 0.8}
                ]
            },
            "art2": {
                "entities": [
                    {"id": "E1", "type": "PERSON", "text": "Foch", "confidence": 0.8},
                    {"id": "E2", "type": "LOCATION", "text": "Verdun", "confidence": 0.7}
                ]
            }
        }"#;
        let batch = parse_batch(json, None, "corpus.json").unwrap();

        let ids: Vec<&str> = batch.mentions.iter().map(|m| m.mention_id.as_str()).collect();
        assert_eq!(ids, vec!["art1#E1", "art2#E1", "art2#E2"]);

        let reasons: Vec<(Option<&str>, MalformedReason)> = batch
            .malformed_mentions
            .iter()
            .map(|m| (m.mention_id.as_deref(), m.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (Some("art1#E2"), MalformedReason::MissingText),
                (Some("art1#E3"), MalformedReason::InvalidRecord),
                (Some("art1#@3"), MalformedReason::InvalidRecord),
            ]
        );

        assert_eq!(batch.relations.len(), 1);
        assert_eq!(batch.relations[0].relation_id, "art1#R1");
        assert_eq!(batch.malformed_relations[0].relation_id, "art1#R0");
        assert_eq!(batch.malformed_relations[0].reason, RelationDefect::InvalidRecord);
    }

    #[test]
    fn test_unsupported_layout() {
        assert!(matches!(
            parse_batch("[1, 2]", None, "list.json"),
            Err(IngestError::UnsupportedLayout(_))
        ));
        assert!(matches!(
            parse_batch("not json", None, "broken.json"),
            Err(IngestError::InvalidJson { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_directory_prefixes_file_stems() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), MULTI).unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"entities": [{"id": "E1", "type": "LOCATION", "text": "Bern", "confidence": 0.9}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let batch = read_path(dir.path()).await.unwrap();

        assert_eq!(batch.mentions[0].mention_id, "a#E1");
        assert!(batch.mentions.iter().any(|m| m.mention_id == "b_art2#E1"));
        assert_eq!(batch.mentions.len(), 6);
        assert!(batch.skipped_files.is_empty());
    }

    #[tokio::test]
    async fn test_read_directory_skips_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), "{ truncated").unwrap();
        std::fs::write(dir.path().join("b.json"), "[1, 2]").unwrap();
        std::fs::write(dir.path().join("c.json"), MULTI).unwrap();

        let batch = read_path(dir.path()).await.unwrap();

        assert_eq!(batch.mentions.len(), 5);
        assert!(batch.mentions.iter().all(|m| m.article_id.starts_with("c_")));
        assert_eq!(batch.skipped_files.len(), 2);
        assert!(batch.skipped_files[0].path.ends_with("a.json"));
        assert!(batch.skipped_files[1].path.ends_with("b.json"));
    }

    #[tokio::test]
    async fn test_read_single_unparseable_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.json");
        std::fs::write(&file, "{ truncated").unwrap();

        assert!(matches!(
            read_path(&file).await,
            Err(IngestError::InvalidJson { .. })
        ));
    }
}

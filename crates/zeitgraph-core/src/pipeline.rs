use std::path::Path;

use crate::config::PipelineConfig;
use crate::enrich::Enricher;
use crate::entity::{CanonicalEntity, EntityMention};
use crate::error::Result;
use crate::export::{self, ExportBundle, ExportSummary};
use crate::ingest::{normalize_mention, ExtractionBatch};
use crate::reify::{Reification, Reifier};
use crate::relationship::RelationMention;
use crate::report::{EnrichmentFailure, IntegrationStats, RunReport};
use crate::resolve::{EntityResolver, MentionMap, Resolution};

/// Result of a full run, ready to hand to an exporter.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub bundle: ExportBundle,
    pub mention_map: MentionMap,
    pub report: RunReport,
}

/// The batch integration pipeline.
///
/// Stages run strictly in order and only read the previous stage's output.
/// Each stage is also exposed on its own so a caller can stop between them.
pub struct Pipeline {
    config: PipelineConfig,
    resolver: EntityResolver,
    enricher: Option<Enricher>,
}

impl Pipeline {
    /// A pipeline without enrichment. Attach one with [`Pipeline::with_enricher`].
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let resolver = EntityResolver::from_config(&config.resolver);
        Ok(Self {
            config,
            resolver,
            enricher: None,
        })
    }

    /// Build every stage from configuration, including the Nominatim
    /// enricher when enrichment is enabled.
    pub async fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let enricher = if config.enrichment.enabled {
            Some(Enricher::from_config(&config.enrichment).await?)
        } else {
            None
        };
        let mut pipeline = Self::new(config)?;
        pipeline.enricher = enricher;
        Ok(pipeline)
    }

    #[must_use]
    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: EntityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage 1.
    pub fn normalize(&self, mentions: &mut [EntityMention]) {
        for mention in mentions.iter_mut() {
            normalize_mention(mention);
        }
    }

    /// Stages 2 and 3.
    pub fn resolve(&self, mentions: &[EntityMention]) -> Result<Resolution> {
        self.resolver.resolve(mentions)
    }

    /// Stage 4. A no-op without an enricher.
    pub async fn enrich(&self, entities: &mut [CanonicalEntity]) -> Vec<EnrichmentFailure> {
        match &self.enricher {
            Some(enricher) => enricher.enrich(entities).await,
            None => {
                tracing::debug!("Enrichment disabled");
                Vec::new()
            }
        }
    }

    /// Stage 5.
    pub fn reify(&self, resolution: &Resolution, relations: &[RelationMention]) -> Reification {
        Reifier::new(&resolution.mention_map, &resolution.entities).reify(relations)
    }

    /// Stage 6.
    pub fn export(&self, output: &PipelineOutput, dir: impl AsRef<Path>) -> Result<ExportSummary> {
        export::write_csv_bundle(&output.bundle, dir, &self.config.export)
    }

    /// Run stages 1 to 5 over a parsed batch.
    pub async fn run(&self, batch: ExtractionBatch) -> Result<PipelineOutput> {
        let ExtractionBatch {
            mut mentions,
            relations,
            malformed_mentions,
            malformed_relations,
            skipped_files,
            ..
        } = batch;

        let mut report = RunReport {
            skipped_files,
            malformed_mentions,
            malformed_relations,
            ..RunReport::default()
        };

        self.normalize(&mut mentions);

        let mut resolution = self.resolve(&mentions)?;

        report.enrichment_failures = self.enrich(&mut resolution.entities).await;

        let reification = self.reify(&resolution, &relations);
        report.unresolved_references = reification.unresolved;
        report.dropped_contexts = reification.dropped_contexts;

        report.stats = IntegrationStats::compute(&resolution.entities, &reification.assertions);
        report.stats.log();

        Ok(PipelineOutput {
            bundle: ExportBundle::new(resolution.entities, reification.assertions),
            mention_map: resolution.mention_map,
            report,
        })
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::enrich::{GeocodeError, GeocodeResult, Geocoder, IsoDateResolver};
    use crate::entity::{EntityType, SpatialAttributes};
    use crate::ingest::parse_batch;

    struct OneCity;

    #[async_trait::async_trait]
    impl Geocoder for OneCity {
        async fn geocode(&self, query: &str) -> GeocodeResult<SpatialAttributes> {
            if query == "Wien" {
                Ok(SpatialAttributes {
                    latitude: Some(48.208),
                    longitude: Some(16.373),
                    ..SpatialAttributes::default()
                })
            } else {
                Err(GeocodeError::NotFound(query.to_string()))
            }
        }
    }

    const CORPUS: &str = r#"{
        "art1": {
            "entities": [
                {"id": "E1", "type": "PERSON", "text": "Wilhelm II.", "confidence": 0.9},
                {"id": "E2", "type": "LOCATION", "text": "Wien", "confidence": 0.95},
                {"id": "E3", "type": "TIME", "text": "April 1915", "normalized": "1915-04", "confidence": 0.8},
                {"id": "E4", "type": "LOCATION", "confidence": 0.5}
            ],
            "relations": [
                {"subject": "E1", "predicate": "visited", "object": "E2", "context_time": "E3", "context_location": "E2", "confidence": 0.7},
                {"subject": "E9", "predicate": "met", "object": "E1", "confidence": 0.6}
            ]
        },
        "art2": {
            "entities": [
                {"id": "E1", "type": "PERSON", "text": "Wilhelm II", "confidence": 0.8},
                {"id": "E2", "type": "LOCATION", "text": "Wien", "confidence": 0.7}
            ],
            "relations": [
                {"subject": "E1", "predicate": "left", "object": "E2", "context_time": "E7", "confidence": 0.9}
            ]
        }
    }"#;

    fn pipeline() -> Pipeline {
        let mut config = PipelineConfig::default();
        config.resolver.workers = Some(2);
        Pipeline::new(config)
            .unwrap()
            .with_enricher(Enricher::new(OneCity, IsoDateResolver::new()))
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let batch = parse_batch(CORPUS, None, "corpus.json").unwrap();
        let output = pipeline().run(batch).await.unwrap();
        let entities = &output.bundle.entities;

        // Wilhelm and Wien each merge across articles.
        assert_eq!(entities.len(), 3);
        let wilhelm = entities.iter().find(|e| e.entity_type == EntityType::Person).unwrap();
        assert_eq!(wilhelm.text, "Wilhelm II.");
        assert_eq!(wilhelm.sources.len(), 2);

        let wien = entities.iter().find(|e| e.entity_type == EntityType::Location).unwrap();
        assert!(wien.spatial().unwrap().has_coordinates());
        assert_eq!(wien.confidence, 0.95);

        let april = entities.iter().find(|e| e.entity_type == EntityType::Time).unwrap();
        assert!(april.temporal().unwrap().has_dates());

        assert_eq!(output.bundle.assertions.len(), 2);
        assert_eq!(output.report.unresolved_references.len(), 1);
        assert_eq!(output.report.unresolved_references[0].relation_id, "art1#R1");
        assert_eq!(output.report.dropped_contexts.len(), 1);
        assert_eq!(output.report.malformed_mentions.len(), 1);

        assert_eq!(output.report.stats.total_entities, 3);
        assert_eq!(output.report.stats.assertions_with_time, 1);
        assert_eq!(output.report.stats.assertions_with_location, 1);
        assert_eq!(output.mention_map.len(), 5);
    }

    #[tokio::test]
    async fn test_runs_are_deterministic() {
        let first = pipeline()
            .run(parse_batch(CORPUS, None, "corpus.json").unwrap())
            .await
            .unwrap();
        let second = pipeline()
            .run(parse_batch(CORPUS, None, "corpus.json").unwrap())
            .await
            .unwrap();

        assert_eq!(first.bundle, second.bundle);
    }

    #[tokio::test]
    async fn test_without_enricher_leaves_attributes_empty() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let output = pipeline
            .run(parse_batch(CORPUS, None, "corpus.json").unwrap())
            .await
            .unwrap();

        assert!(output.report.enrichment_failures.is_empty());
        assert_eq!(output.report.stats.locations_without_coordinates, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.resolver.merge_threshold = 1.5;
        assert!(Pipeline::new(config).is_err());
    }
}

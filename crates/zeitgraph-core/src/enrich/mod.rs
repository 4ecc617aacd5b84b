//! Spatial and temporal enrichment of canonical LOCATION and TIME entities.

mod cache;
mod geocode;
mod temporal;

pub use cache::{CacheError, CacheResult, LookupCache, MemoryCache, SqliteCache};
pub use geocode::{GeocodeError, GeocodeResult, Geocoder, NominatimGeocoder};
pub use temporal::{DateError, DateResolver, DateResult, IsoDateResolver};

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EnrichmentConfig;
use crate::entity::{Attributes, CanonicalEntity, EntityType, SpatialAttributes, TemporalAttributes};
use crate::error::Result;
use crate::report::{EnrichmentFailure, LookupKind};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Lookup {
    Geocode { query: String },
    Date { normalized: String, surface: String },
}

impl Lookup {
    fn for_entity(entity: &CanonicalEntity) -> Option<Self> {
        if entity.attributes != Attributes::None {
            return None;
        }
        match entity.entity_type {
            EntityType::Location => Some(Self::Geocode {
                query: entity.text.clone(),
            }),
            EntityType::Time => Some(Self::Date {
                normalized: entity.normalized.clone(),
                surface: entity.text.clone(),
            }),
            _ => None,
        }
    }

    const fn kind(&self) -> LookupKind {
        match self {
            Self::Geocode { .. } => LookupKind::Geocode,
            Self::Date { .. } => LookupKind::Date,
        }
    }

    fn key(&self) -> String {
        match self {
            Self::Geocode { query } => query.clone(),
            Self::Date { normalized, surface } => format!("{normalized}\u{1f}{surface}"),
        }
    }

    fn query(&self) -> &str {
        match self {
            Self::Geocode { query } => query,
            Self::Date {
                normalized,
                surface,
            } => {
                if normalized.is_empty() {
                    surface
                } else {
                    normalized
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Found {
    Spatial(SpatialAttributes),
    Temporal(TemporalAttributes),
}

struct Services {
    geocoder: Arc<dyn Geocoder>,
    dates: Arc<dyn DateResolver>,
    cache: Arc<dyn LookupCache>,
}

impl Services {
    /// Cached value if present, otherwise ask the service and cache a success.
    /// Cache trouble is logged and never fails the lookup.
    async fn run(&self, lookup: &Lookup) -> std::result::Result<Found, String> {
        let kind = lookup.kind();
        let key = lookup.key();

        match self.cache.get(kind, &key).await {
            Ok(Some(raw)) => match decode(kind, &raw) {
                Ok(found) => {
                    tracing::debug!(
                        kind = kind.as_str(),
                        key = %lookup.query(),
                        "Lookup cache hit"
                    );
                    return Ok(found);
                }
                Err(e) => tracing::warn!("Ignoring undecodable cache entry for {key:?}: {e}"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Lookup cache read failed: {e}"),
        }

        let found = match lookup {
            Lookup::Geocode { query } => self
                .geocoder
                .geocode(query)
                .await
                .map(Found::Spatial)
                .map_err(|e| e.to_string())?,
            Lookup::Date {
                normalized,
                surface,
            } => self
                .dates
                .resolve(normalized, surface)
                .await
                .map(Found::Temporal)
                .map_err(|e| e.to_string())?,
        };

        match encode(&found) {
            Ok(raw) => {
                if let Err(e) = self.cache.put(kind, &key, &raw).await {
                    tracing::warn!("Lookup cache write failed: {e}");
                }
            }
            Err(e) => tracing::warn!("Could not encode lookup result: {e}"),
        }

        Ok(found)
    }
}

fn encode(found: &Found) -> serde_json::Result<String> {
    match found {
        Found::Spatial(s) => serde_json::to_string(s),
        Found::Temporal(t) => serde_json::to_string(t),
    }
}

fn decode(kind: LookupKind, raw: &str) -> serde_json::Result<Found> {
    Ok(match kind {
        LookupKind::Geocode => Found::Spatial(serde_json::from_str(raw)?),
        LookupKind::Date => Found::Temporal(serde_json::from_str(raw)?),
    })
}

/// Attaches coordinates to LOCATION entities and date spans to TIME entities.
///
/// Each distinct lookup runs once, with at most `max_concurrent_lookups` in
/// flight. Entities that already carry attributes are skipped, so running the
/// enricher twice changes nothing.
pub struct Enricher {
    services: Arc<Services>,
    max_concurrent_lookups: usize,
}

impl Enricher {
    #[must_use]
    pub fn new(geocoder: impl Geocoder + 'static, dates: impl DateResolver + 'static) -> Self {
        Self {
            services: Arc::new(Services {
                geocoder: Arc::new(geocoder),
                dates: Arc::new(dates),
                cache: Arc::new(MemoryCache::new()),
            }),
            max_concurrent_lookups: 4,
        }
    }

    /// Nominatim and ISO date resolution, with a sqlite cache when
    /// `cache_path` is set.
    pub async fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let geocoder = NominatimGeocoder::new(&config.geocoder)?;
        let enricher = Self::new(geocoder, IsoDateResolver::new())
            .with_max_concurrent_lookups(config.max_concurrent_lookups);

        Ok(match &config.cache_path {
            Some(path) => {
                tracing::info!("Using lookup cache at {}", path.display());
                enricher.with_cache(SqliteCache::open(path).await?)
            }
            None => enricher,
        })
    }

    #[must_use]
    pub fn with_cache(self, cache: impl LookupCache + 'static) -> Self {
        self.with_shared_cache(Arc::new(cache))
    }

    #[must_use]
    pub fn with_shared_cache(self, cache: Arc<dyn LookupCache>) -> Self {
        let services = Services {
            geocoder: self.services.geocoder.clone(),
            dates: self.services.dates.clone(),
            cache,
        };
        Self {
            services: Arc::new(services),
            ..self
        }
    }

    #[must_use]
    pub fn with_max_concurrent_lookups(mut self, limit: usize) -> Self {
        self.max_concurrent_lookups = limit.max(1);
        self
    }

    /// Enrich in place and return every failed lookup, one per affected entity.
    pub async fn enrich(&self, entities: &mut [CanonicalEntity]) -> Vec<EnrichmentFailure> {
        let mut pending: BTreeMap<Lookup, Vec<usize>> = BTreeMap::new();
        for (index, entity) in entities.iter().enumerate() {
            if let Some(lookup) = Lookup::for_entity(entity) {
                pending.entry(lookup).or_default().push(index);
            }
        }
        if pending.is_empty() {
            return Vec::new();
        }

        tracing::info!(
            lookups = pending.len(),
            limit = self.max_concurrent_lookups,
            "Enriching entities"
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrent_lookups));
        let mut tasks = JoinSet::new();
        for (lookup, targets) in pending {
            let permits = permits.clone();
            let services = self.services.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                // The lookup runs in its own task so a panicking service still
                // yields a failure for every target.
                let job = lookup.clone();
                let outcome = tokio::spawn(async move { services.run(&job).await })
                    .await
                    .unwrap_or_else(|e| Err(format!("lookup task failed: {e}")));
                (lookup, targets, outcome)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (lookup, targets, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!("Lookup task failed: {e}");
                    continue;
                }
            };

            match outcome {
                Ok(found) => {
                    for index in targets {
                        let entity = &mut entities[index];
                        match &found {
                            Found::Spatial(s) => entity.attach_spatial(s.clone()),
                            Found::Temporal(t) => entity.attach_temporal(t.clone()),
                        };
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        kind = lookup.kind().as_str(),
                        query = %lookup.query(),
                        "Lookup failed: {error}"
                    );
                    failures.extend(targets.into_iter().map(|index| EnrichmentFailure {
                        entity_id: entities[index].entity_id,
                        kind: lookup.kind(),
                        query: lookup.query().to_string(),
                        error: error.clone(),
                    }));
                }
            }
        }

        failures.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityMention;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    /// Knows a fixed set of places and counts how often it is asked.
    #[derive(Default)]
    struct FakeGeocoder {
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, query: &str) -> GeocodeResult<SpatialAttributes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match query {
                "Atlantis" => Err(GeocodeError::NotFound(query.to_string())),
                _ => Ok(SpatialAttributes {
                    latitude: Some(48.2),
                    longitude: Some(16.37),
                    display_name: Some(format!("{query}, Europe")),
                    ..SpatialAttributes::default()
                }),
            }
        }
    }

    fn entity(id: &str, entity_type: EntityType, text: &str) -> CanonicalEntity {
        CanonicalEntity::from_mention(&EntityMention::new(id, "a", entity_type, text, 0.9)).freeze()
    }

    fn corpus() -> Vec<CanonicalEntity> {
        vec![
            entity("a#1", EntityType::Location, "Vienna"),
            entity("a#2", EntityType::Location, "Atlantis"),
            entity("a#3", EntityType::Time, "1915-04-05"),
            entity("a#4", EntityType::Time, "gestern"),
            entity("a#5", EntityType::Person, "Vienna"),
            entity("b#1", EntityType::Location, "Vienna"),
        ]
    }

    #[tokio::test]
    async fn test_enrich_attaches_and_reports() {
        let geocoder = FakeGeocoder::default();
        let calls = geocoder.calls.clone();
        let enricher = Enricher::new(geocoder, IsoDateResolver::new());

        let mut entities = corpus();
        let failures = enricher.enrich(&mut entities).await;

        assert!(entities[0].spatial().unwrap().has_coordinates());
        assert!(entities[5].spatial().unwrap().has_coordinates());
        assert_eq!(entities[1].attributes, Attributes::None);
        assert!(entities[2].temporal().unwrap().has_dates());
        assert_eq!(entities[3].attributes, Attributes::None);
        assert_eq!(entities[4].attributes, Attributes::None);

        // Both Vienna entities share one lookup.
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(failures.len(), 2);
        let kinds: Vec<LookupKind> = {
            let mut k: Vec<_> = failures.iter().map(|f| f.kind).collect();
            k.sort_by_key(LookupKind::as_str);
            k
        };
        assert_eq!(kinds, vec![LookupKind::Date, LookupKind::Geocode]);
    }

    #[tokio::test]
    async fn test_enrich_is_idempotent() {
        let geocoder = FakeGeocoder::default();
        let calls = geocoder.calls.clone();
        let enricher = Enricher::new(geocoder, IsoDateResolver::new());

        let mut entities = corpus();
        enricher.enrich(&mut entities).await;
        let first = entities.clone();
        let calls_after_first = calls.load(Ordering::SeqCst);

        enricher.enrich(&mut entities).await;
        assert_eq!(entities, first);
        // Only the failed lookup is retried; successes were attached and cached.
        assert_eq!(calls.load(Ordering::SeqCst), calls_after_first + 1);
    }

    #[tokio::test]
    async fn test_cache_skips_service() {
        let cache: Arc<dyn LookupCache> = Arc::new(SqliteCache::open_memory().await.unwrap());

        let first = FakeGeocoder::default();
        Enricher::new(first, IsoDateResolver::new())
            .with_shared_cache(cache.clone())
            .enrich(&mut corpus())
            .await;

        let second = FakeGeocoder::default();
        let calls = second.calls.clone();
        let mut entities = corpus();
        Enricher::new(second, IsoDateResolver::new())
            .with_shared_cache(cache)
            .enrich(&mut entities)
            .await;

        // Vienna came from the cache; Atlantis failed before and is asked again.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(entities[0].spatial().unwrap().has_coordinates());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let geocoder = FakeGeocoder::default();
        let peak = geocoder.peak.clone();
        let enricher = Enricher::new(geocoder, IsoDateResolver::new()).with_max_concurrent_lookups(2);

        let mut entities: Vec<CanonicalEntity> = (0..10)
            .map(|i| entity(&format!("a#{i}"), EntityType::Location, &format!("Place {i}")))
            .collect();
        let failures = enricher.enrich(&mut entities).await;

        assert!(failures.is_empty());
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(entities.iter().all(|e| e.spatial().is_some()));
    }

    /// Panics on one query and answers the rest.
    struct Volatile;

    #[async_trait::async_trait]
    impl Geocoder for Volatile {
        async fn geocode(&self, query: &str) -> GeocodeResult<SpatialAttributes> {
            assert_ne!(query, "Krakatoa", "geocoder crashed");
            Ok(SpatialAttributes {
                latitude: Some(46.95),
                longitude: Some(7.44),
                ..SpatialAttributes::default()
            })
        }
    }

    #[tokio::test]
    async fn test_panicking_lookup_is_reported() {
        let enricher = Enricher::new(Volatile, IsoDateResolver::new());
        let mut entities = vec![
            entity("a#1", EntityType::Location, "Krakatoa"),
            entity("a#2", EntityType::Location, "Bern"),
            entity("b#1", EntityType::Location, "Krakatoa"),
        ];

        let failures = enricher.enrich(&mut entities).await;

        assert!(entities[1].spatial().unwrap().has_coordinates());
        assert_eq!(entities[0].attributes, Attributes::None);

        let mut expected = vec![entities[0].entity_id, entities[2].entity_id];
        expected.sort();
        let reported: Vec<Uuid> = failures.iter().map(|f| f.entity_id).collect();
        assert_eq!(reported, expected);
        assert!(failures.iter().all(|f| f.kind == LookupKind::Geocode && f.query == "Krakatoa"));
        assert!(failures[0].error.contains("lookup task failed"));
    }
}

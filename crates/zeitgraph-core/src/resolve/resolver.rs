use std::collections::{BTreeMap, HashMap};

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blocking::BlockingStrategy;
use super::similarity::{FuzzyMatch, Similarity};
use crate::config::ResolverConfig;
use crate::entity::{CanonicalEntity, EntityMention};
use crate::error::{Error, Result};

/// Lookup from a mention id to the canonical entity it was merged into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionMap(BTreeMap<String, Uuid>);

impl MentionMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mention_id: impl Into<String>, entity_id: Uuid) {
        self.0.insert(mention_id.into(), entity_id);
    }

    pub fn get(&self, mention_id: &str) -> Option<Uuid> {
        self.0.get(mention_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Uuid)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Ordered by the smallest mention id in each cluster.
    pub entities: Vec<CanonicalEntity>,
    pub mention_map: MentionMap,
}

pub struct EntityResolver {
    similarity: Box<dyn Similarity>,
    merge_threshold: f64,
    blocking: BlockingStrategy,
    workers: usize,
}

impl EntityResolver {
    #[must_use]
    pub fn new(similarity: impl Similarity + 'static, merge_threshold: f64) -> Self {
        Self {
            similarity: Box::new(similarity),
            merge_threshold,
            blocking: BlockingStrategy::default(),
            workers: 1,
        }
    }

    #[must_use]
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(FuzzyMatch::new(config.metric), config.merge_threshold)
            .with_blocking(config.blocking)
            .with_workers(config.worker_count())
    }

    #[must_use]
    pub const fn with_blocking(mut self, blocking: BlockingStrategy) -> Self {
        self.blocking = blocking;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Cluster mentions and build one canonical entity per cluster.
    ///
    /// The result does not depend on input order or worker count.
    pub fn resolve(&self, mentions: &[EntityMention]) -> Result<Resolution> {
        let mut mentions = mentions.to_vec();
        mentions.sort_by(|a, b| a.mention_id.cmp(&b.mention_id));

        let blocks = self.blocking.blocks(&mentions);
        let pairs = self.candidate_pairs(&mentions, &blocks);
        tracing::debug!(
            mentions = mentions.len(),
            blocks = blocks.len(),
            candidates = pairs.len(),
            "Scored mention pairs"
        );

        let sets = cluster(&mentions, &pairs)?;
        let resolution = canonicalize(&mentions, &sets);

        tracing::info!(
            mentions = mentions.len(),
            entities = resolution.entities.len(),
            "Resolved entities"
        );
        Ok(resolution)
    }

    /// Score every within-block pair on scoped threads and keep those at or
    /// above the threshold. Pairs are returned sorted.
    fn candidate_pairs(
        &self,
        mentions: &[EntityMention],
        blocks: &[Vec<usize>],
    ) -> Vec<(usize, usize)> {
        let rows: Vec<(&[usize], usize)> = blocks
            .iter()
            .flat_map(|block| (0..block.len() - 1).map(move |pos| (block.as_slice(), pos)))
            .collect();
        if rows.is_empty() {
            return Vec::new();
        }

        let chunk_size = rows.len().div_ceil(self.workers);
        let mut pairs: Vec<(usize, usize)> = std::thread::scope(|scope| {
            let handles: Vec<_> = rows
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        let mut found = Vec::new();
                        for &(block, pos) in chunk {
                            let left = block[pos];
                            for &right in &block[pos + 1..] {
                                let score =
                                    self.similarity.score(&mentions[left], &mentions[right]);
                                if score >= self.merge_threshold {
                                    found.push((left, right));
                                }
                            }
                        }
                        found
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        });

        pairs.sort_unstable();
        pairs
    }
}

/// Union every candidate pair. Each union re-checks that both sides share a
/// type; a mismatch means blocking or similarity is broken and the run stops.
fn cluster(mentions: &[EntityMention], pairs: &[(usize, usize)]) -> Result<UnionFind<usize>> {
    let mut sets = UnionFind::new(mentions.len());

    for &(left, right) in pairs {
        let (a, b) = (&mentions[left], &mentions[right]);
        if a.entity_type != b.entity_type {
            return Err(Error::TypeMismatchMerge {
                left_mention: a.mention_id.clone(),
                left_type: a.entity_type,
                right_mention: b.mention_id.clone(),
                right_type: b.entity_type,
            });
        }
        if sets.union(left, right) {
            tracing::debug!(left = %a.mention_id, right = %b.mention_id, "Merged mentions");
        }
    }

    Ok(sets)
}

fn canonicalize(mentions: &[EntityMention], sets: &UnionFind<usize>) -> Resolution {
    let mut cluster_of_root: HashMap<usize, usize> = HashMap::new();
    let mut clusters: Vec<CanonicalEntity> = Vec::new();

    for (index, mention) in mentions.iter().enumerate() {
        let root = sets.find(index);
        match cluster_of_root.get(&root) {
            Some(&cluster) => clusters[cluster].absorb(mention),
            None => {
                cluster_of_root.insert(root, clusters.len());
                clusters.push(CanonicalEntity::from_mention(mention));
            }
        }
    }

    let entities: Vec<CanonicalEntity> =
        clusters.into_iter().map(CanonicalEntity::freeze).collect();

    let mut mention_map = MentionMap::new();
    for entity in &entities {
        for mention_id in &entity.mention_ids {
            mention_map.insert(mention_id.clone(), entity.entity_id);
        }
    }

    Resolution {
        entities,
        mention_map,
    }
}

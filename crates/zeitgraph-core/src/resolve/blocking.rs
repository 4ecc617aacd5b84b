use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityMention, EntityType};

/// How mentions are partitioned before pairwise comparison. Mentions in
/// different blocks are never compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingStrategy {
    #[default]
    TypeOnly,
    /// Type plus the first normalized token. Faster, but misses merges like
    /// "kaiser wilhelm" / "wilhelm ii".
    FirstToken,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct BlockKey {
    entity_type: EntityType,
    token: Option<String>,
}

impl BlockingStrategy {
    /// Group mention indices into blocks. UNKNOWN mentions are left out
    /// entirely since they never merge. Indices stay ascending within a block.
    #[must_use]
    pub fn blocks(&self, mentions: &[EntityMention]) -> Vec<Vec<usize>> {
        let mut blocks: BTreeMap<BlockKey, Vec<usize>> = BTreeMap::new();

        for (index, mention) in mentions.iter().enumerate() {
            if !mention.entity_type.is_mergeable() {
                continue;
            }
            let token = match self {
                Self::TypeOnly => None,
                Self::FirstToken => mention
                    .normalized_text
                    .split_whitespace()
                    .next()
                    .map(str::to_string),
            };
            blocks
                .entry(BlockKey {
                    entity_type: mention.entity_type,
                    token,
                })
                .or_default()
                .push(index);
        }

        blocks.into_values().filter(|block| block.len() > 1).collect()
    }
}

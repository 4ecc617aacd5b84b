use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entity::EntityMention;

/// String metric used for partial matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzyMetric {
    #[default]
    SorensenDice,
    Levenshtein,
    JaroWinkler,
}

impl FuzzyMetric {
    #[must_use]
    pub fn compare(&self, a: &str, b: &str) -> f64 {
        match self {
            Self::SorensenDice => strsim::sorensen_dice(a, b),
            Self::Levenshtein => strsim::normalized_levenshtein(a, b),
            Self::JaroWinkler => strsim::jaro_winkler(a, b),
        }
    }
}

/// Pairwise mention similarity in `[0, 1]`.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &EntityMention, b: &EntityMention) -> f64;
}

/// Mentions with different types, or any UNKNOWN mention, can never merge.
fn comparable(a: &EntityMention, b: &EntityMention) -> bool {
    a.entity_type == b.entity_type && a.entity_type.is_mergeable()
}

/// Only identical normalized text matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl Similarity for ExactMatch {
    fn score(&self, a: &EntityMention, b: &EntityMention) -> f64 {
        if comparable(a, b) && a.normalized_text == b.normalized_text {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyMatch {
    metric: FuzzyMetric,
}

impl FuzzyMatch {
    #[must_use]
    pub const fn new(metric: FuzzyMetric) -> Self {
        Self { metric }
    }

    /// Shared tokens over all distinct tokens.
    fn token_overlap(a: &str, b: &str) -> f64 {
        let left: BTreeSet<&str> = a.split_whitespace().collect();
        let right: BTreeSet<&str> = b.split_whitespace().collect();
        let union = left.union(&right).count();
        if union == 0 {
            return 0.0;
        }
        left.intersection(&right).count() as f64 / union as f64
    }
}

impl Similarity for FuzzyMatch {
    fn score(&self, a: &EntityMention, b: &EntityMention) -> f64 {
        if !comparable(a, b) {
            return 0.0;
        }

        let (left, right) = (a.normalized_text.as_str(), b.normalized_text.as_str());
        if left == right {
            return 1.0;
        }

        self.metric
            .compare(left, right)
            .max(Self::token_overlap(left, right))
            .clamp(0.0, 1.0)
    }
}

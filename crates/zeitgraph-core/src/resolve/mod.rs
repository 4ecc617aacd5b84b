//! Entity resolution: blocking, pairwise similarity, and union-find
//! clustering into canonical entities.

mod blocking;
mod resolver;
mod similarity;

pub use blocking::BlockingStrategy;
pub use resolver::{EntityResolver, MentionMap, Resolution};
pub use similarity::{ExactMatch, FuzzyMatch, FuzzyMetric, Similarity};

mod normalizer;
mod parser;

pub use normalizer::{normalize, normalize_mention};
pub use parser::{
    parse_article, parse_batch, read_path, ArticleExtraction, ExtractionBatch, IngestError,
    IngestResult, RawEntity, RawRelation,
};

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod enrich;
pub mod entity;
pub mod error;
pub mod export;
pub mod ingest;
pub mod pipeline;
pub mod reify;
pub mod relationship;
pub mod report;
pub mod resolve;

pub use config::{
    ConfigError, EnrichmentConfig, ExportConfig, GeocoderConfig, GraphStoreConfig, PipelineConfig,
    ResolverConfig,
};
pub use entity::{
    Attributes, BoundingBox, CanonicalEntity, EntityMention, EntityType, Precision,
    SpatialAttributes, TemporalAttributes, TimeType,
};
pub use enrich::Enricher;
pub use error::{Error, Result};
pub use export::{ExportBundle, ExportSummary, GraphSchema};
pub use pipeline::{Pipeline, PipelineOutput};
pub use reify::{Reification, Reifier};
pub use relationship::{Assertion, AssertionEdge, EdgeKind, RelationMention};
pub use report::{IntegrationStats, RunReport};
pub use resolve::{EntityResolver, MentionMap, Resolution};

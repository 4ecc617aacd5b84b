use thiserror::Error;

use crate::config::ConfigError;
use crate::enrich::{CacheError, DateError, GeocodeError};
use crate::entity::EntityType;
use crate::export::ExportError;
use crate::ingest::IngestError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error(
        "Type mismatch merge: {left_mention} ({left_type}) cannot merge with {right_mention} ({right_type})"
    )]
    TypeMismatchMerge {
        left_mention: String,
        left_type: EntityType,
        right_mention: String,
        right_type: EntityType,
    },

    #[error("Export schema violation: duplicate {kind} id {id}")]
    ExportSchemaViolation { kind: &'static str, id: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Geocoding error: {0}")]
    Geocode(#[from] GeocodeError),

    #[error("Date resolution error: {0}")]
    Date(#[from] DateError),

    #[error("Lookup cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Structural violations of the pipeline's own invariants, as opposed to
    /// bad input or an unavailable collaborator.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatchMerge { .. } | Self::ExportSchemaViolation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

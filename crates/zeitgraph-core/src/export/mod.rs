//! Graph export: bulk-load CSV streams, schema statements, JSON snapshots
//! and, with the `neo4j` feature, a direct loader.

pub mod csv;
#[cfg(feature = "neo4j")]
mod neo4j;
mod schema;

#[cfg(feature = "neo4j")]
pub use neo4j::{GraphStore, Neo4jStore};
pub use schema::GraphSchema;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ExportConfig;
use crate::entity::CanonicalEntity;
use crate::error::{Error, Result};
use crate::relationship::{Assertion, AssertionEdge};
use self::csv::CsvWriter;

pub const ENTITIES_FILE: &str = "entities.csv";
pub const LOCATIONS_FILE: &str = "locations.csv";
pub const TIMEPERIODS_FILE: &str = "timeperiods.csv";
pub const RELATIONS_FILE: &str = "relations.csv";
pub const SCHEMA_FILE: &str = "schema.cypher";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[cfg(feature = "neo4j")]
    #[error("Graph store error: {0}")]
    GraphStore(#[from] neo4rs::Error),
}

/// Everything a run hands to a sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub entities: Vec<CanonicalEntity>,
    pub assertions: Vec<Assertion>,
}

impl ExportBundle {
    #[must_use]
    pub const fn new(entities: Vec<CanonicalEntity>, assertions: Vec<Assertion>) -> Self {
        Self {
            entities,
            assertions,
        }
    }

    /// Entity and assertion ids must each be unique before anything is
    /// written; a duplicate aborts the export.
    pub fn validate(&self) -> Result<()> {
        let mut entity_ids = HashSet::new();
        for entity in &self.entities {
            if !entity_ids.insert(entity.entity_id) {
                return Err(Error::ExportSchemaViolation {
                    kind: "entity",
                    id: entity.entity_id.to_string(),
                });
            }
        }

        let mut assertion_ids = HashSet::new();
        for assertion in &self.assertions {
            if !assertion_ids.insert(assertion.assertion_id.as_str()) {
                return Err(Error::ExportSchemaViolation {
                    kind: "assertion",
                    id: assertion.assertion_id.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn edges(&self) -> impl Iterator<Item = AssertionEdge> + '_ {
        self.assertions.iter().flat_map(Assertion::edges)
    }
}

/// Row counts of a written CSV bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub entities: usize,
    pub locations: usize,
    pub timeperiods: usize,
    pub relations: usize,
}

fn create(path: &Path) -> Result<CsvWriter<BufWriter<File>>> {
    let file = File::create(path).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(CsvWriter::new(BufWriter::new(file)))
}

fn finish(out: CsvWriter<BufWriter<File>>, path: &Path) -> Result<()> {
    out.into_inner().flush().map_err(|source| {
        ExportError::Write {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Validate, then write the schema statements and the four CSV streams
/// into `dir`.
pub fn write_csv_bundle(
    bundle: &ExportBundle,
    dir: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<ExportSummary> {
    bundle.validate()?;

    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|source| ExportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let wrap = |path: &Path| {
        let path = path.to_path_buf();
        move |source| Error::from(ExportError::Write { path, source })
    };
    let path = dir.join(SCHEMA_FILE);
    std::fs::write(&path, GraphSchema::new().to_string()).map_err(wrap(&path))?;

    let delimiter = config.sources_delimiter.as_str();
    let mut summary = ExportSummary::default();

    let path = dir.join(ENTITIES_FILE);
    let mut out = create(&path)?;
    summary.entities =
        csv::write_entities(&mut out, &bundle.entities, delimiter).map_err(wrap(&path))?;
    finish(out, &path)?;

    let path = dir.join(LOCATIONS_FILE);
    let mut out = create(&path)?;
    summary.locations = csv::write_locations(&mut out, &bundle.entities).map_err(wrap(&path))?;
    finish(out, &path)?;

    let path = dir.join(TIMEPERIODS_FILE);
    let mut out = create(&path)?;
    summary.timeperiods =
        csv::write_timeperiods(&mut out, &bundle.entities).map_err(wrap(&path))?;
    finish(out, &path)?;

    let path = dir.join(RELATIONS_FILE);
    let mut out = create(&path)?;
    summary.relations =
        csv::write_relations(&mut out, &bundle.assertions, delimiter).map_err(wrap(&path))?;
    finish(out, &path)?;

    tracing::info!(
        entities = summary.entities,
        locations = summary.locations,
        timeperiods = summary.timeperiods,
        relations = summary.relations,
        "Wrote CSV bundle to {}",
        dir.display()
    );
    Ok(summary)
}

/// Validate, then write `{entities, assertions}` as pretty JSON.
pub fn write_json(bundle: &ExportBundle, path: impl AsRef<Path>) -> Result<()> {
    bundle.validate()?;

    let path = path.as_ref();
    let file = File::create(path).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, bundle)?;
    writer.flush().map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

use async_trait::async_trait;
use neo4rs::{query, BoltType, Graph, Query};

use super::{ExportBundle, ExportError, GraphSchema};
use crate::config::GraphStoreConfig;
use crate::entity::{Attributes, CanonicalEntity};
use crate::error::Result;
use crate::relationship::{Assertion, EdgeKind};

/// A property graph database that can take an exported bundle.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn apply_schema(&self, schema: &GraphSchema) -> Result<()>;

    /// Validate the bundle, establish the schema, then write every node and
    /// edge.
    async fn load(&self, bundle: &ExportBundle) -> Result<()>;
}

pub struct Neo4jStore {
    graph: Graph,
}

/// A Cypher statement with its parameters, before it becomes a driver query.
#[derive(Debug)]
struct Statement {
    cypher: String,
    params: Vec<(&'static str, BoltType)>,
}

impl Statement {
    fn new(cypher: impl Into<String>) -> Self {
        Self {
            cypher: cypher.into(),
            params: Vec::new(),
        }
    }

    fn param(mut self, key: &'static str, value: impl Into<BoltType>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    /// Append `, e.<key> = $<key>` and bind the value.
    fn set(&mut self, key: &'static str, value: impl Into<BoltType>) {
        self.cypher.push_str(&format!(", e.{key} = ${key}"));
        self.params.push((key, value.into()));
    }

    #[cfg(test)]
    fn has_param(&self, key: &str) -> bool {
        self.params.iter().any(|(k, _)| *k == key)
    }

    fn into_query(self) -> Query {
        let mut q = query(&self.cypher);
        for (key, value) in self.params {
            q = q.param(key, value);
        }
        q
    }
}

impl Neo4jStore {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(ExportError::from)?;
        Ok(Self { graph })
    }

    pub async fn from_config(config: &GraphStoreConfig) -> Result<Self> {
        tracing::info!(uri = %config.uri, user = %config.user, "Connecting to graph store");
        Self::connect(&config.uri, &config.user, &config.password).await
    }

    async fn run(&self, statement: Statement) -> Result<()> {
        self.graph
            .run(statement.into_query())
            .await
            .map_err(ExportError::from)?;
        Ok(())
    }

    fn entity_statement(entity: &CanonicalEntity) -> Statement {
        // Labels cannot be parameters; they come from the closed type enum.
        let mut statement = Statement::new(format!(
            "MERGE (e:Entity {{entity_id: $id}}) SET e:{}, e.type = $type, e.text = $text, \
             e.normalized = $normalized, e.confidence = $confidence, e.sources = $sources",
            entity.entity_type.label()
        ))
        .param("id", entity.entity_id.to_string())
        .param("type", entity.entity_type.as_str())
        .param("text", entity.text.clone())
        .param("normalized", entity.normalized.clone())
        .param("confidence", entity.confidence)
        .param(
            "sources",
            entity.sources.iter().cloned().collect::<Vec<String>>(),
        );

        match &entity.attributes {
            Attributes::Spatial(s) => {
                if let (Some(lat), Some(lon)) = (s.latitude, s.longitude) {
                    statement.set("latitude", lat);
                    statement.set("longitude", lon);
                }
                if let Some(name) = &s.display_name {
                    statement.set("display_name", name.clone());
                }
                if let Some(kind) = &s.location_type {
                    statement.set("location_type", kind.clone());
                }
                if let Some(importance) = s.importance {
                    statement.set("importance", importance);
                }
                if let Some(osm_id) = &s.osm_id {
                    statement.set("osm_id", osm_id.clone());
                }
                if let Some(bbox) = s.bounding_box {
                    statement.set("bbox_south", bbox.south);
                    statement.set("bbox_north", bbox.north);
                    statement.set("bbox_west", bbox.west);
                    statement.set("bbox_east", bbox.east);
                }
            }
            Attributes::Temporal(t) => {
                statement.set("precision", t.precision.as_str());
                statement.set("time_type", t.time_type.as_str());
                statement.set("date_reliability", t.date_reliability);
                if let (Some(start), Some(end)) = (t.start_date, t.end_date) {
                    statement.cypher.push_str(
                        ", e.start_date = date($start_date), e.end_date = date($end_date)",
                    );
                    statement.params.push(("start_date", start.to_string().into()));
                    statement.params.push(("end_date", end.to_string().into()));
                }
            }
            Attributes::None => {}
        }

        statement
    }

    fn assertion_statement(assertion: &Assertion) -> Statement {
        Statement::new(
            "MERGE (a:Assertion {assertion_id: $id}) \
             SET a.predicate = $predicate, a.confidence = $confidence, a.sources = $sources",
        )
        .param("id", assertion.assertion_id.clone())
        .param("predicate", assertion.predicate.clone())
        .param("confidence", assertion.confidence)
        .param(
            "sources",
            assertion.sources.iter().cloned().collect::<Vec<String>>(),
        )
    }

    fn edge_statement(kind: EdgeKind, entity_id: &str, assertion_id: &str) -> Statement {
        let pattern = if kind == EdgeKind::SubjectOf {
            format!("MERGE (e)-[:{kind}]->(a)")
        } else {
            format!("MERGE (a)-[:{kind}]->(e)")
        };
        Statement::new(format!(
            "MATCH (e:Entity {{entity_id: $entity_id}}), \
             (a:Assertion {{assertion_id: $assertion_id}}) {pattern}"
        ))
        .param("entity_id", entity_id.to_string())
        .param("assertion_id", assertion_id.to_string())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn apply_schema(&self, schema: &GraphSchema) -> Result<()> {
        for statement in schema.statements() {
            self.run(Statement::new(statement.as_str())).await?;
        }
        tracing::info!(statements = schema.statements().len(), "Applied graph schema");
        Ok(())
    }

    async fn load(&self, bundle: &ExportBundle) -> Result<()> {
        bundle.validate()?;
        self.apply_schema(&GraphSchema::new()).await?;

        for entity in &bundle.entities {
            self.run(Self::entity_statement(entity)).await?;
        }
        for assertion in &bundle.assertions {
            self.run(Self::assertion_statement(assertion)).await?;
            for edge in assertion.edges() {
                self.run(Self::edge_statement(
                    edge.kind,
                    &edge.entity_id.to_string(),
                    &edge.assertion_id,
                ))
                .await?;
            }
        }

        tracing::info!(
            entities = bundle.entities.len(),
            assertions = bundle.assertions.len(),
            "Loaded bundle into graph store"
        );
        Ok(())
    }
}

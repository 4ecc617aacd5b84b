use std::fmt;

/// Constraint and index statements that must exist before a bulk load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSchema {
    statements: Vec<String>,
}

impl GraphSchema {
    #[must_use]
    pub fn new() -> Self {
        Self {
            statements: vec![
                "CREATE CONSTRAINT entity_id_unique IF NOT EXISTS \
                 FOR (e:Entity) REQUIRE e.entity_id IS UNIQUE"
                    .to_string(),
                "CREATE CONSTRAINT assertion_id_unique IF NOT EXISTS \
                 FOR (a:Assertion) REQUIRE a.assertion_id IS UNIQUE"
                    .to_string(),
                "CREATE INDEX entity_type_index IF NOT EXISTS FOR (e:Entity) ON (e.type)"
                    .to_string(),
                "CREATE INDEX entity_text_index IF NOT EXISTS FOR (e:Entity) ON (e.text)"
                    .to_string(),
            ],
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

impl Default for GraphSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            writeln!(f, "{statement};")?;
        }
        Ok(())
    }
}

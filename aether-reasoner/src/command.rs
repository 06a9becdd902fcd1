use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::schema::SchemaSnapshot;
use crate::sql::{SqlDialect, StatementKind};

/// What the user wants to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Query,
    Create,
    Update,
    Delete,
    Alter,
    Describe,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Query => "query",
            Intent::Create => "create",
            Intent::Update => "update",
            Intent::Delete => "delete",
            Intent::Alter => "alter",
            Intent::Describe => "describe",
        }
    }

    /// Guess the intent from the leading verb of a request
    pub fn infer(text: &str) -> Self {
        let lowered = text.trim().to_lowercase();
        let first = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .find(|w| !w.is_empty())
            .unwrap_or("");

        match first {
            "create" | "add" | "insert" | "make" | "new" => Intent::Create,
            "update" | "set" | "change" | "modify" | "rename" => Intent::Update,
            "delete" | "remove" | "drop" | "truncate" | "clear" => Intent::Delete,
            "alter" => Intent::Alter,
            "describe" | "explain" => Intent::Describe,
            _ => Intent::Query,
        }
    }

    /// Whether a statement type is plausible for this intent
    pub fn accepts(&self, kind: &StatementKind) -> bool {
        match self {
            Intent::Query | Intent::Describe => matches!(kind, StatementKind::Select),
            Intent::Create => matches!(kind, StatementKind::Create | StatementKind::Insert),
            Intent::Update => matches!(kind, StatementKind::Update),
            Intent::Delete => {
                matches!(kind, StatementKind::Delete | StatementKind::Drop)
                    || matches!(kind, StatementKind::Other(word) if word == "TRUNCATE")
            }
            Intent::Alter => matches!(kind, StatementKind::Alter),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "query" | "select" => Ok(Intent::Query),
            "create" | "create_table" | "insert" => Ok(Intent::Create),
            "update" => Ok(Intent::Update),
            "delete" => Ok(Intent::Delete),
            "alter" => Ok(Intent::Alter),
            "describe" => Ok(Intent::Describe),
            other => Err(format!("unknown intent '{}'", other)),
        }
    }
}

/// A request to reason about. Immutable once built.
#[derive(Debug, Clone)]
pub struct CommandPayload {
    intent: Intent,
    text: String,
    entities: BTreeMap<String, String>,
    snapshot: Option<Arc<SchemaSnapshot>>,
    dialect: Option<SqlDialect>,
}

impl CommandPayload {
    pub fn new(intent: Intent, text: impl Into<String>) -> Self {
        Self {
            intent,
            text: text.into(),
            entities: BTreeMap::new(),
            snapshot: None,
            dialect: None,
        }
    }

    /// Build with an intent inferred from the text
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(Intent::infer(&text), text)
    }

    /// Attach an extracted entity such as `table` or `filter`
    pub fn with_entity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(key.into(), value.into());
        self
    }

    /// Pin the snapshot this command is reasoned against
    pub fn with_snapshot(mut self, snapshot: Arc<SchemaSnapshot>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn entities(&self) -> &BTreeMap<String, String> {
        &self.entities
    }

    pub fn snapshot(&self) -> Option<&Arc<SchemaSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn dialect(&self) -> Option<SqlDialect> {
        self.dialect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_aliases() {
        assert_eq!("select".parse::<Intent>().unwrap(), Intent::Query);
        assert_eq!("create_table".parse::<Intent>().unwrap(), Intent::Create);
        assert_eq!("insert".parse::<Intent>().unwrap(), Intent::Create);
        assert_eq!("DESCRIBE".parse::<Intent>().unwrap(), Intent::Describe);
        assert!("merge".parse::<Intent>().is_err());
    }

    #[test]
    fn test_intent_inference() {
        assert_eq!(Intent::infer("show employees in Engineering"), Intent::Query);
        assert_eq!(Intent::infer("delete all students"), Intent::Delete);
        assert_eq!(
            Intent::infer("Create a table called pets with fields name, age"),
            Intent::Create
        );
        assert_eq!(Intent::infer("  update salaries"), Intent::Update);
        assert_eq!(Intent::infer(""), Intent::Query);
    }

    #[test]
    fn test_payload_builder() {
        let command = CommandPayload::from_text("delete all students")
            .with_entity("table", "students")
            .with_dialect(SqlDialect::Sqlite);

        assert_eq!(command.intent(), Intent::Delete);
        assert_eq!(command.entities().get("table").map(String::as_str), Some("students"));
        assert_eq!(command.dialect(), Some(SqlDialect::Sqlite));
        assert!(command.snapshot().is_none());
    }

    #[test]
    fn test_intent_accepts_statement_kind() {
        assert!(Intent::Query.accepts(&StatementKind::Select));
        assert!(Intent::Create.accepts(&StatementKind::Insert));
        assert!(!Intent::Query.accepts(&StatementKind::Delete));
    }
}

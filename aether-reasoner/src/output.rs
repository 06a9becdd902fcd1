use serde::{Deserialize, Serialize};

use crate::command::Intent;
use crate::sql::SqlDialect;

/// Decision returned for one reasoning call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonerOutput {
    /// Candidate statement, empty when no usable SQL was produced
    pub sql: String,
    pub confidence: f64,
    pub safe_to_execute: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub metadata: OutputMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMetadata {
    pub dialect: SqlDialect,
    pub intent: Intent,
    pub truncation_applied: bool,
    #[serde(default)]
    pub omitted_tables: Vec<String>,
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub generator: String,
    /// Store version the call ran against; absent for pinned snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_kind: Option<String>,
    /// Candidate as re-rendered by the SQL parser
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_sql: Option<String>,
    pub destructive: bool,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub stage: String,
}

impl ReasonerOutput {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Human-readable summary used by the REPL
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        if self.sql.is_empty() {
            lines.push("No SQL produced.".to_string());
        } else {
            lines.push(self.sql.clone());
        }
        lines.push(format!(
            "confidence: {:.2}  safe_to_execute: {}  dialect: {}",
            self.confidence, self.safe_to_execute, self.metadata.dialect
        ));
        if let Some(rationale) = &self.metadata.rationale {
            lines.push(format!("why: {}", rationale));
        }
        if self.metadata.truncation_applied {
            lines.push(format!(
                "schema truncated, omitted: {}",
                self.metadata.omitted_tables.join(", ")
            ));
        }
        lines.extend(self.warnings.iter().map(|w| format!("warning: {}", w)));
        lines.extend(self.errors.iter().map(|e| format!("error: {}", e)));
        if !self.sql.is_empty() && !self.safe_to_execute {
            lines.push("Not executed: review and approve explicitly.".to_string());
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> ReasonerOutput {
        ReasonerOutput {
            sql: "DELETE FROM students;".to_string(),
            confidence: 0.5,
            safe_to_execute: false,
            warnings: vec!["destructive DELETE statement requires explicit approval".to_string()],
            errors: Vec::new(),
            metadata: OutputMetadata {
                dialect: SqlDialect::Mysql,
                intent: Intent::Delete,
                truncation_applied: false,
                omitted_tables: Vec::new(),
                elapsed_ms: 12,
                attempts: 1,
                generator: "offline".to_string(),
                schema_version: Some(1),
                statement_kind: Some("DELETE".to_string()),
                normalized_sql: Some("DELETE FROM students;".to_string()),
                destructive: true,
                tables: vec!["students".to_string()],
                rationale: None,
                stage: "done".to_string(),
            },
        }
    }

    #[test]
    fn test_serialises_flat_record() {
        let value = serde_json::to_value(output()).unwrap();
        assert_eq!(value["sql"], "DELETE FROM students;");
        assert_eq!(value["safe_to_execute"], false);
        assert_eq!(value["metadata"]["dialect"], "mysql");
        assert_eq!(value["metadata"]["intent"], "delete");
        assert_eq!(value["metadata"]["stage"], "done");
        assert_eq!(value["metadata"]["normalized_sql"], "DELETE FROM students;");
        assert!(value["metadata"].get("rationale").is_none());
    }

    #[test]
    fn test_render_mentions_approval() {
        let text = output().render();
        assert!(text.starts_with("DELETE FROM students;"));
        assert!(text.contains("Not executed"));
        assert!(text.contains("warning: destructive"));
    }
}

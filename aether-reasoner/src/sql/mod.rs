//! SQL dialects, statement classification and validation.

pub mod lexer;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use validator::{validate, ValidationError, ValidationReport};

/// SQL variant governing parsing and prompt templating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Mysql,
    #[serde(alias = "postgresql")]
    Postgres,
    Sqlite,
}

impl SqlDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::Mysql => "mysql",
            SqlDialect::Postgres => "postgres",
            SqlDialect::Sqlite => "sqlite",
        }
    }

    /// Identifier quoting hint used in prompts
    pub fn quoting_hint(&self) -> &'static str {
        match self {
            SqlDialect::Mysql => "quote identifiers with backticks when needed",
            SqlDialect::Postgres | SqlDialect::Sqlite => {
                "quote identifiers with double quotes when needed"
            }
        }
    }

    pub(crate) fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        match self {
            SqlDialect::Mysql => Box::new(sqlparser::dialect::MySqlDialect {}),
            SqlDialect::Postgres => Box::new(sqlparser::dialect::PostgreSqlDialect {}),
            SqlDialect::Sqlite => Box::new(sqlparser::dialect::SQLiteDialect {}),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(SqlDialect::Mysql),
            "postgres" | "postgresql" => Ok(SqlDialect::Postgres),
            "sqlite" => Ok(SqlDialect::Sqlite),
            other => Err(format!(
                "unsupported dialect '{}' (expected mysql, postgres or sqlite)",
                other
            )),
        }
    }
}

/// Statement type of a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    /// Anything outside the accepted set, keyed by its leading keyword
    Other(String),
}

impl StatementKind {
    pub fn from_keyword(word: &str) -> Self {
        match word.to_ascii_uppercase().as_str() {
            "SELECT" | "WITH" => StatementKind::Select,
            "INSERT" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "CREATE" => StatementKind::Create,
            "ALTER" => StatementKind::Alter,
            "DROP" => StatementKind::Drop,
            other => StatementKind::Other(other.to_string()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, StatementKind::Other(_))
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Select => f.write_str("SELECT"),
            StatementKind::Insert => f.write_str("INSERT"),
            StatementKind::Update => f.write_str("UPDATE"),
            StatementKind::Delete => f.write_str("DELETE"),
            StatementKind::Create => f.write_str("CREATE"),
            StatementKind::Alter => f.write_str("ALTER"),
            StatementKind::Drop => f.write_str("DROP"),
            StatementKind::Other(word) => f.write_str(word),
        }
    }
}

/// What kind of statement a candidate is and whether it filters rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementProfile {
    pub kind: StatementKind,
    pub has_where: bool,
}

impl StatementProfile {
    /// DELETE, DROP, ALTER, TRUNCATE and UPDATE without WHERE
    pub fn is_destructive(&self) -> bool {
        match &self.kind {
            StatementKind::Delete | StatementKind::Drop | StatementKind::Alter => true,
            StatementKind::Update => !self.has_where,
            StatementKind::Other(word) => word.eq_ignore_ascii_case("TRUNCATE"),
            _ => false,
        }
    }
}

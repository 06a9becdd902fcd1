//! Schema snapshot model.
//!
//! A [`SchemaSnapshot`] maps database names to their tables. Snapshots are
//! immutable once built: construction checks that column names are unique
//! per table, table names are unique per database, and that every foreign
//! key points at a table and column inside the same snapshot.

mod store;
mod text;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{ReasonerError, Result};

pub use store::SchemaStore;

/// Database used when a schema declares no `Database:` header
pub const DEFAULT_DATABASE: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
            foreign_key: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
            row_count: None,
        }
    }

    /// Case-insensitive column lookup
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Immutable description of database structure
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<TableSchema>>",
    into = "BTreeMap<String, Vec<TableSchema>>"
)]
pub struct SchemaSnapshot {
    databases: BTreeMap<String, Vec<TableSchema>>,
}

impl SchemaSnapshot {
    pub fn new(databases: BTreeMap<String, Vec<TableSchema>>) -> Result<Self> {
        let snapshot = Self { databases };
        snapshot.check()?;
        Ok(snapshot)
    }

    /// Snapshot holding a single database
    pub fn single(database: impl Into<String>, tables: Vec<TableSchema>) -> Result<Self> {
        Self::new(BTreeMap::from([(database.into(), tables)]))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ReasonerError::schema(format!("invalid schema JSON: {}", e)))
    }

    fn check(&self) -> Result<()> {
        for (database, tables) in &self.databases {
            let mut table_names = HashSet::new();
            for table in tables {
                if !table_names.insert(table.name.to_lowercase()) {
                    return Err(ReasonerError::schema(format!(
                        "duplicate table '{}' in database '{}'",
                        table.name, database
                    )));
                }

                let mut column_names = HashSet::new();
                for column in &table.columns {
                    if !column_names.insert(column.name.to_lowercase()) {
                        return Err(ReasonerError::schema(format!(
                            "duplicate column '{}' in table '{}'",
                            column.name, table.name
                        )));
                    }
                }
            }
        }

        for (database, tables) in &self.databases {
            for table in tables {
                for column in &table.columns {
                    let Some(fk) = &column.foreign_key else {
                        continue;
                    };
                    let target = self
                        .resolve_reference(database, &fk.table)
                        .ok_or_else(|| {
                            ReasonerError::schema(format!(
                                "foreign key {}.{} references unknown table '{}'",
                                table.name, column.name, fk.table
                            ))
                        })?;
                    if !target.has_column(&fk.column) {
                        return Err(ReasonerError::schema(format!(
                            "foreign key {}.{} references unknown column '{}.{}'",
                            table.name, column.name, fk.table, fk.column
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Foreign key target, preferring the referencing table's own database
    fn resolve_reference(&self, database: &str, table: &str) -> Option<&TableSchema> {
        self.databases
            .get(database)
            .and_then(|tables| tables.iter().find(|t| t.name.eq_ignore_ascii_case(table)))
            .or_else(|| self.find_table(None, table))
    }

    pub fn databases(&self) -> impl Iterator<Item = (&str, &[TableSchema])> {
        self.databases
            .iter()
            .map(|(name, tables)| (name.as_str(), tables.as_slice()))
    }

    /// All tables with their database, in declaration order
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableSchema)> {
        self.databases
            .iter()
            .flat_map(|(db, tables)| tables.iter().map(move |t| (db.as_str(), t)))
    }

    pub fn table_count(&self) -> usize {
        self.databases.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.table_count() == 0
    }

    /// Case-insensitive table lookup.
    ///
    /// The qualifier narrows the search when it names a database; any other
    /// qualifier (such as a Postgres schema like `public`) is ignored.
    pub fn find_table(&self, qualifier: Option<&str>, name: &str) -> Option<&TableSchema> {
        if let Some(qualifier) = qualifier {
            if let Some((_, tables)) = self
                .databases
                .iter()
                .find(|(db, _)| db.eq_ignore_ascii_case(qualifier))
            {
                return tables.iter().find(|t| t.name.eq_ignore_ascii_case(name));
            }
        }

        self.databases
            .values()
            .flat_map(|tables| tables.iter())
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Specialised snapshot containing only the named tables.
    ///
    /// Foreign keys pointing at tables outside the subset are dropped.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        for name in names {
            if self.find_table(None, name.as_ref()).is_none() {
                return Err(ReasonerError::schema(format!(
                    "unknown table '{}'",
                    name.as_ref()
                )));
            }
        }

        let wanted = |table: &str| names.iter().any(|n| n.as_ref().eq_ignore_ascii_case(table));

        let mut databases = BTreeMap::new();
        for (database, tables) in &self.databases {
            let kept: Vec<TableSchema> = tables
                .iter()
                .filter(|t| wanted(&t.name))
                .cloned()
                .map(|mut table| {
                    for column in &mut table.columns {
                        if column.foreign_key.as_ref().is_some_and(|fk| !wanted(&fk.table)) {
                            column.foreign_key = None;
                        }
                    }
                    table
                })
                .collect();
            if !kept.is_empty() {
                databases.insert(database.clone(), kept);
            }
        }

        Self::new(databases)
    }
}

impl TryFrom<BTreeMap<String, Vec<TableSchema>>> for SchemaSnapshot {
    type Error = ReasonerError;

    fn try_from(databases: BTreeMap<String, Vec<TableSchema>>) -> Result<Self> {
        Self::new(databases)
    }
}

impl From<SchemaSnapshot> for BTreeMap<String, Vec<TableSchema>> {
    fn from(snapshot: SchemaSnapshot) -> Self {
        snapshot.databases
    }
}

//! Human-readable schema text format.
//!
//! Two layouts are accepted and may be mixed:
//!
//! ```text
//! Database: school
//!   Table classes: id (int) PK, title (varchar)
//!   Table students: id (int, PK), name (varchar), class_id (int) -> classes.id
//! ```
//!
//! and the long layout written by the schema scanner:
//!
//! ```text
//! Database: school
//!
//! Table students:
//!   - id (INTEGER) NOT NULL PRIMARY KEY
//!   - class_id (INTEGER) NULL
//!   Foreign Keys:
//!     - class_id → classes.id
//!   Rows: 120
//! ```

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::{ColumnSchema, ForeignKeyRef, SchemaSnapshot, TableSchema, DEFAULT_DATABASE};
use crate::error::{ReasonerError, Result};

struct Patterns {
    database: Regex,
    table: Regex,
    rows: Regex,
    foreign_keys: Regex,
    list_item: Regex,
    fk_item: Regex,
    column_head: Regex,
    primary_key: Regex,
    not_null: Regex,
    reference: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let build = |pattern: &str| match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => unreachable!("invalid built-in pattern {pattern}: {e}"),
        };
        Patterns {
            database: build(r"^(?i)database\s*:\s*(?P<name>\S+)\s*$"),
            table: build(r"^(?i)table\s+(?P<name>[^\s:]+)\s*:\s*(?P<rest>.*)$"),
            rows: build(r"^(?i)(?:rows|row\s+count)\s*:\s*(?P<count>\d+)\s*$"),
            foreign_keys: build(r"^(?i)foreign\s+keys\s*:\s*$"),
            list_item: build(r"^[-*]\s+(?P<body>.+)$"),
            fk_item: build(
                r"^(?P<column>[\w$]+)\s*(?:->|→)\s*(?P<table>[\w$]+)\.(?P<target>[\w$]+)\s*$",
            ),
            column_head: build(r"^(?P<name>[A-Za-z_][\w$]*|`[^`]+`|\x22[^\x22]+\x22)\s*(?P<rest>.*)$"),
            primary_key: build(r"(?i)\b(?:pk|primary\s+key)\b"),
            not_null: build(r"(?i)\bnot\s+null\b"),
            reference: build(
                r"(?i)(?:\bfk\s*)?(?:->|→|\breferences\s+)\s*(?P<table>[\w$]+)\s*[.(]\s*(?P<column>[\w$]+)",
            ),
        }
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Columns,
    ForeignKeys,
}

impl SchemaSnapshot {
    /// Parse the schema text format described in the module docs
    pub fn parse_text(text: &str) -> Result<Self> {
        let p = patterns();
        let mut databases: BTreeMap<String, Vec<TableSchema>> = BTreeMap::new();
        let mut database = DEFAULT_DATABASE.to_string();
        let mut section = Section::Columns;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            let error = |message: String| {
                ReasonerError::schema(format!("line {}: {}", line_no, message))
            };

            if line.is_empty() || line.starts_with('#') || line.starts_with("--") {
                continue;
            }

            if let Some(caps) = p.database.captures(line) {
                database = caps["name"].to_string();
                databases.entry(database.clone()).or_default();
                continue;
            }

            if let Some(caps) = p.table.captures(line) {
                let mut table = TableSchema::new(unquote(&caps["name"]), Vec::new());
                let rest = caps["rest"].trim();
                if !rest.is_empty() {
                    for entry in split_top_level(rest) {
                        table.columns.push(parse_column(entry).map_err(&error)?);
                    }
                }
                databases.entry(database.clone()).or_default().push(table);
                section = Section::Columns;
                continue;
            }

            let current = databases
                .get_mut(&database)
                .and_then(|tables| tables.last_mut());

            if let Some(caps) = p.rows.captures(line) {
                let table = current.ok_or_else(|| error("row count outside a table".into()))?;
                let count = caps["count"]
                    .parse()
                    .map_err(|e| error(format!("invalid row count: {}", e)))?;
                table.row_count = Some(count);
                continue;
            }

            if p.foreign_keys.is_match(line) {
                if current.is_none() {
                    return Err(error("foreign keys outside a table".into()));
                }
                section = Section::ForeignKeys;
                continue;
            }

            if line.eq_ignore_ascii_case("columns:") {
                section = Section::Columns;
                continue;
            }

            if let Some(caps) = p.list_item.captures(line) {
                let table = current.ok_or_else(|| error("column outside a table".into()))?;
                let body = caps["body"].trim();
                match section {
                    Section::Columns => {
                        table.columns.push(parse_column(body).map_err(&error)?);
                    }
                    Section::ForeignKeys => {
                        let fk = p
                            .fk_item
                            .captures(body)
                            .ok_or_else(|| error(format!("invalid foreign key '{}'", body)))?;
                        let table_name = table.name.clone();
                        let column = table
                            .columns
                            .iter_mut()
                            .find(|c| c.name.eq_ignore_ascii_case(&fk["column"]))
                            .ok_or_else(|| {
                                error(format!(
                                    "foreign key on unknown column '{}.{}'",
                                    table_name, &fk["column"]
                                ))
                            })?;
                        column.foreign_key = Some(ForeignKeyRef {
                            table: fk["table"].to_string(),
                            column: fk["target"].to_string(),
                        });
                    }
                }
                continue;
            }

            return Err(error(format!("unrecognised schema line '{}'", line)));
        }

        databases.retain(|_, tables| !tables.is_empty());
        SchemaSnapshot::new(databases)
    }
}

/// One column entry: `name [(type[, markers])] [markers]`
fn parse_column(entry: &str) -> std::result::Result<ColumnSchema, String> {
    let p = patterns();
    let caps = p
        .column_head
        .captures(entry.trim())
        .ok_or_else(|| format!("invalid column definition '{}'", entry.trim()))?;
    let mut column = ColumnSchema::new(unquote(&caps["name"]), "");
    let mut rest = caps["rest"].trim().to_string();

    if rest.starts_with('(') {
        let (inner, after) = split_parenthesized(&rest)
            .ok_or_else(|| format!("unbalanced parentheses in '{}'", entry.trim()))?;
        let mut parts = split_top_level(inner).into_iter();
        column.data_type = parts.next().unwrap_or_default().trim().to_string();
        let markers: Vec<&str> = parts.collect();
        rest = format!("{} {}", markers.join(" "), after);
    }

    if p.primary_key.is_match(&rest) {
        column.primary_key = true;
        column.nullable = false;
    }
    if p.not_null.is_match(&rest) {
        column.nullable = false;
    }
    if let Some(fk) = p.reference.captures(&rest) {
        column.foreign_key = Some(ForeignKeyRef {
            table: fk["table"].to_string(),
            column: fk["column"].to_string(),
        });
    }

    Ok(column)
}

/// Split `(inner) rest`, honouring nested parentheses
fn split_parenthesized(text: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some((&text[1..i], text[i + 1..].trim()));
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas outside parentheses
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn unquote(name: &str) -> String {
    name.trim_matches(|c| c == '`' || c == '"').to_string()
}

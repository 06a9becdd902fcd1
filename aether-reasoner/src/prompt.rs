//! Prompt construction.
//!
//! Serialises the schema snapshot into compact table lines, drops the least
//! relevant tables while the text exceeds the character budget, and wraps
//! the result together with the request into the prompt sent to the model.

use std::collections::{BTreeMap, HashSet};

use crate::command::{CommandPayload, Intent};
use crate::schema::{ColumnSchema, SchemaSnapshot, TableSchema};
use crate::sql::SqlDialect;

pub const DEFAULT_MAX_SCHEMA_CHARS: usize = 14_000;

pub const SYSTEM_INSTRUCTIONS: &str = r#"You translate database requests into a single SQL statement.
Rules:
1) Reply with one JSON object and nothing else.
2) Only use tables and columns listed in SCHEMA_SNAPSHOT. Never invent names.
3) Produce exactly one statement for the given DIALECT.
4) If the request is ambiguous, set "clarify_required" to true and "sql" to null.
5) Set "destructive" to true for statements that delete, drop, alter or rewrite existing data.

Reply format:
{
  "sql": "<one SQL statement or null>",
  "explanation": "<at most 30 words>",
  "warnings": ["<anything the operator should double check>"],
  "used_tables": ["t1", "t2"],
  "clarify_required": false,
  "destructive": false
}"#;

/// Everything one model call needs. Lives for a single reasoning call.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub schema_text: String,
    pub dialect: SqlDialect,
    pub intent: Intent,
    pub command_text: String,
    pub entities: BTreeMap<String, String>,
    /// Tables present in `schema_text`, in declaration order
    pub included_tables: Vec<String>,
    /// Tables dropped to fit the budget, least relevant first
    pub omitted_tables: Vec<String>,
    pub truncated: bool,
    pub system_instructions: &'static str,
}

impl PromptContext {
    pub fn user_prompt(&self) -> String {
        let mut prompt = String::from("SCHEMA_SNAPSHOT:\n");
        if self.schema_text.is_empty() {
            prompt.push_str("(no tables available)\n");
        } else {
            prompt.push_str(&self.schema_text);
            prompt.push('\n');
        }
        if self.truncated {
            prompt.push_str(&format!(
                "...[TRUNCATED: {} table(s) omitted]\n",
                self.omitted_tables.len()
            ));
        }

        prompt.push_str(&format!(
            "\nDIALECT: {} ({})\n",
            self.dialect,
            self.dialect.quoting_hint()
        ));
        prompt.push_str(&format!("\nINTENT: {}\n", self.intent));

        if !self.entities.is_empty() {
            let entities: Vec<String> = self
                .entities
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            prompt.push_str(&format!("\nENTITIES: {}\n", entities.join(", ")));
        }

        prompt.push_str(&format!("\nUSER_REQUEST: {}\n", self.command_text));
        prompt.push_str("\nProduce the JSON output matching the reply format.");
        prompt
    }
}

/// Relevance of a table to a request, compared lexicographically.
///
/// Entity hints outrank overlap with the free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Relevance {
    entity_table: bool,
    entity_columns: usize,
    text_table: bool,
    text_columns: usize,
}

struct Candidate<'a> {
    database: &'a str,
    table: &'a TableSchema,
    position: usize,
    relevance: Relevance,
}

#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    max_chars: usize,
}

impl PromptBuilder {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn build(
        &self,
        command: &CommandPayload,
        snapshot: &SchemaSnapshot,
        dialect: SqlDialect,
    ) -> PromptContext {
        let text_tokens = tokens(command.text());
        let entity_tokens: HashSet<String> = command
            .entities()
            .values()
            .flat_map(|v| tokens(v))
            .collect();

        let candidates: Vec<Candidate> = snapshot
            .tables()
            .enumerate()
            .map(|(position, (database, table))| Candidate {
                database,
                table,
                position,
                relevance: relevance(table, &entity_tokens, &text_tokens),
            })
            .collect();

        // Least relevant first; later declarations lose ties
        let mut drop_order: Vec<&Candidate> = candidates.iter().collect();
        drop_order.sort_by(|a, b| {
            a.relevance
                .cmp(&b.relevance)
                .then(b.position.cmp(&a.position))
        });

        let mut dropped = HashSet::new();
        let mut omitted = Vec::new();
        let mut schema_text = render(candidates.iter());
        for candidate in drop_order {
            if schema_text.chars().count() <= self.max_chars {
                break;
            }
            dropped.insert(candidate.position);
            omitted.push(candidate.table.name.clone());
            schema_text = render(
                candidates
                    .iter()
                    .filter(|c| !dropped.contains(&c.position)),
            );
        }

        PromptContext {
            included_tables: candidates
                .iter()
                .filter(|c| !dropped.contains(&c.position))
                .map(|c| c.table.name.clone())
                .collect(),
            truncated: !omitted.is_empty(),
            omitted_tables: omitted,
            schema_text,
            dialect,
            intent: command.intent(),
            command_text: command.text().to_string(),
            entities: command.entities().clone(),
            system_instructions: SYSTEM_INSTRUCTIONS,
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SCHEMA_CHARS)
    }
}

fn relevance(
    table: &TableSchema,
    entity_tokens: &HashSet<String>,
    text_tokens: &HashSet<String>,
) -> Relevance {
    let column_hits = |set: &HashSet<String>| {
        table
            .columns
            .iter()
            .filter(|c| mentions(set, &c.name))
            .count()
    };
    Relevance {
        entity_table: mentions(entity_tokens, &table.name),
        entity_columns: column_hits(entity_tokens),
        text_table: mentions(text_tokens, &table.name),
        text_columns: column_hits(text_tokens),
    }
}

/// Lowercase word tokens of a piece of text
fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether a name appears among the tokens, tolerating a plural `s`
fn mentions(tokens: &HashSet<String>, name: &str) -> bool {
    let name = name.to_lowercase();
    if tokens.contains(&name) || tokens.contains(&format!("{}s", name)) {
        return true;
    }
    name.strip_suffix('s')
        .is_some_and(|singular| !singular.is_empty() && tokens.contains(singular))
}

fn render<'a, 'b: 'a>(candidates: impl Iterator<Item = &'a Candidate<'b>>) -> String {
    let mut lines = Vec::new();
    let mut database: Option<&str> = None;
    for candidate in candidates {
        if database != Some(candidate.database) {
            if database.is_some() {
                lines.push(String::new());
            }
            lines.push(format!("Database: {}", candidate.database));
            database = Some(candidate.database);
        }
        lines.push(render_table(candidate.table));
    }
    lines.join("\n")
}

/// `Table students: id (int, PK), class_id (int, FK -> classes.id)`
pub fn render_table(table: &TableSchema) -> String {
    let columns: Vec<String> = table.columns.iter().map(render_column).collect();
    format!("Table {}: {}", table.name, columns.join(", "))
}

fn render_column(column: &ColumnSchema) -> String {
    let mut details = Vec::new();
    if !column.data_type.is_empty() {
        details.push(column.data_type.clone());
    }
    if column.primary_key {
        details.push("PK".to_string());
    } else if !column.nullable {
        details.push("NOT NULL".to_string());
    }
    if let Some(fk) = &column.foreign_key {
        details.push(format!("FK -> {}.{}", fk.table, fk.column));
    }

    if details.is_empty() {
        column.name.clone()
    } else {
        format!("{} ({})", column.name, details.join(", "))
    }
}

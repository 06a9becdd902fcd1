//! Extraction of a single SQL statement from a model reply.
//!
//! Replies are untrusted text. Three shapes are accepted, tried in order:
//! a JSON object carrying an `sql` field (optionally inside a code fence),
//! fenced code blocks, and plain prose with the statement embedded in it.

use regex::Regex;
use serde::Deserialize;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::sync::OnceLock;
use thiserror::Error;

use crate::sql::lexer::lex;

/// Why no candidate could be extracted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty response from the reasoning service")]
    EmptyResponse,

    #[error("no SQL statement found in the response")]
    NoStatement,

    #[error("expected exactly one SQL statement, found {count}")]
    MultipleStatements { count: usize },

    #[error("clarification required: {explanation}")]
    ClarificationRequired { explanation: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCandidate {
    /// Single trimmed statement ending in exactly one `;`
    pub sql: String,
    pub rationale: Option<String>,
    pub declared_warnings: Vec<String>,
    pub declared_destructive: Option<bool>,
    pub declared_tables: Vec<String>,
    /// The model flagged the request as ambiguous but still answered
    pub clarification_requested: bool,
}

#[derive(Debug, Deserialize)]
struct JsonReply {
    #[serde(default)]
    sql: Option<String>,
    #[serde(default, alias = "rationale")]
    explanation: Option<String>,
    #[serde(default)]
    warnings: Option<Vec<String>>,
    #[serde(default)]
    destructive: Option<bool>,
    #[serde(default)]
    clarify_required: Option<bool>,
    #[serde(default)]
    used_tables: Option<Vec<String>>,
}

/// Words that may continue a statement on the next line
const CONTINUATION_WORDS: &[&str] = &[
    "FROM", "WHERE", "AND", "OR", "NOT", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS",
    "OUTER", "ON", "USING", "GROUP", "ORDER", "BY", "HAVING", "LIMIT", "OFFSET", "UNION",
    "INTERSECT", "EXCEPT", "SET", "VALUES", "INTO", "RETURNING", "AS", "CASE", "WHEN", "THEN",
    "ELSE", "END", "IN", "EXISTS", "BETWEEN", "LIKE", "IS", "SELECT", "WITH", "ASC", "DESC",
    "PRIMARY", "FOREIGN", "REFERENCES", "CONSTRAINT", "ADD", "COLUMN", "DEFAULT", "NULL",
];

struct Patterns {
    fence: Regex,
    label: Regex,
    statement_start: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let build = |pattern: &str| match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => unreachable!("invalid built-in pattern {pattern}: {e}"),
        };
        Patterns {
            fence: build(r"(?s)```[ \t]*(?P<lang>[A-Za-z0-9_+-]*)[ \t]*\r?\n?(?P<body>.*?)```"),
            label: build(r"^(?i)(?:sql(?:\s+query)?|query|answer|statement)\s*:\s*"),
            statement_start: build(
                r"(?i)\b(?:SELECT|WITH|INSERT|UPDATE|DELETE|CREATE|ALTER|DROP|TRUNCATE)\b",
            ),
        }
    })
}

pub fn parse_response(raw: &str) -> Result<ParsedCandidate, ParseError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    if let Some(reply) = json_reply(text) {
        return from_json_reply(reply);
    }

    let blocks: Vec<String> = patterns()
        .fence
        .captures_iter(text)
        .filter(|caps| !caps["lang"].eq_ignore_ascii_case("json"))
        .map(|caps| strip_label(caps["body"].trim()).to_string())
        .filter(|body| !body.is_empty())
        .collect();
    if !blocks.is_empty() {
        let statements: Vec<String> = blocks
            .iter()
            .flat_map(|block| statements_in(block))
            .collect();
        return single(statements).map(|sql| ParsedCandidate {
            sql,
            ..ParsedCandidate::default()
        });
    }

    single(prose_statements(text)).map(|sql| ParsedCandidate {
        sql,
        ..ParsedCandidate::default()
    })
}

/// JSON object with an `sql` or `clarify_required` field, fenced or bare
fn json_reply(text: &str) -> Option<JsonReply> {
    let mut candidates: Vec<&str> = patterns()
        .fence
        .captures_iter(text)
        .filter_map(|caps| caps.name("body").map(|m| m.as_str().trim()))
        .collect();
    candidates.push(text);
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }

    candidates.into_iter().find_map(|candidate| {
        let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
        let object = value.as_object()?;
        if !object.contains_key("sql") && !object.contains_key("clarify_required") {
            return None;
        }
        serde_json::from_value(value).ok()
    })
}

fn from_json_reply(reply: JsonReply) -> Result<ParsedCandidate, ParseError> {
    let clarify = reply.clarify_required.unwrap_or(false);
    let sql = reply
        .sql
        .as_deref()
        .map(|s| strip_label(s.trim()))
        .filter(|s| !s.is_empty());

    let Some(sql) = sql else {
        if clarify {
            return Err(ParseError::ClarificationRequired {
                explanation: reply
                    .explanation
                    .unwrap_or_else(|| "the request is ambiguous".to_string()),
            });
        }
        return Err(ParseError::NoStatement);
    };

    let sql = single(statements_in(sql))?;
    let mut declared_warnings = reply.warnings.unwrap_or_default();
    declared_warnings.retain(|w| !w.trim().is_empty());

    Ok(ParsedCandidate {
        sql,
        rationale: reply.explanation.filter(|e| !e.trim().is_empty()),
        declared_warnings,
        declared_destructive: reply.destructive,
        declared_tables: reply.used_tables.unwrap_or_default(),
        clarification_requested: clarify,
    })
}

fn statements_in(text: &str) -> Vec<String> {
    lex(text, &GenericDialect {}).statements
}

fn single(statements: Vec<String>) -> Result<String, ParseError> {
    match statements.len() {
        0 => Err(ParseError::NoStatement),
        1 => Ok(format!("{};", statements[0].trim())),
        count => Err(ParseError::MultipleStatements { count }),
    }
}

/// Statements embedded in prose.
///
/// Every statement keyword starts a candidate that runs to the first `;` or
/// to the first line that does not continue it. Candidates that parse win,
/// and text they cover is not searched again. When none parse, candidates
/// written in upper case or opening a line are kept so the validator can
/// report the syntax problem.
fn prose_statements(text: &str) -> Vec<String> {
    let mut parsed = Vec::new();
    let mut unparsed = Vec::new();
    let mut covered_to = 0;

    for found in patterns().statement_start.find_iter(text) {
        if found.start() < covered_to {
            continue;
        }
        let (candidate, end) = candidate_at(text, found.start());
        if candidate.is_empty() {
            continue;
        }
        if parses(&candidate) {
            parsed.push(candidate);
            covered_to = end;
        } else if let Some(shorter) = candidate.strip_suffix('.').filter(|c| parses(c)) {
            parsed.push(shorter.trim_end().to_string());
            covered_to = end;
        } else {
            let sql_like = found.as_str() == found.as_str().to_uppercase()
                || opens_line(text, found.start());
            unparsed.push((candidate, sql_like, found.start(), end));
        }
    }

    if !parsed.is_empty() {
        return parsed;
    }

    let mut kept = Vec::new();
    let mut kept_to = 0;
    for (candidate, sql_like, start, end) in unparsed {
        if sql_like && start >= kept_to {
            kept.push(candidate);
            kept_to = end;
        }
    }
    kept
}

/// Whether only whitespace or a label precedes `at` on its line
fn opens_line(text: &str, at: usize) -> bool {
    let line_start = text[..at].rfind('\n').map_or(0, |i| i + 1);
    strip_label(text[line_start..at].trim()).is_empty()
}

/// Candidate statement starting at `start`, and the byte offset it ends at
fn candidate_at(text: &str, start: usize) -> (String, usize) {
    let rest = &text[start..];
    let limit = lex(rest, &GenericDialect {})
        .terminators
        .first()
        .copied()
        .unwrap_or(rest.len());

    let mut end = 0;
    let mut previous: Option<&str> = None;
    for line in rest[..limit].split_inclusive('\n') {
        let trimmed = line.trim();
        if let Some(previous) = previous {
            if !continues(previous, trimmed) {
                break;
            }
        }
        end += line.len();
        previous = Some(trimmed);
    }

    let candidate = rest[..end].trim().to_string();
    let consumed = if end == limit && limit < rest.len() {
        limit + 1
    } else {
        end
    };
    (candidate, start + consumed)
}

/// Whether `line` carries on the statement ended by `previous`
fn continues(previous: &str, line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    if previous.ends_with(|c: char| ",(=<>+-*/".contains(c)) {
        return true;
    }
    if line.starts_with(|c: char| "(),=<>+-*/'\"`".contains(c)) {
        return true;
    }
    let is_clause_word = |word: &str| {
        CONTINUATION_WORDS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(word))
    };
    let first = line
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or("");
    let last = previous
        .rsplit(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or("");
    is_clause_word(first) || is_clause_word(last)
}

fn parses(candidate: &str) -> bool {
    matches!(
        Parser::parse_sql(&GenericDialect {}, candidate),
        Ok(statements) if statements.len() == 1
    )
}

fn strip_label(line: &str) -> &str {
    match patterns().label.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

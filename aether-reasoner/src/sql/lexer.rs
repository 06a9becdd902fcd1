//! Statement splitting on top of the sqlparser tokenizer.
//!
//! Counts statements in model replies and catches quoting and parenthesis
//! problems before the full parser runs. Tokens read before a tokenizer
//! failure are kept, so a reply with an unterminated string still yields
//! its statements.

use sqlparser::dialect::Dialect;
use sqlparser::tokenizer::{Location, Token, TokenWithLocation, Tokenizer, TokenizerError};
use thiserror::Error;

/// Lexical problem found while scanning
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexProblem {
    #[error("unterminated quoted string (missing closing {quote})")]
    UnterminatedQuote { quote: char },

    #[error("unterminated block comment")]
    UnterminatedComment,

    #[error("{message}")]
    Invalid { message: String },

    #[error("unbalanced parentheses: unexpected ')'")]
    UnexpectedCloseParen,

    #[error("unbalanced parentheses: {count} '(' left open")]
    UnclosedParen { count: usize },
}

/// Unquoted word (keyword or identifier) and its parenthesis depth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Lexed {
    pub words: Vec<Word>,
    /// Trimmed statements, without their terminating `;` or surrounding comments
    pub statements: Vec<String>,
    /// Byte offsets of statement-terminating semicolons
    pub terminators: Vec<usize>,
    pub problems: Vec<LexProblem>,
}

impl Lexed {
    /// First bare word, which names the statement type
    pub fn leading_word(&self) -> Option<&str> {
        self.words.first().map(|w| w.text.as_str())
    }

    /// Whether a WHERE keyword appears outside any parentheses
    pub fn has_top_level_where(&self) -> bool {
        self.words
            .iter()
            .any(|w| w.depth == 0 && w.text.eq_ignore_ascii_case("WHERE"))
    }
}

pub fn lex(sql: &str, dialect: &dyn Dialect) -> Lexed {
    let mut tokens: Vec<TokenWithLocation> = Vec::new();
    let failure = Tokenizer::new(dialect, sql)
        .with_unescape(false)
        .tokenize_with_location_into_buf(&mut tokens)
        .err();

    let offsets = LineOffsets::new(sql);
    let starts: Vec<usize> = tokens.iter().map(|t| offsets.at(t.location)).collect();

    let mut lexed = Lexed::default();
    let mut depth = 0usize;
    // Byte range from the first to the last significant token of the current statement
    let mut span: Option<(usize, usize)> = None;

    for (i, token) in tokens.iter().enumerate() {
        let start = starts[i];
        let end = starts.get(i + 1).copied().unwrap_or(sql.len());
        match &token.token {
            Token::SemiColon => {
                lexed.terminators.push(start);
                lexed.flush(sql, span.take());
                continue;
            }
            Token::Whitespace(_) | Token::EOF => continue,
            Token::LParen => depth += 1,
            Token::RParen => {
                if depth == 0 {
                    lexed.problems.push(LexProblem::UnexpectedCloseParen);
                } else {
                    depth -= 1;
                }
            }
            Token::Word(word) if word.quote_style.is_none() => lexed.words.push(Word {
                text: word.value.clone(),
                depth,
            }),
            _ => {}
        }
        span = Some((span.map_or(start, |(first, _)| first), end));
    }

    if let Some(error) = failure {
        let at = offsets.at(error.location).min(sql.len());
        let problem = LexProblem::from_tokenizer(&error, &sql[at..]);
        // The unread remainder belongs to the last statement unless it is a comment
        if !matches!(problem, LexProblem::UnterminatedComment) {
            span = Some((span.map_or(at, |(first, _)| first), sql.len()));
        }
        lexed.problems.push(problem);
    }

    lexed.flush(sql, span);
    if depth > 0 {
        lexed.problems.push(LexProblem::UnclosedParen { count: depth });
    }
    lexed
}

impl Lexed {
    fn flush(&mut self, sql: &str, span: Option<(usize, usize)>) {
        if let Some((start, end)) = span {
            let statement = sql[start..end].trim();
            if !statement.is_empty() {
                self.statements.push(statement.to_string());
            }
        }
    }
}

impl LexProblem {
    fn from_tokenizer(error: &TokenizerError, rest: &str) -> Self {
        let message = error.message.to_lowercase();
        if message.contains("comment") {
            LexProblem::UnterminatedComment
        } else if message.starts_with("unterminated") || message.contains("close delimiter") {
            let quote = rest
                .chars()
                .find(|c| matches!(c, '\'' | '"' | '`' | '$'))
                .unwrap_or('\'');
            LexProblem::UnterminatedQuote { quote }
        } else {
            LexProblem::Invalid {
                message: error.to_string(),
            }
        }
    }
}

/// Maps tokenizer locations (1-based line and character column) to byte offsets
struct LineOffsets<'a> {
    sql: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineOffsets<'a> {
    fn new(sql: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { sql, line_starts }
    }

    fn at(&self, location: Location) -> usize {
        let line = location.line.saturating_sub(1) as usize;
        let Some(&line_start) = self.line_starts.get(line) else {
            return self.sql.len();
        };
        let column = location.column.saturating_sub(1) as usize;
        self.sql[line_start..]
            .char_indices()
            .nth(column)
            .map_or(self.sql.len(), |(i, _)| line_start + i)
    }
}

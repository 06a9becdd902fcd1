//! # Aether Reasoner
//!
//! Turns a natural-language database command plus a schema snapshot into a
//! single SQL statement, a confidence score and a safety verdict. The crate
//! never executes SQL; callers decide what to do with the decision.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aether_reasoner::{
//!     CommandPayload, PipelineSettings, ReasoningClient, ReasoningPipeline, RetryPolicy,
//!     RuleBasedGenerator, SafetyPolicy, SchemaSnapshot, SchemaStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let snapshot = SchemaSnapshot::parse_text(
//!         "Table employees: id (int) PK, name (varchar), department (varchar)",
//!     )?;
//!     let store = Arc::new(SchemaStore::with_snapshot(snapshot));
//!     let client = ReasoningClient::new(Arc::new(RuleBasedGenerator::new()), RetryPolicy::default());
//!     let pipeline = ReasoningPipeline::new(client, store, PipelineSettings::default());
//!
//!     let output = pipeline
//!         .reason(&CommandPayload::from_text("how many employees are there"), &SafetyPolicy::default())
//!         .await?;
//!     println!("{}", output.render());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod generator;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod response;
pub mod safety;
pub mod schema;
pub mod sql;

pub use client::{Exchange, ReasoningClient, RetryPolicy, TextGenerator};
pub use command::{CommandPayload, Intent};
pub use config::{LlmSettings, Provider, ReasonerConfig};
pub use error::{ReasonerError, Result};
pub use generator::{build_generator, LlmGenerator, RuleBasedGenerator};
pub use output::{OutputMetadata, ReasonerOutput};
pub use pipeline::{PipelineSettings, PipelineStage, ReasoningPipeline};
pub use prompt::{PromptBuilder, PromptContext};
pub use response::{parse_response, ParseError, ParsedCandidate};
pub use safety::{SafetyAssessment, SafetyPolicy};
pub use schema::{ColumnSchema, ForeignKeyRef, SchemaSnapshot, SchemaStore, TableSchema};
pub use sql::{SqlDialect, StatementKind};

//! The reasoning pipeline: command and schema in, decision out.
//!
//! Each call walks `Built → Prompted → Responded → Parsed → Validated →
//! Scored → Done`. Missing schema and an unreachable model abort the call;
//! an unusable reply ends in `Failed` but still yields a [`ReasonerOutput`]
//! explaining why. Nothing survives between calls apart from the schema
//! store and the settings.

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::ReasoningClient;
use crate::command::CommandPayload;
use crate::error::{ReasonerError, Result};
use crate::output::{OutputMetadata, ReasonerOutput};
use crate::prompt::{PromptBuilder, PromptContext, DEFAULT_MAX_SCHEMA_CHARS};
use crate::response::parse_response;
use crate::safety::{score, SafetyPolicy};
use crate::schema::SchemaStore;
use crate::sql::{validate, SqlDialect};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Built,
    Prompted,
    Responded,
    Parsed,
    Validated,
    Scored,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Built => "built",
            PipelineStage::Prompted => "prompted",
            PipelineStage::Responded => "responded",
            PipelineStage::Parsed => "parsed",
            PipelineStage::Validated => "validated",
            PipelineStage::Scored => "scored",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Used when the command carries no dialect of its own
    pub dialect: SqlDialect,
    pub max_schema_prompt_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::default(),
            max_schema_prompt_chars: DEFAULT_MAX_SCHEMA_CHARS,
        }
    }
}

pub struct ReasoningPipeline {
    client: ReasoningClient,
    store: Arc<SchemaStore>,
    settings: PipelineSettings,
}

/// Stage tracker for one call
struct Run {
    stage: PipelineStage,
}

impl Run {
    fn advance(&mut self, next: PipelineStage) {
        debug!(from = self.stage.as_str(), to = next.as_str(), "pipeline stage");
        self.stage = next;
    }
}

impl ReasoningPipeline {
    pub fn new(client: ReasoningClient, store: Arc<SchemaStore>, settings: PipelineSettings) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<SchemaStore> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn reason(
        &self,
        command: &CommandPayload,
        policy: &SafetyPolicy,
    ) -> Result<ReasonerOutput> {
        self.run(command, policy, None).await
    }

    /// Like [`reason`](Self::reason), but retries never run past `deadline`
    pub async fn reason_until(
        &self,
        command: &CommandPayload,
        policy: &SafetyPolicy,
        deadline: Instant,
    ) -> Result<ReasonerOutput> {
        self.run(command, policy, Some(deadline)).await
    }

    async fn run(
        &self,
        command: &CommandPayload,
        policy: &SafetyPolicy,
        deadline: Option<Instant>,
    ) -> Result<ReasonerOutput> {
        let started = Instant::now();
        let mut run = Run {
            stage: PipelineStage::Built,
        };

        // Take the snapshot once; a concurrent refresh does not affect this call
        let (schema_version, snapshot) = match command.snapshot() {
            Some(pinned) => (None, Arc::clone(pinned)),
            None => match self.store.current() {
                Some((version, snapshot)) => (Some(version), snapshot),
                None => {
                    run.advance(PipelineStage::Failed);
                    return Err(ReasonerError::schema("no schema snapshot loaded"));
                }
            },
        };
        let dialect = command.dialect().unwrap_or(self.settings.dialect);

        let prompt = PromptBuilder::new(self.settings.max_schema_prompt_chars).build(
            command,
            &snapshot,
            dialect,
        );
        run.advance(PipelineStage::Prompted);

        let exchange = match self.client.send(&prompt, deadline).await {
            Ok(exchange) => exchange,
            Err(e) => {
                run.advance(PipelineStage::Failed);
                warn!(error = %e, "reasoning service unavailable");
                return Err(e);
            }
        };
        run.advance(PipelineStage::Responded);

        let mut metadata = OutputMetadata {
            dialect,
            intent: command.intent(),
            truncation_applied: prompt.truncated,
            omitted_tables: prompt.omitted_tables.clone(),
            elapsed_ms: 0,
            attempts: exchange.attempts,
            generator: self.client.generator_name().to_string(),
            schema_version,
            statement_kind: None,
            normalized_sql: None,
            destructive: false,
            tables: Vec::new(),
            rationale: None,
            stage: String::new(),
        };

        let candidate = match parse_response(&exchange.text) {
            Ok(candidate) => candidate,
            Err(e) => {
                run.advance(PipelineStage::Failed);
                debug!(error = %e, "no usable candidate in reply");
                metadata.elapsed_ms = elapsed_ms(started);
                metadata.stage = run.stage.as_str().to_string();
                return Ok(ReasonerOutput {
                    sql: String::new(),
                    confidence: 0.0,
                    safe_to_execute: false,
                    warnings: truncation_warning(&prompt).into_iter().collect(),
                    errors: vec![e.to_string()],
                    metadata,
                });
            }
        };
        run.advance(PipelineStage::Parsed);

        let report = validate(&candidate.sql, &snapshot, dialect);
        run.advance(PipelineStage::Validated);

        let assessment = score(&candidate, &report, command, policy);
        run.advance(PipelineStage::Scored);

        if assessment.destructive && !policy.allow_destructive {
            warn!(kind = %report.profile.kind, "destructive statement held for approval");
        }

        let mut warnings = report.warnings.clone();
        warnings.extend(truncation_warning(&prompt));
        warnings.extend(
            candidate
                .declared_warnings
                .iter()
                .map(|w| format!("model: {}", w)),
        );
        if candidate.clarification_requested {
            warnings.push("model asked for clarification; review the request".to_string());
        }
        warnings.extend(assessment.warnings);

        run.advance(PipelineStage::Done);
        metadata.elapsed_ms = elapsed_ms(started);
        metadata.statement_kind = Some(report.profile.kind.to_string());
        metadata.normalized_sql = report.normalized.clone();
        metadata.destructive = assessment.destructive;
        metadata.tables = report.tables.clone();
        metadata.rationale = candidate.rationale.clone();
        metadata.stage = run.stage.as_str().to_string();

        info!(
            dialect = %dialect,
            attempts = exchange.attempts,
            elapsed_ms = metadata.elapsed_ms,
            confidence = assessment.confidence,
            safe = assessment.safe_to_execute,
            "reasoning call complete"
        );

        Ok(ReasonerOutput {
            sql: candidate.sql,
            confidence: assessment.confidence,
            safe_to_execute: assessment.safe_to_execute,
            warnings,
            errors: report.errors.iter().map(ToString::to_string).collect(),
            metadata,
        })
    }
}

fn truncation_warning(prompt: &PromptContext) -> Option<String> {
    prompt.truncated.then(|| {
        format!(
            "schema truncated to fit the prompt; omitted tables: {}",
            prompt.omitted_tables.join(", ")
        )
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

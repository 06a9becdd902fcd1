use super::*;
use crate::client::{RetryPolicy, TextGenerator};
use crate::command::Intent;
use crate::schema::SchemaSnapshot;
use aether_llm_sdk::LlmError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Returns a fixed reply and remembers the prompts it was given
struct FixedReply {
    reply: String,
    prompts: Mutex<Vec<PromptContext>>,
}

impl FixedReply {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TextGenerator for FixedReply {
    async fn generate(&self, prompt: &PromptContext) -> std::result::Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn company() -> SchemaSnapshot {
    SchemaSnapshot::parse_text(
        "Database: company\n\
         Table employees: id (int, PK), name (varchar), department (varchar)\n\
         Table students: id (int, PK), name (varchar)\n",
    )
    .unwrap()
}

fn pipeline_with(generator: Arc<dyn TextGenerator>, store: Arc<SchemaStore>) -> ReasoningPipeline {
    let policy = RetryPolicy {
        max_attempts: 2,
        request_timeout: Duration::from_millis(200),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    };
    ReasoningPipeline::new(
        ReasoningClient::new(generator, policy),
        store,
        PipelineSettings::default(),
    )
}

#[tokio::test]
async fn test_done_stage_and_metadata() {
    let generator = FixedReply::new(
        r#"{"sql": "SELECT name FROM employees", "explanation": "Names of all employees"}"#,
    );
    let store = Arc::new(SchemaStore::with_snapshot(company()));
    let pipeline = pipeline_with(generator.clone(), store);

    let command = CommandPayload::new(Intent::Query, "list employee names");
    let output = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap();

    assert_eq!(output.sql, "SELECT name FROM employees;");
    assert_eq!(output.metadata.stage, "done");
    assert_eq!(output.metadata.attempts, 1);
    assert_eq!(output.metadata.generator, "fixed");
    assert_eq!(output.metadata.schema_version, Some(1));
    assert_eq!(output.metadata.statement_kind.as_deref(), Some("SELECT"));
    assert_eq!(
        output.metadata.normalized_sql.as_deref(),
        Some("SELECT name FROM employees;")
    );
    assert_eq!(output.metadata.tables, vec!["employees"]);
    assert_eq!(
        output.metadata.rationale.as_deref(),
        Some("Names of all employees")
    );
    assert!(output.safe_to_execute);
}

#[tokio::test]
async fn test_missing_snapshot_is_schema_error() {
    let pipeline = pipeline_with(FixedReply::new("SELECT 1;"), Arc::new(SchemaStore::new()));
    let command = CommandPayload::from_text("show employees");

    let err = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReasonerError::Schema { .. }));
}

#[tokio::test]
async fn test_pinned_snapshot_and_dialect_override() {
    let generator = FixedReply::new("SELECT * FROM students;");
    let pipeline = pipeline_with(generator.clone(), Arc::new(SchemaStore::new()));

    let pinned = Arc::new(company().subset(&["students"]).unwrap());
    let command = CommandPayload::from_text("show students")
        .with_snapshot(pinned)
        .with_dialect(SqlDialect::Sqlite);
    let output = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap();

    assert_eq!(output.metadata.dialect, SqlDialect::Sqlite);
    assert_eq!(output.metadata.schema_version, None);
    assert!(output.safe_to_execute);

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts[0].included_tables, vec!["students"]);
    assert_eq!(prompts[0].dialect, SqlDialect::Sqlite);
}

#[tokio::test]
async fn test_unparseable_reply_fails_with_output() {
    let pipeline = pipeline_with(
        FixedReply::new("I cannot help with that."),
        Arc::new(SchemaStore::with_snapshot(company())),
    );
    let command = CommandPayload::from_text("show employees");
    let output = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap();

    assert_eq!(output.metadata.stage, "failed");
    assert!(output.sql.is_empty());
    assert!(!output.safe_to_execute);
    assert_eq!(output.errors, vec!["no SQL statement found in the response"]);
}

#[tokio::test]
async fn test_clarification_surfaces_as_error() {
    let pipeline = pipeline_with(
        FixedReply::new(r#"{"sql": null, "clarify_required": true, "explanation": "Which table?"}"#),
        Arc::new(SchemaStore::with_snapshot(company())),
    );
    let command = CommandPayload::from_text("show the things");
    let output = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap();

    assert_eq!(output.errors, vec!["clarification required: Which table?"]);
    assert!(output.sql.is_empty());
}

#[tokio::test]
async fn test_refresh_does_not_affect_taken_snapshot() {
    let store = Arc::new(SchemaStore::with_snapshot(company()));
    let pipeline = pipeline_with(FixedReply::new("SELECT * FROM students;"), store.clone());
    let command = CommandPayload::from_text("show students");

    let before = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap();
    assert!(before.errors.is_empty());

    store.replace(
        SchemaSnapshot::parse_text("Database: company\nTable employees: id, name").unwrap(),
    );
    let after = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap();

    assert_eq!(after.metadata.schema_version, Some(2));
    assert_eq!(after.errors, vec!["unknown table 'students'"]);
    assert!(!after.safe_to_execute);
}

#[tokio::test]
async fn test_concurrent_calls_with_different_policies() {
    let store = Arc::new(SchemaStore::with_snapshot(company()));
    let pipeline = Arc::new(pipeline_with(FixedReply::new("DELETE FROM students;"), store));
    let command = CommandPayload::from_text("delete all students");

    let strict = SafetyPolicy::default();
    let permissive = SafetyPolicy::default().allowing_destructive();
    let (a, b) = tokio::join!(
        pipeline.reason(&command, &strict),
        pipeline.reason(&command, &permissive)
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(!a.safe_to_execute);
    assert_eq!(a.confidence, 0.5);
    assert!(b.safe_to_execute);
    assert_eq!(b.confidence, 1.0);
}

#[tokio::test]
async fn test_truncation_reported_in_metadata() {
    let store = Arc::new(SchemaStore::with_snapshot(company()));
    let pipeline = ReasoningPipeline::new(
        ReasoningClient::new(FixedReply::new("SELECT * FROM students;"), RetryPolicy::default()),
        store,
        PipelineSettings {
            dialect: SqlDialect::Mysql,
            max_schema_prompt_chars: 80,
        },
    );
    let command = CommandPayload::from_text("show students");
    let output = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap();

    assert!(output.metadata.truncation_applied);
    assert_eq!(output.metadata.omitted_tables, vec!["employees"]);
    // Truncation is reported but does not lower confidence
    assert_eq!(output.confidence, 1.0);
}

use aether_llm_sdk::LlmError;
use aether_reasoner::{
    CommandPayload, Intent, PipelineSettings, PromptContext, ReasonerError, ReasoningClient,
    ReasoningPipeline, RetryPolicy, RuleBasedGenerator, SafetyPolicy, SchemaSnapshot,
    SchemaStore, SqlDialect, TextGenerator,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Replies with the same text every time
struct Scripted(String);

#[async_trait]
impl TextGenerator for Scripted {
    async fn generate(&self, _prompt: &PromptContext) -> Result<String, LlmError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Never answers within the request timeout
struct Stalled {
    calls: AtomicU32,
}

#[async_trait]
impl TextGenerator for Stalled {
    async fn generate(&self, _prompt: &PromptContext) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

fn snapshot() -> SchemaSnapshot {
    SchemaSnapshot::parse_text(
        "Database: school\n\
         Table employees: id (int) PK, name (varchar), department (varchar)\n\
         Table students: id (int) PK, name (varchar), grade (int)\n",
    )
    .unwrap()
}

fn quick_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        request_timeout: Duration::from_millis(50),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

fn pipeline(generator: Arc<dyn TextGenerator>) -> ReasoningPipeline {
    ReasoningPipeline::new(
        ReasoningClient::new(generator, quick_retries()),
        Arc::new(SchemaStore::with_snapshot(snapshot())),
        PipelineSettings {
            dialect: SqlDialect::Mysql,
            ..PipelineSettings::default()
        },
    )
}

fn scripted(reply: &str) -> ReasoningPipeline {
    pipeline(Arc::new(Scripted(reply.to_string())))
}

#[tokio::test]
async fn test_select_with_filter_is_safe() {
    let pipeline = scripted(
        r#"{"sql": "SELECT * FROM employees WHERE department='Engineering'", "explanation": "Engineering staff"}"#,
    );
    let command = CommandPayload::from_text("show employees in Engineering");

    let output = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap();

    assert_eq!(
        output.sql,
        "SELECT * FROM employees WHERE department='Engineering';"
    );
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);
    assert!(output.errors.is_empty());
    assert_eq!(output.confidence, 1.0);
    assert!(output.safe_to_execute);
    assert_eq!(output.metadata.intent, Intent::Query);
    assert_eq!(output.metadata.dialect, SqlDialect::Mysql);
}

#[tokio::test]
async fn test_delete_all_is_held_without_override() {
    let pipeline = pipeline(Arc::new(RuleBasedGenerator::new()));
    let command = CommandPayload::from_text("delete all students");

    let held = pipeline
        .reason(&command, &SafetyPolicy::default())
        .await
        .unwrap();
    assert!(held.sql.starts_with("DELETE FROM students"));
    assert!(held.metadata.destructive);
    assert_eq!(held.confidence, 0.5);
    assert!(!held.safe_to_execute);
    assert!(held.errors.is_empty());

    let allowed = pipeline
        .reason(&command, &SafetyPolicy::default().allowing_destructive())
        .await
        .unwrap();
    assert!(allowed.metadata.destructive);
    assert!(allowed.safe_to_execute);
}

#[tokio::test]
async fn test_all_attempts_timing_out_is_unavailable() {
    let generator = Arc::new(Stalled {
        calls: AtomicU32::new(0),
    });
    let pipeline = pipeline(generator.clone());

    let result = pipeline
        .reason(
            &CommandPayload::from_text("show students"),
            &SafetyPolicy::default(),
        )
        .await;

    match result {
        Err(ReasonerError::ReasoningUnavailable { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected ReasoningUnavailable, got {:?}", other),
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_two_statements_are_rejected() {
    let pipeline = scripted("SELECT * FROM employees; DELETE FROM students;");

    let output = pipeline
        .reason(
            &CommandPayload::from_text("show employees"),
            &SafetyPolicy::default(),
        )
        .await
        .unwrap();

    assert!(output.sql.is_empty());
    assert!(!output.errors.is_empty());
    assert!(!output.safe_to_execute);
    assert_eq!(output.confidence, 0.0);
    assert_eq!(output.metadata.stage, "failed");
}

#[tokio::test]
async fn test_unknown_table_never_validates() {
    let replies = [
        "SELECT * FROM payroll;",
        "SELECT e.name FROM employees e JOIN payroll p ON p.id = e.id;",
        "DELETE FROM payroll WHERE id = 1;",
        "UPDATE payroll SET amount = 0 WHERE id = 2;",
        "INSERT INTO payroll (id) VALUES (1);",
        "SELECT name FROM school.payroll;",
        "CREATE TABLE enrolments (id INT, course_id INT REFERENCES payroll(id));",
        "ALTER TABLE students ADD CONSTRAINT fk FOREIGN KEY (id) REFERENCES payroll(id);",
    ];

    for dialect in [SqlDialect::Mysql, SqlDialect::Postgres, SqlDialect::Sqlite] {
        for reply in replies {
            let output = scripted(reply)
                .reason(
                    &CommandPayload::from_text("anything").with_dialect(dialect),
                    &SafetyPolicy::default().allowing_destructive(),
                )
                .await
                .unwrap();
            assert!(
                output.errors.iter().any(|e| e.contains("payroll")),
                "{} ({}): {:?}",
                reply,
                dialect,
                output.errors
            );
            assert!(!output.safe_to_execute, "{} ({})", reply, dialect);
        }
    }
}

#[tokio::test]
async fn test_safe_outputs_meet_the_threshold() {
    let replies = [
        "SELECT name FROM employees;",
        "SELECT nickname FROM employees;",
        "SELECT s.name, e.name FROM students s, employees e;",
        "UPDATE students SET grade = 5;",
        "DELETE FROM students WHERE grade < 2;",
        "INSERT INTO students (id, name, grade) VALUES (1, 'Ada', 3);",
        "DROP TABLE students;",
        "Sure! Here you go:\n```sql\nSELECT id FROM students WHERE grade > 3\n```",
    ];
    let policies = [
        SafetyPolicy::default(),
        SafetyPolicy::default().allowing_destructive(),
        SafetyPolicy {
            confidence_threshold: 0.5,
            ..SafetyPolicy::default()
        },
    ];

    for reply in replies {
        for policy in &policies {
            let output = scripted(reply)
                .reason(&CommandPayload::from_text("students and employees"), policy)
                .await
                .unwrap();
            if output.errors.is_empty() && output.safe_to_execute {
                assert!(
                    output.confidence >= policy.confidence_threshold,
                    "{}: {}",
                    reply,
                    output.confidence
                );
            }
            if output.metadata.destructive && !policy.allow_destructive {
                assert!(!output.safe_to_execute, "{}", reply);
            }
        }
    }
}

#[tokio::test]
async fn test_offline_generator_counts_rows() {
    let output = pipeline(Arc::new(RuleBasedGenerator::new()))
        .reason(
            &CommandPayload::from_text("how many employees are there"),
            &SafetyPolicy::default(),
        )
        .await
        .unwrap();

    assert_eq!(output.sql, "SELECT COUNT(*) FROM employees;");
    assert!(output.safe_to_execute);
    assert_eq!(output.metadata.generator, "offline");
}

use aether_llm_sdk::{
    client::LlmClient,
    error::LlmError,
    gemini::GeminiClient,
    ollama::OllamaClient,
    types::{CompletionRequest, Message, ResponseFormat, Role},
};

const GEMINI_PATH: &str = "/v1beta/models/gemini-2.0-flash-001:generateContent";

fn sql_request() -> CompletionRequest {
    let mut request = CompletionRequest::single_turn(
        "",
        Some("Return JSON only.".to_string()),
        "list all employees",
    );
    request.response_format = Some(ResponseFormat::JsonObject);
    request
}

#[tokio::test]
async fn test_gemini_complete_returns_text() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", GEMINI_PATH)
        .match_header("x-goog-api-key", "test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "{\"sql\": \"SELECT * FROM employees;\"}"}]},
                    "finishReason": "STOP",
                    "index": 0
                }],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 9, "totalTokenCount": 21}
            }"#,
        )
        .create_async()
        .await;

    let client = GeminiClient::new("test-key")
        .unwrap()
        .with_base_url(server.url());
    let response = client.complete(sql_request()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.text(), r#"{"sql": "SELECT * FROM employees;"}"#);
    assert_eq!(response.usage.input_tokens, 12);
    assert_eq!(response.usage.output_tokens, 9);
    assert_eq!(response.stop_reason.as_deref(), Some("STOP"));
}

#[tokio::test]
async fn test_gemini_unauthorized_is_not_transient() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", GEMINI_PATH)
        .with_status(401)
        .with_body(r#"{"error": {"code": 401, "message": "API key not valid", "status": "UNAUTHENTICATED"}}"#)
        .create_async()
        .await;

    let client = GeminiClient::new("bad-key")
        .unwrap()
        .with_base_url(server.url());
    let err = client.complete(sql_request()).await.unwrap_err();

    assert!(matches!(err, LlmError::Authentication { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_gemini_unavailable_is_transient() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", GEMINI_PATH)
        .with_status(503)
        .with_body("upstream overloaded")
        .create_async()
        .await;

    let client = GeminiClient::new("test-key")
        .unwrap()
        .with_base_url(server.url());
    let err = client.complete(sql_request()).await.unwrap_err();

    match &err {
        LlmError::Api { status, .. } => assert_eq!(*status, 503),
        other => panic!("Expected Api error, got {other:?}"),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_gemini_rate_limit_carries_retry_hint() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", GEMINI_PATH)
        .with_status(429)
        .with_header("retry-after", "3")
        .with_body("quota exceeded")
        .create_async()
        .await;

    let client = GeminiClient::new("test-key")
        .unwrap()
        .with_base_url(server.url());
    let err = client.complete(sql_request()).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(3));
}

#[tokio::test]
async fn test_gemini_rejects_requests_without_user_turns() {
    let client = GeminiClient::new("test-key").unwrap();

    let mut empty = sql_request();
    empty.messages.clear();
    let err = client.complete(empty).await.unwrap_err();
    assert!(matches!(err, LlmError::InvalidRequest { .. }));

    let mut system_turn = sql_request();
    system_turn.messages = vec![Message::text(Role::System, "be strict")];
    let err = client.complete(system_turn).await.unwrap_err();
    assert!(matches!(err, LlmError::InvalidRequest { .. }));
}

#[tokio::test]
async fn test_ollama_complete_returns_text() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"model": "llama3.2", "format": "json", "stream": false}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "model": "llama3.2",
                "created_at": "2026-01-01T00:00:00Z",
                "message": {"role": "assistant", "content": "{\"sql\": \"SELECT 1;\"}"},
                "done": true,
                "done_reason": "stop",
                "prompt_eval_count": 30,
                "eval_count": 7
            }"#,
        )
        .create_async()
        .await;

    let client = OllamaClient::new().unwrap().with_base_url(server.url());
    let response = client.complete(sql_request()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.text(), r#"{"sql": "SELECT 1;"}"#);
    assert_eq!(response.usage.input_tokens, 30);
    assert_eq!(response.stop_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_ollama_server_error_is_transient() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(500)
        .with_body("model crashed")
        .create_async()
        .await;

    let client = OllamaClient::new().unwrap().with_base_url(server.url());
    let err = client.complete(sql_request()).await.unwrap_err();

    assert!(err.is_transient());
}

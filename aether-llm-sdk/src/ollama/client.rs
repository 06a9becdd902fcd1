use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::{
    error::LlmError,
    ollama::types::{OllamaChatRequest, OllamaChatResponse, OllamaMessage, OllamaOptions, OllamaRole},
};

/// Ollama local LLM client
pub struct OllamaClient {
    base_url: String,
    default_model: String,
    http_client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client with default base URL
    pub fn new() -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::Network { source: e })?;

        Ok(Self {
            base_url: "http://localhost:11434".to_string(),
            default_model: crate::models::ollama::DEFAULT_MODEL.to_string(),
            http_client,
        })
    }

    /// Set a custom base URL for the API
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Create a chat message using the Ollama /api/chat endpoint
    pub async fn create_chat(
        &self,
        request: OllamaChatRequest,
    ) -> Result<OllamaChatResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if crate::log_payloads() {
            if let Ok(json_str) = serde_json::to_string_pretty(&request) {
                tracing::debug!("Ollama request:\n{}", json_str);
            }
        }

        let response = self
            .http_client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network { source: e })?;

        let status = response.status();

        if status.is_success() {
            let ollama_response: OllamaChatResponse = response
                .json()
                .await
                .map_err(|e| LlmError::internal(format!("Failed to parse response: {}", e)))?;

            if crate::log_payloads() {
                tracing::debug!(
                    model = %ollama_response.model,
                    "Ollama response:\n{}",
                    ollama_response.message.content
                );
            }

            Ok(ollama_response)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(LlmError::from_status(status.as_u16(), error_text, None))
        }
    }
}

#[async_trait]
impl crate::client::LlmClient for OllamaClient {
    async fn complete(
        &self,
        request: crate::types::CompletionRequest,
    ) -> Result<crate::types::CompletionResponse, LlmError> {
        let mut messages = Vec::new();

        // System prompt goes first
        if let Some(system_prompt) = request.system {
            messages.push(OllamaMessage::new(OllamaRole::System, system_prompt));
        }

        messages.extend(request.messages.iter().map(|msg| {
            let role = match msg.role {
                crate::types::Role::User => OllamaRole::User,
                crate::types::Role::Assistant => OllamaRole::Assistant,
                crate::types::Role::System => OllamaRole::System,
            };
            OllamaMessage::new(role, msg.joined_text())
        }));

        let options = OllamaOptions {
            temperature: request.temperature,
            top_p: request.top_p,
            stop: request.stop_sequences,
            num_predict: (request.max_tokens > 0).then_some(request.max_tokens),
        };

        let format = match request.response_format {
            Some(crate::types::ResponseFormat::JsonObject) => Some("json".to_string()),
            _ => None,
        };

        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let ollama_request = OllamaChatRequest {
            model,
            messages,
            format,
            options: options.into_option(),
            // Single JSON response instead of a stream of chunks
            stream: Some(false),
        };

        let ollama_response = self.create_chat(ollama_request).await?;

        Ok(crate::types::CompletionResponse {
            content: vec![crate::types::ContentBlock::Text {
                text: ollama_response.message.content,
            }],
            role: crate::types::Role::Assistant,
            usage: crate::types::Usage {
                input_tokens: ollama_response.prompt_eval_count.unwrap_or(0),
                output_tokens: ollama_response.eval_count.unwrap_or(0),
            },
            stop_reason: ollama_response.done_reason,
        })
    }

    fn provider_name(&self) -> &str {
        crate::providers::OLLAMA
    }

    fn model_name(&self) -> &str {
        &self.default_model
    }
}

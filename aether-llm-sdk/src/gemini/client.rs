use super::types::*;
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

/// Google Gemini API client
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    default_model: String,
    http_client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::authentication("API key cannot be empty"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::Network { source: e })?;

        Ok(Self {
            api_key,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            default_model: crate::models::gemini::DEFAULT_MODEL.to_string(),
            http_client,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub async fn generate_content(
        &self,
        model: impl Into<String>,
        request: GeminiGenerateContentRequest,
    ) -> Result<GeminiGenerateContentResponse, LlmError> {
        let model = model.into();
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| LlmError::authentication(format!("Invalid API key format: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if crate::log_payloads() {
            if let Ok(json_str) = serde_json::to_string_pretty(&request) {
                tracing::debug!(%model, "Gemini request:\n{}", json_str);
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

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse().ok());

            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(&error_body) {
                return Err(LlmError::from_status(
                    error_response.error.code,
                    error_response.error.message,
                    retry_after,
                ));
            }

            return Err(LlmError::from_status(
                status.as_u16(),
                error_body,
                retry_after,
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Network { source: e })?;

        if crate::log_payloads() {
            tracing::debug!(%model, "Gemini response:\n{}", body);
        }

        let generate_response = serde_json::from_str::<GeminiGenerateContentResponse>(&body)
            .map_err(|e| LlmError::internal(format!("Failed to parse response: {}", e)))?;

        Ok(generate_response)
    }

    pub fn provider_name(&self) -> &str {
        crate::providers::GOOGLE
    }
}

#[async_trait]
impl crate::client::LlmClient for GeminiClient {
    async fn complete(
        &self,
        request: crate::types::CompletionRequest,
    ) -> Result<crate::types::CompletionResponse, LlmError> {
        let contents = request
            .messages
            .iter()
            .map(|msg| match msg.role {
                crate::types::Role::User => Ok(GeminiContent::user(msg.joined_text())),
                crate::types::Role::Assistant => Ok(GeminiContent::model(msg.joined_text())),
                crate::types::Role::System => Err(LlmError::invalid_request(
                    "System messages should be provided via the system parameter",
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if contents.is_empty() {
            return Err(LlmError::invalid_request(
                "At least one message is required",
            ));
        }

        let response_mime_type = match request.response_format {
            Some(crate::types::ResponseFormat::JsonObject) => {
                Some("application/json".to_string())
            }
            _ => None,
        };

        let gemini_request = GeminiGenerateContentRequest {
            contents,
            system_instruction: request.system.map(GeminiContent::instruction),
            generation_config: Some(GenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
                top_k: None,
                max_output_tokens: Some(request.max_tokens),
                stop_sequences: request.stop_sequences,
                response_mime_type,
            }),
        };

        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let gemini_response = self.generate_content(model, gemini_request).await?;

        let text = gemini_response.text().ok_or_else(|| {
            let reason = gemini_response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "no candidates".to_string());
            LlmError::internal(format!("Gemini returned no text ({})", reason))
        })?;

        let usage = gemini_response
            .usage_metadata
            .as_ref()
            .map(|u| crate::types::Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(crate::types::CompletionResponse {
            content: vec![crate::types::ContentBlock::Text { text }],
            role: crate::types::Role::Assistant,
            usage,
            stop_reason: gemini_response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone()),
        })
    }

    fn provider_name(&self) -> &str {
        crate::providers::GOOGLE
    }

    fn model_name(&self) -> &str {
        &self.default_model
    }
}

//! [`TextGenerator`] implementations.

use aether_llm_sdk::{
    gemini::GeminiClient,
    ollama::OllamaClient,
    types::{CompletionRequest, ResponseFormat},
    LlmClient, LlmError,
};
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, OnceLock};

use crate::client::TextGenerator;
use crate::config::{LlmSettings, Provider};
use crate::error::{ReasonerError, Result};
use crate::prompt::PromptContext;

/// Generator backed by a remote or local model
pub struct LlmGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f32>,
    max_tokens: u32,
}

impl LlmGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: None,
            max_tokens: 1024,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate(&self, prompt: &PromptContext) -> std::result::Result<String, LlmError> {
        let mut request = CompletionRequest::single_turn(
            self.model.clone(),
            Some(prompt.system_instructions.to_string()),
            prompt.user_prompt(),
        );
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        request.response_format = Some(ResponseFormat::JsonObject);

        let response = self.client.complete(request).await?;
        Ok(response.text())
    }

    fn name(&self) -> &str {
        self.client.provider_name()
    }
}

/// Deterministic offline generator.
///
/// Understands a handful of request shapes (counting rows, listing a table,
/// deleting everything from a table, creating a table with named fields) and
/// asks for clarification otherwise. Replies use the same JSON format as a
/// real model.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedGenerator;

struct Rules {
    count_from: Regex,
    how_many: Regex,
    create_table: Regex,
    delete_all: Regex,
    show: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| {
        let build = |pattern: &str| match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => unreachable!("invalid built-in pattern {pattern}: {e}"),
        };
        Rules {
            count_from: build(r"\bfrom\s+[`\x22]?(\w+)"),
            how_many: build(r"\bhow\s+many\s+(\w+)"),
            create_table: build(
                r"\bcreate\s+(?:a\s+)?(?:new\s+)?table\s+(?:called\s+|named\s+)?(\w+)\s+with\s+(?:fields|columns)\s+(.+)",
            ),
            delete_all: build(r"\b(?:delete|remove)\s+(?:all\s+)?(?:the\s+)?(?:rows\s+(?:of|from)\s+)?(\w+)"),
            show: build(
                r"\b(?:show|list|display)(?:\s+me)?(?:\s+all)?(?:\s+the)?(?:\s+rows)?(?:\s+of)?\s+(\w+)",
            ),
        }
    })
}

impl RuleBasedGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Reply for a request, resolving table words against the prompt's tables
    pub fn reply(&self, prompt: &PromptContext) -> String {
        let r = rules();
        let request = prompt.command_text.to_lowercase();
        let table = |word: &str| resolve_table(prompt, word);

        if request.split_whitespace().any(|w| w == "count") || r.how_many.is_match(&request) {
            let word = r
                .count_from
                .captures(&request)
                .or_else(|| r.how_many.captures(&request))
                .map(|caps| caps[1].to_string());
            return match word {
                Some(word) => {
                    let table = table(&word);
                    reply(
                        Some(format!("SELECT COUNT(*) FROM {};", table)),
                        "Count rows",
                        &[&table],
                        false,
                    )
                }
                None => clarification("Which table should be counted?"),
            };
        }

        if let Some(caps) = r.create_table.captures(&request) {
            let name = caps[1].to_string();
            let fields: Vec<String> = caps[2]
                .replace(" and ", ",")
                .split(',')
                .filter_map(|part| part.split_whitespace().next())
                .map(|word| format!("{} VARCHAR(255)", word))
                .collect();
            if fields.is_empty() {
                return clarification("Which fields should the new table have?");
            }
            return reply(
                Some(format!("CREATE TABLE {} ({});", name, fields.join(", "))),
                "Create table",
                &[&name],
                false,
            );
        }

        if let Some(caps) = r.delete_all.captures(&request) {
            let table = table(&caps[1]);
            return reply(
                Some(format!("DELETE FROM {};", table)),
                &format!("Delete every row from {}", table),
                &[&table],
                true,
            );
        }

        if let Some(caps) = r.show.captures(&request) {
            let table = table(&caps[1]);
            return reply(
                Some(format!("SELECT * FROM {};", table)),
                &format!("Select all rows from {}", table),
                &[&table],
                false,
            );
        }

        clarification("Ambiguous request, clarification required")
    }
}

/// Prefer the spelling of a prompt table the word refers to
fn resolve_table(prompt: &PromptContext, word: &str) -> String {
    prompt
        .included_tables
        .iter()
        .find(|t| {
            let t = t.to_lowercase();
            t == word || format!("{}s", t) == word || format!("{}s", word) == t
        })
        .cloned()
        .unwrap_or_else(|| word.to_string())
}

fn reply(sql: Option<String>, explanation: &str, tables: &[&str], destructive: bool) -> String {
    json!({
        "sql": sql,
        "explanation": explanation,
        "warnings": [],
        "used_tables": tables,
        "clarify_required": false,
        "destructive": destructive,
    })
    .to_string()
}

fn clarification(explanation: &str) -> String {
    json!({
        "sql": null,
        "explanation": explanation,
        "warnings": [],
        "used_tables": [],
        "clarify_required": true,
        "destructive": false,
    })
    .to_string()
}

#[async_trait]
impl TextGenerator for RuleBasedGenerator {
    async fn generate(&self, prompt: &PromptContext) -> std::result::Result<String, LlmError> {
        Ok(self.reply(prompt))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Generator for the configured provider
pub fn build_generator(settings: &LlmSettings) -> Result<Arc<dyn TextGenerator>> {
    let generator: Arc<dyn TextGenerator> = match settings.provider {
        Provider::Gemini => {
            let api_key = settings.resolved_api_key().ok_or_else(|| {
                ReasonerError::configuration(
                    "gemini provider needs llm.api_key or GEMINI_API_KEY",
                )
            })?;
            let mut client = GeminiClient::new(api_key)
                .map_err(|e| ReasonerError::configuration(e.to_string()))?
                .with_default_model(settings.model());
            if let Some(url) = &settings.base_url {
                client = client.with_base_url(url.clone());
            }
            Arc::new(
                LlmGenerator::new(Arc::new(client), settings.model())
                    .with_temperature(settings.temperature)
                    .with_max_tokens(settings.max_output_tokens),
            )
        }
        Provider::Ollama => {
            let mut client = OllamaClient::new()
                .map_err(|e| ReasonerError::configuration(e.to_string()))?
                .with_default_model(settings.model());
            if let Some(url) = &settings.base_url {
                client = client.with_base_url(url.clone());
            }
            Arc::new(
                LlmGenerator::new(Arc::new(client), settings.model())
                    .with_temperature(settings.temperature)
                    .with_max_tokens(settings.max_output_tokens),
            )
        }
        Provider::Offline => Arc::new(RuleBasedGenerator::new()),
    };

    tracing::info!(
        provider = ?settings.provider,
        generator = generator.name(),
        "text generator ready"
    );
    Ok(generator)
}

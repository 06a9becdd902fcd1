//! # Aether LLM SDK
//!
//! Thin provider clients used by the reasoning pipeline to turn a prompt into
//! text. Every provider implements [`client::LlmClient`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use aether_llm_sdk::gemini::GeminiClient;
//! use aether_llm_sdk::types::CompletionRequest;
//! use aether_llm_sdk::LlmClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GeminiClient::new("your-gemini-api-key")?;
//!     let mut request = CompletionRequest::single_turn(
//!         "gemini-2.0-flash-001",
//!         Some("Answer with one SQL statement.".to_string()),
//!         "list all employees",
//!     );
//!     request.max_tokens = 512;
//!
//!     let response = client.complete(request).await?;
//!     println!("Response: {}", response.text());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod gemini;
pub mod models;
pub mod ollama;
pub mod providers;
pub mod types;

pub use client::LlmClient;
pub use error::LlmError;

/// Payload logging switch, read from `AETHER_LLM_LOG_PAYLOADS`
pub(crate) fn log_payloads() -> bool {
    std::env::var_os("AETHER_LLM_LOG_PAYLOADS").is_some()
}

//! Provider name constants

/// Google (Gemini models)
pub const GOOGLE: &str = "google";

/// Ollama local provider
pub const OLLAMA: &str = "ollama";

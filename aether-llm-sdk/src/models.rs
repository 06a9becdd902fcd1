//! Model constants for supported providers

/// Gemini model constants
pub mod gemini {
    /// Gemini 2.0 Flash - fast, generous free tier, good at short SQL answers
    pub const GEMINI_2_0_FLASH_ID: &str = "gemini-2.0-flash-001";

    pub const DEFAULT_MODEL: &str = GEMINI_2_0_FLASH_ID;
}

/// Ollama model constants
pub mod ollama {
    pub const LLAMA_3_2_ID: &str = "llama3.2";

    pub const DEFAULT_MODEL: &str = LLAMA_3_2_ID;
}

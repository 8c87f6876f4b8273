//! Constants used by provider adapters
//!
//! Wire-level names live here so request shaping and response parsing do
//! not scatter string literals across adapters.

/// Default upstream base URLs
pub mod base_urls {
    pub const OPENAI: &str = "https://api.openai.com";
    pub const OPENROUTER: &str = "https://openrouter.ai/api/v1";
    pub const DEEPSEEK: &str = "https://api.deepseek.com";
    pub const GEMINI: &str = "https://generativelanguage.googleapis.com/v1beta";
}

/// URL path segments
pub mod paths {
    pub const CHAT_COMPLETIONS: &str = "/chat/completions";
    pub const VERSIONED_CHAT_COMPLETIONS: &str = "/v1/chat/completions";
    pub const VERSION_SUFFIX: &str = "/v1";

    pub mod gemini {
        pub const MODELS: &str = "models";
        pub const GENERATE: &str = "generateContent";
        pub const STREAM_GENERATE: &str = "streamGenerateContent";
    }
}

/// Request header names sent upstream
pub mod headers {
    pub const AUTHORIZATION: &str = "authorization";
    pub const GOOG_API_KEY: &str = "x-goog-api-key";
    pub const OPENROUTER_REFERER: &str = "HTTP-Referer";
    pub const OPENROUTER_TITLE: &str = "X-Title";
}

/// Gemini model name suffixes handled by the gateway
pub mod model_suffixes {
    pub const STREAMING: &str = "-streaming";
    pub const THINKING: &str = ":thinking";
}

/// Gemini JSON field names
pub mod gemini_fields {
    pub const CONTENTS: &str = "contents";
    pub const ROLE: &str = "role";
    pub const PARTS: &str = "parts";
    pub const TEXT: &str = "text";
    pub const CANDIDATES: &str = "candidates";
    pub const GENERATION_CONFIG: &str = "generationConfig";
    pub const TEMPERATURE: &str = "temperature";
    pub const TOP_P: &str = "topP";
    pub const MAX_OUTPUT_TOKENS: &str = "maxOutputTokens";
    pub const STOP_SEQUENCES: &str = "stopSequences";
    pub const THINKING_CONFIG: &str = "thinkingConfig";
    pub const INCLUDE_THOUGHTS: &str = "includeThoughts";

    pub mod roles {
        pub const MODEL: &str = "model";
        pub const USER: &str = "user";
    }
}

/// Envelope values for reshaped non-streaming responses
pub mod completion {
    pub const OBJECT: &str = "chat.completion";
    pub const GEMINI_ID_PREFIX: &str = "gen-";
}

//! OpenAI endpoint configuration

/// Base URL for API requests, overridable for tests
pub fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
}

/// Per-call HTTP timeout in seconds
pub const TIMEOUT_SECONDS: u64 = 120;

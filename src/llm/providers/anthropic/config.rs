//! Anthropic endpoint configuration

/// Base URL for API requests, overridable for tests
pub fn base_url() -> String {
    std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| "https://api.anthropic.com".to_string())
}

/// Messages API version header value
pub const API_VERSION: &str = "2023-06-01";

/// Per-call HTTP timeout in seconds
pub const TIMEOUT_SECONDS: u64 = 120;

//! Google endpoint configuration

/// Base URL for API requests, overridable for tests
pub fn base_url() -> String {
    std::env::var("GOOGLE_BASE_URL")
        .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string())
}

/// Per-call HTTP timeout in seconds
pub const TIMEOUT_SECONDS: u64 = 120;

/// Model-list cache lifetime in seconds
pub const MODEL_CACHE_TTL_SECONDS: u64 = 600;

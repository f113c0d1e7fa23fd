//! # System Constants
//!
//! Key prefixes, well-known endpoint and service names, and default timings
//! shared by the store, cache, rate limiting and circuit breaker modules.

use std::time::Duration;

/// Prefix of every cache entry key: `cache:<namespace>:<digest>`
pub const CACHE_KEY_PREFIX: &str = "cache";

/// Prefix of every rate limit scope key: `ratelimit:<endpoint>:<identifier>`
pub const RATE_LIMIT_KEY_PREFIX: &str = "ratelimit";

/// Number of hex characters kept from the SHA-256 digest (128 bits)
pub const CACHE_DIGEST_HEX_LEN: usize = 32;

/// Interval between background sweeps of the in-memory store
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Identifier used when no client address can be resolved
pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

/// Well-known endpoint names carrying their own rate limit policy
pub mod endpoints {
    pub const CHAT: &str = "chat";
    pub const UPLOAD: &str = "upload";
    pub const RAG: &str = "rag";
    pub const MEMORY: &str = "memory";
    pub const TOOLS: &str = "tools";
    pub const IMAGE_GENERATION: &str = "image-generation";
    /// Policy applied to endpoints without an explicit entry
    pub const DEFAULT: &str = "default";
}

/// Well-known upstream service names protected by circuit breakers
pub mod services {
    pub const OPENAI: &str = "openai";
    pub const WEATHER: &str = "weather";
    pub const WEB_SEARCH: &str = "web-search";
    pub const IMAGE_GENERATION: &str = "image-generation";
    pub const VIDEO_GENERATION: &str = "video-generation";
    pub const CACHE_BACKEND: &str = "cache-backend";
}

/// Cache namespaces used by the application
pub mod namespaces {
    pub const EMBEDDINGS: &str = "embeddings";
    pub const RAG_QUERY: &str = "rag-query";
    pub const WEATHER: &str = "weather";
    pub const WEB_SEARCH: &str = "web-search";
    pub const DOCUMENTS: &str = "documents";
}

/// Environment variables read by the configuration loader and logging
pub mod env_vars {
    pub const ENVIRONMENT: &str = "BAKAME_ENV";
    pub const FALLBACK_ENVIRONMENT: &str = "APP_ENV";
    pub const CONFIG_PATH: &str = "BAKAME_CONFIG_PATH";
    pub const OVERRIDE_PREFIX: &str = "BAKAME";
    pub const OVERRIDE_SEPARATOR: &str = "__";
}

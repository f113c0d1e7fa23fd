//! Layered configuration loading

use bakame_resilience::config::{ConfigLoader, ConfigurationError, Environment};
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const DEPLOYMENT_TOML: &str = r#"
environment = "production"

[store]
backend = "redis"

[store.redis]
url = "redis://cache.internal:6379/2"

[cache.namespace_ttl_seconds]
weather = 600

[rate_limits]
algorithm = "fixed_window"

[circuit_breakers.service_configs.openai]
failure_threshold = 2
success_threshold = 1
reset_timeout_ms = 15000
request_timeout_ms = 45000
half_open_max_calls = 1
"#;

#[test]
fn test_deployment_file_with_overrides() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(DEPLOYMENT_TOML.as_bytes()).unwrap();

    let overrides = HashMap::from([(
        "BAKAME__STORE__REDIS__CONNECTION_TIMEOUT_SECONDS".to_string(),
        "2".to_string(),
    )]);

    let config = ConfigLoader::new()
        .with_file(file.path())
        .with_env_overrides(overrides)
        .load()
        .unwrap();

    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.store.backend, "redis");
    let redis = config.store.redis.as_ref().unwrap();
    assert_eq!(redis.url, "redis://cache.internal:6379/2");
    assert_eq!(redis.connection_timeout(), Duration::from_secs(2));

    assert_eq!(config.cache.ttl_for("weather"), Duration::from_secs(600));
    assert_eq!(config.cache.ttl_for("embeddings"), Duration::from_secs(86_400));

    let openai = config
        .circuit_breakers
        .config_for_service("openai")
        .to_resilience_config();
    assert_eq!(openai.failure_threshold, 2);
    assert_eq!(openai.reset_timeout, Duration::from_secs(15));

    // Services not mentioned keep their presets
    let weather = config.circuit_breakers.config_for_service("weather");
    assert_eq!(weather.failure_threshold, 5);
}

#[test]
fn test_inverted_quotas_are_rejected() {
    let result = ConfigLoader::new()
        .with_toml(
            r#"
[rate_limits.endpoints.upload]
anonymous = { max_requests = 50, window_seconds = 60 }
authenticated = { max_requests = 10, window_seconds = 60 }
"#,
        )
        .load();
    assert!(result.is_err());
}

#[test]
fn test_invalid_breaker_profile_names_the_service() {
    let err = ConfigLoader::new()
        .with_toml(
            r#"
[circuit_breakers.service_configs.weather]
failure_threshold = 0
success_threshold = 1
reset_timeout_ms = 1000
request_timeout_ms = 1000
half_open_max_calls = 1
"#,
        )
        .load()
        .unwrap_err();
    assert!(err.to_string().contains("weather"));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("bakame.toml");
    let err = ConfigLoader::new().with_file(&missing).load().unwrap_err();
    assert!(matches!(err, ConfigurationError::FileNotFound { path } if path == missing));
}

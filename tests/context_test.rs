//! Composition root wiring and the protected request path

mod common;

use bakame_resilience::config::{ConfigLoader, Environment, ResilienceConfig};
use bakame_resilience::context::{ProtectedRequest, ResilienceContext, ServedFrom};
use bakame_resilience::rate_limit::RateLimitAlgorithm;
use bakame_resilience::resilience::FailureReason;
use bakame_resilience::testing::{CallCounter, UnavailableStore};
use bakame_resilience::BakameError;
use std::sync::Arc;
use std::time::Duration;

fn chat_config(max_requests: u32) -> ResilienceConfig {
    let toml = format!(
        r#"
environment = "test"

[rate_limits.endpoints.chat]
anonymous = {{ max_requests = {max_requests}, window_seconds = 60 }}
authenticated = {{ max_requests = {max_requests}, window_seconds = 60 }}
"#
    );
    ConfigLoader::new().with_toml(toml).load().unwrap()
}

#[tokio::test]
async fn test_from_config_uses_memory_store() {
    let context = ResilienceContext::from_config(chat_config(3)).await.unwrap();
    assert_eq!(context.store().provider_name(), "memory");
    assert_eq!(
        context.rate_limiter().algorithm(),
        RateLimitAlgorithm::SlidingWindow
    );
    assert!(!context.rate_limiter().is_bypassed());
    assert_eq!(context.config.environment, Environment::Test);
}

#[tokio::test]
async fn test_unknown_backend_falls_back_to_memory() {
    let mut config = ResilienceConfig::default();
    config.store.backend = "etcd".to_string();
    let context = ResilienceContext::from_config(config).await.unwrap();
    assert_eq!(context.store().provider_name(), "memory");
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let mut config = ResilienceConfig::default();
    config.rate_limits.endpoints.remove("default");
    let err = ResilienceContext::from_config(config).await.unwrap_err();
    assert!(matches!(err, BakameError::ConfigurationError(_)));
}

#[tokio::test]
async fn test_chat_request_lifecycle() {
    let context = ResilienceContext::from_config(chat_config(3)).await.unwrap();
    let counter = CallCounter::new();
    let request = ProtectedRequest::new("chat", "ip-1", "openai")
        .cached("cache:chat:greeting", Duration::from_secs(60));

    let mut sources = Vec::new();
    for _ in 0..4 {
        let counter = counter.clone();
        let outcome = context
            .run_protected(
                &request,
                || async move {
                    counter.hit();
                    Ok::<_, String>("Muraho!".to_string())
                },
                "Please try again later".to_string(),
            )
            .await;
        sources.push(outcome.source());
    }

    assert_eq!(
        sources,
        vec![
            Some(ServedFrom::Upstream),
            Some(ServedFrom::Cache),
            Some(ServedFrom::Cache),
            None,
        ]
    );
    assert_eq!(counter.count(), 1);

    context
        .rate_limiter()
        .reset_rate_limit("chat", "ip-1")
        .await
        .unwrap();
    let status = context
        .rate_limiter()
        .get_rate_limit_status("chat", "ip-1", false)
        .await;
    assert_eq!(status.remaining, 3);
}

#[tokio::test]
async fn test_open_circuit_serves_fallback_without_calling_upstream() {
    let context = ResilienceContext::from_config(chat_config(10)).await.unwrap();
    for _ in 0..3 {
        context
            .circuit_breakers()
            .record_failure("openai", FailureReason::error("HTTP 500"));
    }
    assert!(context.circuit_breakers().is_open("openai"));

    let counter = CallCounter::new();
    let request = ProtectedRequest::new("chat", "ip-2", "openai");
    let outcome = context
        .run_protected(
            &request,
            || async {
                counter.hit();
                Ok::<_, String>("answer".to_string())
            },
            "fallback".to_string(),
        )
        .await;

    assert_eq!(outcome.source(), Some(ServedFrom::Fallback));
    assert_eq!(outcome.into_value().as_deref(), Some("fallback"));
    assert_eq!(counter.count(), 0);
}

#[tokio::test]
async fn test_store_outage_still_serves_requests() {
    let context = ResilienceContext::with_store(
        ResilienceConfig::default(),
        Arc::new(UnavailableStore::new()),
    )
    .unwrap();
    let request = ProtectedRequest::new("rag", "ip-3", "openai")
        .cached("cache:rag-query:q1", Duration::from_secs(60));

    for _ in 0..3 {
        let outcome = context
            .run_protected(&request, || async { Ok::<_, String>(7u32) }, 0)
            .await;
        assert_eq!(outcome.source(), Some(ServedFrom::Upstream));
        assert!(outcome.decision().allowed);
    }

    let health = context.health_check().await;
    assert!(!health.store_healthy);
    assert_eq!(health.cache.errors, 6);
}

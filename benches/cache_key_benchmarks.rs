use bakame_resilience::cache::{canonical_json, derive_key};
use bakame_resilience::config::{RateLimitAlgorithmPreference, RateLimitConfig};
use bakame_resilience::rate_limit::RateLimiter;
use bakame_resilience::store::MemoryStore;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;

fn rag_query_args() -> serde_json::Value {
    json!({
        "query": "What documents mention the Kigali office lease?",
        "top_k": 8,
        "filters": {"user_id": "u-1942", "tags": ["legal", "facilities"], "after": "2024-01-01"},
        "rerank": true
    })
}

fn benchmark_canonical_json(c: &mut Criterion) {
    let args = rag_query_args();
    c.bench_function("canonical_json", |b| b.iter(|| canonical_json(black_box(&args))));
}

fn benchmark_derive_key(c: &mut Criterion) {
    let args = rag_query_args();
    c.bench_function("derive_key", |b| {
        b.iter(|| derive_key(black_box("rag-query"), black_box(&args)))
    });
}

fn benchmark_fixed_window_check(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let config = RateLimitConfig {
        algorithm: RateLimitAlgorithmPreference::FixedWindow,
        ..RateLimitConfig::default()
    };
    let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), config)
        .expect("default rate limit configuration");

    c.bench_function("fixed_window_check", |b| {
        b.iter(|| {
            runtime.block_on(limiter.check_rate_limit(
                black_box("chat"),
                black_box("bench-client"),
                false,
            ))
        })
    });
}

criterion_group!(
    benches,
    benchmark_canonical_json,
    benchmark_derive_key,
    benchmark_fixed_window_check
);
criterion_main!(benches);

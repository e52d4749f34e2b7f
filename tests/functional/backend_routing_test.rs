//! Functional tests for discovery and model routing across a mixed fleet

use futures::StreamExt;
use llm_host_router::backend::{GenerateRequest, HostRegistry};
use llm_host_router::config::{BackendType, Host};
use llm_host_router::gateway::{HostManager, Router, RouterConfig};
use llm_host_router::AppError;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Native host listing `models` whose generate endpoint answers with `generate_status`
async fn native_host(models: &[&str], generate_status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "0.3.12"})))
        .mount(&server)
        .await;

    let tags: Vec<_> = models.iter().map(|m| json!({"name": m})).collect();
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": tags})))
        .mount(&server)
        .await;

    let generate = if generate_status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({
            "response": format!("from {}", server.uri()),
            "done": true,
            "eval_count": 4
        }))
    } else {
        ResponseTemplate::new(generate_status).set_body_string("out of memory")
    };
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate)
        .mount(&server)
        .await;

    server
}

/// OpenAI-compatible host without a model catalog
async fn compat_host() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "phi3",
            "choices": [{"message": {"role": "assistant", "content": "compat says hi"}}],
            "usage": {"prompt_tokens": 2, "completion_tokens": 3, "total_tokens": 5}
        })))
        .mount(&server)
        .await;
    server
}

fn manager(hosts: Vec<Host>) -> HostManager {
    let registry = Arc::new(HostRegistry::new());
    registry.add_hosts(hosts).unwrap();
    HostManager::new(registry)
}

#[tokio::test]
async fn test_mixed_fleet_discovery() {
    let gpu = native_host(&["llama3.1:8b", "qwen2.5:7b"], 200).await;
    let laptop = native_host(&["llama3.1:8b"], 200).await;
    let compat = compat_host().await;

    let manager = manager(vec![
        Host::new("gpu", gpu.uri()).with_priority(1),
        Host::new("laptop", laptop.uri()).with_priority(5),
        Host::new("compat", compat.uri())
            .with_backend(BackendType::OpenAI)
            .with_models(["phi3"]),
        Host::new("gone", "http://127.0.0.1:1"),
    ]);

    let statuses = manager.check_all_hosts().await;
    let online: Vec<bool> = statuses.iter().map(|s| s.online).collect();
    assert_eq!(online, vec![true, true, true, false]);
    assert!(statuses[2].version.is_none());

    let index = manager.get_all_models().await;
    assert_eq!(index["llama3.1:8b"], vec!["gpu".to_string(), "laptop".to_string()]);
    assert_eq!(index["qwen2.5:7b"], vec!["gpu".to_string()]);
    assert_eq!(index["phi3"], vec!["compat".to_string()]);

    let serving: Vec<String> = manager
        .find_model("llama3.1:8b")
        .await
        .into_iter()
        .map(|s| s.host.name.clone())
        .collect();
    assert_eq!(serving, vec!["gpu", "laptop"]);

    let best = manager.get_host_with_model("phi3").await.unwrap();
    assert_eq!(best.name(), "compat");
}

#[tokio::test]
async fn test_router_falls_back_on_failure() {
    let broken = native_host(&["m1"], 500).await;
    let healthy = native_host(&["m1"], 200).await;

    let router = Router::new(manager(vec![
        Host::new("broken", broken.uri()).with_priority(1),
        Host::new("healthy", healthy.uri()).with_priority(2),
    ]));

    let routed = router.generate(GenerateRequest::new("m1", "hi")).await.unwrap();
    assert_eq!(routed.host.name, "healthy");
    assert_eq!(routed.attempts, 2);
    assert_eq!(routed.response.completion_tokens, 4);
    assert_eq!(routed.response.model, "m1");
}

#[tokio::test]
async fn test_router_stream_falls_back_before_first_chunk() {
    let broken = native_host(&["m1"], 500).await;
    let healthy = native_host(&["m1"], 200).await;

    let router = Router::new(manager(vec![
        Host::new("broken", broken.uri()).with_priority(1),
        Host::new("healthy", healthy.uri()).with_priority(2),
    ]));

    let routed = router
        .generate_stream(GenerateRequest::new("m1", "hi"))
        .await
        .unwrap();
    assert_eq!(routed.host.name, "healthy");
    assert_eq!(routed.attempts, 2);

    let chunks: Vec<_> = routed.stream.collect().await;
    assert_eq!(chunks.len(), 1);
    let chunk = chunks[0].as_ref().unwrap();
    assert!(chunk.done);
    assert_eq!(chunk.text, format!("from {}", healthy.uri()));
    assert_eq!(chunk.completion_tokens, Some(4));
}

#[tokio::test]
async fn test_router_without_fallback_surfaces_error() {
    let broken = native_host(&["m1"], 500).await;
    let healthy = native_host(&["m1"], 200).await;

    let router = Router::with_config(
        manager(vec![
            Host::new("broken", broken.uri()).with_priority(1),
            Host::new("healthy", healthy.uri()).with_priority(2),
        ]),
        RouterConfig {
            fallback_enabled: false,
        },
    );

    let err = router.generate(GenerateRequest::new("m1", "hi")).await.unwrap_err();
    assert!(matches!(err, AppError::Protocol { status: 500, ref body } if body == "out of memory"));
}

#[tokio::test]
async fn test_router_all_candidates_fail() {
    let first = native_host(&["m1"], 500).await;
    let second = native_host(&["m1"], 503).await;

    let router = Router::new(manager(vec![
        Host::new("first", first.uri()).with_priority(1),
        Host::new("second", second.uri()).with_priority(2),
    ]));

    let err = router.generate(GenerateRequest::new("m1", "hi")).await.unwrap_err();
    assert!(matches!(err, AppError::Protocol { status: 503, .. }));
}

#[tokio::test]
async fn test_router_uses_openai_host() {
    let compat = compat_host().await;
    let router = Router::new(manager(vec![Host::new("compat", compat.uri())
        .with_backend(BackendType::OpenAI)
        .with_models(["phi3"])]));

    let routed = router.generate(GenerateRequest::new("phi3", "hi")).await.unwrap();
    assert_eq!(routed.host.name, "compat");
    assert_eq!(routed.response.text, "compat says hi");
    assert_eq!(routed.response.total_tokens(), 5);
}

#[tokio::test]
async fn test_no_route_when_model_host_offline() {
    let router = Router::new(manager(vec![Host::new("gone", "http://127.0.0.1:1")
        .with_backend(BackendType::OpenAI)
        .with_models(["phi3"])]));

    let err = router.generate(GenerateRequest::new("phi3", "hi")).await.unwrap_err();
    assert!(matches!(err, AppError::NoRoute(_)));
}

#[tokio::test]
async fn test_replacing_host_rebinds_client() {
    let old = native_host(&["m1"], 200).await;
    let new = native_host(&["m2"], 200).await;

    let registry = Arc::new(HostRegistry::new());
    registry.add_host(Host::new("box", old.uri())).unwrap();
    registry.add_host(Host::new("other", "http://127.0.0.1:1")).unwrap();
    registry.add_host(Host::new("box", new.uri())).unwrap();
    assert_eq!(registry.len(), 2);

    let manager = HostManager::new(registry);
    let statuses = manager.check_all_hosts().await;
    assert_eq!(statuses[0].name(), "box");
    assert!(statuses[0].has_model("m2"));
    assert!(!statuses[0].has_model("m1"));
}

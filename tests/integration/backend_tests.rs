//! Wire-level tests for both backend clients

use futures::StreamExt;
use llm_host_router::backend::{
    BackendClient, GenerateChunk, GenerateOptions, GenerateRequest, GenerateStream, OllamaClient,
    OpenAICompatibleClient,
};
use llm_host_router::config::{BackendType, Host};
use llm_host_router::AppError;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn ollama(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&Host::new("native", server.uri()), TIMEOUT).unwrap()
}

async fn drain(stream: GenerateStream) -> Vec<GenerateChunk> {
    stream
        .map(|chunk| chunk.expect("stream item"))
        .collect()
        .await
}

fn openai(server: &MockServer, host: Host) -> OpenAICompatibleClient {
    let host = Host {
        url: server.uri(),
        backend: BackendType::OpenAI,
        ..host
    };
    OpenAICompatibleClient::new(&host, TIMEOUT).unwrap()
}

// ============================================================================
// Ollama native
// ============================================================================

#[tokio::test]
async fn test_ollama_ping_and_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "0.3.12"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = ollama(&server);
    assert!(client.ping().await.is_ok());
    assert_eq!(client.version().await.unwrap(), "0.3.12");
}

#[tokio::test]
async fn test_ollama_list_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama3.1:8b", "modified_at": "2024-08-01T10:15:30Z", "size": 4661224676u64},
                {"name": "nomic-embed-text:latest"}
            ]
        })))
        .mount(&server)
        .await;

    let client = ollama(&server);
    let models = client.list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "llama3.1:8b");
    assert_eq!(models[0].size, Some(4_661_224_676));
    assert!(models[0].modified_at.is_some());
    assert!(models[1].modified_at.is_none());

    assert!(client.has_model("llama3.1:8b").await.unwrap());
    assert!(!client.has_model("llama3.1").await.unwrap());
}

#[tokio::test]
async fn test_ollama_generate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({
            "model": "llama3.1:8b",
            "prompt": "why is the sky blue",
            "system": "be brief",
            "stream": false,
            "options": {"num_predict": 32, "num_ctx": 4096}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "response": "Rayleigh scattering.",
            "done": true,
            "prompt_eval_count": 12,
            "eval_count": 5
        })))
        .mount(&server)
        .await;

    let request = GenerateRequest::new("llama3.1:8b", "why is the sky blue")
        .with_system("be brief")
        .with_options(GenerateOptions {
            max_tokens: Some(32),
            temperature: None,
            num_ctx: Some(4096),
        });

    let response = ollama(&server).generate(request).await.unwrap();
    assert_eq!(response.text, "Rayleigh scattering.");
    assert!(response.done);
    assert_eq!(response.prompt_tokens, 12);
    assert_eq!(response.completion_tokens, 5);
    assert_eq!(response.total_tokens(), 17);
}

#[tokio::test]
async fn test_ollama_speed_uses_server_eval_time() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "response": "...",
            "done": true,
            "prompt_eval_count": 40,
            "eval_count": 100,
            "total_duration": 9_000_000_000u64,
            "load_duration": 6_000_000_000u64,
            "prompt_eval_duration": 500_000_000u64,
            "eval_duration": 2_000_000_000u64
        })))
        .mount(&server)
        .await;

    let response = ollama(&server)
        .generate(GenerateRequest::new("llama3.1:8b", "count"))
        .await
        .unwrap();

    assert_eq!(response.timings.eval, Some(Duration::from_secs(2)));
    assert_eq!(response.timings.load, Some(Duration::from_secs(6)));
    assert_eq!(response.timings.total, Some(Duration::from_secs(9)));
    assert_eq!(response.tokens_per_second(), 50.0);
    assert_eq!(response.prompt_tokens_per_second(), 80.0);
}

#[tokio::test]
async fn test_ollama_generate_stream() {
    let server = MockServer::start().await;
    let body = concat!(
        r#"{"model":"llama3.1:8b","response":"Ray","done":false}"#,
        "\n",
        r#"{"model":"llama3.1:8b","response":"leigh","done":false}"#,
        "\n",
        "not json\n",
        r#"{"model":"llama3.1:8b","response":"","done":true,"prompt_eval_count":12,"eval_count":2,"eval_duration":100000000}"#,
        "\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "llama3.1:8b", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let stream = ollama(&server)
        .generate_stream(GenerateRequest::new("llama3.1:8b", "why"))
        .await
        .unwrap();
    let chunks = drain(stream).await;

    assert_eq!(chunks.len(), 3);
    let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(text, "Rayleigh");

    let last = chunks.last().unwrap();
    assert!(last.done);
    assert_eq!(last.completion_tokens, Some(2));
    assert_eq!(last.timings.eval, Some(Duration::from_millis(100)));
    assert!(chunks[..2].iter().all(|c| !c.done));
}

#[tokio::test]
async fn test_ollama_generate_stream_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model 'm9' not found"))
        .mount(&server)
        .await;

    let err = match ollama(&server)
        .generate_stream(GenerateRequest::new("m9", "hi"))
        .await
    {
        Ok(_) => panic!("expected the stream to fail before starting"),
        Err(e) => e,
    };
    assert!(matches!(err, AppError::Protocol { status: 404, .. }));
}

#[tokio::test]
async fn test_ollama_generate_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let err = ollama(&server)
        .generate(GenerateRequest::new("m1", "hi"))
        .await
        .unwrap_err();

    match err {
        AppError::Protocol { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "model not loaded");
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ollama_malformed_catalog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = ollama(&server).list_models().await.unwrap_err();
    assert!(matches!(err, AppError::Decode(_)));
}

#[tokio::test]
async fn test_ollama_ping_non_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = ollama(&server).ping().await.unwrap_err();
    assert!(matches!(err, AppError::Protocol { status: 503, .. }));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Nothing listens on port 1
    let host = Host::new("nowhere", "http://127.0.0.1:1");
    let client = OllamaClient::new(&host, TIMEOUT).unwrap();

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, AppError::Network(_)));
}

#[tokio::test]
async fn test_slow_host_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"version": "0.3.12"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let host = Host::new("slow", server.uri());
    let client = OllamaClient::new(&host, Duration::from_millis(100)).unwrap();

    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, AppError::Network(_)));
}

// ============================================================================
// OpenAI compatible
// ============================================================================

#[tokio::test]
async fn test_openai_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "gpt-4o-mini", "object": "model", "created": 1721172741, "owned_by": "system"}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = openai(&server, Host::new("hosted", "").with_api_key("sk-test"));
    assert!(client.ping().await.is_ok());

    let models = client.list_models().await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "gpt-4o-mini");
    assert!(models[0].modified_at.is_some());
}

#[tokio::test]
async fn test_openai_version_unsupported() {
    let server = MockServer::start().await;
    let client = openai(&server, Host::new("compat", ""));

    let err = client.version().await.unwrap_err();
    assert!(matches!(err, AppError::Unsupported(_)));
}

#[tokio::test]
async fn test_openai_missing_catalog_uses_static_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = openai(&server, Host::new("llamacpp", "").with_models(["phi3", "mistral-7b"]));
    let names: Vec<String> = client
        .list_models()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["phi3", "mistral-7b"]);

    // Liveness still requires a 2xx
    assert!(client.ping().await.is_err());
}

#[tokio::test]
async fn test_openai_empty_catalog_uses_static_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let client = openai(&server, Host::new("vllm", "").with_models(["qwen2.5-7b"]));
    let models = client.list_models().await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "qwen2.5-7b");
}

#[tokio::test]
async fn test_openai_catalog_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = openai(&server, Host::new("compat", "").with_models(["phi3"]));
    let err = client.list_models().await.unwrap_err();
    assert!(matches!(err, AppError::Protocol { status: 500, .. }));
}

#[tokio::test]
async fn test_openai_generate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "phi3",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hello"}
            ],
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "phi3",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
        })))
        .mount(&server)
        .await;

    let client = openai(&server, Host::new("compat", ""));
    let response = client
        .generate(GenerateRequest::new("phi3", "hello").with_system("be terse"))
        .await
        .unwrap();

    assert_eq!(response.text, "Hi.");
    assert_eq!(response.model, "phi3");
    assert_eq!(response.prompt_tokens, 9);
    assert_eq!(response.completion_tokens, 2);
    assert!(response.done);
}

#[tokio::test]
async fn test_openai_generate_without_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        })))
        .mount(&server)
        .await;

    let client = openai(&server, Host::new("compat", ""));
    let response = client.generate(GenerateRequest::new("phi3", "hi")).await.unwrap();

    assert_eq!(response.text, "ok");
    assert_eq!(response.model, "phi3");
    assert_eq!(response.total_tokens(), 0);
    assert_eq!(response.tokens_per_second(), 0.0);
}

#[tokio::test]
async fn test_openai_generate_stream() {
    let server = MockServer::start().await;
    let body = concat!(
        r#"data: {"model":"phi3","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#,
        "\n\n",
        r#"data: {"model":"phi3","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        "\n\n",
        ": keep-alive\n\n",
        r#"data: {"model":"phi3","choices":[{"index":0,"delta":{"content":" there"},"finish_reason":"stop"}],"usage":{"prompt_tokens":4,"completion_tokens":2,"total_tokens":6}}"#,
        "\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "phi3", "stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let client = openai(&server, Host::new("compat", "").with_api_key("sk-test"));
    let stream = client
        .generate_stream(GenerateRequest::new("phi3", "hello"))
        .await
        .unwrap();
    let chunks = drain(stream).await;

    assert_eq!(chunks.len(), 3);
    let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(text, "Hi there");

    let last = chunks.last().unwrap();
    assert!(last.done);
    assert_eq!(last.prompt_tokens, Some(4));
    assert_eq!(last.completion_tokens, Some(2));
    assert_eq!(last.model.as_deref(), Some("phi3"));
}

#[tokio::test]
async fn test_openai_generate_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"choices\": "))
        .mount(&server)
        .await;

    let client = openai(&server, Host::new("compat", ""));
    let err = client.generate(GenerateRequest::new("phi3", "hi")).await.unwrap_err();
    assert!(matches!(err, AppError::Decode(_)));
}

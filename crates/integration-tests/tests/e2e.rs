//! End-to-end gateway behavior: cache, validation, and error mapping

mod harness;

use harness::gateway_config;
use harness::mock_llm::MockLlm;
use harness::server::TestServer;

fn chat_body(model: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": content}]
    })
}

#[tokio::test]
async fn cache_miss_then_hit_invokes_upstream_once() {
    let mock = MockLlm::start().await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    let first = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .header("X-User-ID", "user-42")
        .json(&chat_body("gpt-4", "hi"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    let first_body = first.text().await.unwrap();
    assert!(first_body.contains("hello!"), "body: {first_body}");

    let second = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .header("X-User-ID", "user-42")
        .json(&chat_body("gpt-4", "hi"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    let second_body = second.text().await.unwrap();
    assert!(second_body.contains("hello!"), "body: {second_body}");

    assert_eq!(mock.completion_count(), 1, "second call must be served from cache");
}

#[tokio::test]
async fn distinct_user_ids_do_not_share_cache_entries() {
    let mock = MockLlm::start().await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    for user in ["alice", "bob"] {
        let resp = server
            .client()
            .post(server.url("/v1/chat/completions"))
            .header("X-User-ID", user)
            .json(&chat_body("gpt-4", "hi"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    assert_eq!(mock.completion_count(), 2, "responses must never cross users");
}

#[tokio::test]
async fn missing_user_header_scopes_to_anon() {
    let mock = MockLlm::start().await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    for _ in 0..2 {
        let resp = server
            .client()
            .post(server.url("/v1/chat/completions"))
            .json(&chat_body("gpt-4", "hi"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    assert_eq!(mock.completion_count(), 1, "anonymous requests share one scope");
}

#[tokio::test]
async fn missing_model_rejected_before_upstream() {
    let mock = MockLlm::start().await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&serde_json::json!({"messages": [{"role": "user", "content": "x"}]}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_json");
    assert_eq!(mock.completion_count(), 0);
}

#[tokio::test]
async fn malformed_json_rejected() {
    let mock = MockLlm::start().await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_json");
    assert_eq!(mock.completion_count(), 0);
}

#[tokio::test]
async fn out_of_range_temperature_rejected() {
    let mock = MockLlm::start().await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    let mut body = chat_body("gpt-4", "hi");
    body["temperature"] = serde_json::json!(2.5);

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    assert_eq!(mock.completion_count(), 0);
}

#[tokio::test]
async fn upstream_failure_maps_to_502_after_retries() {
    let mock = MockLlm::start_failing(10).await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body("gpt-4", "hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "upstream_error");
    // max_retries = 2 in the test config: initial attempt plus two retries.
    assert_eq!(mock.completion_count(), 3);
}

#[tokio::test]
async fn empty_choices_surfaces_as_upstream_error() {
    let mock = MockLlm::start_empty_choices().await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body("gpt-4", "hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
    assert_eq!(mock.completion_count(), 1);
}

#[tokio::test]
async fn failed_responses_are_not_cached() {
    let mock = MockLlm::start_failing(3).await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    let first = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body("gpt-4", "hi"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 502);

    // Upstream has recovered; the gateway must go back to it.
    let second = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body("gpt-4", "hi"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(mock.completion_count(), 4);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let mock = MockLlm::start().await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    let resp = server.client().get(server.url("/healthz")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn metrics_expose_cache_counters() {
    let mock = MockLlm::start().await.unwrap();
    let server = TestServer::start(gateway_config(&mock.base_url())).await.unwrap();

    // One miss, one hit.
    for _ in 0..2 {
        server
            .client()
            .post(server.url("/v1/chat/completions"))
            .json(&chat_body("gpt-4", "hi"))
            .send()
            .await
            .unwrap();
    }

    let resp = server.client().get(server.url("/metrics")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    assert!(text.contains("conduit_exact_cache_hits_total 1"), "metrics: {text}");
    assert!(text.contains("conduit_exact_cache_misses_total 1"), "metrics: {text}");
}

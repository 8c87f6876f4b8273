//! End-to-end chat-completion flows through the full router
//!
//! A mock upstream stands in for DeepSeek; the ledger is in memory and the
//! session table static, so every layer from the request ID middleware to
//! billing is exercised.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tollbooth::domain::{ApiKey, ChatMessage, ChatRole, UserId};
use tollbooth::ledger::{
    estimate_messages_tokens, InMemoryLedgerStore, OverrideSource, PricingResolver, UsageLedger,
    UsageRecord,
};
use tollbooth::providers::{
    GeminiAdapter, OpenAiCompatibleAdapter, ProviderAdapter, ProviderSet, Upstream,
};
use tollbooth::proxy::{
    FeaturePasswords, ProviderExecutor, ProxyConfig, ProxyService, StaticSessionResolver,
};
use tollbooth::scheduler::{IntervalSettings, RequestScheduler, SchedulerConfig};
use tower::ServiceExt;

const PRICING: &str = r#"[{"inputPer1k": 100.0, "outputPer1k": 100.0}]"#;

struct Gateway {
    router: Router,
    store: InMemoryLedgerStore,
    scheduler: RequestScheduler,
}

fn user(id: &str) -> UserId {
    UserId::try_new(id.to_string()).unwrap()
}

fn gateway(upstream_url: &str, passwords: FeaturePasswords) -> Gateway {
    let client = reqwest::Client::new();
    let key = |value: &str| Some(ApiKey::try_new(value.to_string()).unwrap());
    let openai: Arc<dyn ProviderAdapter> = Arc::new(OpenAiCompatibleAdapter::generic(
        client.clone(),
        Upstream::new("openrouter", upstream_url),
        Upstream::new("openai", upstream_url).with_key(key("sk-openai")),
    ));
    let deepseek: Arc<dyn ProviderAdapter> = Arc::new(OpenAiCompatibleAdapter::deepseek(
        client.clone(),
        Upstream::new("deepseek", upstream_url).with_key(key("sk-deepseek")),
    ));
    let gemini: Arc<dyn ProviderAdapter> =
        Arc::new(GeminiAdapter::new(client, upstream_url, key("gm-key")));

    let scheduler = RequestScheduler::new(
        Arc::new(ProviderExecutor::new(ProviderSet::new(openai, deepseek, gemini))),
        SchedulerConfig {
            concurrency: 2,
            intervals: IntervalSettings {
                min_ms: 10,
                peak_ms: 10,
                off_peak_ms: 10,
                max_ms: 10,
            },
            ..SchedulerConfig::default()
        },
    );
    scheduler.start();

    let store = InMemoryLedgerStore::with_balances([
        (user("alice"), 1_000_000),
        (user("bob"), 5),
    ]);
    let ledger = UsageLedger::new(
        Arc::new(store.clone()),
        PricingResolver::new(OverrideSource::Static(PRICING.to_string())),
    );
    let sessions = StaticSessionResolver::new()
        .with_session("alice-session", user("alice"))
        .with_session("bob-session", user("bob"));

    let router = ProxyService::new(scheduler.clone(), ProxyConfig::default())
        .with_ledger(ledger)
        .with_feature_passwords(passwords)
        .with_session_resolver(Arc::new(sessions))
        .into_router();

    Gateway {
        router,
        store,
        scheduler,
    }
}

fn completion_request(token: &str, body: Value) -> Request<Body> {
    Request::post("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Streamed exchanges are billed after the relay ends
async fn wait_for_records(store: &InMemoryLedgerStore, count: usize) -> Vec<UsageRecord> {
    for _ in 0..200 {
        let records = store.usage_records();
        if records.len() >= count {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.usage_records()
}

#[tokio::test]
async fn completion_is_returned_and_billed_by_estimate() {
    let mut server = mockito::Server::new_async().await;
    let upstream = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-deepseek")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":"c1","object":"chat.completion","created":1,"model":"deepseek-chat",
            "choices":[{"index":0,"message":{"role":"assistant","content":"Hello there, friend"},"finish_reason":"stop"}]}"#,
        )
        .create_async()
        .await;
    let gateway = gateway(&server.url(), FeaturePasswords::disabled());

    let response = gateway
        .router
        .clone()
        .oneshot(completion_request(
            "alice-session",
            json!({"model": "deepseek-chat", "messages": [{"role": "user", "content": "Say hello"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there, friend");
    upstream.assert_async().await;

    let records = gateway.store.usage_records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.user_id, user("alice"));
    assert!(record.estimated);
    assert!(!record.stream);
    assert_eq!(
        record.prompt_tokens,
        estimate_messages_tokens(&[ChatMessage::user("Say hello")])
    );
    assert!(record.cost_cents > 0);

    gateway.scheduler.shutdown().await;
}

#[tokio::test]
async fn streams_are_relayed_and_billed_with_reported_usage() {
    let mut server = mockito::Server::new_async().await;
    let _upstream = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"id\":\"c2\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"id\":\"c2\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"deepseek-chat\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":21,\"completion_tokens\":2,\"total_tokens\":23}}\n\n",
            "data: [DONE]\n\n",
        ))
        .create_async()
        .await;
    let gateway = gateway(&server.url(), FeaturePasswords::disabled());

    let response = gateway
        .router
        .clone()
        .oneshot(completion_request(
            "alice-session",
            json!({"model": "deepseek-chat", "stream": true, "messages": [{"role": "user", "content": "Say hello"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let text = body_text(response).await;
    assert!(text.contains("\"Hel\""));
    assert!(text.contains("\"lo\""));
    assert!(text.ends_with("data: [DONE]\n\n"));
    assert_eq!(text.matches("data: [DONE]").count(), 1);

    let records = wait_for_records(&gateway.store, 1).await;
    assert_eq!(records.len(), 1);
    assert!(records[0].stream);
    assert!(!records[0].estimated);
    assert_eq!(records[0].prompt_tokens, 21);
    assert_eq!(records[0].completion_tokens, 2);

    gateway.scheduler.shutdown().await;
}

#[tokio::test]
async fn low_balances_are_rejected_before_dispatch() {
    let mut server = mockito::Server::new_async().await;
    let upstream = server
        .mock("POST", "/v1/chat/completions")
        .expect(0)
        .create_async()
        .await;
    let gateway = gateway(&server.url(), FeaturePasswords::disabled());

    let response = gateway
        .router
        .clone()
        .oneshot(completion_request(
            "bob-session",
            json!({"model": "deepseek-chat", "messages": [{"role": "user", "content": "Say hello"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"]["code"], "insufficient_balance");
    upstream.assert_async().await;
    assert!(gateway.store.usage_records().is_empty());

    gateway.scheduler.shutdown().await;
}

#[tokio::test]
async fn missing_feature_password_is_reported_in_band_for_streams() {
    let server = mockito::Server::new_async().await;
    let gateway = gateway(
        &server.url(),
        FeaturePasswords::parse("letmein:llm-deepseek", true),
    );

    let response = gateway
        .router
        .clone()
        .oneshot(completion_request(
            "alice-session",
            json!({"model": "deepseek-chat", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("invalid_feature_password"));
    assert!(text.ends_with("data: [DONE]\n\n"));

    gateway.scheduler.shutdown().await;
}

#[tokio::test]
async fn passthrough_keys_reach_the_upstream_and_are_not_billed() {
    let mut server = mockito::Server::new_async().await;
    let upstream = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-caller-own")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":"c3","object":"chat.completion","created":1,"model":"deepseek-chat",
            "choices":[{"index":0,"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#,
        )
        .create_async()
        .await;
    let gateway = gateway(&server.url(), FeaturePasswords::disabled());

    let response = gateway
        .router
        .clone()
        .oneshot(completion_request(
            "sk-caller-own",
            json!({"model": "deepseek-chat", "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    upstream.assert_async().await;
    assert!(gateway.store.usage_records().is_empty());

    gateway.scheduler.shutdown().await;
}

#[tokio::test]
async fn multi_part_content_and_developer_roles_are_forwarded_unchanged() {
    let mut server = mockito::Server::new_async().await;
    let upstream = server
        .mock("POST", "/v1/chat/completions")
        .match_body(mockito::Matcher::PartialJson(json!({
            "messages": [
                {"role": "developer", "content": "be brief"},
                {"role": "user", "content": [{"type": "text", "text": "Say hello"}]}
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":"c4","object":"chat.completion","created":1,"model":"deepseek-chat",
            "choices":[{"index":0,"message":{"role":"assistant","content":"Hello"},"finish_reason":"stop"}]}"#,
        )
        .create_async()
        .await;
    let gateway = gateway(&server.url(), FeaturePasswords::disabled());

    let response = gateway
        .router
        .clone()
        .oneshot(completion_request(
            "alice-session",
            json!({"model": "deepseek-chat", "messages": [
                {"role": "developer", "content": "be brief"},
                {"role": "user", "content": [{"type": "text", "text": "Say hello"}]}
            ]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    upstream.assert_async().await;
    let records = gateway.store.usage_records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].prompt_tokens,
        estimate_messages_tokens(&[
            ChatMessage::new(ChatRole::Other("developer".into()), "be brief"),
            ChatMessage::user("Say hello"),
        ])
    );

    gateway.scheduler.shutdown().await;
}

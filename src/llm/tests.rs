use super::*;
use crate::config::Config;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> LlmClient {
    LlmClient::new(&Config::test_default())
        .with_base_url(Url::parse(base_url).expect("base url should parse"))
}

#[tokio::test(flavor = "multi_thread")]
async fn sends_prompt_and_returns_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-anthropic-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "messages": [{ "role": "user", "content": "say hi" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "hi there" }],
            "model": "claude-3-5-sonnet-latest",
            "role": "assistant",
        })))
        .mount(&server)
        .await;

    let response = test_client(&server.uri())
        .complete("say hi")
        .expect("completion should succeed");
    assert_eq!(response, "hi there");
}

#[tokio::test(flavor = "multi_thread")]
async fn joins_multiple_text_blocks() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "type": "text", "text": "part one. " },
                { "type": "tool_use", "id": "t1", "name": "noop", "input": {} },
                { "type": "text", "text": "part two." },
            ],
        })))
        .mount(&server)
        .await;

    let response = test_client(&server.uri())
        .complete("anything")
        .expect("completion should succeed");
    assert_eq!(response, "part one. part two.");
}

#[tokio::test(flavor = "multi_thread")]
async fn accepts_plain_string_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "content": "plain answer" })),
        )
        .mount(&server)
        .await;

    let response = test_client(&server.uri())
        .complete("anything")
        .expect("completion should succeed");
    assert_eq!(response, "plain answer");
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_failure_surfaces_as_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "type": "authentication_error", "message": "invalid x-api-key" }
        })))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .complete("anything")
        .expect_err("auth failure must error");
    assert!(format!("{err:#}").contains("LLM request failed"));
}

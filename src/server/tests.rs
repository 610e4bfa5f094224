use super::*;
use crate::config::EmbeddingConfig;
use crate::prompt::NO_CONTEXT_SENTINEL;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Spawn the full router on an ephemeral port, with every provider client
/// pointed at the given mock server.
async fn spawn_app(server: &MockServer, dimension: usize, documents_dir: &std::path::Path) -> String {
    let config = Config {
        embedding: EmbeddingConfig {
            endpoint: url::Url::parse(&format!("{}/embed", server.uri()))
                .expect("endpoint should parse"),
            dimension,
            ..EmbeddingConfig::default()
        },
        documents_dir: documents_dir.to_path_buf(),
        ..Config::test_default()
    };

    let embeddings = EmbeddingClient::new(&config).with_retry_attempts(1);
    let store = VectorStore::new(&config)
        .expect("store should build")
        .with_control_url(url::Url::parse(&server.uri()).expect("control url should parse"));
    let llm = LlmClient::new(&config)
        .with_base_url(url::Url::parse(&server.uri()).expect("llm url should parse"));

    let state = AppState::with_clients(config, embeddings, store, llm);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router(state))
            .await
            .expect("server runs");
    });

    format!("http://{addr}")
}

async fn mock_index_description(server: &MockServer, name: &str, dimension: usize) {
    Mock::given(method("GET"))
        .and(path(format!("/indexes/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": name,
            "dimension": dimension,
            "metric": "cosine",
            "host": server.uri(),
            "status": { "ready": true, "state": "Ready" },
        })))
        .mount(server)
        .await;
}

async fn switch_to(client: &reqwest::Client, app: &str, name: &str) {
    let response = client
        .post(format!("{app}/switch-db"))
        .json(&json!({ "name": name }))
        .send()
        .await
        .expect("switch request");
    assert_eq!(response.status(), 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_ok() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 2, dir.path()).await;

    let body: serde_json::Value = reqwest::get(format!("{app}/health"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");

    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_chat_query_is_rejected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 2, dir.path()).await;

    let response = reqwest::Client::new()
        .post(format!("{app}/chat"))
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body, json!({ "error": "Query cannot be empty." }));
}

#[tokio::test(flavor = "multi_thread")]
async fn over_long_chat_query_is_rejected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 2, dir.path()).await;

    let response = reqwest::Client::new()
        .post(format!("{app}/chat"))
        .json(&json!({ "query": "x".repeat(1001) }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(
        body,
        json!({ "error": "Query is too long. Maximum 1000 characters allowed." })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn chat_without_active_index_returns_503() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 2, dir.path()).await;

    let response = reqwest::Client::new()
        .post(format!("{app}/chat"))
        .json(&json!({ "query": "hello" }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(
        body,
        json!({ "error": "No active index. Switch to an index before chatting." })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn chat_answers_from_retrieved_context() {
    let server = MockServer::start().await;
    mock_index_description(&server, "docs", 2).await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[0.1, 0.9]])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [{
                "id": "c1",
                "score": 0.9,
                "metadata": {
                    "source": "guide.md",
                    "text": "The deploy step runs last.",
                    "chunk_index": 0,
                    "created_at": "",
                },
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "Deploy runs after the tests." }]
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 2, dir.path()).await;
    let client = reqwest::Client::new();
    switch_to(&client, &app, "docs").await;

    let response = client
        .post(format!("{app}/chat"))
        .json(&json!({ "query": "when does deploy run?" }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body, json!({ "response": "Deploy runs after the tests." }));
}

#[tokio::test(flavor = "multi_thread")]
async fn chat_with_zero_matches_still_answers() {
    let server = MockServer::start().await;
    mock_index_description(&server, "docs", 1).await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[0.5]])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
        .mount(&server)
        .await;

    // The sentinel context must reach the LLM rather than short-circuiting.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(wiremock::matchers::body_string_contains(NO_CONTEXT_SENTINEL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "From general knowledge..." }]
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 1, dir.path()).await;
    let client = reqwest::Client::new();
    switch_to(&client, &app, "docs").await;

    let response = client
        .post(format!("{app}/chat"))
        .json(&json!({ "query": "anything" }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["response"], "From general knowledge...");
}

#[tokio::test(flavor = "multi_thread")]
async fn switching_to_a_missing_index_keeps_prior_state() {
    let server = MockServer::start().await;
    mock_index_description(&server, "docs", 1).await;
    Mock::given(method("GET"))
        .and(path("/indexes/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 1, dir.path()).await;
    let client = reqwest::Client::new();
    switch_to(&client, &app, "docs").await;

    let response = client
        .post(format!("{app}/switch-db"))
        .json(&json!({ "name": "ghost" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 404);

    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "indexes": [{
                "name": "docs",
                "dimension": 1,
                "metric": "cosine",
                "host": server.uri(),
            }] })),
        )
        .mount(&server)
        .await;

    let body: serde_json::Value = client
        .get(format!("{app}/list-dbs"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(body["active_index"], "docs");
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_the_active_index_unbinds_chat_even_when_delete_fails() {
    let server = MockServer::start().await;
    mock_index_description(&server, "docs", 1).await;

    Mock::given(method("DELETE"))
        .and(path("/indexes/docs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 1, dir.path()).await;
    let client = reqwest::Client::new();
    switch_to(&client, &app, "docs").await;

    let delete = client
        .post(format!("{app}/delete-db"))
        .json(&json!({ "name": "docs" }))
        .send()
        .await
        .expect("request");
    assert_eq!(delete.status(), 500);
    let body: serde_json::Value = delete.json().await.expect("json body");
    assert_eq!(body, json!({ "error": "An internal server error occurred." }));

    // Even though the provider delete failed, chat must be unbound.
    let chat = client
        .post(format!("{app}/chat"))
        .json(&json!({ "query": "hello" }))
        .send()
        .await
        .expect("request");
    assert_eq!(chat.status(), 503);
}

#[tokio::test(flavor = "multi_thread")]
async fn create_db_reports_conflicts_as_already_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 1, dir.path()).await;

    let response = reqwest::Client::new()
        .post(format!("{app}/create-db"))
        .json(&json!({ "name": "docs" }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["message"], "Index 'docs' already exists.");
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_rejects_unsupported_file_types() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 1, dir.path()).await;

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"%PDF-1.4".to_vec()).file_name("report.pdf"),
    );

    let response = reqwest::Client::new()
        .post(format!("{app}/upload"))
        .multipart(form)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body, json!({ "error": "Only .txt and .md files are supported." }));
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_stages_files_for_listing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 1, dir.path()).await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"staged content".to_vec()).file_name("notes.txt"),
    );

    let response = client
        .post(format!("{app}/upload"))
        .multipart(form)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["saved"], json!(["notes.txt"]));

    let listing: serde_json::Value = client
        .get(format!("{app}/documents"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(listing, json!({ "files": ["notes.txt"] }));
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_with_index_name_triggers_ingestion() {
    let server = MockServer::start().await;
    mock_index_description(&server, "docs", 1).await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[0.4]])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let app = spawn_app(&server, 1, dir.path()).await;

    let form = reqwest::multipart::Form::new()
        .text("index_name", "docs")
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"uploaded body".to_vec()).file_name("doc.md"),
        );

    let response = reqwest::Client::new()
        .post(format!("{app}/upload"))
        .multipart(form)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["saved"], json!(["doc.md"]));
    assert!(
        body["message"]
            .as_str()
            .expect("message is a string")
            .contains("ingested into 'docs'")
    );
}

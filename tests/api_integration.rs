// ABOUTME: Integration tests for the MCP client and token refresh
// ABOUTME: Uses wiremock to stand in for the Granola endpoints

use granola_export::api::{ApiClient, DateRange};
use granola_export::auth::{StoredTokens, TokenFile};
use granola_export::ports::{CredentialProvider, FetchOutcome, TranscriptSource};
use granola_export::Error;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_handshake(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "protocolVersion": "2025-03-26", "capabilities": {} }
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "notifications/initialized" })))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
}

fn tool_result(text: &str) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "id": 2,
        "result": { "content": [{ "type": "text", "text": text }] }
    })
}

fn sse(body: &serde_json::Value) -> String {
    format!("event: message\ndata: {}\n\n", body)
}

fn client(url: String) -> ApiClient {
    ApiClient::new(Some(url)).unwrap().disable_throttle()
}

#[tokio::test]
async fn test_list_meetings_success() {
    let mock_server = MockServer::start().await;
    mount_handshake(&mock_server).await;

    let listing = r#"<meetings_data>
<meeting id="m1" title="Q4 Planning &amp; Review" date="Oct 28, 2025 3:04 PM">
<known_participants>
Alice
Bob
</known_participants>
</meeting>
<meeting id="m2" title="Standup" date="2025-10-29T09:00:00Z">
</meeting>
</meetings_data>"#;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("Authorization", "Bearer test_token"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": { "name": "list_meetings", "arguments": { "time_range": "last_30_days" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_result(listing)))
        .mount(&mock_server)
        .await;

    let url = format!("{}/mcp", mock_server.uri());
    let result = tokio::task::spawn_blocking(move || {
        let api = client(url);
        api.list_meetings("test_token", &DateRange::Last30Days)
    })
    .await
    .unwrap();

    let meetings = result.unwrap();
    assert_eq!(meetings.len(), 2);
    assert_eq!(meetings[0].id, "m1");
    assert_eq!(meetings[0].title, "Q4 Planning & Review");
    assert_eq!(meetings[0].participants, vec!["Alice", "Bob"]);
    assert_eq!(meetings[1].id, "m2");
    assert!(meetings[1].participants.is_empty());
}

#[tokio::test]
async fn test_transcript_over_sse() {
    let mock_server = MockServer::start().await;
    mount_handshake(&mock_server).await;

    let payload = json!({ "transcript": "Alice: Hello.\nBob: Bye!" }).to_string();
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": { "name": "get_meeting_transcript", "arguments": { "meeting_id": "m1" } }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse(&tool_result(&payload)), "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let url = format!("{}/mcp", mock_server.uri());
    let outcomes = tokio::task::spawn_blocking(move || {
        let api = client(url);
        // Second fetch reuses the session; initialize is expected once.
        let first = api.fetch_transcript("m1", "test_token");
        let second = api.fetch_transcript("m1", "test_token");
        (first, second)
    })
    .await
    .unwrap();

    let expected = FetchOutcome::Transcript("Alice: Hello.\nBob: Bye!".into());
    assert_eq!(outcomes.0, expected);
    assert_eq!(outcomes.1, expected);
}

#[tokio::test]
async fn test_rate_limit_text_is_rate_limited() {
    let mock_server = MockServer::start().await;
    mount_handshake(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/call" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_result(
            "Rate limit exceeded. Please slow down your requests.",
        )))
        .mount(&mock_server)
        .await;

    let url = format!("{}/mcp", mock_server.uri());
    let outcome = tokio::task::spawn_blocking(move || client(url).fetch_transcript("m1", "test_token"))
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::RateLimited);
}

#[tokio::test]
async fn test_http_429_is_rate_limited() {
    let mock_server = MockServer::start().await;
    mount_handshake(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/call" })))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&mock_server)
        .await;

    let url = format!("{}/mcp", mock_server.uri());
    let outcome = tokio::task::spawn_blocking(move || client(url).fetch_transcript("m1", "test_token"))
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::RateLimited);
}

#[tokio::test]
async fn test_forbidden_is_transport_error() {
    let mock_server = MockServer::start().await;
    mount_handshake(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/call" })))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&mock_server)
        .await;

    let url = format!("{}/mcp", mock_server.uri());
    let (outcome, listed) = tokio::task::spawn_blocking(move || {
        let api = client(url);
        (
            api.fetch_transcript("m1", "test_token"),
            api.list_meetings("test_token", &DateRange::ThisWeek),
        )
    })
    .await
    .unwrap();

    assert!(matches!(outcome, FetchOutcome::TransportError(msg) if msg.contains("403")));
    assert!(matches!(listed, Err(Error::Api { status: 403, .. })));
}

#[tokio::test]
async fn test_empty_transcript_is_transport_error() {
    let mock_server = MockServer::start().await;
    mount_handshake(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "tools/call" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(tool_result(r#"{"transcript": ""}"#)),
        )
        .mount(&mock_server)
        .await;

    let url = format!("{}/mcp", mock_server.uri());
    let outcome = tokio::task::spawn_blocking(move || client(url).fetch_transcript("m1", "test_token"))
        .await
        .unwrap();

    assert!(matches!(outcome, FetchOutcome::TransportError(msg) if msg.contains("empty transcript")));
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_saved() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "refresh_token": "r2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp = TempDir::new().unwrap();
    let token_path = temp.path().join("tokens.json");
    let stale = StoredTokens {
        access_token: "stale".into(),
        refresh_token: Some("r1".into()),
        expires_at: 1,
        client_id: Some("client-abc".into()),
    };
    std::fs::write(&token_path, serde_json::to_string(&stale).unwrap()).unwrap();

    let token_url = format!("{}/oauth2/token", mock_server.uri());
    let read_path = token_path.clone();
    let (first, second) = tokio::task::spawn_blocking(move || {
        let file = TokenFile::load(&read_path)
            .unwrap()
            .unwrap()
            .with_token_url(token_url);
        // Fresh token is cached; the second call does not refresh again.
        (file.get_valid_credential(), file.get_valid_credential())
    })
    .await
    .unwrap();

    assert_eq!(first.unwrap(), "fresh");
    assert_eq!(second.unwrap(), "fresh");

    let saved: StoredTokens =
        serde_json::from_str(&std::fs::read_to_string(&token_path).unwrap()).unwrap();
    assert_eq!(saved.access_token, "fresh");
    assert_eq!(saved.refresh_token.as_deref(), Some("r2"));
    assert_eq!(saved.client_id.as_deref(), Some("client-abc"));
}

#[tokio::test]
async fn test_rejected_refresh_is_auth_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&mock_server)
        .await;

    let temp = TempDir::new().unwrap();
    let token_path = temp.path().join("tokens.json");
    std::fs::write(
        &token_path,
        r#"{"access_token": "stale", "refresh_token": "r1", "expires_at": 1, "client_id": "c"}"#,
    )
    .unwrap();

    let token_url = format!("{}/oauth2/token", mock_server.uri());
    let result = tokio::task::spawn_blocking(move || {
        TokenFile::load(&token_path)
            .unwrap()
            .unwrap()
            .with_token_url(token_url)
            .get_valid_credential()
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(Error::Auth(_))));
}

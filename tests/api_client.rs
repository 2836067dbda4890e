//! End-to-end tests of the API client against a mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use pawhub_connect::{
    ApiClient, ApiError, ApiRequest, ClientConfig, ForegroundState, MemoryTokenStore, SecureStorage,
    TokenPair, TokenStore,
};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, store: Arc<dyn TokenStore>) -> ApiClient {
    let config = ClientConfig {
        base_url: format!("{}/", server.uri()),
        ..ClientConfig::default()
    };
    ApiClient::new(config, store, Arc::new(ForegroundState::new(true))).unwrap()
}

#[tokio::test]
async fn sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/pets"))
        .and(matchers::header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "name": "Rex" }])))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_pair(&TokenPair::new("a1", "r1")));
    let client = client_for(&server, store);

    let response = client.request(ApiRequest::get("/pets")).await.unwrap();
    let pets: Vec<serde_json::Value> = response.json().unwrap();
    assert_eq!(pets[0]["name"], "Rex");
    assert_eq!(client.server_status().is_online, Some(true));
}

#[tokio::test]
async fn refreshes_expired_token_and_persists_it() {
    let server = MockServer::start().await;
    Mock::given(matchers::path("/bookings"))
        .and(matchers::header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({ "error": "jwt expired" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth/refresh-token"))
        .and(matchers::body_json(serde_json::json!({ "refreshToken": "r1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "accessToken": "new" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(matchers::path("/bookings"))
        .and(matchers::header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(SecureStorage::new(dir.path()).unwrap());
    storage.store_pair(&TokenPair::new("old", "r1")).await.unwrap();
    let client = client_for(&server, Arc::clone(&storage) as Arc<_>);

    let response = client.request(ApiRequest::get("/bookings")).await.unwrap();
    assert_eq!(response.body, "[]");

    let pair = storage.load_pair().await.unwrap();
    assert_eq!(pair, TokenPair::new("new", "r1"));
}

#[tokio::test]
async fn http_errors_carry_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(matchers::path("/services/42"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({ "error": "Service not found" })))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));

    let result = client.request(ApiRequest::get("/services/42")).await;
    assert_eq!(
        result,
        Err(ApiError::Http { status: 404, message: "Service not found".into() })
    );
}

#[tokio::test]
async fn retries_while_server_is_waking() {
    let server = MockServer::start().await;
    Mock::given(matchers::path("/riders"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(matchers::path("/riders"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let mut config = ClientConfig {
        base_url: server.uri(),
        ..ClientConfig::default()
    };
    config.retry.retry_delay = Duration::from_millis(10);
    let client =
        ApiClient::new(config, Arc::new(MemoryTokenStore::new()), Arc::new(ForegroundState::new(true)))
            .unwrap();

    let response = client.request_with_retry(ApiRequest::get("/riders"), 3).await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(matchers::path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));

    let result = client
        .request(ApiRequest::get("/slow").timeout(Duration::from_millis(100)))
        .await;
    assert_eq!(result, Err(ApiError::Timeout(Duration::from_millis(100))));
    assert_eq!(client.server_status().consecutive_failures, 1);
}

#[tokio::test]
async fn health_check_and_wake() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryTokenStore::new()));

    assert!(client.check_health(Duration::from_secs(2)).await);
    assert!(client.wake_server_sequence().await);

    let status = client.server_status();
    assert!(status.is_awake);
    assert_eq!(status.consecutive_failures, 0);
}

#[tokio::test]
async fn unreachable_server_is_offline() {
    // Nothing listens on port 9 (discard) on test machines
    let config = ClientConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        ..ClientConfig::default()
    };
    let client =
        ApiClient::new(config, Arc::new(MemoryTokenStore::new()), Arc::new(ForegroundState::new(true)))
            .unwrap();

    assert!(!client.check_health(Duration::from_secs(2)).await);
    let result = client.request(ApiRequest::get("/pets")).await;
    assert!(matches!(result, Err(ApiError::Network(_)) | Err(ApiError::Timeout(_))));

    let status = client.server_status();
    assert_eq!(status.is_online, Some(false));
    assert_eq!(status.consecutive_failures, 2);
}

//! Integration tests for the HTTP client, run against a loopback server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use dakara_base::http_client::{HttpClient, HttpError, ServerConfig};

#[derive(Default)]
struct AppState {
    logins: AtomicU32,
    valid_token: Mutex<Option<String>>,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if body["login"] != "player" || body["password"] != "pass" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "invalid credentials"})),
        );
    }

    let count = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    let token = format!("token{}", count);
    *state.valid_token.lock().unwrap() = Some(token.clone());

    (StatusCode::OK, Json(json!({ "token": token })))
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let expected = state.valid_token.lock().unwrap().clone();
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    matches!((expected, header), (Some(token), Some(header)) if header == format!("Token {}", token))
}

async fn songs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "unauthorized"})),
        );
    }

    (
        StatusCode::OK,
        Json(json!([{"id": 1, "title": "mysterious song"}])),
    )
}

async fn create_song(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "unauthorized"})),
        );
    }

    (StatusCode::CREATED, Json(body))
}

async fn clear_queue() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn garbled() -> &'static str {
    "definitely not json"
}

async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::default());

    let app = Router::new()
        .route("/api/accounts/login/", post(login))
        .route("/api/library/songs/", get(songs).post(create_song))
        .route("/api/playlist/queuing/", delete(clear_queue))
        .route("/api/garbled/", get(garbled))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn server_config(addr: SocketAddr) -> ServerConfig {
    ServerConfig {
        address: format!("127.0.0.1:{}", addr.port()),
        ssl: false,
        login: Some("player".to_string()),
        password: Some("pass".to_string()),
        token: None,
    }
}

#[tokio::test]
async fn test_authenticate_and_get() {
    let (addr, state) = spawn_server().await;
    let client = HttpClient::new(&server_config(addr), "api/").unwrap();

    client.authenticate().await.unwrap();
    assert!(client.is_authenticated().await);
    assert_eq!(state.logins.load(Ordering::SeqCst), 1);

    let songs: Value = client.get("library/songs/").await.unwrap();
    assert_eq!(songs[0]["title"], "mysterious song");
}

#[tokio::test]
async fn test_authenticate_invalid_credentials() {
    let (addr, _state) = spawn_server().await;
    let mut config = server_config(addr);
    config.password = Some("wrong".to_string());

    let client = HttpClient::new(&config, "api/").unwrap();
    let error = client.authenticate().await.unwrap_err();
    assert!(matches!(error, HttpError::Authentication));
}

#[tokio::test]
async fn test_lazy_authentication_on_first_request() {
    let (addr, state) = spawn_server().await;
    let client = HttpClient::new(&server_config(addr), "api/").unwrap();

    // no explicit login: the first 401 triggers one
    let songs: Value = client.get("library/songs/").await.unwrap();
    assert_eq!(songs[0]["id"], 1);
    assert_eq!(state.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reauthenticate_on_expired_token() {
    let (addr, state) = spawn_server().await;
    let client = HttpClient::new(&server_config(addr), "api/").unwrap();

    client.authenticate().await.unwrap();
    let _: Value = client.get("library/songs/").await.unwrap();

    // invalidate the token on the server side
    *state.valid_token.lock().unwrap() = Some("revoked".to_string());

    let songs: Value = client.get("library/songs/").await.unwrap();
    assert_eq!(songs[0]["id"], 1);
    assert_eq!(state.logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unauthorized_without_credentials() {
    let (addr, _state) = spawn_server().await;
    let mut config = server_config(addr);
    config.login = None;
    config.password = None;

    let client = HttpClient::new(&config, "api/").unwrap();
    let error = client.get::<Value>("library/songs/").await.unwrap_err();
    assert!(matches!(error, HttpError::NotAuthenticated));
}

#[tokio::test]
async fn test_post_echoes_body() {
    let (addr, _state) = spawn_server().await;
    let client = HttpClient::new(&server_config(addr), "api/").unwrap();
    client.authenticate().await.unwrap();

    let created: Value = client
        .post("library/songs/", &json!({"title": "new song"}))
        .await
        .unwrap();
    assert_eq!(created["title"], "new song");
}

#[tokio::test]
async fn test_delete_with_empty_response() {
    let (addr, _state) = spawn_server().await;
    let client = HttpClient::new(&server_config(addr), "api/").unwrap();
    client.authenticate().await.unwrap();

    client.delete::<()>("playlist/queuing/").await.unwrap();
}

#[tokio::test]
async fn test_not_found_maps_to_response_error() {
    let (addr, _state) = spawn_server().await;
    let client = HttpClient::new(&server_config(addr), "api/").unwrap();
    client.authenticate().await.unwrap();

    let error = client.get::<Value>("nowhere/").await.unwrap_err();
    match error {
        HttpError::Response { status, .. } => assert_eq!(status, 404),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_json_response() {
    let (addr, _state) = spawn_server().await;
    let client = HttpClient::new(&server_config(addr), "api/").unwrap();
    client.authenticate().await.unwrap();

    let error = client.get::<Value>("garbled/").await.unwrap_err();
    assert!(matches!(error, HttpError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_unreachable_server() {
    // bind a port then free it, so nothing listens there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpClient::new(&server_config(addr), "api/").unwrap();
    let error = client.authenticate().await.unwrap_err();
    assert!(matches!(error, HttpError::Network(_)));
}

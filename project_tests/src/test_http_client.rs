//! # `http_client` Test Runner
//!
//! Exercises the `dakara_base::http_client::HttpClient` end-to-end against a
//! loopback server started in the same process: login, token injection,
//! re-authentication after a token expiry and the uniform error mapping of
//! non-2xx responses.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use dakara_base::config::create_logger;
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

async fn songs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let expected = state.valid_token.lock().unwrap().clone();
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let ok = matches!(
        (expected, header),
        (Some(token), Some(header)) if header == format!("Token {}", token)
    );

    if !ok {
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

async fn spawn_server() -> anyhow::Result<(SocketAddr, Arc<AppState>)> {
    let state = Arc::new(AppState::default());
    let app = Router::new()
        .route("/api/accounts/login/", post(login))
        .route("/api/library/songs/", get(songs))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok((addr, state))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    create_logger()?;

    let (addr, state) = spawn_server().await?;
    let config = ServerConfig {
        address: format!("127.0.0.1:{}", addr.port()),
        ssl: false,
        login: Some("player".to_string()),
        password: Some("pass".to_string()),
        token: None,
    };
    let client = HttpClient::new(&config, "api/")?;

    println!("--- Starting HTTP Client Tests ---");

    // --- TEST 1: Login & Token Injection ---
    println!("\n[Test 1] Testing login and token injection...");
    client.authenticate().await?;
    let songs: Value = client.get("library/songs/").await?;
    assert_eq!(songs[0]["title"], "mysterious song");
    println!("✅ Login successful, token injected on GET");

    // --- TEST 2: Re-authentication after token expiry ---
    println!("\n[Test 2] Testing re-authentication on 401...");
    *state.valid_token.lock().unwrap() = Some("revoked".to_string());
    let _: Value = client.get("library/songs/").await?;
    assert_eq!(state.logins.load(Ordering::SeqCst), 2);
    println!("✅ Expired token healed by a single re-login");

    // --- TEST 3: Uniform error for non-2xx responses ---
    println!("\n[Test 3] Testing 404 mapping...");
    let error = client.get::<Value>("nowhere/").await.unwrap_err();
    match error {
        HttpError::Response { status, .. } => assert_eq!(status, 404),
        other => panic!("unexpected error: {:?}", other),
    }
    println!("✅ Non-2xx mapped to HttpError::Response");

    println!("\n--- All Tests Passed Successfully ---");
    Ok(())
}

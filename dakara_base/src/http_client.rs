//! # HTTP Client Module
//!
//! A token-authenticated HTTP client for the Dakara server, built on
//! `reqwest` with middleware support for exponential backoff retries on
//! transient failures.
//!
//! The client logs in once with the configured credentials, then injects the
//! obtained token in every request. A request rejected with 401 triggers a
//! single re-authentication before being replayed, so a token expired on the
//! server side heals transparently. Non-2xx responses map to one uniform
//! error.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::utils::{create_url, display_message};

/// Route of the login endpoint, relative to the server URL.
const LOGIN_ROUTE: &str = "accounts/login/";

/// Number of retries performed by the transient error middleware.
const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Limit applied to server error bodies before they reach the logs.
const ERROR_MESSAGE_LIMIT: usize = 100;

/// Errors raised by the HTTP client.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The server address or the route cannot form a valid URL.
    #[error("Invalid server parameter: {0}")]
    Parameter(String),

    /// The server rejected the configured credentials.
    #[error("Unable to authenticate to the server with this user")]
    Authentication,

    /// The client holds no valid token for the request.
    #[error("Not authenticated to the server")]
    NotAuthenticated,

    /// The server is unreachable.
    #[error("Network error, unable to talk to the server: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("Error {status} from the server: {message}")]
    Response {
        /// HTTP status code of the response.
        status: u16,
        /// Truncated body of the response.
        message: String,
    },

    /// The server answered with a body that does not deserialize.
    #[error("Invalid response from the server: {0}")]
    InvalidResponse(String),
}

/// Configuration of the connection to the server.
///
/// This is the `server` section of the config file, shared with the
/// WebSocket client.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host and optional port of the server, e.g. `www.example.com:8000`.
    pub address: String,
    /// Use TLS schemes (`https`/`wss`).
    #[serde(default)]
    pub ssl: bool,
    /// Login used to authenticate.
    #[serde(default)]
    pub login: Option<String>,
    /// Password used to authenticate.
    #[serde(default)]
    pub password: Option<String>,
    /// Pre-obtained token, used instead of logging in.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Token-authenticated HTTP client for the Dakara server.
#[derive(Debug)]
pub struct HttpClient {
    inner: ClientWithMiddleware,
    server_url: Url,
    credentials: Option<(String, String)>,
    token: RwLock<Option<String>>,
}

impl HttpClient {
    /// Create a client for the given server and API route.
    ///
    /// The route is appended to the server address, e.g. `api/`. No network
    /// access happens before [`authenticate`](Self::authenticate) or the
    /// first request.
    pub fn new(config: &ServerConfig, route: &str) -> Result<Self, HttpError> {
        let server_url = create_url(&config.address, config.ssl, route, "http", "https")
            .map_err(|error| HttpError::Parameter(format!("{}: {}", config.address, error)))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_TRANSIENT_RETRIES);
        let inner = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let credentials = match (&config.login, &config.password) {
            (Some(login), Some(password)) => Some((login.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            inner,
            server_url,
            credentials,
            token: RwLock::new(config.token.clone()),
        })
    }

    /// Log in to the server and store the obtained token.
    pub async fn authenticate(&self) -> Result<(), HttpError> {
        let (login, password) = self
            .credentials
            .as_ref()
            .ok_or(HttpError::NotAuthenticated)?;

        let url = self.join(LOGIN_ROUTE)?;
        let response = self
            .inner
            .post(url)
            .json(&serde_json::json!({ "login": login, "password": password }))
            .send()
            .await
            .map_err(|error| HttpError::Network(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(HttpError::Authentication);
        }

        if !status.is_success() {
            return Err(response_error(status, response).await);
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|error| HttpError::InvalidResponse(error.to_string()))?;

        *self.token.write().await = Some(body.token);
        log::info!("Login to server successful");

        Ok(())
    }

    /// Tell if the client currently holds a token.
    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Give the `Authorization` header value holding the current token.
    ///
    /// The WebSocket client reuses it for its handshake.
    pub async fn authorization_header(&self) -> Result<HeaderValue, HttpError> {
        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or(HttpError::NotAuthenticated)?;

        HeaderValue::from_str(&format!("Token {}", token))
            .map_err(|error| HttpError::Parameter(error.to_string()))
    }

    /// Perform a GET request on the given route.
    pub async fn get<T>(&self, path: &str) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.request(Method::GET, path, None::<&()>).await
    }

    /// Perform a POST request on the given route with a JSON body.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Perform a PUT request on the given route with a JSON body.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// Perform a PATCH request on the given route with a JSON body.
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// Perform a DELETE request on the given route.
    pub async fn delete<T>(&self, path: &str) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.request(Method::DELETE, path, None::<&()>).await
    }

    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.join(path)?;
        let mut reauthenticated = false;

        loop {
            let mut request = self.inner.request(method.clone(), url.clone());

            if let Some(body) = body {
                request = request.json(body);
            }

            if let Some(token) = self.token.read().await.as_ref() {
                let header = format!("Token {}", token);
                request = request.header(AUTHORIZATION, header);
            }

            let response = request
                .send()
                .await
                .map_err(|error| HttpError::Network(error.to_string()))?;

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                // replay the request once with a fresh token
                if !reauthenticated && self.credentials.is_some() {
                    log::debug!("Authentication token rejected, logging in again");
                    reauthenticated = true;
                    self.authenticate().await?;
                    continue;
                }

                return Err(HttpError::NotAuthenticated);
            }

            if !status.is_success() {
                return Err(response_error(status, response).await);
            }

            let text = response
                .text()
                .await
                .map_err(|error| HttpError::Network(error.to_string()))?;

            // an empty body deserializes as null, so T can be () or Option
            let payload = if text.is_empty() { "null" } else { text.as_str() };
            return serde_json::from_str(payload)
                .map_err(|error| HttpError::InvalidResponse(error.to_string()));
        }
    }

    fn join(&self, path: &str) -> Result<Url, HttpError> {
        self.server_url
            .join(path)
            .map_err(|error| HttpError::Parameter(format!("{}: {}", path, error)))
    }
}

async fn response_error(status: StatusCode, response: reqwest::Response) -> HttpError {
    let message = response.text().await.unwrap_or_default();

    HttpError::Response {
        status: status.as_u16(),
        message: display_message(&message, ERROR_MESSAGE_LIMIT),
    }
}

//! # Dakara Base
//!
//! Helpers shared by the Dakara Project client and server applications.
//!
//! ## Purpose:
//! Every Dakara application needs the same handful of small building blocks:
//! a YAML configuration loader with environment variable overrides, a common
//! error type with message annotation helpers, an authenticated HTTP client,
//! a self-reconnecting WebSocket client, progress bars and the resolution of
//! per-OS application directories. This crate collects them in one place so
//! the applications can focus on their own logic.
//!
//! ## Contained Modules:
//!
//! - **`config`**: YAML configuration loading, env var overlay and logger setup.
//! - **`directory`**: per-OS application directory resolution.
//! - **`error`**: the `DakaraError` umbrella type and annotation helpers.
//! - **`http_client`**: token-authenticated HTTP client with retry middleware.
//! - **`progress_bar`**: progress bar presets for interactive and logged runs.
//! - **`resources`**: lookup of files shipped alongside an application.
//! - **`utils`**: message truncation and URL construction helpers.
//! - **`websocket_client`**: auto-reconnecting WebSocket client.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// YAML configuration loading, environment overlay and logger installation.
pub mod config;
/// Per-OS application directory resolution.
pub mod directory;
/// Crate-wide error type, annotation helpers and exit code reporting.
pub mod error;
/// Token-authenticated HTTP client with transient retry middleware.
pub mod http_client;
/// Progress bar presets for interactive and log-friendly output.
pub mod progress_bar;
/// Lookup of resource files shipped alongside an application.
pub mod resources;
/// Small helpers shared by the other modules.
pub mod utils;
/// Auto-reconnecting WebSocket client with callback hooks.
pub mod websocket_client;

// Re-export the most commonly used items
pub use error::{Annotate, DakaraError};
pub use http_client::{HttpClient, ServerConfig};
pub use websocket_client::{ConnectionState, WebSocketClient, WebSocketHandle, WebSocketHandler};

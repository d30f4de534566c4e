//! # Shared Helpers
//!
//! Small functions used across the crate: truncating messages before they
//! reach the logs and building server URLs from the common `address`/`ssl`
//! configuration keys.

use url::Url;

/// Truncate a message for display.
///
/// The result never exceeds `limit` characters. Longer messages are cut and
/// terminated with `...`.
pub fn display_message(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }

    let kept: String = message.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

/// Build a server URL from an address and a route.
///
/// The scheme is picked according to `ssl`, so the same helper serves both
/// the HTTP client (`http`/`https`) and the WebSocket client (`ws`/`wss`).
/// The address holds the host and an optional port, e.g. `www.example.com`
/// or `192.168.0.1:8080`.
pub fn create_url(
    address: &str,
    ssl: bool,
    path: &str,
    scheme_no_ssl: &str,
    scheme_ssl: &str,
) -> Result<Url, url::ParseError> {
    let scheme = if ssl { scheme_ssl } else { scheme_no_ssl };
    let base = Url::parse(&format!("{}://{}/", scheme, address))?;
    base.join(path)
}

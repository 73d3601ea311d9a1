//! Shared HTTP client and request helpers.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::McpezError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// No overall timeout is set since tool-server event streams stay open for
/// the whole session; callers bound individual requests instead.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// JSON headers, with a bearer token when `api_key` is set.
pub fn bearer_headers(api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key.filter(|key| !key.is_empty()) {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Build an API error from a non-success response body.
///
/// Uses `error.message` from a JSON body when present, else the raw text.
pub fn status_to_error(status: u16, body: &str) -> McpezError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    McpezError::api(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_error_message_is_extracted() {
        let err = status_to_error(401, r#"{"error":{"message":"Invalid API key","type":"auth"}}"#);
        assert!(matches!(err, McpezError::Api { status: 401, message } if message == "Invalid API key"));
    }

    #[test]
    fn plain_body_is_kept() {
        let err = status_to_error(502, "bad gateway\n");
        assert!(matches!(err, McpezError::Api { status: 502, message } if message == "bad gateway"));
    }

    #[test]
    fn authorization_only_with_key() {
        assert!(bearer_headers(None).get(AUTHORIZATION).is_none());
        assert!(bearer_headers(Some("")).get(AUTHORIZATION).is_none());
        assert_eq!(bearer_headers(Some("sk-1"))[AUTHORIZATION], "Bearer sk-1");
    }
}

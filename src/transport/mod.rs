//! HTTP transport to the banking platform
//!
//! One request in, one parsed JSON response out. The transport knows the base
//! URL and the timeout, nothing about tokens or what the payload means.

use crate::error::GatewayError;
use crate::Result;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A single call against the platform, relative to the base URL.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// `Authorization` carries either the password or the session token.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();

        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &headers)
            .field("query", &self.query)
            .field("body", &self.body)
            .finish()
    }
}

/// A 2xx response with a parsed body. Empty bodies parse to `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

/// Trait for performing HTTP calls (swapped for a double in tests)
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// `Err(Transport)` when no response arrived, `Err(Upstream)` for a
    /// non-2xx status or an unparseable body.
    async fn send(&self, request: HttpRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport with a pooled client and a bounded timeout
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<TransportResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let started = Instant::now();

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(ACCEPT, "application/json");

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(method = %request.method, path = %request.path, error = %e, "Upstream request failed");
            let reason = if e.is_timeout() { "timed out" } else { "failed" };
            GatewayError::Transport(format!(
                "Request {} {} {}: {}",
                request.method, request.path, reason, e
            ))
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            GatewayError::Transport(format!(
                "Reading response for {} {} failed: {}",
                request.method, request.path, e
            ))
        })?;

        debug!(
            method = %request.method,
            path = %request.path,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream call completed"
        );

        interpret_response(status, &bytes)
    }
}

/// Classify a received response by status and body.
pub fn interpret_response(status: u16, body: &[u8]) -> Result<TransportResponse> {
    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        Ok(Value::Null)
    } else {
        serde_json::from_slice::<Value>(body)
    };

    if !(200..300).contains(&status) {
        let message = match parsed.ok().as_ref().and_then(upstream_message) {
            Some(detail) => format!("API request failed: {} ({})", status, detail),
            None => format!("API request failed: {}", status),
        };
        return Err(GatewayError::upstream(status, message));
    }

    match parsed {
        Ok(body) => Ok(TransportResponse { status, body }),
        Err(e) => Err(GatewayError::upstream(
            status,
            format!("Invalid JSON response: {}", e),
        )),
    }
}

/// The platform reports failures as `{"code": 400, "message": "OBP-30001: ..."}`.
fn upstream_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_with_json_body() {
        let response = interpret_response(200, br#"{"banks": []}"#).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["banks"], Value::Array(vec![]));
    }

    #[test]
    fn test_empty_success_body_is_null() {
        let response = interpret_response(204, b"").unwrap();
        assert_eq!(response.body, Value::Null);
    }

    #[test]
    fn test_non_2xx_carries_status_and_platform_message() {
        let err = interpret_response(404, br#"{"code":404,"message":"OBP-30001: Bank not found."}"#)
            .unwrap_err();
        assert_eq!(err.status_code(), Some(404));
        assert!(err.to_string().contains("OBP-30001"));
    }

    #[test]
    fn test_non_2xx_with_html_body() {
        let err = interpret_response(502, b"<html>Bad Gateway</html>").unwrap_err();
        assert_eq!(err, GatewayError::upstream(502, "API request failed: 502"));
    }

    #[test]
    fn test_unparseable_2xx_is_upstream_failure() {
        let err = interpret_response(200, b"not json").unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: Some(200), .. }));
    }

    #[test]
    fn test_request_builder_helpers() {
        let request = HttpRequest::get("/obp/v5.1.0/banks")
            .header("Authorization", "DirectLogin token=\"abc\"")
            .query("limit", 5);
        assert_eq!(request.header_value("authorization"), Some("DirectLogin token=\"abc\""));
        assert_eq!(request.query_value("limit"), Some("5"));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_debug_redacts_authorization() {
        let login = HttpRequest::post("/my/logins/direct").header(
            "Authorization",
            r#"DirectLogin username="u", password="hunter2", consumer_key="k""#,
        );
        let call = HttpRequest::get("/obp/v5.1.0/banks")
            .header("authorization", "DirectLogin token=\"secret-token\"")
            .header("Accept", "application/json");

        let rendered = format!("{:?} {:?}", login, call);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("/my/logins/direct"));
        assert!(rendered.contains("application/json"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let transport = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = transport.send(HttpRequest::get("/obp/v5.1.0/banks")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert_eq!(err.status_code(), None);
    }
}

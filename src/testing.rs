//! Test doubles shared by the unit tests

use crate::error::GatewayError;
use crate::session::DIRECT_LOGIN_PATH;
use crate::transport::{HttpRequest, Transport, TransportResponse};
use crate::Result;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type ApiHandler = Box<dyn Fn(&HttpRequest) -> Result<TransportResponse> + Send + Sync>;
type LoginHandler = Box<dyn Fn(usize) -> Result<TransportResponse> + Send + Sync>;

/// Transport double: logins answer `token-N` by default, every other request
/// goes to the supplied handler. All calls are counted and recorded.
pub(crate) struct ScriptedTransport {
    api: ApiHandler,
    login: Option<LoginHandler>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    logins: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<TransportResponse> + Send + Sync + 'static,
    {
        Self {
            api: Box::new(handler),
            login: None,
            latency: None,
            calls: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every API call answers 200 with the given body.
    pub fn always(body: Value) -> Self {
        Self::new(move |_| ok(body.clone()))
    }

    pub fn with_login<F>(mut self, handler: F) -> Self
    where
        F: Fn(usize) -> Result<TransportResponse> + Send + Sync + 'static,
    {
        self.login = Some(Box::new(handler));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn api_call_count(&self) -> usize {
        self.call_count() - self.login_count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn api_requests(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path != DIRECT_LOGIN_PATH)
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let login_number = if request.path == DIRECT_LOGIN_PATH {
            Some(self.logins.fetch_add(1, Ordering::SeqCst) + 1)
        } else {
            None
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match login_number {
            Some(n) => match &self.login {
                Some(handler) => handler(n),
                None => Ok(TransportResponse {
                    status: 201,
                    body: json!({ "token": format!("token-{}", n) }),
                }),
            },
            None => (self.api)(&request),
        }
    }
}

pub(crate) fn ok(body: Value) -> Result<TransportResponse> {
    Ok(TransportResponse { status: 200, body })
}

pub(crate) fn status(code: u16) -> Result<TransportResponse> {
    Err(GatewayError::upstream(code, format!("API request failed: {}", code)))
}

//! Session management
//!
//! Owns the DirectLogin token. All reads and refreshes go through one async
//! mutex, so concurrent callers that find the session absent or stale wait
//! for a single login instead of issuing their own. The login itself runs in
//! a spawned task holding the lock: a caller that gets cancelled mid-refresh
//! does not abort it, and the result still lands for everyone else.

use crate::config::Credentials;
use crate::error::GatewayError;
use crate::transport::{HttpRequest, Transport};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DIRECT_LOGIN_PATH: &str = "/my/logins/direct";

/// An issued token and its client-side validity window.
///
/// The platform does not report an expiry, so `expires_at` is
/// `issued_at + lifetime` with a configured lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub username: String,
    pub consumer_key: String,
}

impl Session {
    fn issue(token: String, credentials: &Credentials, lifetime: chrono::Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            token,
            issued_at,
            expires_at: issued_at + lifetime,
            username: credentials.username.clone(),
            consumer_key: credentials.consumer_key.clone(),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.fingerprint())
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("username", &self.username)
            .finish()
    }
}

/// Short SHA-256 prefix so tokens can be correlated in logs without leaking.
pub fn token_fingerprint(token: &str) -> String {
    let digest = hex::encode(Sha256::digest(token.as_bytes()));
    digest[..12].to_string()
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Absent,
    Valid,
    Stale,
}

#[derive(Default)]
struct SessionState {
    session: Option<Session>,
    last_failure: Option<GatewayError>,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    credentials: Arc<Credentials>,
    lifetime: chrono::Duration,
    state: Arc<Mutex<SessionState>>,
    /// Bumped (under the lock) each time a login attempt finishes.
    completed_logins: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials, lifetime: Duration) -> Self {
        // A lifetime chrono cannot represent falls back to one day; any other is kept as given.
        let lifetime = chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::days(1));

        Self {
            transport,
            credentials: Arc::new(credentials),
            lifetime,
            state: Arc::new(Mutex::new(SessionState::default())),
            completed_logins: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return a token that is valid right now, logging in first if needed.
    pub async fn get_valid_token(&self) -> Result<String> {
        let observed = self.completed_logins.load(Ordering::Acquire);
        let mut guard = self.state.clone().lock_owned().await;

        if let Some(session) = guard.session.as_ref() {
            if session.is_valid_at(Utc::now()) {
                return Ok(session.token.clone());
            }
            debug!(token = %session.fingerprint(), expires_at = %session.expires_at, "Session is stale");
            guard.session = None;
        }

        // A login finished while we were queued and it failed: share its outcome.
        if self.completed_logins.load(Ordering::Acquire) != observed {
            if let Some(err) = guard.last_failure.clone() {
                return Err(err);
            }
        }

        let transport = self.transport.clone();
        let credentials = self.credentials.clone();
        let lifetime = self.lifetime;
        let completed_logins = self.completed_logins.clone();

        let refresh = tokio::spawn(async move {
            let mut state = guard;
            let outcome = authenticate(transport.as_ref(), &credentials, lifetime).await;
            match &outcome {
                Ok(session) => {
                    state.session = Some(session.clone());
                    state.last_failure = None;
                }
                Err(err) => {
                    state.session = None;
                    state.last_failure = Some(err.clone());
                }
            }
            completed_logins.fetch_add(1, Ordering::Release);
            outcome.map(|session| session.token)
        });

        match refresh.await {
            Ok(outcome) => outcome,
            Err(e) => Err(GatewayError::Unexpected(format!("Session refresh task failed: {}", e))),
        }
    }

    /// Drop the session if it still holds `rejected`, forcing a fresh login.
    /// A newer session obtained by another caller is left alone.
    pub async fn invalidate_token(&self, rejected: &str) {
        let mut state = self.state.lock().await;
        if state.session.as_ref().map(|s| s.token.as_str()) == Some(rejected) {
            warn!(token = %token_fingerprint(rejected), "Discarding rejected session token");
            state.session = None;
        }
    }

    pub async fn status(&self) -> SessionStatus {
        match self.state.lock().await.session.as_ref() {
            None => SessionStatus::Absent,
            Some(session) if session.is_valid_at(Utc::now()) => SessionStatus::Valid,
            Some(_) => SessionStatus::Stale,
        }
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.state.lock().await.session.clone()
    }

    /// Shift the current session's window into the past.
    #[cfg(test)]
    pub(crate) async fn backdate(&self, by: chrono::Duration) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.session.clone() {
            state.session = Some(Session {
                issued_at: session.issued_at - by,
                expires_at: session.expires_at - by,
                ..session
            });
        }
    }
}

/// Exchange credentials for a token via DirectLogin.
async fn authenticate(
    transport: &dyn Transport,
    credentials: &Credentials,
    lifetime: chrono::Duration,
) -> Result<Session> {
    if credentials.username.is_empty()
        || credentials.password.is_empty()
        || credentials.consumer_key.is_empty()
    {
        return Err(GatewayError::Authentication {
            status: None,
            message: "Username, password, and consumer_key are required for authentication".to_string(),
        });
    }

    let request = HttpRequest::post(DIRECT_LOGIN_PATH)
        .header("Authorization", credentials.direct_login_header());

    let response = transport.send(request).await.map_err(|err| match err {
        GatewayError::Upstream { status, message } => GatewayError::Authentication {
            status,
            message: format!("Authentication failed: {}", message),
        },
        GatewayError::Transport(message) => GatewayError::Authentication {
            status: None,
            message: format!("Authentication request failed: {}", message),
        },
        other => other,
    })?;

    let token = response
        .body
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::Authentication {
            status: Some(response.status),
            message: "No token found in response".to_string(),
        })?;

    let session = Session::issue(token.to_string(), credentials, lifetime);
    info!(
        username = %session.username,
        token = %session.fingerprint(),
        expires_at = %session.expires_at,
        "Authenticated with banking platform"
    );

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ok, ScriptedTransport};
    use crate::transport::TransportResponse;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn manager(transport: Arc<ScriptedTransport>) -> SessionManager {
        SessionManager::new(
            transport,
            Credentials::new("user@example.com", "pw", "key"),
            Duration::from_secs(1800),
        )
    }

    fn bank_list() -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::always(json!([])))
    }

    #[tokio::test]
    async fn test_first_call_logs_in_and_reuses_fresh_token() {
        let transport = bank_list();
        let sessions = manager(transport.clone());
        assert_eq!(sessions.status().await, SessionStatus::Absent);

        let first = assert_ok!(sessions.get_valid_token().await);
        let second = assert_ok!(sessions.get_valid_token().await);

        assert_eq!(first, "token-1");
        assert_eq!(first, second);
        assert_eq!(transport.login_count(), 1);
        assert_eq!(sessions.status().await, SessionStatus::Valid);

        let requests = transport.requests();
        let login = &requests[0];
        assert_eq!(login.method, reqwest::Method::POST);
        assert_eq!(
            login.header_value("Authorization"),
            Some(r#"DirectLogin username="user@example.com", password="pw", consumer_key="key""#)
        );
    }

    #[tokio::test]
    async fn test_session_window_uses_configured_lifetime() {
        let transport = bank_list();
        let sessions = SessionManager::new(
            transport,
            Credentials::new("u", "p", "k"),
            Duration::from_secs(60),
        );
        sessions.get_valid_token().await.unwrap();

        let session = sessions.current_session().await.unwrap();
        assert_eq!(session.expires_at - session.issued_at, chrono::Duration::seconds(60));
        assert_eq!(session.username, "u");
        assert_eq!(session.consumer_key, "k");
    }

    #[tokio::test]
    async fn test_long_lifetimes_kept_unrepresentable_fall_back() {
        let ten_years = Duration::from_secs(10 * 365 * 24 * 3600);
        let sessions = SessionManager::new(bank_list(), Credentials::new("u", "p", "k"), ten_years);
        sessions.get_valid_token().await.unwrap();
        let session = sessions.current_session().await.unwrap();
        assert_eq!(
            session.expires_at - session.issued_at,
            chrono::Duration::seconds(10 * 365 * 24 * 3600)
        );

        let sessions = SessionManager::new(bank_list(), Credentials::new("u", "p", "k"), Duration::MAX);
        sessions.get_valid_token().await.unwrap();
        let session = sessions.current_session().await.unwrap();
        assert_eq!(session.expires_at - session.issued_at, chrono::Duration::days(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_login() {
        let transport = Arc::new(
            ScriptedTransport::always(json!([])).with_latency(Duration::from_millis(50)),
        );
        let sessions = Arc::new(manager(transport.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.get_valid_token().await })
            })
            .collect();

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(transport.login_count(), 1);
        assert!(tokens.iter().all(|t| t == "token-1"));
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed() {
        let transport = bank_list();
        let sessions = manager(transport.clone());

        assert_eq!(sessions.get_valid_token().await.unwrap(), "token-1");
        sessions.backdate(chrono::Duration::hours(1)).await;
        assert_eq!(sessions.status().await, SessionStatus::Stale);

        assert_eq!(sessions.get_valid_token().await.unwrap(), "token-2");
        assert_eq!(transport.login_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_expired_session_refreshes_once_under_concurrency() {
        let transport = Arc::new(
            ScriptedTransport::always(json!([])).with_latency(Duration::from_millis(30)),
        );
        let sessions = Arc::new(manager(transport.clone()));
        sessions.get_valid_token().await.unwrap();
        sessions.backdate(chrono::Duration::hours(1)).await;

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.get_valid_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "token-2");
        }
        assert_eq!(transport.login_count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_credentials_surface_status() {
        let transport = Arc::new(ScriptedTransport::always(json!([])).with_login(|_| {
            Err(GatewayError::upstream(401, "API request failed: 401 (OBP-20004: Invalid login credentials.)"))
        }));
        let sessions = manager(transport);

        let err = assert_err!(sessions.get_valid_token().await);
        match err {
            GatewayError::Authentication { status, message } => {
                assert_eq!(status, Some(401));
                assert!(message.contains("OBP-20004"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(sessions.status().await, SessionStatus::Absent);
    }

    #[tokio::test]
    async fn test_network_failure_during_login() {
        let transport = Arc::new(
            ScriptedTransport::always(json!([]))
                .with_login(|_| Err(GatewayError::Transport("connection refused".into()))),
        );
        let sessions = manager(transport);

        let err = sessions.get_valid_token().await.unwrap_err();
        assert!(matches!(err, GatewayError::Authentication { status: None, .. }));
    }

    #[tokio::test]
    async fn test_missing_token_in_login_response() {
        let transport = Arc::new(
            ScriptedTransport::always(json!([]))
                .with_login(|_| Ok(TransportResponse { status: 201, body: json!({}) })),
        );
        let sessions = manager(transport);

        let err = sessions.get_valid_token().await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Authentication {
                status: Some(201),
                message: "No token found in response".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_credentials_never_reach_network() {
        let transport = bank_list();
        let sessions = SessionManager::new(
            transport.clone(),
            Credentials::new("", "pw", "key"),
            Duration::from_secs(60),
        );

        assert!(sessions.get_valid_token().await.is_err());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_share_a_failed_login() {
        let transport = Arc::new(
            ScriptedTransport::always(json!([]))
                .with_latency(Duration::from_millis(50))
                .with_login(|_| Err(GatewayError::upstream(503, "API request failed: 503"))),
        );
        let sessions = Arc::new(manager(transport.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.get_valid_token().await })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err.status_code(), Some(503));
        }
        assert_eq!(transport.login_count(), 1);

        // A later call is a new attempt, not a replay of the old failure.
        assert!(sessions.get_valid_token().await.is_err());
        assert_eq!(transport.login_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_abort_refresh() {
        let transport = Arc::new(
            ScriptedTransport::always(json!([])).with_latency(Duration::from_millis(100)),
        );
        let sessions = Arc::new(manager(transport.clone()));

        let caller = {
            let sessions = sessions.clone();
            tokio::spawn(async move { sessions.get_valid_token().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();

        assert_eq!(sessions.get_valid_token().await.unwrap(), "token-1");
        assert_eq!(transport.login_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_token_only_drops_matching_session() {
        let transport = Arc::new(ScriptedTransport::new(|_| ok(json!([]))));
        let sessions = manager(transport.clone());

        let token = sessions.get_valid_token().await.unwrap();
        sessions.invalidate_token("some-older-token").await;
        assert_eq!(sessions.status().await, SessionStatus::Valid);

        sessions.invalidate_token(&token).await;
        assert_eq!(sessions.status().await, SessionStatus::Absent);
        assert_eq!(sessions.get_valid_token().await.unwrap(), "token-2");
    }

    #[test]
    fn test_debug_hides_token() {
        let session = Session::issue(
            "super-secret-token".to_string(),
            &Credentials::new("u", "p", "k"),
            chrono::Duration::minutes(5),
        );
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains(&token_fingerprint("super-secret-token")));
    }
}

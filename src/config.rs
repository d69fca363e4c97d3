//! Gateway configuration
//!
//! Values come from the process environment (after `.env` is loaded by the
//! binaries). Credentials are either supplied explicitly or taken from the
//! public sandbox account; the active mode is always inspectable.

use crate::error::GatewayError;
use crate::Result;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://apisandbox.openbankproject.com";
pub const DEFAULT_API_VERSION: &str = "v5.1.0";
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 30 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PAGE_SIZE: u32 = 50;

const SANDBOX_USERNAME: &str = "katja.fi.29@example.com";
const SANDBOX_PASSWORD: &str = "ca0317";
const SANDBOX_CONSUMER_KEY: &str = "h1lquhpcl3jx43xbfaqqygi2hjp1bdb3qivlanku";

/// Where the credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// Shared demo account of the public sandbox.
    SandboxDefault,
    /// All three values were provided by the environment.
    Explicit,
}

impl fmt::Display for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialMode::SandboxDefault => "sandbox-default",
            CredentialMode::Explicit => "explicit-credentials",
        };
        write!(f, "{}", s)
    }
}

/// DirectLogin credentials. Immutable for the life of the process.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub consumer_key: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        consumer_key: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            consumer_key: consumer_key.into(),
        }
    }

    pub fn sandbox_default() -> Self {
        Self::new(SANDBOX_USERNAME, SANDBOX_PASSWORD, SANDBOX_CONSUMER_KEY)
    }

    /// Value of the `Authorization` header for the DirectLogin endpoint.
    pub fn direct_login_header(&self) -> String {
        format!(
            "DirectLogin username=\"{}\", password=\"{}\", consumer_key=\"{}\"",
            self.username, self.password, self.consumer_key
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("consumer_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_version: String,
    pub credentials: Credentials,
    pub credential_mode: CredentialMode,
    pub token_lifetime: Duration,
    pub request_timeout: Duration,
    pub default_page_size: u32,
}

impl GatewayConfig {
    /// Sandbox defaults for every setting.
    pub fn sandbox() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            credentials: Credentials::sandbox_default(),
            credential_mode: CredentialMode::SandboxDefault,
            token_lifetime: Duration::from_secs(DEFAULT_TOKEN_LIFETIME_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self.credential_mode = CredentialMode::Explicit;
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::sandbox();

        if let Some(base_url) = get("OBP_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(version) = get("OBP_API_VERSION") {
            config.api_version = version;
        }

        match (get("OBP_USERNAME"), get("OBP_PASSWORD"), get("OBP_CONSUMER_KEY")) {
            (Some(username), Some(password), Some(consumer_key)) => {
                config = config.with_credentials(Credentials::new(username, password, consumer_key));
            }
            (None, None, None) => {}
            _ => {
                return Err(GatewayError::Configuration(
                    "OBP_USERNAME, OBP_PASSWORD and OBP_CONSUMER_KEY must be set together".to_string(),
                ));
            }
        }

        if let Some(raw) = get("OBP_TOKEN_LIFETIME_SECS") {
            config.token_lifetime = Duration::from_secs(parse_positive(&raw, "OBP_TOKEN_LIFETIME_SECS")?);
        }
        if let Some(raw) = get("OBP_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_positive(&raw, "OBP_REQUEST_TIMEOUT_SECS")?);
        }
        if let Some(raw) = get("OBP_DEFAULT_PAGE_SIZE") {
            let size = parse_positive(&raw, "OBP_DEFAULT_PAGE_SIZE")?;
            config.default_page_size = u32::try_from(size).map_err(|_| {
                GatewayError::Configuration(format!("OBP_DEFAULT_PAGE_SIZE out of range: {}", raw))
            })?;
        }

        Ok(config)
    }

    /// Path prefix of the versioned REST API, e.g. `/obp/v5.1.0`.
    pub fn api_prefix(&self) -> String {
        format!("/obp/{}", self.api_version)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::sandbox()
    }
}

fn parse_positive(raw: &str, key: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(GatewayError::Configuration(format!(
            "{} must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_selects_sandbox_mode() {
        let config = GatewayConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.credential_mode, CredentialMode::SandboxDefault);
        assert_eq!(config.credentials, Credentials::sandbox_default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_full_credentials_select_explicit_mode() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("OBP_USERNAME", "alice@example.com"),
            ("OBP_PASSWORD", "secret"),
            ("OBP_CONSUMER_KEY", "key123"),
            ("OBP_BASE_URL", "http://localhost:8080/"),
            ("OBP_TOKEN_LIFETIME_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(config.credential_mode, CredentialMode::Explicit);
        assert_eq!(config.credentials.username, "alice@example.com");
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.token_lifetime, Duration::from_secs(60));
    }

    #[test]
    fn test_partial_credentials_are_rejected() {
        let result = GatewayConfig::from_lookup(lookup_from(&[("OBP_USERNAME", "alice")]));
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("OBP_USERNAME", "  "),
            ("OBP_PASSWORD", ""),
        ]))
        .unwrap();
        assert_eq!(config.credential_mode, CredentialMode::SandboxDefault);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let result = GatewayConfig::from_lookup(lookup_from(&[("OBP_DEFAULT_PAGE_SIZE", "0")]));
        assert!(matches!(result, Err(GatewayError::Configuration(_))));

        let result = GatewayConfig::from_lookup(lookup_from(&[("OBP_REQUEST_TIMEOUT_SECS", "soon")]));
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("bob", "hunter2", "consumer-secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("bob"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("consumer-secret"));
    }

    #[test]
    fn test_direct_login_header_format() {
        let creds = Credentials::new("u", "p", "k");
        assert_eq!(
            creds.direct_login_header(),
            r#"DirectLogin username="u", password="p", consumer_key="k""#
        );
    }
}

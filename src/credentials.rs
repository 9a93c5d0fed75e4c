// src/credentials.rs
//
// Credential resolution: environment (or explicit fields) first, token cache last.
// The environment is read once, here, into a `CredentialSource`; nothing else in
// the crate consults OS_* variables.

use std::fmt;
use tracing::{debug, warn};
use url::Url;

use crate::constants::{
    ENV_AUTH_TOKEN, ENV_AUTH_URL, ENV_PASSWORD, ENV_STORAGE_URL, ENV_TENANT_NAME, ENV_USERNAME,
};
use crate::error::{Result, StoreError};
use crate::token_cache::TokenCache;

/// Raw connection parameters. Empty strings count as absent.
#[derive(Clone, Default)]
pub struct CredentialSource {
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tenant_name: Option<String>,
    pub storage_url: Option<String>,
    pub auth_token: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl CredentialSource {
    /// Read OS_* variables, loading a `.env` file first if one exists.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let var = |name: &str| non_empty(std::env::var(name).ok());
        Self {
            auth_url: var(ENV_AUTH_URL),
            username: var(ENV_USERNAME),
            password: var(ENV_PASSWORD),
            tenant_name: var(ENV_TENANT_NAME),
            storage_url: var(ENV_STORAGE_URL),
            auth_token: var(ENV_AUTH_TOKEN),
        }
    }

    pub fn with_auth_url(mut self, v: impl Into<String>) -> Self {
        self.auth_url = non_empty(Some(v.into()));
        self
    }

    pub fn with_username(mut self, v: impl Into<String>) -> Self {
        self.username = non_empty(Some(v.into()));
        self
    }

    pub fn with_password(mut self, v: impl Into<String>) -> Self {
        self.password = non_empty(Some(v.into()));
        self
    }

    pub fn with_tenant(mut self, v: impl Into<String>) -> Self {
        self.tenant_name = non_empty(Some(v.into()));
        self
    }

    pub fn with_storage_url(mut self, v: impl Into<String>) -> Self {
        self.storage_url = non_empty(Some(v.into()));
        self
    }

    pub fn with_auth_token(mut self, v: impl Into<String>) -> Self {
        self.auth_token = non_empty(Some(v.into()));
        self
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSource")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tenant_name", &self.tenant_name)
            .field("storage_url", &self.storage_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Exactly one credential mode, fixed at construction time.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password {
        auth_url: String,
        username: String,
        password: String,
        tenant: String,
    },
    Token {
        /// Kept so a refreshed token can be cached under the right host.
        auth_url: Option<String>,
        storage_url: String,
        auth_token: String,
        tenant: String,
    },
}

impl Credentials {
    pub fn tenant(&self) -> &str {
        match self {
            Credentials::Password { tenant, .. } | Credentials::Token { tenant, .. } => tenant,
        }
    }

    pub fn auth_url(&self) -> Option<&str> {
        match self {
            Credentials::Password { auth_url, .. } => Some(auth_url),
            Credentials::Token { auth_url, .. } => auth_url.as_deref(),
        }
    }

    /// Token the caller started with, if any.
    pub fn supplied_token(&self) -> Option<&str> {
        match self {
            Credentials::Password { .. } => None,
            Credentials::Token { auth_token, .. } => Some(auth_token),
        }
    }

    /// Host component used to key the token cache. Empty when no auth URL is known.
    pub fn cache_host(&self) -> String {
        self.auth_url().map(auth_host).unwrap_or_default()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { auth_url, username, tenant, .. } => f
                .debug_struct("Password")
                .field("auth_url", auth_url)
                .field("username", username)
                .field("password", &"<redacted>")
                .field("tenant", tenant)
                .finish(),
            Credentials::Token { auth_url, storage_url, tenant, .. } => f
                .debug_struct("Token")
                .field("auth_url", auth_url)
                .field("storage_url", storage_url)
                .field("auth_token", &"<redacted>")
                .field("tenant", tenant)
                .finish(),
        }
    }
}

/// `host[:port]` of an auth endpoint; the raw string when it does not parse as a URL.
pub fn auth_host(auth_url: &str) -> String {
    match Url::parse(auth_url) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}

/// Produce `Credentials` from a source, consulting `cache` only when neither
/// a password nor a token was supplied.
///
/// Order: password mode, then token mode, then the cache. No network access.
pub fn resolve(source: &CredentialSource, cache: &dyn TokenCache) -> Result<Credentials> {
    if let Some(password) = &source.password {
        let mut missing = Vec::new();
        if source.auth_url.is_none() {
            missing.push(ENV_AUTH_URL);
        }
        if source.username.is_none() {
            missing.push(ENV_USERNAME);
        }
        if source.tenant_name.is_none() {
            missing.push(ENV_TENANT_NAME);
        }
        if !missing.is_empty() {
            return Err(StoreError::Configuration { missing });
        }
        debug!("using password to authenticate");
        return Ok(Credentials::Password {
            auth_url: source.auth_url.clone().unwrap_or_default(),
            username: source.username.clone().unwrap_or_default(),
            password: password.clone(),
            tenant: source.tenant_name.clone().unwrap_or_default(),
        });
    }

    if let Some(token) = &source.auth_token {
        let mut missing = Vec::new();
        if source.tenant_name.is_none() {
            missing.push(ENV_TENANT_NAME);
        }
        if source.storage_url.is_none() {
            missing.push(ENV_STORAGE_URL);
        }
        if !missing.is_empty() {
            return Err(StoreError::Configuration { missing });
        }
        debug!("using supplied auth token");
        return Ok(Credentials::Token {
            auth_url: source.auth_url.clone(),
            storage_url: source.storage_url.clone().unwrap_or_default(),
            auth_token: token.clone(),
            tenant: source.tenant_name.clone().unwrap_or_default(),
        });
    }

    let host = source.auth_url.as_deref().map(auth_host).unwrap_or_default();
    let tenant = source.tenant_name.clone().unwrap_or_default();
    let cached = match cache.read(&host, &tenant) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("token cache read failed for {}/{}: {}", host, tenant, e);
            None
        }
    };

    match cached {
        Some(entry) => {
            debug!("using cached auth token for {}/{}", host, tenant);
            Ok(Credentials::Token {
                auth_url: source.auth_url.clone(),
                storage_url: entry.storage_url,
                auth_token: entry.token,
                tenant,
            })
        }
        None => Err(StoreError::NoCredentials),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_cache::MemoryTokenCache;

    fn password_source() -> CredentialSource {
        CredentialSource::default()
            .with_auth_url("https://auth.example.org:5000/v2.0")
            .with_username("alice")
            .with_password("s3cret")
            .with_tenant("AUTH_lab")
    }

    #[test]
    fn password_mode_wins_over_token() {
        let cache = MemoryTokenCache::new();
        let source = password_source()
            .with_auth_token("tok")
            .with_storage_url("https://store.example.org/v1/AUTH_lab");
        let creds = resolve(&source, &cache).unwrap();
        assert!(matches!(creds, Credentials::Password { .. }));
        assert_eq!(creds.tenant(), "AUTH_lab");
        assert_eq!(creds.cache_host(), "auth.example.org:5000");
        assert_eq!(cache.reads(), 0);
    }

    #[test]
    fn password_mode_reports_every_missing_field() {
        let cache = MemoryTokenCache::new();
        let source = CredentialSource::default().with_password("s3cret");
        match resolve(&source, &cache) {
            Err(StoreError::Configuration { missing }) => {
                assert_eq!(missing, vec![ENV_AUTH_URL, ENV_USERNAME, ENV_TENANT_NAME]);
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn token_mode_requires_storage_url() {
        let cache = MemoryTokenCache::new();
        let source = CredentialSource::default().with_auth_token("tok").with_tenant("t");
        match resolve(&source, &cache) {
            Err(StoreError::Configuration { missing }) => assert_eq!(missing, vec![ENV_STORAGE_URL]),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn cache_is_the_last_resort() {
        let cache = MemoryTokenCache::new();
        cache.write("auth.example.org", "AUTH_lab", "cached-tok", "https://store/v1/AUTH_lab").unwrap();
        let source = CredentialSource::default()
            .with_auth_url("https://auth.example.org/v2.0")
            .with_tenant("AUTH_lab");
        let creds = resolve(&source, &cache).unwrap();
        assert_eq!(creds.supplied_token(), Some("cached-tok"));
        match creds {
            Credentials::Token { storage_url, .. } => assert_eq!(storage_url, "https://store/v1/AUTH_lab"),
            _ => panic!("expected token mode"),
        }
    }

    #[test]
    fn empty_everything_is_no_credentials() {
        let cache = MemoryTokenCache::new();
        let err = resolve(&CredentialSource::default(), &cache).unwrap_err();
        assert!(matches!(err, StoreError::NoCredentials));
        assert_eq!(cache.reads(), 1);
    }

    #[test]
    fn blank_values_are_absent() {
        let source = CredentialSource::default().with_password("   ");
        assert!(source.password.is_none());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let text = format!("{:?}", password_source());
        assert!(!text.contains("s3cret"));
        let cache = MemoryTokenCache::new();
        let creds = resolve(&password_source(), &cache).unwrap();
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn host_extraction() {
        assert_eq!(auth_host("https://keystone.example.org/v2.0"), "keystone.example.org");
        assert_eq!(auth_host("http://10.0.0.1:5000/v2.0"), "10.0.0.1:5000");
        assert_eq!(auth_host(""), "");
    }
}

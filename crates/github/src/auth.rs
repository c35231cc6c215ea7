use std::fmt;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use lintbridge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::PlatformClient;

/// Maximum assertion lifetime accepted by the platform.
pub const ASSERTION_LIFETIME: Duration = Duration::minutes(10);

/// The App this process acts as. Read-only after startup.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AppIdentity {
    pub app_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// A signed, short-lived JWT identifying the App.
#[derive(Clone)]
pub struct AppAssertion {
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub issuer: String,
    token: String,
}

impl AppAssertion {
    pub fn token(&self) -> &str { &self.token }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool { now >= self.expires_at }
}

impl fmt::Debug for AppAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppAssertion")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// An installation-scoped access token. Never persisted.
#[derive(Clone)]
pub struct InstallationToken {
    pub installation_id: u64,
    pub expires_at: Option<OffsetDateTime>,
    token: String,
}

impl InstallationToken {
    pub fn new(
        installation_id: u64,
        token: impl Into<String>,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        Self { installation_id, expires_at, token: token.into() }
    }

    pub fn token(&self) -> &str { &self.token }

    /// Whether the token expires before `now + margin`. Tokens without a known expiry never do.
    pub fn expires_within(&self, now: OffsetDateTime, margin: Duration) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at - now <= margin)
    }
}

impl fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationToken")
            .field("installation_id", &self.installation_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Mints App assertions. Holds the parsed private key for the lifetime of the process.
#[derive(Clone)]
pub struct AppAuthenticator {
    identity: AppIdentity,
    key: EncodingKey,
}

impl AppAuthenticator {
    /// Fails with a configuration error if the key is absent or not an RSA PEM.
    pub fn new(app_id: impl Into<String>, private_key_pem: &str) -> Result<Self> {
        let app_id = app_id.into();
        if app_id.trim().is_empty() {
            return Err(Error::Configuration("GitHub App identifier is empty".into()));
        }
        if private_key_pem.trim().is_empty() {
            return Err(Error::Configuration("GitHub App private key is empty".into()));
        }
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| Error::Configuration(format!("Invalid GitHub App private key: {e}")))?;
        Ok(Self { identity: AppIdentity { app_id }, key })
    }

    pub fn identity(&self) -> &AppIdentity { &self.identity }

    pub fn mint_assertion(&self, now: OffsetDateTime) -> Result<AppAssertion> {
        mint_assertion(&self.identity.app_id, &self.key, now)
    }
}

pub fn mint_assertion(app_id: &str, key: &EncodingKey, now: OffsetDateTime) -> Result<AppAssertion> {
    let expires_at = now + ASSERTION_LIFETIME;
    let claims = Claims {
        iat: now.unix_timestamp(),
        exp: expires_at.unix_timestamp(),
        iss: app_id.to_string(),
    };
    let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
        .map_err(|e| Error::Configuration(format!("Failed to sign App assertion: {e}")))?;
    Ok(AppAssertion { issued_at: now, expires_at, issuer: app_id.to_string(), token })
}

/// Redeem an assertion for a token scoped to `installation_id`.
pub async fn authenticate_installation(
    platform: &dyn PlatformClient,
    assertion: &AppAssertion,
    installation_id: u64,
) -> Result<InstallationToken> {
    if assertion.is_expired(OffsetDateTime::now_utc()) {
        return Err(Error::Auth("App assertion has expired".into()));
    }
    let token = platform.exchange_token(assertion, installation_id).await?;
    tracing::debug!(
        "Authenticated installation {} (expires {:?})",
        token.installation_id,
        token.expires_at
    );
    Ok(token)
}

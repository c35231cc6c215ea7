pub mod auth;
pub mod event;
pub mod signature;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod webhook;

use async_trait::async_trait;
use lintbridge_core::{Error, Result, models::CheckRunUpdate};
use octocrab::{GitHubError, Octocrab};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::auth::{AppAssertion, InstallationToken};

/// Outbound calls to the source-control platform.
///
/// Every check-run call carries the installation token explicitly; implementations keep no
/// per-request state.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Redeem an App assertion for an installation token.
    async fn exchange_token(
        &self,
        assertion: &AppAssertion,
        installation_id: u64,
    ) -> Result<InstallationToken>;

    /// Create a queued check run and return its id.
    async fn create_check_run(
        &self,
        token: &InstallationToken,
        repository: &str,
        name: &str,
        head_sha: &str,
    ) -> Result<u64>;

    async fn update_check_run(
        &self,
        token: &InstallationToken,
        repository: &str,
        check_run_id: u64,
        update: &CheckRunUpdate,
    ) -> Result<()>;
}

/// [`PlatformClient`] backed by the GitHub REST API.
#[derive(Clone)]
pub struct GitHub {
    base_uri: String,
}

#[derive(Serialize)]
struct CreateCheckRun<'a> {
    name: &'a str,
    head_sha: &'a str,
    status: &'static str,
}

#[derive(Deserialize)]
struct CheckRunCreated {
    id: u64,
}

#[derive(Deserialize)]
struct AccessToken {
    token: String,
    expires_at: Option<String>,
}

impl GitHub {
    pub fn new(base_uri: impl Into<String>) -> Self { Self { base_uri: base_uri.into() } }

    fn client(&self, bearer: &str) -> Result<Octocrab> {
        Octocrab::builder()
            .base_uri(self.base_uri.as_str())
            .and_then(|builder| builder.personal_token(bearer.to_string()).build())
            .map_err(|e| Error::Configuration(format!("Failed to create GitHub client: {e}")))
    }
}

#[async_trait]
impl PlatformClient for GitHub {
    async fn exchange_token(
        &self,
        assertion: &AppAssertion,
        installation_id: u64,
    ) -> Result<InstallationToken> {
        let client = self.client(assertion.token())?;
        let response: AccessToken = client
            .post(format!("/app/installations/{installation_id}/access_tokens"), None::<&()>)
            .await
            .map_err(|e| {
                Error::Auth(format!(
                    "Failed to exchange App assertion for installation {installation_id}: {}",
                    describe_error(&e)
                ))
            })?;
        let expires_at =
            response.expires_at.as_deref().and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok());
        Ok(InstallationToken::new(installation_id, response.token, expires_at))
    }

    async fn create_check_run(
        &self,
        token: &InstallationToken,
        repository: &str,
        name: &str,
        head_sha: &str,
    ) -> Result<u64> {
        let client = self.client(token.token())?;
        let body = CreateCheckRun { name, head_sha, status: "queued" };
        let response: CheckRunCreated = client
            .post(format!("/repos/{repository}/check-runs"), Some(&body))
            .await
            .map_err(|e| {
                Error::Remote(format!(
                    "Failed to create check run on {repository}@{head_sha}: {}",
                    describe_error(&e)
                ))
            })?;
        tracing::info!("Created check run {} on {}@{}", response.id, repository, head_sha);
        Ok(response.id)
    }

    async fn update_check_run(
        &self,
        token: &InstallationToken,
        repository: &str,
        check_run_id: u64,
        update: &CheckRunUpdate,
    ) -> Result<()> {
        let client = self.client(token.token())?;
        let _: serde_json::Value = client
            .patch(format!("/repos/{repository}/check-runs/{check_run_id}"), Some(update))
            .await
            .map_err(|e| {
                Error::Remote(format!(
                    "Failed to update check run {check_run_id} on {repository}: {}",
                    describe_error(&e)
                ))
            })?;
        tracing::debug!("Updated check run {} on {}: {:?}", check_run_id, repository, update.status);
        Ok(())
    }
}

fn describe_error(err: &octocrab::Error) -> String {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            let GitHubError { status_code, message, .. } = source.as_ref();
            format!("{status_code}: {message}")
        }
        e => e.to_string(),
    }
}

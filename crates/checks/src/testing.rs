//! Recording fakes for the lifecycle collaborators.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use lintbridge_core::{Error, Result, models::{AnalysisReport, CheckRunUpdate}};
use lintbridge_github::{
    PlatformClient,
    auth::{AppAssertion, InstallationToken},
    event::RepositoryRef,
};
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::{
    analysis::{AnalysisMode, AnalysisRunner},
    lifecycle::CheckRunContext,
    working_copy::{GitRef, WorkingCopyManager},
};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Call {
    ExchangeToken { installation_id: u64 },
    CreateCheckRun { repository: String, name: String, head_sha: String },
    UpdateCheckRun { repository: String, check_run_id: u64, update: CheckRunUpdate },
    CloneRepository { remote: String, path: PathBuf },
    Checkout { path: PathBuf, reference: GitRef },
    HasChanges,
    CommitAll { message: String },
    Push { remote: String, branch: String },
    Discard { path: PathBuf },
    Analysis { path: PathBuf, mode: AnalysisMode },
}

impl Call {
    pub fn kind(&self) -> &'static str {
        match self {
            Call::ExchangeToken { .. } => "exchange_token",
            Call::CreateCheckRun { .. } => "create_check_run",
            Call::UpdateCheckRun { .. } => "update_check_run",
            Call::CloneRepository { .. } => "clone_repository",
            Call::Checkout { .. } => "checkout",
            Call::HasChanges => "has_changes",
            Call::CommitAll { .. } => "commit_all",
            Call::Push { .. } => "push",
            Call::Discard { .. } => "discard",
            Call::Analysis { .. } => "analysis",
        }
    }
}

/// Shared, ordered log of every collaborator call.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Call>>>);

impl Recorder {
    pub fn record(&self, call: Call) { self.0.lock().unwrap().push(call); }

    pub fn calls(&self) -> Vec<Call> { self.0.lock().unwrap().clone() }
}

/// A token and repository matching the fixtures used across tests.
pub fn context() -> CheckRunContext {
    CheckRunContext {
        token: InstallationToken::new(7, "ghs_test", None),
        repository: RepositoryRef {
            name: "Hello-World".into(),
            full_name: "octocat/Hello-World".into(),
            html_url: "https://github.com/octocat/Hello-World".into(),
        },
        delivery_id: "delivery-1".into(),
    }
}

pub struct FakePlatform {
    recorder: Recorder,
    fail_exchange: bool,
    fail_updates: bool,
}

impl FakePlatform {
    pub const CHECK_RUN_ID: u64 = 4242;
    pub const EXCHANGED_TOKEN: &str = "ghs_exchanged";

    pub fn new(recorder: Recorder) -> Self {
        Self { recorder, fail_exchange: false, fail_updates: false }
    }

    pub fn failing_exchange(mut self) -> Self {
        self.fail_exchange = true;
        self
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn exchange_token(
        &self,
        _assertion: &AppAssertion,
        installation_id: u64,
    ) -> Result<InstallationToken> {
        self.recorder.record(Call::ExchangeToken { installation_id });
        if self.fail_exchange {
            return Err(Error::Auth("installation not found".into()));
        }
        Ok(InstallationToken::new(
            installation_id,
            Self::EXCHANGED_TOKEN,
            Some(OffsetDateTime::now_utc() + Duration::hours(1)),
        ))
    }

    async fn create_check_run(
        &self,
        _token: &InstallationToken,
        repository: &str,
        name: &str,
        head_sha: &str,
    ) -> Result<u64> {
        self.recorder.record(Call::CreateCheckRun {
            repository: repository.into(),
            name: name.into(),
            head_sha: head_sha.into(),
        });
        Ok(Self::CHECK_RUN_ID)
    }

    async fn update_check_run(
        &self,
        token: &InstallationToken,
        repository: &str,
        check_run_id: u64,
        update: &CheckRunUpdate,
    ) -> Result<()> {
        self.recorder.record(Call::UpdateCheckRun {
            repository: repository.into(),
            check_run_id,
            update: update.clone(),
        });
        if token.expires_within(OffsetDateTime::now_utc(), Duration::ZERO) {
            return Err(Error::Remote("401: Bad credentials".into()));
        }
        if self.fail_updates {
            return Err(Error::Remote("502: Bad Gateway".into()));
        }
        Ok(())
    }
}

pub struct FakeWorkingCopies {
    recorder: Recorder,
    has_changes: bool,
    fail_clone: bool,
    fail_push: bool,
}

impl FakeWorkingCopies {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder, has_changes: false, fail_clone: false, fail_push: false }
    }

    pub fn with_changes(mut self) -> Self {
        self.has_changes = true;
        self
    }

    pub fn failing_clone(mut self) -> Self {
        self.fail_clone = true;
        self
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }
}

#[async_trait]
impl WorkingCopyManager for FakeWorkingCopies {
    async fn clone_repository(&self, remote: &Url, path: &Path) -> Result<()> {
        self.recorder
            .record(Call::CloneRepository { remote: remote.to_string(), path: path.into() });
        if self.fail_clone {
            return Err(Error::Tool("git clone failed (exit status: 128): not found".into()));
        }
        Ok(())
    }

    async fn checkout(&self, path: &Path, reference: &GitRef) -> Result<()> {
        self.recorder.record(Call::Checkout { path: path.into(), reference: reference.clone() });
        Ok(())
    }

    async fn has_changes(&self, _path: &Path) -> Result<bool> {
        self.recorder.record(Call::HasChanges);
        Ok(self.has_changes)
    }

    async fn commit_all(&self, _path: &Path, message: &str) -> Result<()> {
        self.recorder.record(Call::CommitAll { message: message.into() });
        Ok(())
    }

    async fn push(&self, _path: &Path, remote: &Url, branch: &str) -> Result<()> {
        self.recorder.record(Call::Push { remote: remote.to_string(), branch: branch.into() });
        if self.fail_push {
            return Err(Error::Tool("git push failed (exit status: 1): rejected".into()));
        }
        Ok(())
    }

    async fn discard(&self, path: &Path) -> Result<()> {
        self.recorder.record(Call::Discard { path: path.into() });
        Ok(())
    }
}

/// Returns the configured report, or a tool failure when there is none.
pub struct FakeAnalysis {
    recorder: Recorder,
    report: Option<AnalysisReport>,
    delay: std::time::Duration,
}

impl FakeAnalysis {
    pub fn new(recorder: Recorder, report: Option<AnalysisReport>) -> Self {
        Self { recorder, report, delay: std::time::Duration::ZERO }
    }

    /// Sleeps before returning, like a slow tool run.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl AnalysisRunner for FakeAnalysis {
    async fn run(&self, target: &Path, mode: AnalysisMode) -> Result<AnalysisReport> {
        self.recorder.record(Call::Analysis { path: target.into(), mode });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.report.clone().ok_or_else(|| Error::Tool("rubocop exited with signal 9".into()))
    }
}

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use lintbridge_core::{
    Error, Result,
    config::Config,
    models::{
        AnalysisReport, Annotation, CheckConclusion, CheckRunAction, CheckRunOutput,
        CheckRunUpdate, MAX_ANNOTATIONS_PER_REQUEST,
    },
    util::{UrlExt, git_remote_url, join_normalized},
};
use lintbridge_github::{PlatformClient, auth::InstallationToken, event::RepositoryRef};
use time::OffsetDateTime;
use url::Url;

use crate::{
    analysis::{AnalysisMode, AnalysisRunner},
    working_copy::{GitRef, WorkingCopyManager},
};

/// Identifier of the follow-up action offered on completed runs.
pub const FIX_ACTION_IDENTIFIER: &str = "fix_rubocop_notices";

const ACCESS_TOKEN_USER: &str = "x-access-token";

/// Everything one delivery needs to act on a repository, passed down explicitly.
#[derive(Debug, Clone)]
pub struct CheckRunContext {
    pub token: InstallationToken,
    pub repository: RepositoryRef,
    pub delivery_id: String,
}

impl CheckRunContext {
    /// Authenticated git remote. Never log this without [`UrlExt::redacted`].
    fn remote(&self) -> Result<Url> {
        let remote = git_remote_url(&self.repository.html_url).ok_or_else(|| {
            Error::Validation(format!("invalid repository URL {:?}", self.repository.html_url))
        })?;
        Ok(remote.with_credentials(ACCESS_TOKEN_USER, self.token.token()))
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub check_name: String,
    pub work_dir: PathBuf,
    pub commit_message: String,
}

impl LifecycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            check_name: config.github.check_name.clone(),
            work_dir: config.checks.work_dir.clone(),
            commit_message: config.checks.commit_message.clone(),
        }
    }
}

/// Result of handling a requested action.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RemediationOutcome {
    /// The identifier is not one this App offers.
    Ignored,
    /// Autocorrect left the working copy identical to HEAD.
    NoChanges,
    Pushed,
    /// Committed locally but the push was refused; logged, not reported to the platform.
    PushFailed(String),
}

/// Drives check runs through queued → in_progress → completed, plus the autocorrect flow.
///
/// Holds no check-run state: the platform is the source of truth and every transition is an
/// API call keyed by the check run id.
#[derive(Clone)]
pub struct CheckRunLifecycle {
    platform: Arc<dyn PlatformClient>,
    working_copies: Arc<dyn WorkingCopyManager>,
    analysis: Arc<dyn AnalysisRunner>,
    settings: LifecycleSettings,
}

impl CheckRunLifecycle {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        working_copies: Arc<dyn WorkingCopyManager>,
        analysis: Arc<dyn AnalysisRunner>,
        settings: LifecycleSettings,
    ) -> Self {
        Self { platform, working_copies, analysis, settings }
    }

    pub fn settings(&self) -> &LifecycleSettings { &self.settings }

    pub async fn create_check_run(&self, ctx: &CheckRunContext, head_sha: &str) -> Result<u64> {
        self.platform
            .create_check_run(
                &ctx.token,
                &ctx.repository.full_name,
                &self.settings.check_name,
                head_sha,
            )
            .await
    }

    /// Mark the run in progress, analyze `head_sha` and complete the run.
    ///
    /// Clone or analysis failures still complete the run, with a `failure` conclusion.
    pub async fn initiate_check_run(
        &self,
        ctx: &CheckRunContext,
        check_run_id: u64,
        head_sha: &str,
    ) -> Result<CheckConclusion> {
        let repository = ctx.repository.full_name.as_str();
        self.platform
            .update_check_run(
                &ctx.token,
                repository,
                check_run_id,
                &CheckRunUpdate::in_progress(OffsetDateTime::now_utc()),
            )
            .await?;

        let (update, overflow) = match self.analyze(ctx, head_sha).await {
            Ok(report) => self.completion(&report),
            Err(e) => {
                tracing::error!(
                    "Analysis of {}@{} for check run {} failed: {}",
                    repository,
                    head_sha,
                    check_run_id,
                    e
                );
                (self.failure(&e), Vec::new())
            }
        };
        let conclusion = update.conclusion.unwrap_or(CheckConclusion::Failure);
        self.platform.update_check_run(&ctx.token, repository, check_run_id, &update).await?;

        // Annotations past the per-request cap are appended without touching the status.
        let title = update.output.as_ref().map(|o| o.title.clone()).unwrap_or_default();
        let summary = update.output.as_ref().map(|o| o.summary.clone()).unwrap_or_default();
        for batch in overflow.chunks(MAX_ANNOTATIONS_PER_REQUEST) {
            let append = CheckRunUpdate {
                output: Some(CheckRunOutput {
                    title: title.clone(),
                    summary: summary.clone(),
                    text: None,
                    annotations: batch.to_vec(),
                }),
                ..Default::default()
            };
            self.platform.update_check_run(&ctx.token, repository, check_run_id, &append).await?;
        }
        tracing::info!("Completed check run {} on {}: {}", check_run_id, repository, conclusion);
        Ok(conclusion)
    }

    /// Apply autocorrections on the run's branch and push them back.
    pub async fn take_requested_action(
        &self,
        ctx: &CheckRunContext,
        identifier: &str,
        head_branch: Option<&str>,
    ) -> Result<RemediationOutcome> {
        if identifier != FIX_ACTION_IDENTIFIER {
            tracing::debug!("Ignoring requested action {:?}", identifier);
            return Ok(RemediationOutcome::Ignored);
        }
        let branch = head_branch
            .ok_or_else(|| Error::Validation("requested action has no head branch".into()))?;
        let path = self.working_copy_path(ctx);
        let result = self.remediate(ctx, &path, branch).await;
        self.discard(&path).await;
        let outcome = result?;
        tracing::info!(
            "Requested action on {}@{}: {:?}",
            ctx.repository.full_name,
            branch,
            outcome
        );
        Ok(outcome)
    }

    async fn analyze(&self, ctx: &CheckRunContext, head_sha: &str) -> Result<AnalysisReport> {
        let path = self.working_copy_path(ctx);
        let result = self.analyze_at(ctx, &path, head_sha).await;
        self.discard(&path).await;
        result
    }

    async fn analyze_at(
        &self,
        ctx: &CheckRunContext,
        path: &Path,
        head_sha: &str,
    ) -> Result<AnalysisReport> {
        let remote = ctx.remote()?;
        self.working_copies.clone_repository(&remote, path).await?;
        self.working_copies.checkout(path, &GitRef::Commit(head_sha.to_string())).await?;
        self.analysis.run(path, AnalysisMode::Report).await
    }

    async fn remediate(
        &self,
        ctx: &CheckRunContext,
        path: &Path,
        branch: &str,
    ) -> Result<RemediationOutcome> {
        let remote = ctx.remote()?;
        self.working_copies.clone_repository(&remote, path).await?;
        self.working_copies.checkout(path, &GitRef::Branch(branch.to_string())).await?;
        self.analysis.run(path, AnalysisMode::Autocorrect).await?;
        if !self.working_copies.has_changes(path).await? {
            return Ok(RemediationOutcome::NoChanges);
        }
        self.working_copies.commit_all(path, &self.settings.commit_message).await?;
        match self.working_copies.push(path, &remote, branch).await {
            Ok(()) => Ok(RemediationOutcome::Pushed),
            Err(e) => {
                tracing::error!(
                    "Failed to push autocorrections to {}@{}: {}",
                    ctx.repository.full_name,
                    branch,
                    e
                );
                Ok(RemediationOutcome::PushFailed(e.to_string()))
            }
        }
    }

    async fn discard(&self, path: &Path) {
        if let Err(e) = self.working_copies.discard(path).await {
            tracing::warn!("{e}");
        }
    }

    /// Unique per delivery, so concurrent deliveries for one repository never share a directory.
    fn working_copy_path(&self, ctx: &CheckRunContext) -> PathBuf {
        let delivery: String = ctx
            .delivery_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        join_normalized(&self.settings.work_dir, format!("{delivery}-{}", ctx.repository.name))
    }

    fn completion(&self, report: &AnalysisReport) -> (CheckRunUpdate, Vec<Annotation>) {
        let name = &self.settings.check_name;
        let mut annotations = report.annotations();
        let overflow = if annotations.len() > MAX_ANNOTATIONS_PER_REQUEST {
            annotations.split_off(MAX_ANNOTATIONS_PER_REQUEST)
        } else {
            Vec::new()
        };
        let summary = format!(
            "{name} summary\n- Offense count: {}\n- Target file count: {}\n- Inspected file count: {}",
            report.summary.offense_count,
            report.summary.target_file_count,
            report.summary.inspected_file_count
        );
        let output = CheckRunOutput {
            title: name.clone(),
            summary,
            text: Some(format!("{name} version: {}", report.metadata.tool_version)),
            annotations,
        };
        let mut update =
            CheckRunUpdate::completed(report.conclusion(), OffsetDateTime::now_utc(), output);
        update.actions = vec![CheckRunAction {
            label: "Fix this".to_string(),
            description: "Automatically fix all linter notices.".to_string(),
            identifier: FIX_ACTION_IDENTIFIER.to_string(),
        }];
        (update, overflow)
    }

    fn failure(&self, err: &Error) -> CheckRunUpdate {
        let output = CheckRunOutput {
            title: self.settings.check_name.clone(),
            summary: format!("Analysis failed: {err}"),
            text: None,
            annotations: Vec::new(),
        };
        CheckRunUpdate::completed(CheckConclusion::Failure, OffsetDateTime::now_utc(), output)
    }
}

use anyhow::{Context, Result};
use lintbridge_checks::{CheckRunContext, RemediationOutcome};

use crate::JobContext;

/// Job to run the follow-up action a user picked on a completed check run.
#[derive(Debug, Clone)]
pub struct RequestedActionJob {
    pub context: CheckRunContext,
    pub identifier: String,
    /// Branch the fixes are pushed to. Missing for runs on detached commits.
    pub head_branch: Option<String>,
}

pub async fn process_requested_action_job(
    mut job: RequestedActionJob,
    ctx: &JobContext,
) -> Result<()> {
    tracing::info!(
        "Processing requested action job: repo={} action={} branch={:?}",
        job.context.repository.full_name,
        job.identifier,
        job.head_branch
    );
    ctx.refresh_token(&mut job.context).await?;
    let outcome = ctx
        .lifecycle
        .take_requested_action(&job.context, &job.identifier, job.head_branch.as_deref())
        .await
        .with_context(|| format!("Failed to apply requested action {}", job.identifier))?;
    if let RemediationOutcome::PushFailed(reason) = &outcome {
        tracing::warn!(
            "Autocorrections for {} were not pushed: {}",
            job.context.repository.full_name,
            reason
        );
    }
    Ok(())
}

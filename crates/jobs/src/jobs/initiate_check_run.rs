use anyhow::{Context, Result};
use lintbridge_checks::CheckRunContext;

use crate::JobContext;

/// Job to analyze a freshly created check run and complete it.
#[derive(Debug, Clone)]
pub struct InitiateCheckRunJob {
    pub context: CheckRunContext,
    pub check_run_id: u64,
    /// The commit the check run was created for.
    pub head_sha: String,
}

pub async fn process_initiate_check_run_job(
    mut job: InitiateCheckRunJob,
    ctx: &JobContext,
) -> Result<()> {
    tracing::info!(
        "Processing check run job: repo={} check_run={} sha={}",
        job.context.repository.full_name,
        job.check_run_id,
        job.head_sha
    );
    ctx.refresh_token(&mut job.context).await?;
    let conclusion = ctx
        .lifecycle
        .initiate_check_run(&job.context, job.check_run_id, &job.head_sha)
        .await
        .with_context(|| format!("Failed to complete check run {}", job.check_run_id))?;
    tracing::debug!("Check run {} concluded {}", job.check_run_id, conclusion);
    Ok(())
}

mod jobs;

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use lintbridge_checks::{CheckRunContext, CheckRunLifecycle};
use lintbridge_core::config::WorkerConfig;
use lintbridge_github::{
    PlatformClient,
    auth::{AppAuthenticator, authenticate_installation},
};
pub use jobs::{
    InitiateCheckRunJob, RequestedActionJob, process_initiate_check_run_job,
    process_requested_action_job,
};
use tokio::{
    sync::{
        Semaphore,
        mpsc::{self, error::TrySendError},
    },
    task::{JoinError, JoinSet},
};
use time::OffsetDateTime;

/// Tokens expiring sooner than this are replaced before a job starts. Covers the longest job a
/// default configuration allows.
const TOKEN_REFRESH_MARGIN: time::Duration = time::Duration::minutes(20);

/// Shared context available to all job handlers.
#[derive(Clone)]
pub struct JobContext {
    pub lifecycle: Arc<CheckRunLifecycle>,
    pub authenticator: Arc<AppAuthenticator>,
    pub platform: Arc<dyn PlatformClient>,
}

impl JobContext {
    /// Re-authenticate the installation when the token minted at delivery time has expired, or
    /// would expire while the job runs.
    pub async fn refresh_token(&self, context: &mut CheckRunContext) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        if !context.token.expires_within(now, TOKEN_REFRESH_MARGIN) {
            return Ok(());
        }
        let installation_id = context.token.installation_id;
        tracing::info!("Refreshing token for installation {}", installation_id);
        let assertion = self.authenticator.mint_assertion(now)?;
        context.token =
            authenticate_installation(self.platform.as_ref(), &assertion, installation_id)
                .await
                .with_context(|| format!("Failed to refresh token for installation {installation_id}"))?;
        Ok(())
    }
}

/// Work deferred from a webhook delivery.
#[derive(Debug, Clone)]
pub enum CheckRunJob {
    Initiate(InitiateCheckRunJob),
    RequestedAction(RequestedActionJob),
}

impl From<InitiateCheckRunJob> for CheckRunJob {
    fn from(job: InitiateCheckRunJob) -> Self { Self::Initiate(job) }
}

impl From<RequestedActionJob> for CheckRunJob {
    fn from(job: RequestedActionJob) -> Self { Self::RequestedAction(job) }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("job queue is full")]
    Full,
    #[error("job queue is closed")]
    Closed,
}

/// Handle for pushing jobs from request handlers.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<CheckRunJob>,
}

impl JobQueue {
    /// Enqueue without waiting. A full queue is reported rather than buffered.
    pub fn push(&self, job: impl Into<CheckRunJob>) -> Result<(), QueueError> {
        self.sender.try_send(job.into()).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// Create the job queue and the monitor that drains it.
pub fn create_monitor(context: JobContext, config: &WorkerConfig) -> (JobQueue, Monitor) {
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    let monitor = Monitor {
        receiver,
        context,
        concurrency: config.concurrency.max(1),
        shutdown_timeout: config.shutdown_timeout(),
    };
    (JobQueue { sender }, monitor)
}

/// Runs queued jobs on a bounded pool of tasks.
pub struct Monitor {
    receiver: mpsc::Receiver<CheckRunJob>,
    context: JobContext,
    concurrency: usize,
    /// How long in-flight and queued jobs may keep running after shutdown is requested.
    shutdown_timeout: Duration,
}

impl Monitor {
    /// Process jobs until `shutdown` resolves or every [`JobQueue`] is dropped, then finish
    /// in-flight and already-queued jobs.
    pub async fn run(mut self, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                job = self.receiver.recv() => {
                    let Some(job) = job else { break };
                    let permit =
                        semaphore.clone().acquire_owned().await.context("Worker pool closed")?;
                    let ctx = self.context.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        process_check_run_job(job, ctx).await
                    });
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => log_result(result),
            }
        }

        self.receiver.close();
        tracing::info!("Shutting down job workers");
        let shutdown_timeout = self.shutdown_timeout;
        let drain = async {
            while let Some(job) = self.receiver.recv().await {
                let permit =
                    semaphore.clone().acquire_owned().await.context("Worker pool closed")?;
                let ctx = self.context.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    process_check_run_job(job, ctx).await
                });
            }
            while let Some(result) = tasks.join_next().await {
                log_result(result);
            }
            anyhow::Ok(())
        };
        match tokio::time::timeout(shutdown_timeout, drain).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Job workers did not finish within {:?}", shutdown_timeout);
                Ok(())
            }
        }
    }
}

pub async fn process_check_run_job(job: CheckRunJob, ctx: JobContext) -> Result<()> {
    match job {
        CheckRunJob::Initiate(job) => process_initiate_check_run_job(job, &ctx).await,
        CheckRunJob::RequestedAction(job) => process_requested_action_job(job, &ctx).await,
    }
}

fn log_result(result: Result<Result<()>, JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Job failed: {:?}", e),
        Err(e) => tracing::error!("Job panicked: {}", e),
    }
}

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lintbridge_checks::{CheckRunContext, Route, route};
use lintbridge_core::{AppError, Error};
use lintbridge_github::{auth::authenticate_installation, webhook::GitHubEvent};
use lintbridge_jobs::{CheckRunJob, InitiateCheckRunJob, RequestedActionJob};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppState;

/// Webhook handler: creates check runs inline and enqueues analysis and remediation jobs.
pub async fn webhook(
    State(state): State<AppState>,
    GitHubEvent { event }: GitHubEvent,
) -> Result<Response, AppError> {
    // Log the event source
    if let Some(repository) = &event.payload.repository {
        tracing::info!(
            "Received webhook event {}.{} from repository {}",
            event.event_type,
            event.action.as_deref().unwrap_or("[none]"),
            repository.full_name
        );
    } else {
        tracing::info!(
            "Received webhook event {}.{} from unknown source",
            event.event_type,
            event.action.as_deref().unwrap_or("[none]")
        );
    }

    event.validate(state.authenticator.identity())?;

    let Some(route) = route(&event.event_type, event.action.as_deref()) else {
        return Ok((StatusCode::OK, "Event ignored").into_response());
    };
    let payload = &event.payload;
    let repository = payload
        .repository
        .clone()
        .ok_or_else(|| Error::Validation("event has no repository".into()))?;
    let installation = payload
        .installation
        .ok_or_else(|| Error::Validation("event has no installation".into()))?;

    let assertion = state.authenticator.mint_assertion(OffsetDateTime::now_utc())?;
    let token =
        authenticate_installation(state.platform.as_ref(), &assertion, installation.id).await?;
    let context = CheckRunContext {
        token,
        repository,
        delivery_id: event.delivery_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
    };

    match route {
        Route::CreateCheckRun => {
            let head_sha = payload
                .head_sha()
                .ok_or_else(|| Error::Validation("event has no head commit".into()))?;
            let id = state.lifecycle.create_check_run(&context, head_sha).await?;
            Ok((StatusCode::OK, format!("Created check run {id}")).into_response())
        }
        Route::InitiateCheckRun => {
            let check_run = payload
                .check_run
                .as_ref()
                .ok_or_else(|| Error::Validation("event has no check run".into()))?;
            let check_run_id = check_run.id;
            enqueue(&state, InitiateCheckRunJob {
                context,
                check_run_id,
                head_sha: check_run.head_sha.clone(),
            })?;
            tracing::info!("Enqueued check run {} for analysis", check_run_id);
            Ok((StatusCode::OK, "Check run enqueued").into_response())
        }
        Route::TakeRequestedAction => {
            let identifier = payload
                .requested_action
                .as_ref()
                .map(|action| action.identifier.clone())
                .ok_or_else(|| Error::Validation("event has no requested action".into()))?;
            let head_branch = payload.head_branch().map(str::to_string);
            tracing::info!("Enqueued requested action {}", identifier);
            enqueue(&state, RequestedActionJob { context, identifier, head_branch })?;
            Ok((StatusCode::OK, "Requested action enqueued").into_response())
        }
    }
}

fn enqueue(state: &AppState, job: impl Into<CheckRunJob>) -> Result<(), AppError> {
    state.jobs.push(job).map_err(|e| {
        tracing::warn!("Refusing webhook delivery: {e}");
        AppError::Status(StatusCode::SERVICE_UNAVAILABLE)
    })
}

mod handlers;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, Request, StatusCode, header},
};
use lintbridge_checks::{
    CheckRunLifecycle, LifecycleSettings, analysis::RuboCop, working_copy::Git,
};
use lintbridge_core::config::Config;
use lintbridge_github::{
    GitHub, PlatformClient,
    auth::AppAuthenticator,
    webhook::{DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_256_HEADER, SIGNATURE_HEADER},
};
use lintbridge_jobs::{JobContext, JobQueue, create_monitor};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt,
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, MakeSpan, TraceLayer},
};
use tracing::{Level, Span};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::handlers::build_router;

#[derive(Clone, FromRef)]
pub struct AppState {
    config: Arc<Config>,
    authenticator: Arc<AppAuthenticator>,
    platform: Arc<dyn PlatformClient>,
    lifecycle: Arc<CheckRunLifecycle>,
    jobs: JobQueue,
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let config = Arc::new(Config::load("config.yml").expect("Failed to load configuration"));
    let authenticator = Arc::new(
        AppAuthenticator::new(config.github.app_id.clone(), &config.github.private_key)
            .expect("Failed to load GitHub App private key"),
    );
    let platform: Arc<dyn PlatformClient> =
        Arc::new(GitHub::new(config.github.api_base_url.clone()));
    let analysis = RuboCop::new(&config.checks.rubocop_command, config.checks.analysis_timeout())
        .expect("Failed to configure analysis tool");
    let git = Git {
        author_name: config.checks.commit_author_name.clone(),
        author_email: config.checks.commit_author_email.clone(),
        clone_timeout: config.checks.clone_timeout(),
        push_timeout: config.checks.push_timeout(),
    };
    tokio::fs::create_dir_all(&config.checks.work_dir)
        .await
        .expect("Failed to create working directory");
    let lifecycle = Arc::new(CheckRunLifecycle::new(
        platform.clone(),
        Arc::new(git),
        Arc::new(analysis),
        LifecycleSettings::from_config(&config),
    ));

    // Create the job monitor
    let job_context = JobContext {
        lifecycle: lifecycle.clone(),
        authenticator: authenticator.clone(),
        platform: platform.clone(),
    };
    let (jobs, monitor) = create_monitor(job_context, &config.worker);
    let state = AppState { config: config.clone(), authenticator, platform, lifecycle, jobs };

    let addr = config.server.addr();
    let listener = TcpListener::bind(addr).await.expect("bind error");
    tracing::info!("Web server: Listening on {}", addr);

    // Run both the web server and job monitor concurrently, with graceful shutdown
    let web_server = async {
        let result = axum::serve(listener, app(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Web server error");
        tracing::info!("Web server stopped");
        result
    };
    let job_monitor = async {
        let result = monitor.run(shutdown_signal()).await.context("Job monitor error");
        tracing::info!("Job monitor stopped");
        result
    };

    // Wait for both to complete gracefully (early return on error)
    if let Err(e) = tokio::try_join!(web_server, job_monitor) {
        tracing::error!("{e}");
    }
    tracing::info!("Shut down gracefully");
}

fn app(state: AppState) -> Router {
    let sensitive_headers: Arc<[_]> = vec![
        header::AUTHORIZATION,
        HeaderName::from_static("x-hub-signature"),
        HeaderName::from_static("x-hub-signature-256"),
    ]
    .into();
    let middleware = ServiceBuilder::new()
        .sensitive_request_headers(sensitive_headers)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DeliverySpan { level: Level::INFO })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(120),
        ));
    build_router().with_state(state).layer(middleware)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        tokio::select! {
            result = signal::ctrl_c() => result.expect("Failed to listen for ctrl-c"),
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for ctrl-c")
    }
}

fn header_str<'a, B>(request: &'a Request<B>, name: &str) -> &'a str {
    request.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or("[unknown]")
}

/// Request span carrying the webhook event and delivery id, so job logs can be correlated.
#[derive(Debug, Clone)]
pub struct DeliverySpan {
    level: Level,
}

impl<B> MakeSpan<B> for DeliverySpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let event = header_str(request, EVENT_HEADER);
        let delivery = header_str(request, DELIVERY_HEADER);
        let signed = request.headers().contains_key(SIGNATURE_256_HEADER)
            || request.headers().contains_key(SIGNATURE_HEADER);
        macro_rules! make_span {
            ($level:expr) => {
                tracing::span!(
                    $level,
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    event = %event,
                    delivery = %delivery,
                    signed = signed,
                )
            }
        }
        match self.level {
            Level::ERROR => make_span!(Level::ERROR),
            Level::WARN => make_span!(Level::WARN),
            Level::INFO => make_span!(Level::INFO),
            Level::DEBUG => make_span!(Level::DEBUG),
            Level::TRACE => make_span!(Level::TRACE),
        }
    }
}

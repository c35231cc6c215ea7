use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

mod common;
mod webhook;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/api/github/webhook", post(webhook::webhook))
        .route("/healthz", get(common::healthz))
}

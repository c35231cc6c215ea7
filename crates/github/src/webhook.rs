use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, Request},
    http::HeaderMap,
};
use lintbridge_core::{AppError, Error, config::Config};

use crate::{event::WebhookEvent, signature::verify_signature};

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";
pub const SIGNATURE_256_HEADER: &str = "X-Hub-Signature-256";

/// Verify and extract a GitHub event payload.
///
/// Signature failures reject with 401 before any other check. A signed delivery with a missing
/// event header or an unparseable body rejects with 400.
#[derive(Clone)]
#[must_use]
pub struct GitHubEvent {
    pub event: WebhookEvent,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl<S> FromRequest<S> for GitHubEvent
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync + Clone,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers();
        let delivery_id = header(headers, DELIVERY_HEADER).map(str::to_string);
        let event_type = header(headers, EVENT_HEADER).map(str::to_string);
        // Prefer the SHA-256 signature when the platform sends both.
        let signature = header(headers, SIGNATURE_256_HEADER)
            .or_else(|| header(headers, SIGNATURE_HEADER))
            .map(str::to_string);
        let config = <Arc<Config>>::from_ref(state);
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|_| Error::Validation("error reading body".into()))?;
        if !verify_signature(&body, signature.as_deref(), &config.github.webhook_secret) {
            tracing::warn!(
                "Dropping {} delivery {}: signature mismatch",
                event_type.as_deref().unwrap_or("[unknown]"),
                delivery_id.as_deref().unwrap_or("[unknown]")
            );
            return Err(Error::Signature("signature mismatch".into()).into());
        }
        // Only authenticated deliveries learn which headers they are missing.
        let event_type = event_type
            .ok_or_else(|| Error::Validation(format!("{EVENT_HEADER} header missing")))?;
        let event = WebhookEvent::parse(event_type, delivery_id, body)?;
        Ok(GitHubEvent { event })
    }
}

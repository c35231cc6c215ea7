/// Liveness probe. Touches no collaborators.
pub async fn healthz() -> &'static str { "ok" }

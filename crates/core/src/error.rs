/// Failure taxonomy shared across the bridge.
///
/// Nothing is retried: every variant is terminal for the delivery that produced it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed startup configuration (private key, secret, app id).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The webhook signature did not match the shared secret.
    #[error("signature verification failed: {0}")]
    Signature(String),
    /// The event was addressed to a different App.
    #[error("sender rejected: {0}")]
    Sender(String),
    /// The platform refused to exchange the App assertion for an installation token.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Malformed payload or unsafe input.
    #[error("invalid request: {0}")]
    Validation(String),
    /// A platform API call failed.
    #[error("platform request failed: {0}")]
    Remote(String),
    /// The analysis tool or a working-copy operation failed.
    #[error("tool failed: {0}")]
    Tool(String),
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod config;
pub mod error;
pub mod models;
pub mod util;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
pub use error::{Error, Result};

pub enum AppError {
    Status(StatusCode),
    Bridge(Error),
    Internal(anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status(status) => *status,
            Self::Bridge(Error::Signature(_) | Error::Auth(_)) => StatusCode::UNAUTHORIZED,
            Self::Bridge(Error::Sender(_) | Error::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Bridge(Error::Remote(_)) => StatusCode::BAD_GATEWAY,
            Self::Bridge(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::Status(status) => status.into_response(),
            Self::Bridge(err) => {
                if status.is_server_error() {
                    tracing::error!("{err}");
                } else {
                    tracing::warn!("Rejected webhook delivery: {err}");
                }
                (status, err.to_string()).into_response()
            }
            Self::Internal(err) => {
                tracing::error!("{:?}", err);
                (status, format!("Something went wrong: {}", err)).into_response()
            }
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self { Self::Bridge(err) }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self { Self::Internal(err) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (Error::Signature("mismatch".into()), StatusCode::UNAUTHORIZED),
            (Error::Auth("bad assertion".into()), StatusCode::UNAUTHORIZED),
            (Error::Sender("app 1".into()), StatusCode::BAD_REQUEST),
            (Error::Validation("repository name".into()), StatusCode::BAD_REQUEST),
            (Error::Remote("500".into()), StatusCode::BAD_GATEWAY),
            (Error::Tool("crash".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                Error::Timeout { operation: "analysis", seconds: 5 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let message = err.to_string();
            assert_eq!(AppError::from(err).status_code(), expected, "{message}");
        }
    }
}

use axum::http::StatusCode;

/// Every failure mode the gateway can produce, mapped to exactly one HTTP
/// status at the single translation site in [`crate::pipeline::to_response`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("empty command")]
    EmptyCommand,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("forbidden by acl")]
    AclDenied,

    #[error("redis unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("format mismatch")]
    FormatMismatch,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::EmptyCommand => StatusCode::FORBIDDEN,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::AclDenied => StatusCode::FORBIDDEN,
            GatewayError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::FormatMismatch => StatusCode::BAD_REQUEST,
            GatewayError::Redis(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

//! Request-path errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::fanout::dispatch::DispatchError;
use crate::fanout::merge::MergeError;
use crate::fanout::split::SplitError;
use crate::load_balancer::ConfigurationError;

#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("no active backend available")]
    NoActiveBackend,

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Upstream(#[from] DispatchError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),

    #[error("invalid backend URL '{0}'")]
    InvalidBackendUrl(String),

    #[error("tunnel dial failed: {0}")]
    Tunnel(#[source] tokio_tungstenite::tungstenite::Error),
}

impl BalancerError {
    pub fn status(&self) -> StatusCode {
        match self {
            BalancerError::NoActiveBackend => StatusCode::SERVICE_UNAVAILABLE,
            BalancerError::Split(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BalancerError::Merge(MergeError::Decode { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            BalancerError::Merge(MergeError::NoSuccessfulBranch) => StatusCode::BAD_GATEWAY,
            BalancerError::Upstream(DispatchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            BalancerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            BalancerError::Configuration(_) => StatusCode::BAD_REQUEST,
            BalancerError::Body(_) => StatusCode::BAD_REQUEST,
            BalancerError::InvalidBackendUrl(_) | BalancerError::Tunnel(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for BalancerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::AlgorithmKind;

    #[test]
    fn test_status_mapping() {
        assert_eq!(BalancerError::NoActiveBackend.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            BalancerError::from(SplitError::MissingContent).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            BalancerError::from(MergeError::NoSuccessfulBranch).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            BalancerError::from(ConfigurationError::Uninitialized(AlgorithmKind::Weighted)).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_split_message_reaches_client() {
        let err = BalancerError::from(SplitError::NotEnoughContent { items: 1, backends: 2 });
        assert!(err.to_string().contains("toggle split to False"));
    }
}

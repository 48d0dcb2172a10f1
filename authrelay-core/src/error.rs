//! Top-level error type returned by [`ApiClient`](crate::ApiClient).

use thiserror::Error;
use uuid::Uuid;

use crate::authority::RefreshError;
use crate::store::StoreError;
use crate::transport::{ApiResponse, TransportError};

/// Why a call through the client did not produce a successful response.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The session could not be refreshed. The credential store has been
    /// cleared and the logout signal fired.
    #[error("session expired: {0}")]
    SessionExpired(RefreshError),

    /// The call was rejected again after being replayed with a refreshed
    /// credential.
    #[error("request {request_id} was rejected again after refreshing credentials")]
    RetryExhausted { request_id: Uuid },

    /// The server answered with a non-success status unrelated to
    /// authorization. The response is passed on as received.
    #[error("request failed with HTTP {}", .0.status)]
    Status(ApiResponse),

    /// No response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The credential store could not be read.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The client is misconfigured.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl ApiError {
    /// Whether this error means the caller is no longer signed in.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(response) => Some(response.status),
            Self::RetryExhausted { .. } => Some(crate::transport::AUTH_FAILURE_STATUS),
            _ => None,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

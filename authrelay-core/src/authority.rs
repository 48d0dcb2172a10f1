//! Remote refresh authority.
//!
//! The authority exchanges a refresh credential for a new [`CredentialPair`].
//! It is always called directly by the refresh coordinator and never through
//! the client's retry path, so a rejected refresh can not trigger another
//! refresh.
//!
//! This module provides:
//! - [`RefreshAuthority`] - Trait for the exchange
//! - [`RefreshError`] - Why an exchange (or the refresh around it) failed
//! - [`HttpAuthority`] - JSON refresh endpoint over `reqwest`

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::credential::{CredentialPair, Secret};
use crate::store::StoreError;

/// Why a refresh failed.
///
/// Every variant ends the session in the same way; they only differ in what
/// gets logged. The type is `Clone` because one outcome is handed to every
/// call waiting on the refresh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh credential is stored.
    #[error("no refresh credential available")]
    MissingRefreshCredential,

    /// The authority refused the refresh credential.
    #[error("refresh credential rejected: {message}")]
    Rejected {
        status: Option<u16>,
        message: String,
    },

    /// The exchange could not reach the authority.
    #[error("network error during refresh: {message}")]
    Network { message: String },

    /// The authority answered with something that is not a credential pair.
    #[error("invalid refresh response: {message}")]
    InvalidResponse { message: String },

    /// The exchange did not finish in time.
    #[error("refresh timed out after {0:?}")]
    Timeout(Duration),

    /// Reading or writing the credential store failed.
    #[error("credential store error during refresh: {message}")]
    Store { message: String },

    /// The refresh task ended without producing an outcome.
    #[error("refresh aborted before it settled")]
    Aborted,
}

impl RefreshError {
    /// Short machine-friendly name of the failure, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingRefreshCredential => "missing_refresh_credential",
            Self::Rejected { .. } => "rejected",
            Self::Network { .. } => "network",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::Timeout(_) => "timeout",
            Self::Store { .. } => "store",
            Self::Aborted => "aborted",
        }
    }
}

impl From<StoreError> for RefreshError {
    fn from(e: StoreError) -> Self {
        Self::Store {
            message: e.to_string(),
        }
    }
}

/// The remote side of a refresh.
#[async_trait]
pub trait RefreshAuthority: Send + Sync {
    /// Exchange `refresh` for a new credential pair.
    ///
    /// The returned pair may omit a refresh credential; the coordinator then
    /// keeps the one that was exchanged.
    async fn exchange(&self, refresh: &Secret) -> Result<CredentialPair, RefreshError>;
}

#[async_trait]
impl<A: RefreshAuthority + ?Sized> RefreshAuthority for std::sync::Arc<A> {
    async fn exchange(&self, refresh: &Secret) -> Result<CredentialPair, RefreshError> {
        (**self).exchange(refresh).await
    }
}

/// Body of a successful refresh response.
///
/// Both snake_case and camelCase field names are accepted.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "accessToken")]
    access_token: String,

    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,

    #[serde(default, alias = "expiresIn")]
    expires_in: Option<i64>,
}

/// Refresh authority that POSTs the refresh credential as JSON.
///
/// The request body is `{"<refresh_field>": "<refresh credential>"}`. A 2xx
/// response must carry at least an access token.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    url: Url,
    refresh_field: String,
}

impl HttpAuthority {
    /// Default JSON field carrying the refresh credential.
    pub const DEFAULT_REFRESH_FIELD: &'static str = "refresh_token";

    /// Create an authority for the refresh endpoint at `url`.
    ///
    /// Pass the same `reqwest::Client` the transport uses to share its
    /// connection pool.
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self {
            client,
            url,
            refresh_field: Self::DEFAULT_REFRESH_FIELD.to_string(),
        }
    }

    /// Set the JSON field name that carries the refresh credential.
    pub fn with_refresh_field(mut self, field: impl Into<String>) -> Self {
        self.refresh_field = field.into();
        self
    }

    /// The refresh endpoint.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RefreshAuthority for HttpAuthority {
    async fn exchange(&self, refresh: &Secret) -> Result<CredentialPair, RefreshError> {
        let mut body = serde_json::Map::new();
        body.insert(
            self.refresh_field.clone(),
            serde_json::Value::String(refresh.expose().to_string()),
        );

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| RefreshError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, text)
            };
            return Err(RefreshError::Rejected {
                status: Some(status.as_u16()),
                message,
            });
        }

        let issued: RefreshResponse =
            response
                .json()
                .await
                .map_err(|e| RefreshError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let mut pair = CredentialPair::new(issued.access_token);
        if let Some(refresh_token) = issued.refresh_token {
            pair = pair.with_refresh(refresh_token);
        }
        if let Some(seconds) = issued.expires_in {
            pair = pair.expiring_in(seconds);
        }

        Ok(pair)
    }
}

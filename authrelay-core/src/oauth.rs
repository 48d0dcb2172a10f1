//! OAuth 2.0 refresh authority.
//!
//! Performs the `grant_type=refresh_token` exchange against a provider's
//! token endpoint. Only available with the `oauth` feature.

use async_trait::async_trait;
use chrono::Utc;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicErrorResponse},
    reqwest::async_http_client,
};

use crate::authority::{RefreshAuthority, RefreshError};
use crate::credential::{CredentialPair, Secret};
use crate::error::ApiError;

/// Refresh authority backed by an OAuth 2.0 token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthAuthority {
    client: BasicClient,
}

impl OAuthAuthority {
    /// Create an authority for the token endpoint at `token_url`.
    ///
    /// # Arguments
    ///
    /// * `token_url` - Provider token endpoint
    /// * `client_id` - OAuth client ID
    /// * `client_secret` - Client secret for confidential clients
    pub fn new(
        token_url: &str,
        client_id: impl Into<String>,
        client_secret: Option<&Secret>,
    ) -> Result<Self, ApiError> {
        // The refresh grant never visits the authorization endpoint.
        let auth_url = AuthUrl::new(token_url.to_string())
            .map_err(|e| ApiError::config(format!("invalid token URL: {}", e)))?;
        let token_url = TokenUrl::new(token_url.to_string())
            .map_err(|e| ApiError::config(format!("invalid token URL: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(client_id.into()),
            client_secret.map(|s| ClientSecret::new(s.expose().to_string())),
            auth_url,
            Some(token_url),
        );

        Ok(Self { client })
    }
}

fn map_error<RE>(error: RequestTokenError<RE, BasicErrorResponse>) -> RefreshError
where
    RE: std::error::Error + 'static,
{
    match error {
        RequestTokenError::ServerResponse(response) => RefreshError::Rejected {
            status: None,
            message: response.to_string(),
        },
        RequestTokenError::Request(e) => RefreshError::Network {
            message: e.to_string(),
        },
        RequestTokenError::Parse(e, _) => RefreshError::InvalidResponse {
            message: e.to_string(),
        },
        RequestTokenError::Other(message) => RefreshError::InvalidResponse { message },
    }
}

#[async_trait]
impl RefreshAuthority for OAuthAuthority {
    async fn exchange(&self, refresh: &Secret) -> Result<CredentialPair, RefreshError> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh.expose().to_string()))
            .request_async(async_http_client)
            .await
            .map_err(map_error)?;

        let mut pair = CredentialPair::new(response.access_token().secret().as_str());

        if let Some(rotated) = response.refresh_token() {
            pair = pair.with_refresh(rotated.secret().as_str());
        }

        if let Some(duration) = response.expires_in() {
            let lifetime =
                chrono::Duration::from_std(duration).map_err(|e| RefreshError::InvalidResponse {
                    message: format!("invalid expiration duration: {}", e),
                })?;
            pair = pair.with_expiry(Utc::now() + lifetime);
        }

        Ok(pair)
    }
}

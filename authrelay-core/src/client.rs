//! The API client façade.
//!
//! [`ApiClient`] is the only entry point callers use. Each call goes through
//! the same path:
//!
//! 1. attach the stored access credential
//! 2. send through the [`Transport`]
//! 3. on the first authorization failure, obtain a fresh credential from the
//!    [`RefreshCoordinator`] and replay once
//!
//! Refreshes and replays are invisible to the caller, who gets either the
//! final successful response or a terminal [`ApiError`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), authrelay_core::ApiError> {
//! use authrelay_core::{ApiClient, ApiRequest, ClientConfig, FileStore, NoopLogout};
//!
//! let store = FileStore::open(FileStore::default_path()?).await?;
//! let client = ApiClient::from_config(
//!     &ClientConfig::new("https://api.example.com/v1"),
//!     store,
//!     NoopLogout,
//! )?;
//!
//! let jobs: serde_json::Value = client.send_json(ApiRequest::get("jobs")).await?;
//! println!("{}", jobs);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::authority::{HttpAuthority, RefreshAuthority};
use crate::config::ClientConfig;
use crate::coordinator::{DEFAULT_REFRESH_TIMEOUT, RefreshCoordinator};
use crate::credential::CredentialPair;
use crate::error::ApiError;
use crate::interceptor::{self, OutgoingCall, Verdict};
use crate::logout::{LogoutSignal, NoopLogout};
use crate::store::{CredentialStore, MemoryStore};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

/// Authenticated API client.
///
/// Cloning is cheap; clones share the credential store and the refresh
/// coordinator, so single-flight refresh holds across all of them.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl ApiClient {
    /// Start building a client from its parts.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    /// Build a client that talks HTTP to `config.base_url` and refreshes
    /// through the JSON endpoint at `config.refresh_path`.
    ///
    /// Transport and authority share one connection pool.
    pub fn from_config(
        config: &ClientConfig,
        store: impl CredentialStore + 'static,
        logout: impl LogoutSignal + 'static,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ApiError::config(format!("failed to build HTTP client: {}", e)))?;

        let transport = HttpTransport::new(http.clone(), config.base_url()?)
            .with_timeout(config.request_timeout());
        let authority = HttpAuthority::new(http, config.refresh_url()?)
            .with_refresh_field(config.refresh_field.as_str());

        Self::builder()
            .transport(transport)
            .authority(authority)
            .store(store)
            .logout(logout)
            .refresh_timeout(config.refresh_timeout())
            .build()
    }

    /// Send `request`, refreshing credentials and replaying once if needed.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut call = OutgoingCall::new(request);
        let mut credential = interceptor::current_access(self.store.as_ref()).await?;

        loop {
            let outgoing = call.prepare(credential.take());
            let response = self.transport.send(&outgoing).await?;

            match interceptor::inspect(&mut call, response) {
                Verdict::Completed(response) => return Ok(response),
                Verdict::Failed(response) => {
                    debug!("Request {} failed with HTTP {}", call.id(), response.status);
                    return Err(ApiError::Status(response));
                }
                Verdict::Exhausted(_) => {
                    warn!("Request {} rejected again after refreshing credentials", call.id());
                    return Err(ApiError::RetryExhausted {
                        request_id: call.id(),
                    });
                }
                Verdict::Refresh => {
                    debug!("Request {} was not authorized, refreshing", call.id());
                    let fresh = self
                        .coordinator
                        .refresh(call.sent_with())
                        .await
                        .map_err(ApiError::SessionExpired)?;
                    credential = Some(fresh);
                }
            }
        }
    }

    /// Send `request` and decode the successful response body as JSON.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        Ok(self.send(request).await?.json()?)
    }

    /// Store a freshly issued credential pair.
    pub async fn sign_in(&self, pair: CredentialPair) -> Result<(), ApiError> {
        self.store.set(&pair).await?;
        info!("Stored new session credentials");
        Ok(())
    }

    /// Forget the current session. Does not fire the logout signal.
    pub async fn sign_out(&self) -> Result<(), ApiError> {
        self.store.clear().await?;
        info!("Cleared session credentials");
        Ok(())
    }

    /// The stored credential pair, if any.
    pub async fn credentials(&self) -> Result<Option<CredentialPair>, ApiError> {
        Ok(self.store.get().await?)
    }

    /// Number of refresh exchanges performed by this client (and its clones).
    pub fn refresh_count(&self) -> u64 {
        self.coordinator.refresh_count()
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

/// Builder for creating an [`ApiClient`] from custom parts.
///
/// A transport and an authority are required. The store defaults to a
/// [`MemoryStore`], the logout signal to [`NoopLogout`].
pub struct ApiClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    authority: Option<Arc<dyn RefreshAuthority>>,
    store: Option<Arc<dyn CredentialStore>>,
    logout: Option<Arc<dyn LogoutSignal>>,
    refresh_timeout: Duration,
}

impl ApiClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            transport: None,
            authority: None,
            store: None,
            logout: None,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn authority(mut self, authority: impl RefreshAuthority + 'static) -> Self {
        self.authority = Some(Arc::new(authority));
        self
    }

    pub fn store(mut self, store: impl CredentialStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn logout(mut self, logout: impl LogoutSignal + 'static) -> Self {
        self.logout = Some(Arc::new(logout));
        self
    }

    /// Set the bound on one refresh exchange.
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let transport = self
            .transport
            .ok_or_else(|| ApiError::config("no transport configured"))?;
        let authority = self
            .authority
            .ok_or_else(|| ApiError::config("no refresh authority configured"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let logout = self.logout.unwrap_or_else(|| Arc::new(NoopLogout));

        let coordinator = RefreshCoordinator::new(Arc::clone(&store), authority, logout)
            .with_timeout(self.refresh_timeout);

        Ok(ApiClient {
            transport,
            store,
            coordinator: Arc::new(coordinator),
        })
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::RefreshError;
    use crate::credential::Secret;
    use crate::transport::TransportError;
    use async_trait::async_trait;

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
            let auth = request.header_value("Authorization").unwrap_or("none").to_string();
            Ok(ApiResponse::new(200).with_body(auth))
        }
    }

    struct UnusedAuthority;

    #[async_trait]
    impl RefreshAuthority for UnusedAuthority {
        async fn exchange(&self, _refresh: &Secret) -> Result<CredentialPair, RefreshError> {
            Err(RefreshError::Aborted)
        }
    }

    #[test]
    fn test_builder_requires_transport() {
        let result = ApiClient::builder().authority(UnusedAuthority).build();
        assert!(matches!(result, Err(ApiError::Config { .. })));
    }

    #[test]
    fn test_builder_requires_authority() {
        let result = ApiClient::builder().transport(EchoTransport).build();
        assert!(matches!(result, Err(ApiError::Config { .. })));
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let client = ApiClient::builder()
            .transport(EchoTransport)
            .authority(UnusedAuthority)
            .build()
            .unwrap();

        let anonymous = client.send(ApiRequest::get("me")).await.unwrap();
        assert_eq!(anonymous.text(), "none");

        client
            .sign_in(CredentialPair::new("abc").with_refresh("r"))
            .await
            .unwrap();
        let signed_in = client.send(ApiRequest::get("me")).await.unwrap();
        assert_eq!(signed_in.text(), "Bearer abc");

        client.sign_out().await.unwrap();
        assert!(client.credentials().await.unwrap().is_none());
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let result = ApiClient::from_config(&ClientConfig::new("nope"), MemoryStore::new(), NoopLogout);
        assert!(matches!(result, Err(ApiError::Config { .. })));
    }
}

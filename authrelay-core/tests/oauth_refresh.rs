//! Integration tests for the OAuth 2.0 refresh authority.
//!
//! These tests verify that OAuthAuthority:
//! - Sends a `refresh_token` grant to the token endpoint
//! - Keeps the old refresh credential when the provider does not rotate it
//! - Maps provider errors to a rejected refresh

#![cfg(feature = "oauth")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use authrelay_core::{
    ApiClient, ApiError, ApiRequest, ApiResponse, CredentialPair, CredentialStore, MemoryStore,
    OAuthAuthority, RefreshAuthority, RefreshError, Secret, Transport, TransportError,
};
use chrono::{Duration, Utc};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

fn authority_for(server: &MockServer) -> OAuthAuthority {
    let secret = Secret::new("test-client-secret");
    OAuthAuthority::new(
        &format!("{}/token", server.uri()),
        "test-client-id",
        Some(&secret),
    )
    .unwrap()
}

#[tokio::test]
async fn test_exchange_refresh_grant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "new-refresh"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pair = authority_for(&server)
        .exchange(&Secret::new("old-refresh"))
        .await
        .unwrap();

    assert_eq!(pair.access.expose(), "new-access");
    assert_eq!(pair.refresh.unwrap().expose(), "new-refresh");

    let expires_at = pair.expires_at.unwrap();
    assert!(expires_at > Utc::now() + Duration::minutes(59));
    assert!(expires_at <= Utc::now() + Duration::hours(1));
}

#[tokio::test]
async fn test_exchange_without_rotation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access",
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let pair = authority_for(&server)
        .exchange(&Secret::new("old-refresh"))
        .await
        .unwrap();

    assert_eq!(pair.access.expose(), "new-access");
    assert!(pair.refresh.is_none());
    assert!(pair.expires_at.is_none());
}

#[tokio::test]
async fn test_exchange_invalid_grant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Refresh token expired"
        })))
        .mount(&server)
        .await;

    let result = authority_for(&server)
        .exchange(&Secret::new("expired-refresh"))
        .await;

    match result {
        Err(RefreshError::Rejected { message, .. }) => {
            assert!(message.contains("invalid_grant"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

/// API that only accepts the token issued by the mock provider.
struct ProtectedApi;

#[async_trait]
impl Transport for ProtectedApi {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        match request.header_value("Authorization") {
            Some("Bearer new-access") => Ok(ApiResponse::new(200).with_body("ok")),
            _ => Ok(ApiResponse::new(401)),
        }
    }
}

#[tokio::test]
async fn test_client_refreshes_through_provider() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_pair(
        CredentialPair::new("old-access").with_refresh("old-refresh"),
    ));
    let logouts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&logouts);

    let client = ApiClient::builder()
        .transport(ProtectedApi)
        .authority(authority_for(&server))
        .store(Arc::clone(&store))
        .logout(move |_: &RefreshError| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    let response = client.send(ApiRequest::get("/me")).await.unwrap();
    assert_eq!(response.text(), "ok");

    let stored = store.get().await.unwrap().unwrap();
    assert_eq!(stored.access.expose(), "new-access");
    assert_eq!(stored.refresh.unwrap().expose(), "old-refresh");
    assert_eq!(logouts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_client_signs_out_on_provider_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_pair(
        CredentialPair::new("old-access").with_refresh("old-refresh"),
    ));
    let client = ApiClient::builder()
        .transport(ProtectedApi)
        .authority(authority_for(&server))
        .store(Arc::clone(&store))
        .build()
        .unwrap();

    let result = client.send(ApiRequest::get("/me")).await;

    assert!(matches!(result, Err(ApiError::SessionExpired(RefreshError::Rejected { .. }))));
    assert!(store.get().await.unwrap().is_none());
}

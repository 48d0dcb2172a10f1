//! # authrelay Core
//!
//! Authenticated API client with transparent, single-flight credential refresh.
//!
//! This crate provides:
//! - [`ApiClient`] - The façade every call goes through
//! - [`RefreshCoordinator`] - At most one refresh in flight, shared by all waiting calls
//! - Traits for the boundaries: [`Transport`], [`RefreshAuthority`],
//!   [`CredentialStore`] and [`LogoutSignal`]
//! - `reqwest`-backed implementations of the transport and authority, and
//!   memory, file and (optionally) keyring credential stores
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use authrelay_core::{ApiClient, ApiRequest, ClientConfig, MemoryStore, RefreshError};
//!
//! let client = ApiClient::from_config(
//!     &ClientConfig::new("https://api.example.com/v1"),
//!     MemoryStore::new(),
//!     |reason: &RefreshError| eprintln!("signed out: {}", reason),
//! )?;
//!
//! let response = client.send(ApiRequest::get("applications")).await?;
//! ```

pub mod authority;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod interceptor;
pub mod logout;
pub mod store;
pub mod transport;

#[cfg(feature = "oauth")]
pub mod oauth;

// Re-export commonly used types at crate root
pub use authority::{HttpAuthority, RefreshAuthority, RefreshError};

pub use client::{ApiClient, ApiClientBuilder};

pub use config::ClientConfig;

pub use coordinator::RefreshCoordinator;

pub use credential::{CredentialPair, Secret};

pub use error::ApiError;

pub use logout::{LogoutSignal, NoopLogout};

pub use store::{CredentialStore, FileStore, MemoryStore, StoreError, StoreKind, create_store};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport, TransportError};

#[cfg(feature = "oauth")]
pub use oauth::OAuthAuthority;

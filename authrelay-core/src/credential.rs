//! Credential types.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredentialPair`] - The access/refresh credential pair of one session

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// The credentials of one authenticated session.
///
/// The access credential authorizes ordinary calls. The refresh credential
/// (when the authority issued one) is exchanged for a new pair once the
/// access credential stops being accepted.
///
/// Stores always read and write the pair as a single unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived credential attached to every call.
    pub access: Secret,

    /// Longer-lived credential used only to obtain a new access credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<Secret>,

    /// When the access credential expires, if the authority said so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialPair {
    /// Create a pair holding only an access credential.
    pub fn new(access: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access),
            refresh: None,
            expires_at: None,
        }
    }

    /// Attach a refresh credential.
    pub fn with_refresh(mut self, refresh: impl Into<String>) -> Self {
        self.refresh = Some(Secret::new(refresh));
        self
    }

    /// Set the access credential's expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the expiration time relative to now, as token endpoints report it.
    pub fn expiring_in(self, seconds: i64) -> Self {
        self.with_expiry(Utc::now() + Duration::seconds(seconds))
    }

    /// Keep `previous` as the refresh credential when none was issued.
    ///
    /// Authorities are allowed to omit a rotated refresh credential, in which
    /// case the one that was just exchanged stays valid.
    pub fn or_refresh(mut self, previous: Secret) -> Self {
        if self.refresh.is_none() {
            self.refresh = Some(previous);
        }
        self
    }

    /// Check if the access credential has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp < Utc::now()).unwrap_or(false)
    }

    /// Check if the access credential will expire within the given duration.
    pub fn expires_within(&self, duration: Duration) -> bool {
        self.expires_at
            .map(|exp| exp < Utc::now() + duration)
            .unwrap_or(false)
    }
}

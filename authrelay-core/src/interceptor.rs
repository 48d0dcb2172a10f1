//! Request and response interception.
//!
//! The request side reads the current access credential and attaches it to
//! the outgoing call. The response side classifies what came back and decides
//! whether the call is finished, needs a refresh and a replay, or has used up
//! its single replay.

use tracing::debug;
use uuid::Uuid;

use crate::credential::Secret;
use crate::store::{CredentialStore, StoreError};
use crate::transport::{ApiRequest, ApiResponse};

/// Read the access credential to attach to the next send.
pub async fn current_access(store: &dyn CredentialStore) -> Result<Option<Secret>, StoreError> {
    Ok(store.get().await?.map(|pair| pair.access))
}

/// One logical call, across its original send and at most one replay.
#[derive(Debug)]
pub struct OutgoingCall {
    request: ApiRequest,
    sent_with: Option<Secret>,
    retried: bool,
}

impl OutgoingCall {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            sent_with: None,
            retried: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.request.id
    }

    /// Attach `credential` and return the request to hand to the transport.
    ///
    /// The credential is remembered so a later authorization failure can tell
    /// whether it is already stale.
    pub fn prepare(&mut self, credential: Option<Secret>) -> ApiRequest {
        debug!(
            "{} {} [{}] {}",
            self.request.method,
            self.request.path,
            self.request.id,
            if credential.is_some() {
                "with credential"
            } else {
                "unauthenticated"
            }
        );
        let request = self.request.authorized(credential.as_ref());
        self.sent_with = credential;
        request
    }

    /// The credential the last send carried.
    pub fn sent_with(&self) -> Option<&Secret> {
        self.sent_with.as_ref()
    }

    pub fn has_been_retried(&self) -> bool {
        self.retried
    }

    /// Flip the retry marker; returns `false` if it was already set.
    fn mark_retried(&mut self) -> bool {
        !std::mem::replace(&mut self.retried, true)
    }
}

/// What to do with a completed send.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Success; hand the response to the caller.
    Completed(ApiResponse),
    /// Failure unrelated to authorization; hand it to the caller untouched.
    Failed(ApiResponse),
    /// First authorization failure; refresh and replay.
    Refresh,
    /// The replay was rejected too.
    Exhausted(ApiResponse),
}

/// Classify `response` for `call`, consuming its one replay on the first
/// authorization failure.
pub fn inspect(call: &mut OutgoingCall, response: ApiResponse) -> Verdict {
    if response.is_auth_failure() {
        if call.mark_retried() {
            Verdict::Refresh
        } else {
            Verdict::Exhausted(response)
        }
    } else if response.is_success() {
        Verdict::Completed(response)
    } else {
        Verdict::Failed(response)
    }
}

//! Forced-logout signal.

use crate::authority::RefreshError;

/// Told once per failed refresh that the session is gone.
///
/// The coordinator calls it after clearing the credential store and does not
/// wait on whatever the application does in response (reset UI state,
/// navigate to a sign-in screen, exit).
pub trait LogoutSignal: Send + Sync {
    fn force_logout(&self, reason: &RefreshError);
}

impl<F> LogoutSignal for F
where
    F: Fn(&RefreshError) + Send + Sync,
{
    fn force_logout(&self, reason: &RefreshError) {
        self(reason)
    }
}

/// Logout signal that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogout;

impl LogoutSignal for NoopLogout {
    fn force_logout(&self, reason: &RefreshError) {
        tracing::debug!("Session ended ({}), no logout handler installed", reason.kind());
    }
}

//! Single-flight credential refresh.
//!
//! [`RefreshCoordinator`] is the only owner of the refresh state. However many
//! calls fail authorization at the same time, at most one exchange with the
//! [`RefreshAuthority`] is in flight; every other caller is parked as a
//! pending call and receives the same outcome when that exchange settles.
//!
//! ```text
//! Idle --(auth failure)--> Refreshing { pending } --(settled)--> Idle
//! ```
//!
//! The idle check and the move to `Refreshing` happen under one lock
//! acquisition, as do the store update, the drain of pending calls and the
//! move back to `Idle`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, warn};

use crate::authority::{RefreshAuthority, RefreshError};
use crate::credential::{CredentialPair, Secret};
use crate::logout::LogoutSignal;
use crate::store::CredentialStore;

/// Default bound on one refresh exchange.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// A caller parked until the in-flight refresh settles.
type PendingCall = oneshot::Sender<Result<Secret, RefreshError>>;

enum RefreshState {
    Idle,
    Refreshing { pending: Vec<PendingCall> },
}

/// Coordinates refreshes of one credential store.
///
/// Must be used from within a Tokio runtime; each refresh runs in its own
/// task so it settles even if the caller that started it goes away.
pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    authority: Arc<dyn RefreshAuthority>,
    logout: Arc<dyn LogoutSignal>,
    timeout: Duration,
    state: Mutex<RefreshState>,
    refreshes: AtomicU64,
}

impl RefreshCoordinator {
    /// Create a coordinator with the default refresh timeout.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        authority: Arc<dyn RefreshAuthority>,
        logout: Arc<dyn LogoutSignal>,
    ) -> Self {
        Self {
            store,
            authority,
            logout,
            timeout: DEFAULT_REFRESH_TIMEOUT,
            state: Mutex::new(RefreshState::Idle),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Bound each exchange by `timeout`; expiry counts as a failed refresh.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of exchanges sent to the authority so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Whether an exchange is currently in flight.
    pub async fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock().await, RefreshState::Refreshing { .. })
    }

    /// Obtain an access credential that replaces `sent_with`.
    ///
    /// `sent_with` is the credential the failed call carried. If the store
    /// already holds a different one, a refresh has settled since the call
    /// was sent and that credential is returned without another exchange.
    /// If the store is empty, there is no session to refresh: either it ended
    /// since the call was sent, or the call was made without one. No refresh
    /// (and no logout) is started.
    ///
    /// Otherwise the caller either starts the refresh or joins the one in
    /// flight, and resolves when it settles.
    pub async fn refresh(self: &Arc<Self>, sent_with: Option<&Secret>) -> Result<Secret, RefreshError> {
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock().await;
            match &mut *state {
                RefreshState::Refreshing { pending } => {
                    pending.push(tx);
                    debug!("Refresh in flight, queued call ({} waiting)", pending.len());
                }
                RefreshState::Idle => {
                    match (self.store.get().await?, sent_with) {
                        (Some(current), Some(stale)) if current.access != *stale => {
                            debug!("Access credential rotated since the call was sent");
                            return Ok(current.access);
                        }
                        (None, Some(_)) => {
                            debug!("Session ended since the call was sent");
                            return Err(RefreshError::MissingRefreshCredential);
                        }
                        (None, None) => {
                            debug!("Unauthenticated call rejected with no session to refresh");
                            return Err(RefreshError::MissingRefreshCredential);
                        }
                        _ => {}
                    }

                    *state = RefreshState::Refreshing { pending: vec![tx] };
                    self.start();
                }
            }
        }

        rx.await.unwrap_or(Err(RefreshError::Aborted))
    }

    fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let exchange = tokio::spawn(Arc::clone(&this).exchange());
            let outcome = match exchange.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Refresh task failed: {}", e);
                    Err(RefreshError::Aborted)
                }
            };
            this.settle(outcome).await;
        });
    }

    /// One round-trip to the authority.
    async fn exchange(self: Arc<Self>) -> Result<CredentialPair, RefreshError> {
        let refresh = self
            .store
            .get()
            .await?
            .and_then(|pair| pair.refresh)
            .ok_or(RefreshError::MissingRefreshCredential)?;

        let attempt = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Exchanging refresh credential (refresh #{})", attempt);

        let issued = tokio::time::timeout(self.timeout, self.authority.exchange(&refresh))
            .await
            .map_err(|_| RefreshError::Timeout(self.timeout))??;

        Ok(issued.or_refresh(refresh))
    }

    /// Store or clear, drain pending calls, return to idle, then fan out.
    async fn settle(&self, outcome: Result<CredentialPair, RefreshError>) {
        let (pending, result) = {
            let mut state = self.state.lock().await;

            let result = match outcome {
                Ok(pair) => match self.store.set(&pair).await {
                    Ok(()) => Ok(pair.access),
                    Err(e) => Err(RefreshError::from(e)),
                },
                Err(e) => Err(e),
            };

            if result.is_err() {
                if let Err(e) = self.store.clear().await {
                    warn!("Failed to clear credentials after refresh failure: {}", e);
                }
            }

            let pending = match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { pending } => pending,
                RefreshState::Idle => Vec::new(),
            };

            (pending, result)
        };

        match &result {
            Ok(_) => info!("Refresh succeeded, resuming {} call(s)", pending.len()),
            Err(e) => {
                error!(
                    "Refresh failed ({}): {}; ending session for {} call(s)",
                    e.kind(),
                    e,
                    pending.len()
                );
                self.logout.force_logout(e);
            }
        }

        for waiter in pending {
            let _ = waiter.send(result.clone());
        }
    }

    #[cfg(test)]
    async fn waiting(&self) -> usize {
        match &*self.state.lock().await {
            RefreshState::Refreshing { pending } => pending.len(),
            RefreshState::Idle => 0,
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("timeout", &self.timeout)
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::{Notify, Semaphore};

    /// Authority that blocks until released, so callers can pile up.
    struct GatedAuthority {
        calls: AtomicUsize,
        entered: Notify,
        release: Semaphore,
        result: Result<CredentialPair, RefreshError>,
    }

    impl GatedAuthority {
        fn new(result: Result<CredentialPair, RefreshError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                entered: Notify::new(),
                release: Semaphore::new(0),
                result,
            })
        }
    }

    #[async_trait]
    impl RefreshAuthority for GatedAuthority {
        async fn exchange(&self, _refresh: &Secret) -> Result<CredentialPair, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            let _permit = self.release.acquire().await.unwrap();
            self.result.clone()
        }
    }

    struct PanickingAuthority;

    #[async_trait]
    impl RefreshAuthority for PanickingAuthority {
        async fn exchange(&self, _refresh: &Secret) -> Result<CredentialPair, RefreshError> {
            panic!("authority exploded");
        }
    }

    fn logout_counter() -> (Arc<AtomicUsize>, Arc<dyn LogoutSignal>) {
        let count = Arc::new(AtomicUsize::new(0));
        let signal = {
            let count = Arc::clone(&count);
            move |_: &RefreshError| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };
        (count, Arc::new(signal))
    }

    fn coordinator(
        store: &Arc<MemoryStore>,
        authority: Arc<dyn RefreshAuthority>,
        logout: Arc<dyn LogoutSignal>,
    ) -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(store.clone(), authority, logout))
    }

    fn expired_session() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_pair(
            CredentialPair::new("old").with_refresh("r1"),
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_exchange() {
        let store = expired_session();
        let authority = GatedAuthority::new(Ok(CredentialPair::new("new").with_refresh("r2")));
        let (logouts, logout) = logout_counter();
        let coordinator = coordinator(&store, authority.clone(), logout);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let coordinator = Arc::clone(&coordinator);
            tasks.spawn(async move { coordinator.refresh(Some(&Secret::new("old"))).await });
        }

        authority.entered.notified().await;
        while coordinator.waiting().await < 10 {
            tokio::task::yield_now().await;
        }
        assert!(coordinator.is_refreshing().await);
        authority.release.add_permits(1);

        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap().unwrap().expose(), "new");
        }

        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.refresh_count(), 1);
        assert_eq!(logouts.load(Ordering::SeqCst), 0);
        assert!(!coordinator.is_refreshing().await);

        let stored = store.get().await.unwrap().unwrap();
        assert_eq!(stored.access.expose(), "new");
        assert_eq!(stored.refresh.unwrap().expose(), "r2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_exchange_rejects_everyone_and_logs_out_once() {
        let store = expired_session();
        let rejected = RefreshError::Rejected {
            status: Some(401),
            message: "expired".to_string(),
        };
        let authority = GatedAuthority::new(Err(rejected.clone()));
        let (logouts, logout) = logout_counter();
        let coordinator = coordinator(&store, authority.clone(), logout);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..5 {
            let coordinator = Arc::clone(&coordinator);
            tasks.spawn(async move { coordinator.refresh(Some(&Secret::new("old"))).await });
        }

        authority.entered.notified().await;
        while coordinator.waiting().await < 5 {
            tokio::task::yield_now().await;
        }
        authority.release.add_permits(1);

        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap(), Err(rejected.clone()));
        }

        assert_eq!(logouts.load(Ordering::SeqCst), 1);
        assert!(store.get().await.unwrap().is_none());
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn test_rotated_credential_skips_exchange() {
        let store = Arc::new(MemoryStore::with_pair(
            CredentialPair::new("already-new").with_refresh("r2"),
        ));
        let authority = GatedAuthority::new(Ok(CredentialPair::new("unused")));
        let (_, logout) = logout_counter();
        let coordinator = coordinator(&store, authority.clone(), logout);

        let fresh = coordinator.refresh(Some(&Secret::new("old"))).await.unwrap();

        assert_eq!(fresh.expose(), "already-new");
        assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ended_session_does_not_log_out_again() {
        let store = Arc::new(MemoryStore::new());
        let authority = GatedAuthority::new(Ok(CredentialPair::new("unused")));
        let (logouts, logout) = logout_counter();
        let coordinator = coordinator(&store, authority.clone(), logout);

        let result = coordinator.refresh(Some(&Secret::new("old"))).await;

        assert_eq!(result, Err(RefreshError::MissingRefreshCredential));
        assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
        assert_eq!(logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_anonymous_call_without_session_does_not_log_out() {
        let store = Arc::new(MemoryStore::new());
        let authority = GatedAuthority::new(Ok(CredentialPair::new("unused")));
        let (logouts, logout) = logout_counter();
        let coordinator = coordinator(&store, authority.clone(), logout);

        let result = coordinator.refresh(None).await;

        assert_eq!(result, Err(RefreshError::MissingRefreshCredential));
        assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.refresh_count(), 0);
        assert_eq!(logouts.load(Ordering::SeqCst), 0);
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn test_missing_refresh_credential_ends_session() {
        let store = Arc::new(MemoryStore::with_pair(CredentialPair::new("old")));
        let authority = GatedAuthority::new(Ok(CredentialPair::new("unused")));
        let (logouts, logout) = logout_counter();
        let coordinator = coordinator(&store, authority.clone(), logout);

        let result = coordinator.refresh(Some(&Secret::new("old"))).await;

        assert_eq!(result, Err(RefreshError::MissingRefreshCredential));
        assert_eq!(coordinator.refresh_count(), 0);
        assert_eq!(logouts.load(Ordering::SeqCst), 1);
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_timeout_is_a_failure() {
        let store = expired_session();
        // Never released: the exchange hangs until the timeout fires.
        let authority = GatedAuthority::new(Ok(CredentialPair::new("late")));
        let (logouts, logout) = logout_counter();
        let coordinator = Arc::new(
            RefreshCoordinator::new(store.clone(), authority, logout)
                .with_timeout(Duration::from_secs(2)),
        );

        let result = coordinator.refresh(Some(&Secret::new("old"))).await;

        assert_eq!(result, Err(RefreshError::Timeout(Duration::from_secs(2))));
        assert_eq!(logouts.load(Ordering::SeqCst), 1);
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_panicking_authority_aborts_waiters() {
        let store = expired_session();
        let (logouts, logout) = logout_counter();
        let coordinator = coordinator(&store, Arc::new(PanickingAuthority), logout);

        let result = coordinator.refresh(Some(&Secret::new("old"))).await;

        assert_eq!(result, Err(RefreshError::Aborted));
        assert_eq!(logouts.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn test_sequential_refreshes_each_exchange() {
        let store = expired_session();
        let authority = GatedAuthority::new(Ok(CredentialPair::new("new")));
        authority.release.add_permits(2);
        let (_, logout) = logout_counter();
        let coordinator = coordinator(&store, authority.clone(), logout);

        let first = coordinator.refresh(Some(&Secret::new("old"))).await.unwrap();
        // The next failure carries the refreshed credential, so it is not stale.
        let second = coordinator.refresh(Some(&first)).await.unwrap();

        assert_eq!(second.expose(), "new");
        assert_eq!(coordinator.refresh_count(), 2);
        // The refresh credential survives an exchange that did not rotate it.
        assert_eq!(store.get().await.unwrap().unwrap().refresh.unwrap().expose(), "r1");
    }
}

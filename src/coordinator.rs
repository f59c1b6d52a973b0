//! Session coordinator
//!
//! Owns the application's `Session` and keeps it consistent with the
//! identity provider. Two sources update it: the initial "who is signed
//! in" lookup and the provider's change stream. Either may arrive first.
//!
//! Ordering rules:
//! - whichever source answers first clears `loading`
//! - change events apply in arrival order (last write wins)
//! - the initial lookup only sets the user if nothing newer (a change
//!   event or a sign-out) was applied while it was in flight
//! - after teardown every late result is discarded

use crate::config::CoordinatorConfig;
use crate::error::{Result, SessionError};
use crate::notify::Notifier;
use crate::provider::{AuthSubscription, IdentityProvider};
use crate::router::Router;
use crate::types::{AuthChange, Session, User};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

struct CoreState {
    session: Session,

    /// Bumped by every applied change event and sign-out
    revision: u64,
}

struct Shared {
    provider: Arc<dyn IdentityProvider>,
    router: Arc<dyn Router>,
    notifier: Arc<dyn Notifier>,
    config: CoordinatorConfig,
    state: Mutex<CoreState>,

    /// Cleared once, under the state lock, at teardown
    active: AtomicBool,
    tx: watch::Sender<Session>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &CoreState) {
        self.tx.send_replace(state.session.clone());
    }

    fn apply_lookup(&self, issued_at: u64, result: Result<Option<User>>) {
        let user = match result {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(
                    provider = %self.provider.name(),
                    error = %e,
                    "Initial user lookup failed, continuing unauthenticated"
                );
                None
            }
        };

        let mut state = self.lock();
        if !self.active.load(Ordering::SeqCst) {
            tracing::debug!("Discarding initial lookup after teardown");
            return;
        }

        if state.revision != issued_at {
            tracing::debug!(
                issued_at,
                revision = state.revision,
                "Discarding stale initial lookup"
            );
            if state.session.loading {
                state.session.loading = false;
                self.publish(&state);
            }
            return;
        }

        tracing::debug!(
            user_id = user.as_ref().map(|u| u.id.as_str()).unwrap_or("-"),
            "Initial lookup applied"
        );
        state.session.user = user;
        state.session.loading = false;
        self.publish(&state);
    }

    fn apply_change(&self, change: AuthChange) {
        let signed_in = change.user.is_some();

        {
            let mut state = self.lock();
            if !self.active.load(Ordering::SeqCst) {
                tracing::debug!(kind = %change.kind, "Discarding auth change after teardown");
                return;
            }

            state.revision += 1;
            tracing::debug!(
                kind = %change.kind,
                revision = state.revision,
                user_id = change.user.as_ref().map(|u| u.id.as_str()).unwrap_or("-"),
                "Auth change applied"
            );
            state.session.user = change.user;
            state.session.loading = false;
            self.publish(&state);
        }

        // Teardown may have landed since the lock was released
        if signed_in && self.is_active() {
            let path = self.router.current_path();
            if self.config.is_guest_route(&path) {
                tracing::info!(
                    from = %path,
                    to = %self.config.landing_route,
                    "Redirecting signed-in user away from guest page"
                );
                self.router.navigate(&self.config.landing_route);
            }
        }
    }

    /// Mark the coordinator torn down; returns false if it already was
    fn deactivate(&self) -> bool {
        let state = self.lock();
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        // Wake `loaded()` waiters so they observe teardown
        self.publish(&state);
        true
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Cloneable access point to the session for the rest of the application
///
/// Handed out by `SessionCoordinator::handle` and passed to consumers
/// explicitly.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Snapshot of the current session
    ///
    /// # Panics
    ///
    /// Panics if the coordinator has been torn down. Use `try_session`
    /// to handle that case.
    pub fn session(&self) -> Session {
        match self.try_session() {
            Ok(session) => session,
            Err(e) => panic!("{}", e),
        }
    }

    /// Snapshot of the current session, or `Inactive` after teardown
    pub fn try_session(&self) -> Result<Session> {
        let state = self.shared.lock();
        if !self.shared.is_active() {
            return Err(SessionError::Inactive);
        }
        Ok(state.session.clone())
    }

    /// Current user. Panics after teardown, like `session`.
    pub fn user(&self) -> Option<User> {
        self.session().user
    }

    /// Panics after teardown, like `session`.
    pub fn is_loading(&self) -> bool {
        self.session().loading
    }

    /// Panics after teardown, like `session`.
    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Receiver that observes every session change
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.shared.tx.subscribe()
    }

    /// Wait until the first authoritative answer has arrived
    ///
    /// Returns `Inactive` if the coordinator is torn down first.
    pub async fn loaded(&self) -> Result<Session> {
        let mut rx = self.watch();
        let shared = self.shared.clone();
        // The sender lives in `Shared`, which this handle keeps alive
        let _ = rx
            .wait_for(|session| !session.loading || !shared.is_active())
            .await;
        self.try_session()
    }

    /// Sign the user out through the identity provider
    ///
    /// On success the user is cleared, a success notification is shown,
    /// and the router goes to the public root. On failure the session is
    /// left untouched, an error notification is shown, and the provider
    /// error is returned. `loading` is never changed.
    pub async fn sign_out(&self) -> Result<()> {
        if !self.shared.is_active() {
            return Err(SessionError::Inactive);
        }

        let shared = &self.shared;
        match shared.provider.sign_out().await {
            Ok(()) => {
                {
                    let mut state = shared.lock();
                    if !shared.is_active() {
                        tracing::debug!("Sign-out completed after teardown");
                        return Ok(());
                    }
                    state.revision += 1;
                    state.session.user = None;
                    shared.publish(&state);
                }

                tracing::info!(provider = %shared.provider.name(), "Signed out");
                shared.notifier.success(&shared.config.sign_out_success_message);
                shared.router.navigate(&shared.config.public_route);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    provider = %shared.provider.name(),
                    error = %e,
                    "Sign-out failed"
                );
                if shared.is_active() {
                    shared.notifier.error(&shared.config.sign_out_error_message);
                }
                Err(e)
            }
        }
    }
}

/// Mediates between an identity provider, the router, and the
/// notification sink
///
/// Created on application mount with `start`, torn down with `shutdown`
/// (or on drop). Holds exactly one change-stream subscription for its
/// whole lifetime.
pub struct SessionCoordinator {
    handle: SessionHandle,
    shutdown_tx: Option<oneshot::Sender<()>>,
    listener: Option<JoinHandle<()>>,
    lookup: Option<JoinHandle<()>>,
}

impl SessionCoordinator {
    /// Mount the coordinator
    ///
    /// Registers on the change stream and issues the initial lookup.
    /// Only an invalid config or a failed subscription is an error; a
    /// failing lookup degrades to "unauthenticated".
    pub async fn start(
        provider: Arc<dyn IdentityProvider>,
        router: Arc<dyn Router>,
        notifier: Arc<dyn Notifier>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let subscription = provider.subscribe().await?;
        let provider_name = provider.name().to_string();
        tracing::info!(
            provider = %provider_name,
            subscription = %subscription.id(),
            "Session coordinator mounted"
        );

        let (tx, _) = watch::channel(Session::initial());
        let shared = Arc::new(Shared {
            provider,
            router,
            notifier,
            config,
            state: Mutex::new(CoreState {
                session: Session::initial(),
                revision: 0,
            }),
            active: AtomicBool::new(true),
            tx,
        });

        // Read before the listener can apply anything
        let issued_at = shared.lock().revision;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let listener = tokio::spawn(run_listener(shared.clone(), subscription, shutdown_rx));

        let lookup_shared = shared.clone();
        let lookup = tokio::spawn(async move {
            let result = lookup_shared.provider.current_user().await;
            lookup_shared.apply_lookup(issued_at, result);
        });

        Ok(Self {
            handle: SessionHandle { shared },
            shutdown_tx: Some(shutdown_tx),
            listener: Some(listener),
            lookup: Some(lookup),
        })
    }

    /// Access point to hand to consumers
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.handle.session()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    /// Tear the coordinator down
    ///
    /// Releases the change subscription and waits for the listener to
    /// exit. Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        if !self.teardown() {
            return;
        }

        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                tracing::warn!(error = %e, "Auth listener task failed");
            }
        }

        tracing::info!(
            provider = %self.handle.shared.provider.name(),
            "Session coordinator torn down"
        );
    }

    fn teardown(&mut self) -> bool {
        if !self.handle.shared.deactivate() {
            return false;
        }
        if let Some(lookup) = self.lookup.take() {
            lookup.abort();
        }
        if let Some(tx) = self.shutdown_tx.take() {
            // Listener may already have exited on a closed stream
            let _ = tx.send(());
        }
        true
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_listener(
    shared: Arc<Shared>,
    mut subscription: Box<dyn AuthSubscription>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            change = subscription.next() => match change {
                Some(change) => shared.apply_change(change),
                None => {
                    tracing::warn!(
                        subscription = %subscription.id(),
                        "Auth change stream closed"
                    );
                    break;
                }
            },
        }
    }

    subscription.unsubscribe();
    tracing::debug!(subscription = %subscription.id(), "Auth subscription released");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;
    use crate::provider::memory::{LookupBehavior, MemoryIdentityProvider};
    use crate::router::MemoryRouter;
    use std::time::Duration;

    async fn start(
        provider: Arc<MemoryIdentityProvider>,
        router: Arc<MemoryRouter>,
    ) -> SessionCoordinator {
        SessionCoordinator::start(
            provider,
            router,
            Arc::new(MemoryNotifier::new()),
            CoordinatorConfig::default(),
        )
        .await
        .unwrap()
    }

    async fn wait_until(handle: &SessionHandle, pred: impl Fn(&Session) -> bool) -> Session {
        let mut rx = handle.watch();
        let session = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for session")
            .expect("session sender dropped")
            .clone();
        session
    }

    #[tokio::test]
    async fn test_reads_loading_before_first_answer() {
        let provider =
            Arc::new(MemoryIdentityProvider::new().with_lookup(LookupBehavior::Pending));
        let coordinator = start(provider, Arc::new(MemoryRouter::default())).await;

        let session = coordinator.session();
        assert!(session.loading);
        assert!(session.user.is_none());
    }

    #[tokio::test]
    async fn test_lookup_sets_user() {
        let provider = Arc::new(MemoryIdentityProvider::new().with_user(User::new("u1")));
        let coordinator = start(provider, Arc::new(MemoryRouter::default())).await;

        let session = coordinator.handle().loaded().await.unwrap();
        assert!(!session.loading);
        assert_eq!(session.user.unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_stale_lookup_keeps_newer_user() {
        let provider = Arc::new(
            MemoryIdentityProvider::new()
                .with_user(User::new("stale"))
                .with_lookup(LookupBehavior::Gated),
        );
        let coordinator = start(provider.clone(), Arc::new(MemoryRouter::default())).await;
        let handle = coordinator.handle();

        provider.emit(AuthChange::signed_in(User::new("fresh")));
        let session = wait_until(&handle, |s| s.user.is_some()).await;
        assert!(!session.loading);

        provider.release_lookup();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(provider.lookup_count(), 1);
        assert_eq!(handle.user().unwrap().id, "fresh");
    }

    #[tokio::test]
    async fn test_sign_out_before_lookup_settles_wins() {
        let provider = Arc::new(
            MemoryIdentityProvider::new()
                .with_user(User::new("u1"))
                .with_lookup(LookupBehavior::Gated),
        );
        let coordinator = start(provider.clone(), Arc::new(MemoryRouter::default())).await;
        let handle = coordinator.handle();

        handle.sign_out().await.unwrap();
        provider.release_lookup();

        let session = wait_until(&handle, |s| !s.loading).await;
        assert!(session.user.is_none());
    }

    #[tokio::test]
    async fn test_double_shutdown_releases_once() {
        let provider = Arc::new(MemoryIdentityProvider::new());
        let mut coordinator = start(provider.clone(), Arc::new(MemoryRouter::default())).await;
        assert_eq!(provider.subscriber_count(), 1);

        coordinator.shutdown().await;
        coordinator.shutdown().await;

        assert!(!coordinator.is_active());
        assert_eq!(provider.subscriber_count(), 0);
        assert_eq!(provider.released_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let provider = Arc::new(MemoryIdentityProvider::new());
        let coordinator = start(provider.clone(), Arc::new(MemoryRouter::default())).await;
        drop(coordinator);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(provider.released_count(), 1);
    }

    #[tokio::test]
    async fn test_loaded_after_shutdown_is_inactive() {
        let provider =
            Arc::new(MemoryIdentityProvider::new().with_lookup(LookupBehavior::Pending));
        let mut coordinator = start(provider, Arc::new(MemoryRouter::default())).await;
        let handle = coordinator.handle();

        let waiter = tokio::spawn(async move { handle.loaded().await });
        tokio::task::yield_now().await;
        coordinator.shutdown().await;

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(SessionError::Inactive)));
    }

    #[tokio::test]
    async fn test_callbacks_after_teardown_are_discarded() {
        let provider =
            Arc::new(MemoryIdentityProvider::new().with_lookup(LookupBehavior::Pending));
        let router = Arc::new(MemoryRouter::new("/login"));
        let mut coordinator = start(provider, router.clone()).await;
        let shared = coordinator.handle.shared.clone();
        let rx = coordinator.handle().watch();

        coordinator.shutdown().await;
        assert!(!shared.deactivate());

        shared.apply_change(AuthChange::signed_in(User::new("late")));
        shared.apply_lookup(0, Ok(Some(User::new("late"))));
        shared.apply_lookup(0, Err(SessionError::Lookup {
            provider: "memory".to_string(),
            reason: "gone".to_string(),
        }));

        let session = rx.borrow().clone();
        assert!(session.user.is_none());
        assert!(session.loading);
        assert_eq!(shared.lock().revision, 0);
        assert!(router.history().is_empty());
        assert_eq!(router.current_path(), "/login");
    }

    #[tokio::test]
    async fn test_sign_out_completing_after_teardown_is_silent() {
        let provider = Arc::new(MemoryIdentityProvider::new().with_user(User::new("u1")));
        let router = Arc::new(MemoryRouter::new("/clients"));
        let notifier = Arc::new(MemoryNotifier::new());
        let mut coordinator = SessionCoordinator::start(
            provider.clone(),
            router.clone(),
            notifier.clone(),
            CoordinatorConfig::default(),
        )
        .await
        .unwrap();
        let handle = coordinator.handle();
        handle.loaded().await.unwrap();

        provider.gate_sign_out(true);
        let sign_out = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.sign_out().await })
        };
        tokio::task::yield_now().await;

        coordinator.shutdown().await;
        provider.release_sign_out();

        let result = tokio::time::timeout(Duration::from_secs(1), sign_out)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(provider.user().is_none());
        assert!(notifier.notifications().is_empty());
        assert!(router.history().is_empty());
        assert_eq!(router.current_path(), "/clients");
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let result = SessionCoordinator::start(
            Arc::new(MemoryIdentityProvider::new()),
            Arc::new(MemoryRouter::default()),
            Arc::new(MemoryNotifier::new()),
            CoordinatorConfig::default().with_public_route("home"),
        )
        .await;
        assert!(matches!(result, Err(SessionError::Config(_))));
    }
}

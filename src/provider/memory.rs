//! In-memory identity provider
//!
//! Single-process provider for tests and local embedding. Lookups can be
//! scripted (delayed, gated, pending, failing) so callers can reproduce
//! every ordering between the initial lookup and the change stream.

use super::{AuthSubscription, IdentityProvider};
use crate::error::{Result, SessionError};
use crate::state::SessionStore;
use crate::types::{AuthChange, AuthChangeKind, User};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

type Subscribers = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<AuthChange>>>>;

/// How `current_user` resolves
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LookupBehavior {
    /// Resolve right away
    #[default]
    Immediate,
    /// Resolve after a fixed delay
    Delayed(Duration),
    /// Resolve once `release_lookup` is called
    Gated,
    /// Never resolve
    Pending,
    /// Fail with the given reason
    Fail(String),
}

/// In-memory `IdentityProvider`
///
/// The user returned by a lookup is captured when the lookup is issued,
/// not when it resolves, the same way a network round-trip answers with
/// the state at request time.
pub struct MemoryIdentityProvider {
    user: Mutex<Option<User>>,
    subscribers: Subscribers,
    lookup: Mutex<LookupBehavior>,
    lookup_gate: Notify,
    sign_out_failure: Mutex<Option<String>>,
    sign_out_gated: AtomicBool,
    sign_out_gate: Notify,
    subscribe_failure: Mutex<Option<String>>,
    initial_session_event: bool,
    store: Option<Box<dyn SessionStore>>,
    lookups: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self {
            user: Mutex::new(None),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            lookup: Mutex::new(LookupBehavior::default()),
            lookup_gate: Notify::new(),
            sign_out_failure: Mutex::new(None),
            sign_out_gated: AtomicBool::new(false),
            sign_out_gate: Notify::new(),
            subscribe_failure: Mutex::new(None),
            initial_session_event: false,
            store: None,
            lookups: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a signed-in user
    pub fn with_user(self, user: User) -> Self {
        *lock(&self.user) = Some(user);
        self
    }

    /// Set how lookups resolve
    pub fn with_lookup(self, behavior: LookupBehavior) -> Self {
        *lock(&self.lookup) = behavior;
        self
    }

    /// Queue an `InitialSession` change on every new subscription,
    /// like hosted SDKs do when a listener registers
    pub fn with_initial_session_event(mut self) -> Self {
        self.initial_session_event = true;
        self
    }

    /// Persist the signed-in user and restore it now
    ///
    /// A store that fails to load leaves the provider signed out.
    pub fn with_store(mut self, store: impl SessionStore + 'static) -> Self {
        match store.load() {
            Ok(Some(user)) => {
                tracing::debug!(user_id = %user.id, "Restored persisted session");
                *lock(&self.user) = Some(user);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to restore persisted session");
            }
        }
        self.store = Some(Box::new(store));
        self
    }

    /// Change how subsequent lookups resolve
    pub fn set_lookup(&self, behavior: LookupBehavior) {
        *lock(&self.lookup) = behavior;
    }

    /// Let one gated lookup resolve
    pub fn release_lookup(&self) {
        self.lookup_gate.notify_one();
    }

    /// Make the next sign-out calls fail with `reason` (`None` to succeed)
    pub fn fail_sign_out(&self, reason: Option<&str>) {
        *lock(&self.sign_out_failure) = reason.map(str::to_string);
    }

    /// Hold subsequent sign-out calls until `release_sign_out`
    pub fn gate_sign_out(&self, gated: bool) {
        self.sign_out_gated.store(gated, Ordering::SeqCst);
    }

    /// Let one gated sign-out proceed
    pub fn release_sign_out(&self) {
        self.sign_out_gate.notify_one();
    }

    /// Make the next subscribe calls fail with `reason` (`None` to succeed)
    pub fn fail_subscribe(&self, reason: Option<&str>) {
        *lock(&self.subscribe_failure) = reason.map(str::to_string);
    }

    /// The provider's own notion of the signed-in user
    pub fn user(&self) -> Option<User> {
        lock(&self.user).clone()
    }

    /// Sign a user in and broadcast `SignedIn`
    pub fn sign_in(&self, user: User) -> usize {
        *lock(&self.user) = Some(user.clone());
        self.persist(Some(&user));
        self.emit(AuthChange::signed_in(user))
    }

    /// Deliver a change to every live subscription without touching the
    /// provider's own user, returning how many subscriptions received it
    pub fn emit(&self, change: AuthChange) -> usize {
        let mut subs = lock(&self.subscribers);
        subs.retain(|_, tx| tx.send(change.clone()).is_ok());
        tracing::debug!(
            kind = %change.kind,
            delivered = subs.len(),
            "Auth change emitted"
        );
        subs.len()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Number of subscriptions released via `unsubscribe`
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of lookups issued so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn persist(&self, user: Option<&User>) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(user) {
                tracing::warn!(error = %e, "Failed to persist session");
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn current_user(&self) -> Result<Option<User>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let behavior = lock(&self.lookup).clone();
        let user = self.user();

        match behavior {
            LookupBehavior::Immediate => {}
            LookupBehavior::Delayed(delay) => tokio::time::sleep(delay).await,
            LookupBehavior::Gated => self.lookup_gate.notified().await,
            LookupBehavior::Pending => std::future::pending::<()>().await,
            LookupBehavior::Fail(reason) => {
                return Err(SessionError::Lookup {
                    provider: self.name().to_string(),
                    reason,
                });
            }
        }

        Ok(user)
    }

    async fn subscribe(&self) -> Result<Box<dyn AuthSubscription>> {
        if let Some(reason) = lock(&self.subscribe_failure).clone() {
            return Err(SessionError::Subscribe {
                provider: self.name().to_string(),
                reason,
            });
        }

        let id = format!("sub-{}", uuid::Uuid::new_v4());
        let (tx, rx) = mpsc::unbounded_channel();

        if self.initial_session_event {
            let change = AuthChange::new(AuthChangeKind::InitialSession, self.user());
            // Receiver is alive in this scope
            let _ = tx.send(change);
        }

        lock(&self.subscribers).insert(id.clone(), tx);
        tracing::debug!(subscription = %id, "Auth subscription registered");

        Ok(Box::new(MemorySubscription {
            id,
            receiver: UnboundedReceiverStream::new(rx),
            subscribers: self.subscribers.clone(),
            released: self.released.clone(),
            active: true,
        }))
    }

    async fn sign_out(&self) -> Result<()> {
        if self.sign_out_gated.load(Ordering::SeqCst) {
            self.sign_out_gate.notified().await;
        }

        if let Some(reason) = lock(&self.sign_out_failure).clone() {
            return Err(SessionError::SignOut(reason));
        }

        *lock(&self.user) = None;
        self.persist(None);
        self.emit(AuthChange::signed_out());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Subscription handle returned by `MemoryIdentityProvider::subscribe`
pub struct MemorySubscription {
    id: String,
    receiver: UnboundedReceiverStream<AuthChange>,
    subscribers: Subscribers,
    released: Arc<AtomicUsize>,
    active: bool,
}

#[async_trait]
impl AuthSubscription for MemorySubscription {
    async fn next(&mut self) -> Option<AuthChange> {
        if !self.active {
            return None;
        }
        self.receiver.next().await
    }

    fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        lock(&self.subscribers).remove(&self.id);
        self.released.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(subscription = %self.id, "Auth subscription released");
    }

    fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

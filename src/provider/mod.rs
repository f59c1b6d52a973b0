//! Identity provider trait — the seam to the hosted authentication service
//!
//! The coordinator only needs three things from an identity backend: a
//! "who is signed in" lookup, a stream of auth changes, and sign-out.
//! Hosted SDK wrappers and the in-memory provider implement
//! `IdentityProvider` so the coordinator never depends on a concrete backend.

use crate::error::Result;
use crate::types::{AuthChange, User};
use async_trait::async_trait;

pub mod memory;

/// Core trait for identity backends
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Look up the currently authenticated user
    ///
    /// May take arbitrarily long; callers must not assume it resolves
    /// before change events start flowing.
    async fn current_user(&self) -> Result<Option<User>>;

    /// Register a listener on the auth change stream
    async fn subscribe(&self) -> Result<Box<dyn AuthSubscription>>;

    /// End the current session
    async fn sign_out(&self) -> Result<()>;

    /// Provider name (e.g., "memory", "supabase")
    fn name(&self) -> &str;
}

/// Handle to a live registration on a provider's change stream
///
/// Acquired once per coordinator and released exactly once at teardown.
#[async_trait]
pub trait AuthSubscription: Send {
    /// Receive the next change; `None` once the stream is closed or released
    async fn next(&mut self) -> Option<AuthChange>;

    /// Release the registration. Calling it again is a no-op.
    fn unsubscribe(&mut self);

    /// Provider-assigned subscription identifier
    fn id(&self) -> &str;
}

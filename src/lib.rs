//! # sweeply-session
//!
//! Client-side session lifecycle for Sweeply.
//!
//! ## Overview
//!
//! `sweeply-session` keeps the application's view of "who is signed in"
//! consistent with a hosted identity provider. It reconciles the initial
//! user lookup with the provider's change stream, redirects signed-in
//! users away from guest-only pages, and propagates sign-out to routing
//! and notifications.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sweeply_session::{
//!     CoordinatorConfig, MemoryIdentityProvider, MemoryRouter, SessionCoordinator,
//!     TracingNotifier, User,
//! };
//!
//! # async fn example() -> sweeply_session::Result<()> {
//! let provider = Arc::new(MemoryIdentityProvider::new().with_user(User::new("u1")));
//! let router = Arc::new(MemoryRouter::new("/login"));
//!
//! let mut coordinator = SessionCoordinator::start(
//!     provider,
//!     router,
//!     Arc::new(TracingNotifier),
//!     CoordinatorConfig::default(),
//! )
//! .await?;
//!
//! let session = coordinator.handle().loaded().await?;
//! assert_eq!(session.user.map(|u| u.id), Some("u1".to_string()));
//!
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **IdentityProvider** trait — lookup, change stream, sign-out
//! - **SessionCoordinator** — owns the session and its transitions
//! - **SessionHandle** — the access point consumers hold
//! - **Router** / **Notifier** — navigation and toast seams
//! - **SessionStore** — persisted provider session

pub mod config;
pub mod coordinator;
pub mod error;
pub mod notify;
pub mod provider;
pub mod router;
pub mod state;
pub mod types;

pub use config::CoordinatorConfig;
pub use coordinator::{SessionCoordinator, SessionHandle};
pub use error::{Result, SessionError};
pub use notify::{MemoryNotifier, Notifier, TracingNotifier};
pub use provider::{AuthSubscription, IdentityProvider};
pub use router::{MemoryRouter, Router};
pub use state::{FileSessionStore, MemorySessionStore, PersistedSession, SessionStore};
pub use types::{AuthChange, AuthChangeKind, Notification, NotificationLevel, Session, User};

pub use provider::memory::{LookupBehavior, MemoryIdentityProvider, MemorySubscription};

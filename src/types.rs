//! Core session types
//!
//! All serialized types use camelCase JSON for compatibility with the
//! hosted identity provider's payloads.

use serde::{Deserialize, Serialize};

/// An authenticated identity as reported by the identity provider
///
/// The shape beyond `id` is owned by the provider; the coordinator never
/// inspects anything but presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Provider-assigned user identifier
    pub id: String,

    /// Primary email address, when the provider exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Arbitrary provider metadata (e.g., display name, company)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl User {
    /// Create a user with only an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach an email address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Attach provider metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What kind of transition a change event reports
///
/// The coordinator applies every kind the same way; the kind is carried
/// for logging and for providers that need to distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

impl std::fmt::Display for AuthChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
        };
        f.write_str(s)
    }
}

/// A single event from the identity provider's change stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChange {
    /// Transition reported by the provider
    pub kind: AuthChangeKind,

    /// User after the transition; `None` when no session remains
    pub user: Option<User>,

    /// Unix timestamp in milliseconds when the change was produced
    pub timestamp: u64,
}

impl AuthChange {
    /// Create a change event stamped with the current time
    pub fn new(kind: AuthChangeKind, user: Option<User>) -> Self {
        Self {
            kind,
            user,
            timestamp: now_millis(),
        }
    }

    /// A user signed in
    pub fn signed_in(user: User) -> Self {
        Self::new(AuthChangeKind::SignedIn, Some(user))
    }

    /// The session ended
    pub fn signed_out() -> Self {
        Self::new(AuthChangeKind::SignedOut, None)
    }
}

/// Authentication state exposed to the rest of the application
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Current user, `None` when unauthenticated
    pub user: Option<User>,

    /// True until the first authoritative answer arrives
    pub loading: bool,
}

impl Session {
    /// State before any answer from the provider
    pub fn initial() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initial()
    }
}

/// Severity of a user-visible notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A user-visible message emitted through a `Notifier`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Current time in Unix milliseconds
fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_builder() {
        let user = User::new("u1")
            .with_email("owner@sparkle-clean.test")
            .with_metadata(serde_json::json!({"company": "Sparkle Clean"}));

        assert_eq!(user.id, "u1");
        assert_eq!(user.email.as_deref(), Some("owner@sparkle-clean.test"));
        assert_eq!(user.metadata["company"], "Sparkle Clean");
    }

    #[test]
    fn test_user_deserialize_minimal() {
        let user: User = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(user, User::new("u1"));
        assert!(user.metadata.is_null());
    }

    #[test]
    fn test_user_serialize_skips_empty_fields() {
        let json = serde_json::to_value(User::new("u1")).unwrap();
        assert_eq!(json, serde_json::json!({"id": "u1"}));
    }

    #[test]
    fn test_auth_change_constructors() {
        let change = AuthChange::signed_in(User::new("u1"));
        assert_eq!(change.kind, AuthChangeKind::SignedIn);
        assert_eq!(change.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
        assert!(change.timestamp > 0);

        let change = AuthChange::signed_out();
        assert_eq!(change.kind, AuthChangeKind::SignedOut);
        assert!(change.user.is_none());
    }

    #[test]
    fn test_auth_change_kind_wire_format() {
        let json = serde_json::to_string(&AuthChangeKind::TokenRefreshed).unwrap();
        assert_eq!(json, "\"TOKEN_REFRESHED\"");
        assert_eq!(AuthChangeKind::TokenRefreshed.to_string(), "TOKEN_REFRESHED");

        let kind: AuthChangeKind = serde_json::from_str("\"INITIAL_SESSION\"").unwrap();
        assert_eq!(kind, AuthChangeKind::InitialSession);
    }

    #[test]
    fn test_session_initial() {
        let session = Session::default();
        assert!(session.loading);
        assert!(session.user.is_none());
        assert!(!session.is_authenticated());
    }
}

//! Coordinator configuration
//!
//! Routes and messages the coordinator uses when reacting to session
//! changes. Every field has a default, so an empty JSON object is a
//! valid configuration.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Routing and messaging settings for a `SessionCoordinator`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorConfig {
    /// Pages meant only for unauthenticated visitors
    ///
    /// A signed-in change event observed on one of these routes redirects
    /// to `landing_route`.
    #[serde(default = "default_guest_routes")]
    pub guest_routes: Vec<String>,

    /// Default authenticated landing page
    #[serde(default = "default_landing_route")]
    pub landing_route: String,

    /// Public root, navigated to after sign-out
    #[serde(default = "default_public_route")]
    pub public_route: String,

    #[serde(default = "default_sign_out_success_message")]
    pub sign_out_success_message: String,

    #[serde(default = "default_sign_out_error_message")]
    pub sign_out_error_message: String,
}

fn default_guest_routes() -> Vec<String> {
    vec!["/login".to_string(), "/signup".to_string()]
}

fn default_landing_route() -> String {
    "/dashboard".to_string()
}

fn default_public_route() -> String {
    "/".to_string()
}

fn default_sign_out_success_message() -> String {
    "Signed out successfully".to_string()
}

fn default_sign_out_error_message() -> String {
    "Error signing out".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            guest_routes: default_guest_routes(),
            landing_route: default_landing_route(),
            public_route: default_public_route(),
            sign_out_success_message: default_sign_out_success_message(),
            sign_out_error_message: default_sign_out_error_message(),
        }
    }
}

impl CoordinatorConfig {
    /// Parse and validate a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = serde_json::from_str(&json).map_err(|e| {
            SessionError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "Coordinator config loaded");
        Ok(config)
    }

    pub fn with_guest_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guest_routes = routes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_landing_route(mut self, route: impl Into<String>) -> Self {
        self.landing_route = route.into();
        self
    }

    pub fn with_public_route(mut self, route: impl Into<String>) -> Self {
        self.public_route = route.into();
        self
    }

    pub fn with_messages(
        mut self,
        success: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        self.sign_out_success_message = success.into();
        self.sign_out_error_message = error.into();
        self
    }

    /// Whether `path` is a guest-only page
    pub fn is_guest_route(&self, path: &str) -> bool {
        self.guest_routes.iter().any(|r| r == path)
    }

    /// Check that every route is an absolute path
    pub fn validate(&self) -> Result<()> {
        let routes = self
            .guest_routes
            .iter()
            .map(|r| ("guestRoutes", r))
            .chain([
                ("landingRoute", &self.landing_route),
                ("publicRoute", &self.public_route),
            ]);

        for (field, route) in routes {
            if !route.starts_with('/') {
                return Err(SessionError::Config(format!(
                    "{} must be an absolute path, got '{}'",
                    field, route
                )));
            }
        }

        if self.is_guest_route(&self.landing_route) {
            return Err(SessionError::Config(format!(
                "landingRoute '{}' cannot also be a guest route",
                self.landing_route
            )));
        }

        Ok(())
    }
}

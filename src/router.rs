//! Navigation seam
//!
//! The coordinator reads the current route and issues fire-and-forget
//! navigations; it never owns routing.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Application router as seen by the coordinator
pub trait Router: Send + Sync {
    /// Path of the page currently shown (e.g., "/login")
    fn current_path(&self) -> String;

    /// Navigate to `path`
    fn navigate(&self, path: &str);
}

/// Router that tracks the current path and every navigation request
pub struct MemoryRouter {
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl Default for MemoryRouter {
    fn default() -> Self {
        Self::new("/")
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryRouter {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(path.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Move to `path` as if the user followed a link (not recorded)
    pub fn set_path(&self, path: impl Into<String>) {
        *lock(&self.current) = path.into();
    }

    /// Paths passed to `navigate`, oldest first
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }
}

impl Router for MemoryRouter {
    fn current_path(&self) -> String {
        lock(&self.current).clone()
    }

    fn navigate(&self, path: &str) {
        *lock(&self.current) = path.to_string();
        lock(&self.history).push(path.to_string());
        tracing::debug!(path = %path, "Navigated");
    }
}

use async_trait::async_trait;
use shared::{
    domain::{AuthSession, NewTodo, SessionUser, Todo, TodoId},
    error::BackendError,
    protocol::AuthChange,
};
use tokio::sync::broadcast;

pub mod http;
pub mod messages;
pub mod session;
pub mod todos;
pub mod tracker;

pub use http::{HostedBackend, HostedBackendConfig};
pub use messages::{Locale, Messages};
pub use session::{SessionSnapshot, SessionState, SessionStore};
pub use todos::{SyncAction, SyncError, TodoList};
pub use tracker::{SessionSubscription, SessionTracker, TrackerError, TrackerSettings};

/// Auth half of the hosted backend.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn get_current_user(&self) -> Result<Option<SessionUser>, BackendError>;
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError>;
    async fn sign_out(&self) -> Result<(), BackendError>;
    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), BackendError>;
    fn subscribe_auth_changes(&self) -> broadcast::Receiver<AuthChange>;
}

/// Data half of the hosted backend, scoped to the todos collection.
///
/// Row ownership is enforced by the backend's authorization policy, not here.
#[async_trait]
pub trait TodoGateway: Send + Sync {
    /// All rows visible to the caller, newest first.
    async fn select_todos(&self) -> Result<Vec<Todo>, BackendError>;
    async fn insert_todo(&self, row: NewTodo) -> Result<Vec<Todo>, BackendError>;
    async fn update_completed(&self, id: &TodoId, completed: bool) -> Result<(), BackendError>;
    async fn delete_todo(&self, id: &TodoId) -> Result<(), BackendError>;
}

/// Performs a full resync of the front end, e.g. a page reload.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn hard_reload(&self, destination: &str);
}

pub struct NoopNavigator;

#[async_trait]
impl Navigator for NoopNavigator {
    async fn hard_reload(&self, destination: &str) {
        tracing::debug!(destination, "hard reload requested without a navigator");
    }
}

#[cfg(test)]
#[path = "tests/fakes.rs"]
mod fakes;

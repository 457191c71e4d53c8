//! Item List Synchronizer: a local, newest-first cache of the signed-in user's todos.
//!
//! The view is only ever replaced wholesale (`load`), prepended to (`add`) or
//! patched by id (`toggle`, `remove`). Every mutation is confirmed by the
//! backend first; nothing is applied optimistically and nothing is retried.

use std::sync::Arc;

use shared::{
    domain::{NewTodo, SessionUser, Todo, TodoId},
    error::BackendError,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::{
    messages::Messages,
    session::{SessionState, SessionStore},
    TodoGateway,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Fetch,
    Add,
    Update,
    Delete,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("todo title must not be blank")]
    EmptyTitle,
    #[error("todo {0} is not in the current view")]
    UnknownItem(TodoId),
    #[error("session changed while the {} request was in flight", .0.as_str())]
    SessionChanged(SyncAction),
    #[error("{message}")]
    Backend { action: SyncAction, message: String },
}

impl SyncError {
    pub fn user_message(&self, messages: &Messages) -> String {
        match self {
            Self::AuthenticationRequired => messages.authentication_required(),
            Self::EmptyTitle => messages.empty_title(),
            Self::UnknownItem(_) => messages.unknown_item(),
            Self::SessionChanged(_) => messages.session_changed(),
            Self::Backend { message, .. } => message.clone(),
        }
    }

    /// Rejected locally; the backend was never contacted.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Backend { .. } | Self::SessionChanged(_))
    }
}

#[derive(Debug, Default)]
struct TodoView {
    /// Session epoch the items were fetched under.
    epoch: u64,
    items: Vec<Todo>,
    loads_in_flight: usize,
    error: Option<String>,
}

impl TodoView {
    /// Rebinds the view to a newer `epoch`, discarding rows cached for the
    /// previous session. Returns `false` when `epoch` is older than the view.
    fn adopt(&mut self, epoch: u64) -> bool {
        if epoch > self.epoch {
            self.epoch = epoch;
            self.items.clear();
            self.error = None;
            self.loads_in_flight = 0;
        }
        epoch == self.epoch
    }
}

pub struct TodoList {
    gateway: Arc<dyn TodoGateway>,
    store: Arc<SessionStore>,
    messages: Messages,
    view: Mutex<TodoView>,
}

impl TodoList {
    pub fn new(
        gateway: Arc<dyn TodoGateway>,
        store: Arc<SessionStore>,
        messages: Messages,
    ) -> Self {
        Self {
            gateway,
            store,
            messages,
            view: Mutex::new(TodoView::default()),
        }
    }

    /// The rows to render, or `None` when there is no session or the cached
    /// rows belong to a different one.
    pub async fn items(&self) -> Option<Vec<Todo>> {
        let snapshot = self.store.snapshot();
        let SessionState::Present(_) = snapshot.state else {
            return None;
        };
        let view = self.view.lock().await;
        (view.epoch == snapshot.epoch).then(|| view.items.clone())
    }

    pub async fn error(&self) -> Option<String> {
        let view = self.view.lock().await;
        (view.epoch == self.store.epoch())
            .then(|| view.error.clone())
            .flatten()
    }

    pub async fn is_loading(&self) -> bool {
        let view = self.view.lock().await;
        view.epoch == self.store.epoch() && view.loads_in_flight > 0
    }

    /// Waits for the session query to settle, then loads if someone is signed in.
    pub async fn wait_for_session_and_load(&self) -> Result<Option<usize>, SyncError> {
        match self.store.wait_resolved().await {
            SessionState::Present(_) => self.load().await.map(Some),
            SessionState::Unknown | SessionState::Absent => Ok(None),
        }
    }

    /// Replaces the view with the backend's rows. Overlapping loads resolve
    /// last-writer-wins.
    pub async fn load(&self) -> Result<usize, SyncError> {
        let (_, epoch) = self.require_session().await?;
        {
            let mut view = self.view.lock().await;
            if !view.adopt(epoch) {
                return Err(SyncError::SessionChanged(SyncAction::Fetch));
            }
            view.error = None;
            view.loads_in_flight += 1;
        }

        let result = self.gateway.select_todos().await;

        let mut view = self.view.lock().await;
        if !self.is_current(epoch) {
            debug!(epoch, "dropping todo list fetched under a previous session");
            return Err(SyncError::SessionChanged(SyncAction::Fetch));
        }
        view.loads_in_flight = view.loads_in_flight.saturating_sub(1);

        match result {
            Ok(mut rows) => {
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let count = rows.len();
                view.items = rows;
                debug!(count, "todo list loaded");
                Ok(count)
            }
            Err(err) => Err(self.record_failure(&mut view, SyncAction::Fetch, err)),
        }
    }

    /// Inserts a todo and, once the backend confirms it, puts it at the top.
    pub async fn add(&self, title: &str) -> Result<Vec<Todo>, SyncError> {
        let (user, epoch) = self.require_session().await?;
        let title = title.trim();
        if title.is_empty() {
            return Err(SyncError::EmptyTitle);
        }
        self.begin_mutation(epoch, SyncAction::Add).await?;

        let row = NewTodo {
            title: title.to_string(),
            user_id: user.id,
        };
        let result = self.gateway.insert_todo(row).await;

        let mut view = self.view.lock().await;
        if !self.is_current(epoch) {
            debug!(epoch, "dropping inserted todo confirmed after the session changed");
            return Err(SyncError::SessionChanged(SyncAction::Add));
        }
        match result {
            Ok(rows) => {
                info!(count = rows.len(), "todo added");
                view.items.splice(0..0, rows.iter().cloned());
                Ok(rows)
            }
            Err(err) => Err(self.record_failure(&mut view, SyncAction::Add, err)),
        }
    }

    /// Flips `completed` on one item. Returns the new value.
    pub async fn toggle(&self, id: &TodoId) -> Result<bool, SyncError> {
        let (_, epoch) = self.require_session().await?;
        let completed = {
            let mut view = self.view.lock().await;
            if !view.adopt(epoch) {
                return Err(SyncError::SessionChanged(SyncAction::Update));
            }
            let current = view
                .items
                .iter()
                .find(|todo| &todo.id == id)
                .map(|todo| todo.completed)
                .ok_or_else(|| SyncError::UnknownItem(id.clone()))?;
            view.error = None;
            !current
        };

        let result = self.gateway.update_completed(id, completed).await;

        let mut view = self.view.lock().await;
        if !self.is_current(epoch) {
            debug!(epoch, %id, "dropping todo update confirmed after the session changed");
            return Err(SyncError::SessionChanged(SyncAction::Update));
        }
        match result {
            Ok(()) => {
                for todo in view.items.iter_mut().filter(|todo| &todo.id == id) {
                    todo.completed = completed;
                }
                Ok(completed)
            }
            Err(err) => Err(self.record_failure(&mut view, SyncAction::Update, err)),
        }
    }

    pub async fn remove(&self, id: &TodoId) -> Result<(), SyncError> {
        let (_, epoch) = self.require_session().await?;
        {
            let mut view = self.view.lock().await;
            if !view.adopt(epoch) {
                return Err(SyncError::SessionChanged(SyncAction::Delete));
            }
            if !view.items.iter().any(|todo| &todo.id == id) {
                return Err(SyncError::UnknownItem(id.clone()));
            }
            view.error = None;
        }

        let result = self.gateway.delete_todo(id).await;

        let mut view = self.view.lock().await;
        if !self.is_current(epoch) {
            debug!(epoch, %id, "dropping todo delete confirmed after the session changed");
            return Err(SyncError::SessionChanged(SyncAction::Delete));
        }
        match result {
            Ok(()) => {
                view.items.retain(|todo| &todo.id != id);
                info!(%id, "todo removed");
                Ok(())
            }
            Err(err) => Err(self.record_failure(&mut view, SyncAction::Delete, err)),
        }
    }

    async fn require_session(&self) -> Result<(SessionUser, u64), SyncError> {
        let snapshot = self.store.snapshot();
        match snapshot.state {
            SessionState::Present(user) => Ok((user, snapshot.epoch)),
            SessionState::Unknown | SessionState::Absent => {
                let mut view = self.view.lock().await;
                if view.adopt(snapshot.epoch) {
                    view.error = Some(self.messages.authentication_required());
                }
                Err(SyncError::AuthenticationRequired)
            }
        }
    }

    async fn begin_mutation(&self, epoch: u64, action: SyncAction) -> Result<(), SyncError> {
        let mut view = self.view.lock().await;
        if !view.adopt(epoch) {
            return Err(SyncError::SessionChanged(action));
        }
        view.error = None;
        Ok(())
    }

    fn is_current(&self, epoch: u64) -> bool {
        let snapshot = self.store.snapshot();
        snapshot.epoch == epoch && matches!(snapshot.state, SessionState::Present(_))
    }

    fn record_failure(
        &self,
        view: &mut TodoView,
        action: SyncAction,
        err: BackendError,
    ) -> SyncError {
        error!(
            action = action.as_str(),
            code = ?err.code,
            status = ?err.status,
            error = %err,
            "todo request failed"
        );
        let message = self.messages.action_failed(action);
        view.error = Some(message.clone());
        SyncError::Backend { action, message }
    }
}

#[cfg(test)]
#[path = "tests/todos_tests.rs"]
mod tests;

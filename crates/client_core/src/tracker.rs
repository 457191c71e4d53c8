//! Session Tracker: mirrors the backend's auth state into the [`SessionStore`].
//!
//! The store is written from two places only: the initial
//! [`SessionTracker::current_session`] query and the push listener installed by
//! [`SessionTracker::on_session_change`]. Sign-in and sign-out requests never
//! write it directly; the backend confirms them through a push.

use std::sync::Arc;

use shared::domain::SessionUser;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    messages::Messages,
    session::{SessionState, SessionStore},
    AuthGateway, Navigator,
};

const RESET_PASSWORD_PATH: &str = "/auth/reset-password";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Where a successful sign-in lands.
    pub home_url: String,
    /// Sent with password reset requests; the emailed link points here.
    pub reset_redirect_url: String,
}

impl TrackerSettings {
    pub fn from_origin(site_origin: &str, home_path: &str) -> Result<Self, url::ParseError> {
        let origin = Url::parse(site_origin)?;
        Ok(Self {
            home_url: origin.join(home_path)?.to_string(),
            reset_redirect_url: origin.join(RESET_PASSWORD_PATH)?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// Rejected before contacting the backend.
    #[error("{0}")]
    MissingInput(String),
    #[error("{0}")]
    Backend(String),
}

impl TrackerError {
    pub fn user_message(&self) -> &str {
        match self {
            Self::MissingInput(message) | Self::Backend(message) => message,
        }
    }
}

/// Listener registration returned by [`SessionTracker::on_session_change`].
///
/// Dropping the handle stops the listener; [`SessionSubscription::unsubscribe`]
/// also waits for it to finish so no handler runs afterwards.
pub struct SessionSubscription {
    task: Option<JoinHandle<()>>,
}

impl SessionSubscription {
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct SessionTracker {
    gateway: Arc<dyn AuthGateway>,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    messages: Messages,
    settings: TrackerSettings,
}

impl SessionTracker {
    pub fn new(
        gateway: Arc<dyn AuthGateway>,
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        messages: Messages,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            gateway,
            store,
            navigator,
            messages,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Asks the backend who is signed in. Failures resolve to no session.
    ///
    /// A push that lands while the query is in flight is newer than the query
    /// result, so the result is only written if the store did not move.
    pub async fn current_session(&self) -> Option<SessionUser> {
        let observed_epoch = self.store.epoch();
        let user = match self.gateway.get_current_user().await {
            Ok(user) => user,
            Err(err) => {
                warn!(code = ?err.code, error = %err, "failed to fetch current user");
                None
            }
        };

        if self
            .store
            .set_if_epoch(observed_epoch, SessionState::from_user(user.clone()))
        {
            return user;
        }
        self.store.current_user()
    }

    /// Registers `handler` for every auth change pushed by the backend until the
    /// returned subscription is released. The store is updated before the
    /// handler runs.
    pub fn on_session_change<F>(&self, handler: F) -> SessionSubscription
    where
        F: Fn(Option<SessionUser>) + Send + Sync + 'static,
    {
        let mut changes = BroadcastStream::new(self.gateway.subscribe_auth_changes());
        let store = Arc::clone(&self.store);

        let task = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                match change {
                    Ok(change) => {
                        let user = change.user().cloned();
                        debug!(
                            event = ?change.event,
                            signed_in = user.is_some(),
                            "auth state changed"
                        );
                        store.set(SessionState::from_user(user.clone()));
                        handler(user);
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth listener fell behind; waiting for the next change");
                    }
                }
            }
            debug!("auth change channel closed");
        });

        SessionSubscription { task: Some(task) }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<String, TrackerError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(TrackerError::MissingInput(
                self.messages.credentials_required(),
            ));
        }

        match self.gateway.sign_in_with_password(email, password).await {
            Ok(session) => {
                info!(user_id = %session.user.id, "signed in");
                self.navigator.hard_reload(&self.settings.home_url).await;
                Ok(self.messages.sign_in_succeeded())
            }
            Err(err) => {
                warn!(code = ?err.code, error = %err, "sign in rejected");
                let message = if err.message.trim().is_empty() {
                    self.messages.sign_in_failed()
                } else {
                    err.message
                };
                Err(TrackerError::Backend(message))
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), TrackerError> {
        match self.gateway.sign_out().await {
            Ok(()) => {
                info!("sign out requested");
                Ok(())
            }
            Err(err) => {
                warn!(code = ?err.code, error = %err, "sign out failed");
                Err(TrackerError::Backend(self.messages.sign_out_failed()))
            }
        }
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<String, TrackerError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(TrackerError::MissingInput(self.messages.email_required()));
        }

        match self
            .gateway
            .reset_password_for_email(email, &self.settings.reset_redirect_url)
            .await
        {
            Ok(()) => Ok(self.messages.password_reset_sent()),
            Err(err) => {
                warn!(code = ?err.code, error = %err, "password reset request failed");
                let message = if err.message.trim().is_empty() {
                    self.messages.password_reset_failed()
                } else {
                    err.message
                };
                Err(TrackerError::Backend(message))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/tracker_tests.rs"]
mod tests;

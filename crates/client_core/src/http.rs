//! [`AuthGateway`] and [`TodoGateway`] over the hosted backend's HTTP API
//! (password-grant auth endpoints plus a REST table interface).

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{AuthSession, NewTodo, SessionUser, Todo, TodoCompletionPatch, TodoId},
    error::{BackendError, ErrorCode},
    protocol::{AuthChange, ErrorBody, PasswordGrantRequest, RecoverRequest, RefreshGrantRequest},
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::{AuthGateway, TodoGateway};

const AUTH_EVENT_CAPACITY: usize = 64;
const DEFAULT_TODOS_TABLE: &str = "todos";

#[derive(Debug, Clone)]
pub struct HostedBackendConfig {
    pub base_url: String,
    pub anon_key: String,
    pub todos_table: String,
}

impl HostedBackendConfig {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            todos_table: DEFAULT_TODOS_TABLE.to_string(),
        }
    }
}

pub struct HostedBackend {
    http: Client,
    base_url: String,
    anon_key: String,
    todos_table: String,
    session: RwLock<Option<AuthSession>>,
    /// Serializes refresh-token exchanges; refresh tokens are single use.
    refresh_lock: Mutex<()>,
    auth_events: broadcast::Sender<AuthChange>,
}

impl HostedBackend {
    pub fn new(config: HostedBackendConfig) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&config.base_url)?;
        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            http: Client::new(),
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            anon_key: config.anon_key,
            todos_table: config.todos_table,
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            auth_events,
        })
    }

    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    fn request(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    /// Exchanges the stored refresh token for a new access token and pushes
    /// `TokenRefreshed`. A rejected refresh token ends the local session.
    pub async fn refresh_session(&self) -> Result<AuthSession, BackendError> {
        let _exchange = self.refresh_lock.lock().await;
        self.exchange_refresh_token().await
    }

    async fn exchange_refresh_token(&self) -> Result<AuthSession, BackendError> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .and_then(|session| session.refresh_token.clone())
            .ok_or_else(|| BackendError::new(ErrorCode::Unauthorized, "no refresh token"))?;

        let result = send(
            self.request(Method::POST, "/auth/v1/token", &self.anon_key)
                .query(&[("grant_type", "refresh_token")])
                .json(&RefreshGrantRequest { refresh_token }),
        )
        .await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                if matches!(
                    err.code,
                    ErrorCode::Unauthorized | ErrorCode::Forbidden | ErrorCode::Validation
                ) {
                    warn!(error = %err, "refresh token rejected, ending local session");
                    self.end_local_session().await;
                }
                return Err(err);
            }
        };
        let session: AuthSession = decode(response).await?;

        *self.session.write().await = Some(session.clone());
        info!(user_id = %session.user.id, "access token refreshed");
        self.publish(AuthChange::token_refreshed(session.clone()));
        Ok(session)
    }

    /// Sends a request with the caller's bearer. When the backend rejects the
    /// user's access token, refreshes once and repeats the request.
    async fn send_authorized<F>(&self, build: F) -> Result<Response, BackendError>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let Some(token) = self.access_token().await else {
            return send(build(&self.anon_key)).await;
        };

        match send(build(&token)).await {
            Err(err) if err.code == ErrorCode::Unauthorized => {
                debug!(error = %err, "access token rejected, refreshing");
                let token = self.refresh_after_rejection(&token, err).await?;
                send(build(&token)).await
            }
            result => result,
        }
    }

    /// Returns the token to retry with. Concurrent callers that saw the same
    /// rejected token share one exchange.
    async fn refresh_after_rejection(
        &self,
        rejected: &str,
        rejection: BackendError,
    ) -> Result<String, BackendError> {
        let _exchange = self.refresh_lock.lock().await;
        match self.access_token().await {
            None => Err(rejection),
            Some(current) if current != rejected => Ok(current),
            Some(_) => {
                let can_refresh = self
                    .session
                    .read()
                    .await
                    .as_ref()
                    .is_some_and(|session| session.refresh_token.is_some());
                if !can_refresh {
                    return Err(rejection);
                }
                self.exchange_refresh_token()
                    .await
                    .map(|session| session.access_token)
            }
        }
    }

    async fn end_local_session(&self) {
        *self.session.write().await = None;
        self.publish(AuthChange::signed_out());
    }

    fn table_path(&self) -> String {
        format!("/rest/v1/{}", self.todos_table)
    }

    fn publish(&self, change: AuthChange) {
        // No listeners is fine; the next subscriber queries the current user.
        let _ = self.auth_events.send(change);
    }
}

async fn send(builder: RequestBuilder) -> Result<Response, BackendError> {
    let response = builder
        .send()
        .await
        .map_err(|err| BackendError::network(err.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Err(BackendError::from_status(status.as_u16(), message))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response
        .json()
        .await
        .map_err(|err| BackendError::new(ErrorCode::Internal, format!("malformed response: {err}")))
}

fn id_filter(id: &TodoId) -> String {
    format!("eq.{id}")
}

#[async_trait]
impl AuthGateway for HostedBackend {
    async fn get_current_user(&self) -> Result<Option<SessionUser>, BackendError> {
        if self.access_token().await.is_none() {
            return Ok(None);
        }

        let response = self
            .send_authorized(|bearer| self.request(Method::GET, "/auth/v1/user", bearer))
            .await?;
        decode(response).await.map(Some)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let response = send(
            self.request(Method::POST, "/auth/v1/token", &self.anon_key)
                .query(&[("grant_type", "password")])
                .json(&PasswordGrantRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                }),
        )
        .await?;
        let session: AuthSession = decode(response).await?;

        *self.session.write().await = Some(session.clone());
        info!(user_id = %session.user.id, "password grant accepted");
        self.publish(AuthChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(token) = self.access_token().await {
            match send(self.request(Method::POST, "/auth/v1/logout", &token)).await {
                Ok(_) => {}
                // The backend no longer knows this session; it is over either way.
                Err(err)
                    if matches!(
                        err.code,
                        ErrorCode::Unauthorized | ErrorCode::Forbidden | ErrorCode::NotFound
                    ) =>
                {
                    info!(error = %err, "session already ended on the backend");
                }
                Err(err) => return Err(err),
            }
        } else {
            debug!("sign out without a local session");
        }

        self.end_local_session().await;
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), BackendError> {
        send(
            self.request(Method::POST, "/auth/v1/recover", &self.anon_key)
                .query(&[("redirect_to", redirect_to)])
                .json(&RecoverRequest {
                    email: email.to_string(),
                }),
        )
        .await?;
        Ok(())
    }

    fn subscribe_auth_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.auth_events.subscribe()
    }
}

#[async_trait]
impl TodoGateway for HostedBackend {
    async fn select_todos(&self) -> Result<Vec<Todo>, BackendError> {
        let path = self.table_path();
        let response = self
            .send_authorized(|bearer| {
                self.request(Method::GET, &path, bearer)
                    .query(&[("select", "*"), ("order", "created_at.desc")])
            })
            .await?;
        decode(response).await
    }

    async fn insert_todo(&self, row: NewTodo) -> Result<Vec<Todo>, BackendError> {
        let path = self.table_path();
        let rows = [row];
        let response = self
            .send_authorized(|bearer| {
                self.request(Method::POST, &path, bearer)
                    .header("Prefer", "return=representation")
                    .header(header::ACCEPT, "application/json")
                    .json(&rows)
            })
            .await?;
        decode(response).await
    }

    async fn update_completed(&self, id: &TodoId, completed: bool) -> Result<(), BackendError> {
        let path = self.table_path();
        let filter = id_filter(id);
        self.send_authorized(|bearer| {
            self.request(Method::PATCH, &path, bearer)
                .query(&[("id", &filter)])
                .json(&TodoCompletionPatch { completed })
        })
        .await?;
        Ok(())
    }

    async fn delete_todo(&self, id: &TodoId) -> Result<(), BackendError> {
        let path = self.table_path();
        let filter = id_filter(id);
        self.send_authorized(|bearer| {
            self.request(Method::DELETE, &path, bearer)
                .query(&[("id", &filter)])
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;

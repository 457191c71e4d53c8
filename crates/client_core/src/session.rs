//! Explicitly owned session-state container.
//!
//! The store is the single place the front end reads "who is signed in" from.
//! Every change of principal bumps [`SessionSnapshot::epoch`], which lets data
//! views tell whether what they hold was fetched under the current session.

use shared::domain::SessionUser;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Unknown,
    Absent,
    Present(SessionUser),
}

impl SessionState {
    pub fn from_user(user: Option<SessionUser>) -> Self {
        match user {
            Some(user) => Self::Present(user),
            None => Self::Absent,
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Self::Present(user) => Some(user),
            Self::Unknown | Self::Absent => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    fn same_principal(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Present(a), Self::Present(b)) => a.id == b.id,
            (Self::Absent, Self::Absent) | (Self::Unknown, Self::Unknown) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub epoch: u64,
}

pub struct SessionStore {
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.tx.borrow().state.user().cloned()
    }

    pub fn epoch(&self) -> u64 {
        self.tx.borrow().epoch
    }

    /// Replaces the state. Returns `true` when the principal changed.
    ///
    /// A refreshed session for the same user updates the stored user without
    /// bumping the epoch.
    pub fn set(&self, state: SessionState) -> bool {
        let mut principal_changed = false;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.state == state {
                return false;
            }
            if !snapshot.state.same_principal(&state) {
                snapshot.epoch += 1;
                principal_changed = true;
            }
            snapshot.state = state;
            true
        });
        principal_changed
    }

    /// Like [`SessionStore::set`], but only if no other transition happened
    /// since `epoch` was observed.
    pub fn set_if_epoch(&self, epoch: u64, state: SessionState) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.epoch != epoch || snapshot.state == state {
                return false;
            }
            if !snapshot.state.same_principal(&state) {
                snapshot.epoch += 1;
            }
            snapshot.state = state;
            applied = true;
            true
        });
        applied
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Suspends until the initial session query (or a push) has resolved the state.
    pub async fn wait_resolved(&self) -> SessionState {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(|snapshot| snapshot.state.is_resolved()).await {
            Ok(snapshot) => snapshot.state.clone(),
            Err(_) => SessionState::Absent,
        };
        state
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;

use super::*;
use crate::{
    fakes::{auth_session, user, AuthCall, FakeAuth, RecordingNavigator, Reply},
    messages::Locale,
};

use std::time::Duration;

use shared::{
    error::{BackendError, ErrorCode},
    protocol::{AuthChange, AuthChangeKind},
};
use tokio::sync::mpsc;

struct Harness {
    auth: Arc<FakeAuth>,
    store: Arc<SessionStore>,
    navigator: Arc<RecordingNavigator>,
    tracker: SessionTracker,
}

fn harness() -> Harness {
    let auth = FakeAuth::new();
    let store = Arc::new(SessionStore::new());
    let navigator = Arc::new(RecordingNavigator::default());
    let settings =
        TrackerSettings::from_origin("https://todo.example.com", "/").expect("settings");
    let tracker = SessionTracker::new(
        auth.clone(),
        store.clone(),
        navigator.clone(),
        Messages::new(Locale::En),
        settings,
    );
    Harness {
        auth,
        store,
        navigator,
        tracker,
    }
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Option<SessionUser>>) -> Option<SessionUser> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("handler invoked in time")
        .expect("handler channel open")
}

#[test]
fn settings_derive_home_and_reset_urls_from_origin() {
    let settings =
        TrackerSettings::from_origin("http://localhost:3000", "/").expect("settings");
    assert_eq!(settings.home_url, "http://localhost:3000/");
    assert_eq!(
        settings.reset_redirect_url,
        "http://localhost:3000/auth/reset-password"
    );
    assert!(TrackerSettings::from_origin("not a url", "/").is_err());
}

#[tokio::test]
async fn current_session_resolves_present_user_into_the_store() {
    let h = harness();
    h.auth.queue_current_user(Reply::ok(Some(user("alice"))));

    let session = h.tracker.current_session().await;

    assert_eq!(session, Some(user("alice")));
    assert_eq!(h.store.snapshot().state, SessionState::Present(user("alice")));
    assert_eq!(h.auth.calls(), vec![AuthCall::GetCurrentUser]);
}

#[tokio::test]
async fn current_session_failure_resolves_to_absent() {
    let h = harness();
    h.auth.queue_current_user(Reply::err("jwt expired"));

    assert_eq!(h.tracker.current_session().await, None);
    assert_eq!(h.store.snapshot().state, SessionState::Absent);
}

#[tokio::test]
async fn push_during_current_user_query_wins() {
    let h = harness();
    let (gate, reply) = Reply::gated();
    h.auth.queue_current_user(reply);

    let _subscription = h.tracker.on_session_change(|_| {});
    let tracker = Arc::new(h.tracker);
    let query = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        async move { tracker.current_session().await }
    });
    tokio::time::timeout(Duration::from_secs(1), async {
        while h.auth.calls().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("query in flight");

    h.auth.push(AuthChange::signed_in(auth_session("bob")));
    tokio::time::timeout(Duration::from_secs(1), async {
        while h.store.current_user().is_none() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("push applied");

    gate.send(Ok(None)).expect("gate open");
    let resolved = query.await.expect("join");

    assert_eq!(resolved, Some(user("bob")));
    assert_eq!(h.store.current_user(), Some(user("bob")));
}

#[tokio::test]
async fn session_changes_reach_the_handler_and_the_store() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = h.tracker.on_session_change(move |user| {
        let _ = tx.send(user);
    });

    h.auth.push(AuthChange::signed_in(auth_session("alice")));
    assert_eq!(recv(&mut rx).await, Some(user("alice")));
    assert_eq!(h.store.current_user(), Some(user("alice")));

    h.auth.push(AuthChange {
        event: AuthChangeKind::TokenRefreshed,
        session: Some(auth_session("alice")),
    });
    assert_eq!(recv(&mut rx).await, Some(user("alice")));

    h.auth.push(AuthChange::signed_out());
    assert_eq!(recv(&mut rx).await, None);
    assert_eq!(h.store.snapshot().state, SessionState::Absent);
}

#[tokio::test]
async fn unsubscribe_stops_handler_calls() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = h.tracker.on_session_change(move |user| {
        let _ = tx.send(user);
    });
    assert!(subscription.is_active());

    h.auth.push(AuthChange::signed_in(auth_session("alice")));
    assert_eq!(recv(&mut rx).await, Some(user("alice")));

    subscription.unsubscribe().await;

    let mut probe = h.auth.subscribe_auth_changes();
    h.auth.push(AuthChange::signed_out());
    probe.recv().await.expect("probe sees the push");
    tokio::task::yield_now().await;

    assert!(rx.recv().await.is_none(), "handler dropped with the task");
    assert_eq!(h.store.current_user(), Some(user("alice")));
}

#[tokio::test]
async fn dropping_the_subscription_releases_the_listener() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = h.tracker.on_session_change(move |user| {
        let _ = tx.send(user);
    });
    drop(subscription);

    assert!(
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("handler released in time")
            .is_none()
    );
}

#[tokio::test]
async fn sign_out_does_not_touch_the_store() {
    let h = harness();
    h.store.set(SessionState::Present(user("alice")));

    h.tracker.sign_out().await.expect("sign out");

    assert_eq!(h.auth.calls(), vec![AuthCall::SignOut]);
    assert_eq!(h.store.current_user(), Some(user("alice")));
}

#[tokio::test]
async fn sign_out_failure_is_reported_and_store_untouched() {
    let h = harness();
    h.store.set(SessionState::Present(user("alice")));
    h.auth.queue_sign_out(Reply::err("network down"));

    let err = h.tracker.sign_out().await.expect_err("sign out fails");

    assert_eq!(err, TrackerError::Backend("Sign-out failed.".to_string()));
    assert_eq!(h.store.current_user(), Some(user("alice")));
}

#[tokio::test]
async fn sign_in_success_reloads_home() {
    let h = harness();
    h.auth.queue_sign_in(Reply::ok(auth_session("alice")));

    let notice = h
        .tracker
        .sign_in(" alice@example.com ", "hunter2")
        .await
        .expect("sign in");

    assert_eq!(notice, "Signed in!");
    assert_eq!(
        h.auth.calls(),
        vec![AuthCall::SignIn {
            email: "alice@example.com".to_string(),
            password: "hunter2".to_string(),
        }]
    );
    assert_eq!(
        *h.navigator.reloads.lock().await,
        vec!["https://todo.example.com/".to_string()]
    );
    assert_eq!(h.store.snapshot().state, SessionState::Unknown);
}

#[tokio::test]
async fn sign_in_failure_surfaces_backend_message_verbatim() {
    let h = harness();
    h.auth.queue_sign_in(Reply::Ready(Err(BackendError::from_status(
        400,
        "Invalid login credentials",
    ))));

    let err = h
        .tracker
        .sign_in("alice@example.com", "wrong")
        .await
        .expect_err("rejected");

    assert_eq!(err.user_message(), "Invalid login credentials");
    assert!(h.navigator.reloads.lock().await.is_empty());
}

#[tokio::test]
async fn sign_in_failure_without_message_uses_generic_text() {
    let h = harness();
    h.auth
        .queue_sign_in(Reply::Ready(Err(BackendError::new(ErrorCode::Internal, " "))));

    let err = h
        .tracker
        .sign_in("alice@example.com", "pw")
        .await
        .expect_err("rejected");

    assert_eq!(err, TrackerError::Backend("Sign-in failed.".to_string()));
}

#[tokio::test]
async fn sign_in_requires_both_fields_before_calling_the_backend() {
    let h = harness();

    let err = h.tracker.sign_in("   ", "pw").await.expect_err("rejected");
    assert!(matches!(err, TrackerError::MissingInput(_)));
    let err = h
        .tracker
        .sign_in("alice@example.com", "")
        .await
        .expect_err("rejected");
    assert!(matches!(err, TrackerError::MissingInput(_)));

    assert!(h.auth.calls().is_empty());
}

#[tokio::test]
async fn password_reset_sends_redirect_and_reports_success() {
    let h = harness();

    let notice = h
        .tracker
        .request_password_reset("alice@example.com")
        .await
        .expect("reset");

    assert_eq!(notice, "A password reset email has been sent.");
    assert_eq!(
        h.auth.calls(),
        vec![AuthCall::ResetPassword {
            email: "alice@example.com".to_string(),
            redirect_to: "https://todo.example.com/auth/reset-password".to_string(),
        }]
    );
    assert_eq!(h.store.snapshot().state, SessionState::Unknown);
}

#[tokio::test]
async fn password_reset_failure_and_blank_email() {
    let h = harness();
    h.auth.queue_reset(Reply::Ready(Err(BackendError::from_status(
        429,
        "For security purposes, you can only request this once every 60 seconds",
    ))));

    let err = h
        .tracker
        .request_password_reset("alice@example.com")
        .await
        .expect_err("rate limited");
    assert_eq!(
        err.user_message(),
        "For security purposes, you can only request this once every 60 seconds"
    );

    let err = h
        .tracker
        .request_password_reset("")
        .await
        .expect_err("blank email");
    assert_eq!(err, TrackerError::MissingInput("Enter your email first.".to_string()));
    assert_eq!(h.auth.calls().len(), 1);
}

//! UserApplication behaviour against in-memory ports.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use tessera_core::error::CoreError;
use tessera_core::tasks::PayloadSendVerifyEmail;
use tessera_core::token::TokenVerifier;
use tessera_service::user::{CreateUserParams, LoginParams, UpdateUserParams};

use common::{harness, harness_with, settings, RecordingDistributor};

fn create_params(username: &str) -> CreateUserParams {
    CreateUserParams {
        username: username.to_string(),
        full_name: "Alice Smith".to_string(),
        email: format!("{username}@example.com"),
        password: "secret-password".to_string(),
    }
}

fn login_params(username: &str, password: &str) -> LoginParams {
    LoginParams {
        username: username.to_string(),
        password: password.to_string(),
        user_agent: "test-agent".to_string(),
        client_ip: "10.0.0.1".to_string(),
    }
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_records_event_and_enqueues_task() {
    let h = harness();

    let created = h.users.create(create_params("alice")).await.unwrap();

    assert_eq!(created.user.username, "alice");
    assert_eq!(created.user.role, "user");
    assert!(!created.user.is_email_verified);
    assert_ne!(created.user.hashed_password, "secret-password");

    assert_eq!(created.events.len(), 1);
    let event = &created.events[0];
    assert!(event.dispatched_at.is_some());

    let tasks = h.distributor.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_key, format!("outbox:{}", event.id));
    assert_eq!(tasks[0].task_type, "send_verify_email");
    assert_eq!(tasks[0].queue, "critical");
    assert_eq!(tasks[0].max_retry, 10);

    let payload: PayloadSendVerifyEmail = serde_json::from_value(tasks[0].payload.clone()).unwrap();
    assert_eq!(payload.username, "alice");
    assert!(h.store.outbox()[0].dispatched_at.is_some());
}

#[tokio::test]
async fn create_with_invalid_input_has_no_side_effects() {
    let h = harness();
    let mut params = create_params("alice");
    params.email = "nope".into();
    params.password = "123".into();

    let err = h.users.create(params).await.unwrap_err();

    assert_matches!(&err, CoreError::Validation(v) if v.fields() == vec!["password", "email"]);
    assert!(h.store.user("alice").is_none());
    assert!(h.store.outbox().is_empty());
    assert!(h.distributor.tasks().is_empty());
}

#[tokio::test]
async fn create_duplicate_username_is_conflict() {
    let h = harness();
    let original = h.users.create(create_params("alice")).await.unwrap();

    let mut again = create_params("alice");
    again.email = "different@example.com".into();
    let err = h.users.create(again).await.unwrap_err();

    assert_matches!(err, CoreError::UsernameAlreadyExists);
    assert_eq!(h.store.user("alice").unwrap(), original.user);
}

#[tokio::test]
async fn create_fails_whole_when_outbox_write_fails() {
    let h = harness();
    h.store.fail_outbox.store(true, Ordering::SeqCst);

    assert!(h.users.create(create_params("alice")).await.is_err());
    assert!(h.store.user("alice").is_none());
    assert!(h.distributor.tasks().is_empty());
}

#[tokio::test]
async fn queue_outage_leaves_event_pending() {
    let h = harness_with(settings(), RecordingDistributor::failing());

    let created = h.users.create(create_params("alice")).await.unwrap();

    assert_eq!(created.user.username, "alice");
    let event = &h.store.outbox()[0];
    assert!(event.dispatched_at.is_none());
    assert_eq!(event.attempts, 1);
    assert_eq!(event.last_error.as_deref(), Some("Transient infrastructure error: queue unreachable"));
}

#[tokio::test]
async fn slow_queue_does_not_fail_committed_create() {
    let mut settings = settings();
    settings.operation_timeout = Duration::from_millis(300);
    let h = harness_with(settings, RecordingDistributor::slow(Duration::from_secs(3)));

    let created = h.users.create(create_params("alice")).await.unwrap();

    assert_eq!(created.user.username, "alice");
    assert_eq!(created.events.len(), 1);
    assert!(created.events[0].dispatched_at.is_none());
    assert!(h.store.outbox()[0].dispatched_at.is_none());
    assert!(h.store.user("alice").is_some());
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_full_name_only() {
    let h = harness();
    let created = h.users.create(create_params("alice")).await.unwrap().user;

    let updated = h
        .users
        .update(UpdateUserParams {
            username: "alice".into(),
            full_name: Some("Alice Liddell".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(updated.full_name, "Alice Liddell");
    assert_eq!(updated.email, created.email);
    assert_eq!(updated.hashed_password, created.hashed_password);
    assert_eq!(updated.password_changed_at, created.password_changed_at);
}

#[tokio::test]
async fn update_password_rehashes_and_stamps() {
    let h = harness();
    let created = h.users.create(create_params("alice")).await.unwrap().user;

    let updated = h
        .users
        .update(UpdateUserParams {
            username: "alice".into(),
            password: Some("a-new-password".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_ne!(updated.hashed_password, created.hashed_password);
    assert!(updated.password_changed_at > created.password_changed_at);

    // Old password no longer works, new one does.
    assert_matches!(
        h.users.login(login_params("alice", "secret-password")).await,
        Err(CoreError::InvalidCredentials)
    );
    assert!(h.users.login(login_params("alice", "a-new-password")).await.is_ok());
}

#[tokio::test]
async fn update_missing_user_is_not_found() {
    let h = harness();
    let err = h
        .users
        .update(UpdateUserParams {
            username: "ghost".into(),
            full_name: Some("Nobody Here".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_matches!(err, CoreError::NotFound { entity: "user", .. });
}

#[tokio::test]
async fn update_to_taken_email_is_conflict() {
    let h = harness();
    h.users.create(create_params("alice")).await.unwrap();
    h.users.create(create_params("bob")).await.unwrap();

    let err = h
        .users
        .update(UpdateUserParams {
            username: "bob".into(),
            email: Some("alice@example.com".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::EmailAlreadyExists);
}

#[tokio::test]
async fn update_validates_only_supplied_fields() {
    let h = harness();
    let err = h
        .users
        .update(UpdateUserParams {
            username: "alice".into(),
            email: Some("bad".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_matches!(&err, CoreError::Validation(v) if v.fields() == vec!["email"]);
}

// ---------------------------------------------------------------------------
// login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_issues_tokens_and_session() {
    let h = harness();
    h.users.create(create_params("bob")).await.unwrap();

    let result = h
        .users
        .login(login_params("bob", "secret-password"))
        .await
        .unwrap();

    let access = h.tokens.verify_token(&result.access_token).unwrap();
    let refresh = h.tokens.verify_token(&result.refresh_token).unwrap();
    assert_eq!(access.subject, "bob");
    assert!(access.expired_at < refresh.expired_at);
    assert_eq!(result.access_token_expires_at, access.expired_at);
    assert_eq!(result.refresh_token_expires_at, refresh.expired_at);

    assert_eq!(result.session_id, refresh.id);
    let session = h.store.session(refresh.id).unwrap();
    assert_eq!(session.username, "bob");
    assert_eq!(session.refresh_token, result.refresh_token);
    assert_eq!(session.user_agent, "test-agent");
    assert_eq!(session.client_ip, "10.0.0.1");
    assert_eq!(session.expires_at, refresh.expired_at);
}

#[tokio::test]
async fn login_wrong_password_creates_no_session() {
    let h = harness();
    h.users.create(create_params("bob")).await.unwrap();

    let err = h
        .users
        .login(login_params("bob", "wrong-password"))
        .await
        .unwrap_err();

    assert_matches!(err, CoreError::InvalidCredentials);
    assert_eq!(h.store.session_count(), 0);
}

#[tokio::test]
async fn login_unknown_user_is_not_found_by_default() {
    let h = harness();
    let err = h
        .users
        .login(login_params("ghost", "whatever"))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::NotFound { entity: "user", .. });
}

#[tokio::test]
async fn login_unknown_user_concealed_when_configured() {
    let mut s = settings();
    s.conceal_unknown_users = true;
    let h = harness_with(s, RecordingDistributor::default());

    let err = h
        .users
        .login(login_params("ghost", "whatever"))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::InvalidCredentials);
}

#[tokio::test]
async fn login_validates_before_lookup() {
    let h = harness();
    let err = h.users.login(login_params("BOB", "x")).await.unwrap_err();
    assert_matches!(&err, CoreError::Validation(v) if v.fields() == vec!["username", "password"]);
}

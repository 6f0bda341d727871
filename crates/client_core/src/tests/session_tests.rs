use std::time::Duration;

use super::*;
use crate::test_support::{admin, user, RecordingBackend};

fn gate(backend: &Arc<RecordingBackend>) -> SessionGate {
    SessionGate::new(backend.clone())
}

#[tokio::test]
async fn established_session_resolves_full_user() {
    let backend = Arc::new(
        RecordingBackend::new()
            .with_user(user(4))
            .with_session_script([SessionCheck::Established(UserId(4))]),
    );

    let identity = gate(&backend).resolve_identity().await;

    assert_eq!(identity, Identity::Authenticated(user(4)));
    assert_eq!(
        backend.calls().await,
        vec!["GET /check_session".to_string(), "GET /users/4".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn pending_session_is_retried_until_established() {
    let backend = Arc::new(
        RecordingBackend::new()
            .with_user(admin(9))
            .with_session_script([
                SessionCheck::Pending,
                SessionCheck::Established(UserId(9)),
                SessionCheck::Established(UserId(9)),
            ]),
    );

    let identity = gate(&backend).resolve_identity().await;

    assert!(identity.user().is_some_and(|u| u.is_admin()));
    assert_eq!(backend.count("GET /check_session").await, 2);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_three_pending_checks() {
    let backend = Arc::new(RecordingBackend::new().with_session_script([
        SessionCheck::Pending,
        SessionCheck::Pending,
        SessionCheck::Pending,
        SessionCheck::Pending,
    ]));

    let started = tokio::time::Instant::now();
    let identity = gate(&backend).resolve_identity().await;

    assert_eq!(
        identity,
        Identity::Unauthenticated(UnauthenticatedReason::NotEstablished { attempts: 3 })
    );
    assert_eq!(backend.count("GET /check_session").await, 3);
    assert_eq!(backend.count("GET /users").await, 0);
    // Two waits between three attempts; none after the last.
    let waited = started.elapsed();
    assert!(waited >= SESSION_CHECK_RETRY_DELAY * 2, "{waited:?}");
    assert!(waited < SESSION_CHECK_RETRY_DELAY * 3, "{waited:?}");
}

#[tokio::test]
async fn rejected_session_is_terminal() {
    let backend = Arc::new(
        RecordingBackend::new()
            .with_user(user(4))
            .with_session_script([SessionCheck::Rejected { status: 401 }]),
    );

    let identity = gate(&backend).resolve_identity().await;

    let Identity::Unauthenticated(reason) = identity else {
        panic!("expected unauthenticated identity");
    };
    assert_eq!(reason, UnauthenticatedReason::Rejected { status: 401 });
    assert_eq!(reason.kind(), FailureKind::AuthFailure);
    assert_eq!(backend.calls().await, vec!["GET /check_session".to_string()]);
}

#[tokio::test]
async fn user_fetch_failure_is_unauthenticated() {
    let backend = Arc::new(
        RecordingBackend::new()
            .with_user(user(4))
            .with_session_script([SessionCheck::Established(UserId(4))])
            .failing("GET /users/{id}", "database unavailable"),
    );

    let identity = gate(&backend).resolve_identity().await;

    match identity {
        Identity::Unauthenticated(UnauthenticatedReason::UserFetchFailed(message)) => {
            assert!(message.contains("database unavailable"), "{message}");
        }
        other => panic!("unexpected identity: {other:?}"),
    }
}

#[tokio::test]
async fn repeated_resolution_yields_identical_users() {
    let backend = Arc::new(
        RecordingBackend::new()
            .with_user(user(4))
            .with_session_script([
                SessionCheck::Established(UserId(4)),
                SessionCheck::Established(UserId(4)),
            ]),
    );
    let gate = gate(&backend);

    let first = gate.resolve_identity().await;
    let second = gate.resolve_identity().await;

    assert!(first.is_authenticated());
    assert_eq!(first, second);
}

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let backend = Arc::new(
        RecordingBackend::new().with_session_script([SessionCheck::Established(UserId(4))]),
    );
    let (handle, signal) = cancellation();
    handle.cancel();

    let identity = gate(&backend).resolve_identity_until(signal).await;

    assert_eq!(
        identity,
        Identity::Unauthenticated(UnauthenticatedReason::Cancelled)
    );
    assert!(backend.calls().await.is_empty());
}

#[tokio::test]
async fn dropping_the_handle_cancels() {
    let backend = Arc::new(RecordingBackend::new());
    let (handle, signal) = cancellation();
    drop(handle);

    assert!(signal.is_cancelled());
    let identity = gate(&backend).resolve_identity_until(signal).await;
    assert_eq!(
        identity,
        Identity::Unauthenticated(UnauthenticatedReason::Cancelled)
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_retry_wait() {
    let backend = Arc::new(RecordingBackend::new().with_session_script([
        SessionCheck::Pending,
        SessionCheck::Pending,
        SessionCheck::Pending,
    ]));
    let gate = gate(&backend);
    let (handle, signal) = cancellation();

    let task = tokio::spawn(async move { gate.resolve_identity_until(signal).await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.cancel();

    let identity = task.await.expect("join");
    assert_eq!(
        identity,
        Identity::Unauthenticated(UnauthenticatedReason::Cancelled)
    );
    assert_eq!(backend.count("GET /check_session").await, 1);
}

#[tokio::test(start_paused = true)]
async fn custom_retry_policy_bounds_attempts() {
    let backend = Arc::new(RecordingBackend::new().with_session_script([
        SessionCheck::Pending,
        SessionCheck::Pending,
    ]));
    let gate = gate(&backend).with_retry_policy(RetryPolicy {
        max_attempts: 1,
        delay: Duration::from_millis(10),
    });

    let identity = gate.resolve_identity().await;

    assert_eq!(
        identity,
        Identity::Unauthenticated(UnauthenticatedReason::NotEstablished { attempts: 1 })
    );
    assert_eq!(backend.count("GET /check_session").await, 1);
}

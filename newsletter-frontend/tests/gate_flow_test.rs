//! Session manager and access gate wired to wiremock stand-ins for the identity
//! provider and the backend's approval endpoint.

mod common;

use common::{approved, mount_account, mount_approval, mount_logout, PASSWORD};
use newsletter_frontend::services::{AccessGate, AccessLevel, GateView};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;
use wiremock::{MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn approved_user_reaches_the_app() {
    let identity = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_account(&identity, "a@x.com").await;
    mount_approval(&backend, "a@x.com", approved(true)).await;

    let sessions = common::sessions(&identity);
    let gate = AccessGate::new(sessions.clone(), common::backend(&backend));
    sessions.initialize(None).await;
    assert_eq!(gate.settled(WAIT).await, AccessLevel::Unauthenticated);

    sessions.sign_in("a@x.com", PASSWORD).await.unwrap();

    assert_eq!(gate.settled(WAIT).await, AccessLevel::Approved);
    assert!(matches!(gate.view(), GateView::Approved { .. }));
}

#[tokio::test]
async fn unapproved_user_waits() {
    let identity = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_account(&identity, "a@x.com").await;
    mount_approval(&backend, "a@x.com", approved(false)).await;

    let sessions = common::sessions(&identity);
    let gate = AccessGate::new(sessions.clone(), common::backend(&backend));
    sessions.initialize(None).await;
    sessions.sign_in("a@x.com", PASSWORD).await.unwrap();

    assert_eq!(gate.settled(WAIT).await, AccessLevel::PendingApproval);
}

#[tokio::test]
async fn approval_endpoint_failure_fails_closed() {
    let identity = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_account(&identity, "a@x.com").await;
    mount_approval(&backend, "a@x.com", ResponseTemplate::new(500)).await;

    let sessions = common::sessions(&identity);
    let gate = AccessGate::new(sessions.clone(), common::backend(&backend));
    sessions.initialize(None).await;
    sessions.sign_in("a@x.com", PASSWORD).await.unwrap();

    assert_eq!(gate.settled(WAIT).await, AccessLevel::PendingApproval);
}

#[tokio::test]
async fn slow_check_for_previous_user_does_not_leak() {
    let identity = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_account(&identity, "a@x.com").await;
    mount_account(&identity, "b@x.com").await;
    mount_logout(&identity).await;
    mount_approval(
        &backend,
        "a@x.com",
        approved(true).set_delay(Duration::from_millis(300)),
    )
    .await;
    mount_approval(&backend, "b@x.com", approved(false)).await;

    let sessions = common::sessions(&identity);
    let gate = AccessGate::new(sessions.clone(), common::backend(&backend));
    sessions.initialize(None).await;

    sessions.sign_in("a@x.com", PASSWORD).await.unwrap();
    sessions.sign_out().await;
    let second = sessions.sign_in("b@x.com", PASSWORD).await.unwrap();

    assert_eq!(gate.settled(WAIT).await, AccessLevel::PendingApproval);
    // Outlive the first user's delayed answer.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(gate.level(), AccessLevel::PendingApproval);
    match gate.view() {
        GateView::PendingApproval { session } => assert_eq!(session.id, second.id),
        other => panic!("unexpected view: {:?}", other),
    }
}

#[tokio::test]
async fn sign_out_closes_the_gate() {
    let identity = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_account(&identity, "a@x.com").await;
    mount_logout(&identity).await;
    mount_approval(&backend, "a@x.com", approved(true)).await;

    let sessions = common::sessions(&identity);
    let gate = AccessGate::new(sessions.clone(), common::backend(&backend));
    sessions.initialize(None).await;
    sessions.sign_in("a@x.com", PASSWORD).await.unwrap();
    assert_eq!(gate.settled(WAIT).await, AccessLevel::Approved);

    sessions.sign_out().await;

    assert_eq!(gate.level(), AccessLevel::Unauthenticated);
}

#[test]
fn gate_approval_checks_are_counted_as_backend_calls() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let level = metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let identity = MockServer::start().await;
            let backend = MockServer::start().await;
            mount_account(&identity, "a@x.com").await;
            mount_approval(&backend, "a@x.com", approved(true)).await;

            let sessions = common::sessions(&identity);
            let gate = AccessGate::new(sessions.clone(), common::backend(&backend));
            sessions.initialize(None).await;
            sessions.sign_in("a@x.com", PASSWORD).await.unwrap();
            gate.settled(WAIT).await
        })
    });

    assert_eq!(level, AccessLevel::Approved);
    let rendered = handle.render();
    let line = rendered
        .lines()
        .find(|line| {
            line.starts_with("backend_requests_total{")
                && line.contains(r#"operation="approval_status""#)
                && line.contains(r#"outcome="ok""#)
        })
        .expect("approval check was not counted");
    assert!(line.ends_with(" 1"), "{}", line);
}

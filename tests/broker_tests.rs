mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use uuid::Uuid;

use slurm_gateway::error::GatewayError;
use slurm_gateway::session::{
    MemoryPermissionStore, MemorySessionStore, SessionBroker, SessionState, SessionStore,
};

use common::MockAgent;

struct Setup {
    broker: SessionBroker,
    permissions: Arc<MemoryPermissionStore>,
    agent: Arc<MockAgent>,
}

fn setup(ports: std::ops::Range<u16>) -> Setup {
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let permissions = Arc::new(MemoryPermissionStore::new());
    let agent = Arc::new(MockAgent::default());
    let broker = SessionBroker::new(sessions, permissions.clone(), agent.clone(), ports);
    Setup {
        broker,
        permissions,
        agent,
    }
}

#[tokio::test]
async fn admin_reaches_every_active_worker() {
    let s = setup(8888..8900);
    s.permissions.set_admin("root").await;
    s.permissions.register_worker("10.0.0.1").await;
    s.permissions.register_worker("10.0.0.2").await;

    let grant = s.broker.check_permission("root").await;
    assert!(grant.allowed);
    assert_eq!(grant.workers, vec!["10.0.0.1", "10.0.0.2"]);
}

#[tokio::test]
async fn user_grant_limits_workers() {
    let s = setup(8888..8900);
    s.permissions
        .grant_user("alice", true, vec!["10.0.0.1".to_string()])
        .await;

    let grant = s.broker.check_permission("alice").await;
    assert!(grant.allowed);
    assert_eq!(grant.workers, vec!["10.0.0.1"]);
}

#[tokio::test]
async fn group_grant_applies_when_no_user_grant() {
    let s = setup(8888..8900);
    s.permissions.add_group_member("bob", "ml-team").await;
    s.permissions
        .grant_group("ml-team", true, vec!["10.0.0.2".to_string()])
        .await;

    let grant = s.broker.check_permission("bob").await;
    assert!(grant.allowed);
    assert_eq!(grant.workers, vec!["10.0.0.2"]);
}

#[tokio::test]
async fn ungranted_principal_is_denied() {
    let s = setup(8888..8900);
    let grant = s.broker.check_permission("mallory").await;
    assert!(!grant.allowed);
    assert!(grant.workers.is_empty());
}

#[tokio::test]
async fn start_without_grant_is_rejected() {
    let s = setup(8888..8900);
    assert!(matches!(
        s.broker.start("mallory", "10.0.0.1").await,
        Err(GatewayError::Permission(_))
    ));
}

#[tokio::test]
async fn start_on_worker_outside_grant_is_rejected() {
    let s = setup(8888..8900);
    s.permissions
        .grant_user("alice", true, vec!["10.0.0.1".to_string()])
        .await;

    assert!(matches!(
        s.broker.start("alice", "10.0.0.9").await,
        Err(GatewayError::Permission(_))
    ));
}

#[tokio::test]
async fn start_allocates_lowest_free_port() {
    let s = setup(8888..8900);
    for user in ["alice", "bob", "carol"] {
        s.permissions
            .grant_user(user, true, vec!["10.0.0.1".to_string()])
            .await;
    }

    assert_eq!(s.broker.start("alice", "10.0.0.1").await.unwrap().port, 8888);
    assert_eq!(s.broker.start("bob", "10.0.0.1").await.unwrap().port, 8889);
    assert_eq!(s.broker.start("carol", "10.0.0.1").await.unwrap().port, 8890);
}

#[tokio::test]
async fn ports_are_tracked_per_worker() {
    let s = setup(8888..8900);
    s.permissions
        .grant_user(
            "alice",
            true,
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
        )
        .await;

    assert_eq!(s.broker.start("alice", "10.0.0.1").await.unwrap().port, 8888);
    assert_eq!(s.broker.start("alice", "10.0.0.2").await.unwrap().port, 8888);
}

#[tokio::test]
async fn repeated_start_returns_live_session() {
    let s = setup(8888..8900);
    s.permissions
        .grant_user("alice", true, vec!["10.0.0.1".to_string()])
        .await;

    let first = s.broker.start("alice", "10.0.0.1").await.unwrap();
    let second = s.broker.start("alice", "10.0.0.1").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.port, second.port);
    assert_eq!(s.agent.start_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_port_range_is_capacity_error() {
    let s = setup(8888..8890);
    for user in ["alice", "bob", "carol"] {
        s.permissions
            .grant_user(user, true, vec!["10.0.0.1".to_string()])
            .await;
    }

    s.broker.start("alice", "10.0.0.1").await.unwrap();
    s.broker.start("bob", "10.0.0.1").await.unwrap();
    assert!(matches!(
        s.broker.start("carol", "10.0.0.1").await,
        Err(GatewayError::Capacity(_))
    ));
}

#[tokio::test]
async fn failed_launch_releases_the_port() {
    let s = setup(8888..8900);
    s.permissions
        .grant_user("alice", true, vec!["10.0.0.1".to_string()])
        .await;

    s.agent.fail_start.store(true, Ordering::SeqCst);
    assert!(matches!(
        s.broker.start("alice", "10.0.0.1").await,
        Err(GatewayError::Worker(_))
    ));

    // The errored session no longer holds 8888.
    s.agent.fail_start.store(false, Ordering::SeqCst);
    let session = s.broker.start("alice", "10.0.0.1").await.unwrap();
    assert_eq!(session.port, 8888);
    assert_eq!(session.state, SessionState::Running);
}

#[tokio::test]
async fn successful_start_records_pid() {
    let s = setup(8888..8900);
    s.permissions
        .grant_user("alice", true, vec!["10.0.0.1".to_string()])
        .await;

    let session = s.broker.start("alice", "10.0.0.1").await.unwrap();
    assert_eq!(session.state, SessionState::Running);
    assert_eq!(session.pid, Some(4242));
    assert_eq!(session.token.len(), 64);
    assert!(session
        .url
        .starts_with("/notebook/proxy/10.0.0.1/8888/?token="));
}

#[tokio::test]
async fn stop_marks_stopped_even_if_worker_unreachable() {
    let s = setup(8888..8900);
    s.permissions
        .grant_user("alice", true, vec!["10.0.0.1".to_string()])
        .await;

    let session = s.broker.start("alice", "10.0.0.1").await.unwrap();
    s.agent.fail_stop.store(true, Ordering::SeqCst);

    let stopped = s.broker.stop("alice", session.id).await.unwrap();
    assert_eq!(stopped.state, SessionState::Stopped);
    assert!(stopped.stopped_at.is_some());
    assert!(s.broker.sessions_for("alice").await.is_empty());
}

#[tokio::test]
async fn stop_by_non_owner_is_not_found() {
    let s = setup(8888..8900);
    s.permissions
        .grant_user("alice", true, vec!["10.0.0.1".to_string()])
        .await;

    let session = s.broker.start("alice", "10.0.0.1").await.unwrap();
    assert!(matches!(
        s.broker.stop("bob", session.id).await,
        Err(GatewayError::NotFound(_))
    ));
}

#[tokio::test]
async fn stop_unknown_session_is_not_found() {
    let s = setup(8888..8900);
    assert!(matches!(
        s.broker.stop("alice", Uuid::new_v4()).await,
        Err(GatewayError::NotFound(_))
    ));
}

#[tokio::test]
async fn session_listings_show_running_only() {
    let s = setup(8888..8900);
    s.permissions
        .grant_user("alice", true, vec!["10.0.0.1".to_string()])
        .await;
    s.permissions
        .grant_user("bob", true, vec!["10.0.0.1".to_string()])
        .await;

    let a = s.broker.start("alice", "10.0.0.1").await.unwrap();
    s.broker.start("bob", "10.0.0.1").await.unwrap();
    assert_eq!(s.broker.all_sessions().await.len(), 2);

    s.broker.stop("alice", a.id).await.unwrap();
    assert_eq!(s.broker.all_sessions().await.len(), 1);
    assert!(s.broker.sessions_for("alice").await.is_empty());
    assert_eq!(s.broker.sessions_for("bob").await.len(), 1);
}

#[tokio::test]
async fn resources_pass_through_to_agent() {
    let s = setup(8888..8900);
    let snapshot = s.broker.resources("10.0.0.1").await.unwrap();
    assert_eq!(snapshot.cpu, 12.5);
    assert_eq!(snapshot.memory, 40.0);
    assert_eq!(snapshot.gpu, 5.0);
}

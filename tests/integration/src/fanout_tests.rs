//! Fan-out across real nodes
//!
//! Node A orchestrates; every other node trusts A's public key unless a test
//! says otherwise.

use crate::test_utils::*;
use cloudcontrol_c2_router::{DispatchError, ExecuteError, FanoutError, PeerStatus};
use std::time::Duration;

fn status(host: &str, ping: &str, health: &str) -> PeerStatus {
    PeerStatus {
        host: host.to_string(),
        ping_status: ping.to_string(),
        health_status: health.to_string(),
    }
}

#[tokio::test]
async fn test_poweroff_aborts_at_failing_peer() {
    init_test_logging();
    let (a, b, c) = (
        NodeDir::create("a"),
        NodeDir::create("b"),
        NodeDir::create("c"),
    );
    b.trust(&a);
    c.trust(&a);

    let (listener_b, addr_b) = ephemeral_listener().await;
    let (listener_c, addr_c) = ephemeral_listener().await;
    a.add_remote(&addr_b.to_string());
    a.add_remote(&addr_c.to_string());

    let node_b = start_node(
        &b,
        listener_b,
        RecordingPower::failing(ExecuteError::Failed("exit status 1".into())),
    )
    .await;
    let node_c = start_node(&c, listener_c, RecordingPower::default()).await;
    let (listener_a, _) = ephemeral_listener().await;
    let node_a = start_node(&a, listener_a, RecordingPower::default()).await;

    let err = node_a
        .state
        .orchestrator
        .poweroff_all_and_self()
        .await
        .unwrap_err();

    match err {
        FanoutError::Peer {
            ref host,
            source: DispatchError::RemoteRejected { status, ref body, .. },
        } => {
            assert_eq!(host, &addr_b.to_string());
            assert_eq!(status, 500);
            assert_eq!(body, "cannot execute poweroff: exit status 1");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(node_b.power.calls(), vec![Duration::ZERO]);
    assert!(node_c.power.calls().is_empty(), "C must never be contacted");
    assert!(node_a.power.calls().is_empty(), "A must stay up");

    for node in [node_a, node_b, node_c] {
        node.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_terminated_peer_counts_as_success() {
    init_test_logging();
    let (a, b, c) = (
        NodeDir::create("a"),
        NodeDir::create("b"),
        NodeDir::create("c"),
    );
    b.trust(&a);
    c.trust(&a);

    let (listener_b, addr_b) = ephemeral_listener().await;
    let (listener_c, addr_c) = ephemeral_listener().await;
    a.add_remote(&addr_b.to_string());
    a.add_remote(&addr_c.to_string());

    // B's own poweroff kills it while it is still answering.
    let node_b = start_node(
        &b,
        listener_b,
        RecordingPower::failing(ExecuteError::Failed("signal: terminated".into())),
    )
    .await;
    let node_c = start_node(&c, listener_c, RecordingPower::default()).await;
    let (listener_a, _) = ephemeral_listener().await;
    let node_a = start_node(&a, listener_a, RecordingPower::default()).await;

    node_a
        .state
        .orchestrator
        .poweroff_all_and_self()
        .await
        .unwrap();

    assert_eq!(node_b.power.calls(), vec![Duration::ZERO]);
    assert_eq!(node_c.power.calls(), vec![Duration::ZERO]);
    assert_eq!(node_a.power.calls(), vec![Duration::ZERO]);

    for node in [node_a, node_b, node_c] {
        node.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_unreachable_peer_aborts_poweroff() {
    init_test_logging();
    let (a, c) = (NodeDir::create("a"), NodeDir::create("c"));
    c.trust(&a);

    let dead = dead_address().await;
    let (listener_c, addr_c) = ephemeral_listener().await;
    a.add_remote(&dead.to_string());
    a.add_remote(&addr_c.to_string());

    let node_c = start_node(&c, listener_c, RecordingPower::default()).await;
    let (listener_a, _) = ephemeral_listener().await;
    let node_a = start_node(&a, listener_a, RecordingPower::default()).await;

    let err = node_a
        .state
        .orchestrator
        .poweroff_all_and_self()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FanoutError::Peer {
            source: DispatchError::PeerUnreachable { .. },
            ..
        }
    ));
    assert!(node_c.power.calls().is_empty());
    assert!(node_a.power.calls().is_empty());

    node_a.stop().await.unwrap();
    node_c.stop().await.unwrap();
}

#[tokio::test]
async fn test_async_remote_is_acknowledged_then_powered_off() {
    init_test_logging();
    let (a, b) = (NodeDir::create("a"), NodeDir::create("b"));
    b.trust(&a);

    let (listener_b, addr_b) = ephemeral_listener().await;
    a.add_remote(&addr_b.to_string());
    a.set_remote_async(&addr_b.to_string(), true, 20);

    let node_b = start_node(&b, listener_b, RecordingPower::default()).await;
    let (listener_a, _) = ephemeral_listener().await;
    let node_a = start_node(&a, listener_a, RecordingPower::default()).await;

    node_a
        .state
        .orchestrator
        .poweroff_all_and_self()
        .await
        .unwrap();

    for _ in 0..100 {
        if !node_b.power.calls().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(node_b.power.calls(), vec![Duration::from_millis(20)]);
    assert_eq!(node_a.power.calls(), vec![Duration::ZERO]);

    node_a.stop().await.unwrap();
    node_b.stop().await.unwrap();
}

#[tokio::test]
async fn test_status_aggregation_over_three_peers() {
    init_test_logging();
    let (a, b, d) = (
        NodeDir::create("a"),
        NodeDir::create("b"),
        NodeDir::create("d"),
    );
    // D does not trust A.
    b.trust(&a);

    let (listener_b, addr_b) = ephemeral_listener().await;
    let dead = dead_address().await;
    let (listener_d, addr_d) = ephemeral_listener().await;
    for host in [addr_b, dead, addr_d] {
        a.add_remote(&host.to_string());
    }

    let node_b = start_node(&b, listener_b, RecordingPower::default()).await;
    let node_d = start_node(&d, listener_d, RecordingPower::default()).await;
    let (listener_a, _) = ephemeral_listener().await;
    let node_a = start_node(&a, listener_a, RecordingPower::default()).await;

    let statuses = node_a.state.orchestrator.aggregate_status().await;
    assert_eq!(
        statuses,
        vec![
            status(&addr_b.to_string(), "online", "online"),
            status(&dead.to_string(), "online", "offline"),
            status(
                &addr_d.to_string(),
                "online",
                "remote returned error: Unauthorized"
            ),
        ]
    );

    // Health probes never power anything off.
    assert!(node_b.power.calls().is_empty());
    assert!(node_d.power.calls().is_empty());

    for node in [node_a, node_b, node_d] {
        node.stop().await.unwrap();
    }
}

//! Replay behavior over HTTP
//!
//! A captured request stays valid until its timestamp leaves the freshness
//! window; there is no nonce tracking.

use crate::test_utils::*;
use chrono::{Duration as ChronoDuration, Utc};
use cloudcontrol_c2_router::{sign_envelope, Envelope, HealthProbe, PoweroffCommand, SignedRequest};
use std::time::Duration;

async fn post(url: &str, request: &SignedRequest) -> (u16, String) {
    let response = reqwest::Client::new()
        .post(url)
        .header("X-Signature", request.signature.clone())
        .header("Content-Type", "application/json")
        .body(request.body.clone())
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn test_captured_request_replays_within_window() {
    init_test_logging();
    let (operator, target) = (NodeDir::create("operator"), NodeDir::create("target"));
    target.trust(&operator);

    let (listener, _) = ephemeral_listener().await;
    let node = start_node(&target, listener, RecordingPower::default()).await;

    let command = PoweroffCommand {
        async_poweroff: false,
        poweroff_delay_msec: 5,
    };
    let captured = sign_envelope(
        &Envelope::stamp(command, Utc::now()),
        operator.keypair.signing_key(),
    )
    .unwrap();

    let url = node.url("/node/execute/poweroff");
    for _ in 0..3 {
        assert_eq!(post(&url, &captured).await, (200, "OK".to_string()));
    }
    assert_eq!(node.power.calls(), vec![Duration::from_millis(5); 3]);

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_stale_request_is_rejected() {
    init_test_logging();
    let (operator, target) = (NodeDir::create("operator"), NodeDir::create("target"));
    target.trust(&operator);

    let (listener, _) = ephemeral_listener().await;
    let node = start_node(&target, listener, RecordingPower::default()).await;

    let stale = sign_envelope(
        &Envelope::stamp(
            PoweroffCommand::default(),
            Utc::now() - ChronoDuration::seconds(120),
        ),
        operator.keypair.signing_key(),
    )
    .unwrap();

    let (status, body) = post(&node.url("/node/execute/poweroff"), &stale).await;
    assert_eq!(status, 400);
    assert!(body.starts_with("current time deviates too far"));
    assert!(node.power.calls().is_empty());

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_tampered_body_is_unauthorized() {
    init_test_logging();
    let (operator, target) = (NodeDir::create("operator"), NodeDir::create("target"));
    target.trust(&operator);

    let (listener, _) = ephemeral_listener().await;
    let node = start_node(&target, listener, RecordingPower::default()).await;

    let mut request = sign_envelope(
        &Envelope::stamp(
            PoweroffCommand {
                async_poweroff: false,
                poweroff_delay_msec: 60_000,
            },
            Utc::now(),
        ),
        operator.keypair.signing_key(),
    )
    .unwrap();
    let tampered = String::from_utf8(request.body.clone())
        .unwrap()
        .replace("60000", "0");
    request.body = tampered.into_bytes();

    assert_eq!(
        post(&node.url("/node/execute/poweroff"), &request).await,
        (401, "Unauthorized".to_string())
    );
    assert!(node.power.calls().is_empty());

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_health_signed_by_self_needs_self_in_trusted_set() {
    init_test_logging();
    let target = NodeDir::create("target");

    let (listener, _) = ephemeral_listener().await;
    let node = start_node(&target, listener, RecordingPower::default()).await;

    let request = sign_envelope(
        &Envelope::stamp(HealthProbe {}, Utc::now()),
        target.keypair.signing_key(),
    )
    .unwrap();
    assert_eq!(
        post(&node.url("/node/health"), &request).await.0,
        401,
        "a node's own key is not trusted implicitly"
    );

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_graceful_stop_releases_port() {
    init_test_logging();
    let target = NodeDir::create("target");

    let (listener, addr) = ephemeral_listener().await;
    let node = start_node(&target, listener, RecordingPower::default()).await;
    node.stop().await.unwrap();

    let err = reqwest::Client::new()
        .post(format!("http://{addr}/node/health"))
        .timeout(Duration::from_secs(1))
        .send()
        .await
        .unwrap_err();
    assert!(err.is_connect() || err.is_timeout());
}

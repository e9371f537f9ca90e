//! Drain and cut-off behavior of a stopping server

use crate::test_utils::*;
use axum::routing::get;
use axum::Router;
use cloudcontrol_node::serve;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

const GRACE: Duration = Duration::from_millis(500);

fn timed_app() -> Router {
    Router::new()
        .route(
            "/quick",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                "done"
            }),
        )
        .route(
            "/stuck",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "done"
            }),
        )
}

#[tokio::test]
async fn test_drain_finishes_quick_request_and_cuts_off_stuck_one() {
    init_test_logging();
    let (listener, addr) = ephemeral_listener().await;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(
        listener,
        timed_app(),
        async move {
            let _ = stop_rx.await;
        },
        GRACE,
    ));

    let client = reqwest::Client::new();
    let quick = tokio::spawn(client.get(format!("http://{addr}/quick")).send());
    let stuck = tokio::spawn(client.get(format!("http://{addr}/stuck")).send());

    // Both requests are being handled before shutdown starts.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    stop_tx.send(()).unwrap();

    let quick = quick.await.unwrap().unwrap();
    assert_eq!(quick.status(), 200);
    assert_eq!(quick.text().await.unwrap(), "done");

    match stuck.await.unwrap() {
        Ok(response) => {
            assert_eq!(response.status(), 503);
            assert_eq!(response.text().await.unwrap(), "Server shutting down");
        }
        Err(e) => assert!(!e.is_timeout(), "unexpected client error: {e}"),
    }
    let cut_off_after = started.elapsed();
    assert!(cut_off_after >= GRACE, "cut off early: {cut_off_after:?}");
    assert!(
        cut_off_after < Duration::from_secs(3),
        "stuck request ran on: {cut_off_after:?}"
    );

    server.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_idle_server_stops_without_waiting_for_grace() {
    init_test_logging();
    let (listener, _) = ephemeral_listener().await;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(
        listener,
        timed_app(),
        async move {
            let _ = stop_rx.await;
        },
        Duration::from_secs(5),
    ));

    let started = Instant::now();
    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}

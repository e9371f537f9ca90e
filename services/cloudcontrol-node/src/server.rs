use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use cloudcontrol_c2_router::{spawn_failure_sink, Action, HealthProbe, PoweroffCommand};
use cloudcontrol_core::{Config, NodePaths, NodeSettings};
use cloudcontrol_identity::{load_local_keypair, load_trusted_keys};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{NodeError, NodeResult};
use crate::handlers;
use crate::state::NodeState;
use crate::webadmin;

pub const WEBADMIN_DASHBOARD_PATH: &str = "/webadmin/";
pub const WEBADMIN_POWEROFF_ALL_PATH: &str = "/webadmin/execute/poweroff-all-and-self";

/// How long cut-off responses get to reach their clients before the server
/// task is aborted.
const CUT_OFF_FLUSH: Duration = Duration::from_secs(1);

pub fn router(state: Arc<NodeState>) -> Router {
    let mut router = Router::new()
        .route(
            PoweroffCommand::ENDPOINT,
            post(handlers::execute_poweroff).fallback(method_not_allowed),
        )
        .route(
            HealthProbe::ENDPOINT,
            post(handlers::health).fallback(method_not_allowed),
        );

    if state.webadmin_enabled {
        let admin = Router::new()
            .route(
                WEBADMIN_DASHBOARD_PATH,
                get(webadmin::dashboard).fallback(method_not_allowed),
            )
            .route(
                WEBADMIN_POWEROFF_ALL_PATH,
                post(webadmin::poweroff_all_and_self).fallback(method_not_allowed),
            )
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                webadmin::require_admin,
            ));
        router = router.merge(admin);
    }

    router
        .with_state(state)
        .layer(middleware::from_fn(catch_panic))
        .layer(TraceLayer::new_for_http())
}

async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "HTTP method not allowed")
}

/// Turn a handler panic into a 500 instead of dropping the connection.
async fn catch_panic(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            error!(%path, panic = %panic_message(panic.as_ref()), "Panic for request");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

pub async fn bind(addr: SocketAddr) -> NodeResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| NodeError::Bind { addr, source })
}

/// Answer with 503 once the drain deadline has passed, dropping the handler.
///
/// Connections outlive the server task, so requests still running at the
/// deadline have to be cut off from inside the service.
async fn cut_off_at_deadline(
    State(mut deadline): State<watch::Receiver<bool>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let passed = async move {
        loop {
            if *deadline.borrow_and_update() {
                break;
            }
            if deadline.changed().await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        biased;
        response = next.run(request) => response,
        _ = passed => {
            warn!(%path, "Request cut off at drain deadline");
            (StatusCode::SERVICE_UNAVAILABLE, "Server shutting down").into_response()
        }
    }
}

/// Serve until `shutdown` resolves, then drain in-flight requests for at most
/// `grace`. Requests still running after that are cut off with a 503 and the
/// server task is aborted.
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
    grace: Duration,
) -> NodeResult<()>
where
    F: Future<Output = ()> + Send,
{
    let (deadline_tx, deadline_rx) = watch::channel(false);
    let router = router.layer(middleware::from_fn_with_state(
        deadline_rx,
        cut_off_at_deadline,
    ));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => return join_result(result),
        _ = shutdown => {}
    }

    info!(grace_secs = grace.as_secs(), "Shutting down, draining requests");
    let _ = stop_tx.send(());

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => join_result(result),
        Err(_) => {
            warn!("Drain deadline exceeded, cutting off in-flight requests");
            deadline_tx.send_replace(true);
            if tokio::time::timeout(CUT_OFF_FLUSH, &mut server).await.is_err() {
                warn!("Connections still open, aborting server");
                server.abort();
            }
            Ok(())
        }
    }
}

fn join_result(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> NodeResult<()> {
    match result {
        Ok(served) => served.map_err(NodeError::Serve),
        Err(e) => Err(NodeError::Serve(std::io::Error::new(
            std::io::ErrorKind::Other,
            e,
        ))),
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Load everything from the node directory and serve until signalled.
pub async fn run(paths: &NodePaths, settings: NodeSettings, webadmin: bool) -> NodeResult<()> {
    let config = Config::load(paths)?;
    config.validate(webadmin)?;

    let keypair = load_local_keypair(paths)?;
    if !keypair.is_paired() {
        warn!(
            path = %paths.self_public_key().display(),
            "Local public key does not match the private key"
        );
    }
    let trusted_keys = load_trusted_keys(&paths.authorized_keys_dir())?;
    info!(
        trusted_keys = trusted_keys.len(),
        remotes = config.peers().len(),
        webadmin,
        "Node configuration loaded"
    );

    let (state, failures) = NodeState::builder(config, Arc::new(keypair), Arc::new(trusted_keys))
        .settings(settings)
        .webadmin(webadmin)
        .build()?;
    spawn_failure_sink(failures);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = bind(addr).await?;
    info!(%addr, "CloudControl node listening");

    serve(
        listener,
        router(Arc::new(state)),
        shutdown_signal(),
        settings.shutdown_grace,
    )
    .await?;

    info!("CloudControl node stopped");
    Ok(())
}

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use cloudcontrol_c2_router::{
    Action, AuthError, Authorized, HealthProbe, HealthStatus, PoweroffCommand, Rejection,
    SIGNATURE_HEADER,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::state::NodeState;

pub async fn execute_poweroff(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let authorized = match authorize::<PoweroffCommand>(&state, &headers, body) {
        Ok(authorized) => authorized,
        Err(response) => return response,
    };
    let command = authorized.into_action();

    if command.async_poweroff {
        info!(delay_ms = command.poweroff_delay_msec, "Accepted async poweroff");
        state.executor.spawn_detached(command.delay());
        return (StatusCode::OK, "OK async").into_response();
    }

    info!(delay_ms = command.poweroff_delay_msec, "Accepted poweroff");
    match state.executor.run(command.delay()).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            error!(error = %e, "Poweroff failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("cannot execute poweroff: {e}"),
            )
                .into_response()
        }
    }
}

pub async fn health(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if let Err(response) = authorize::<HealthProbe>(&state, &headers, body) {
        return response;
    }
    Json(HealthStatus::online()).into_response()
}

/// Header gate first, then the body, then the remaining gates.
fn authorize<A: Action>(
    state: &NodeState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Authorized<A>, Response> {
    let signature = headers.get(SIGNATURE_HEADER).map(|value| value.as_bytes());
    state
        .authenticator
        .check_header::<A>(signature)
        .map_err(reject)?;

    let body = body.map_err(|e| reject(AuthError::BodyUnreadable(e.body_text())))?;

    state
        .authenticator
        .authenticate::<A>(signature, &body, Utc::now())
        .map_err(reject)
}

fn reject(e: AuthError) -> Response {
    let status = match e.rejection() {
        Rejection::Unauthenticated => StatusCode::UNAUTHORIZED,
        Rejection::BadRequest => StatusCode::BAD_REQUEST,
    };
    warn!(status = status.as_u16(), error = %e, "Rejected node request");
    (status, e.public_message()).into_response()
}

//! Operator surface: peer status and the fleet-wide power-off.
//!
//! Every request needs the configured URI key as `?key=` and HTTP Basic auth
//! carrying the configured password. The user name is ignored.

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use base64::engine::general_purpose;
use base64::Engine as _;
use cloudcontrol_c2_router::PeerStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::state::NodeState;

const BASIC_CHALLENGE: &str = r#"Basic charset="UTF-8""#;

#[derive(Debug, Deserialize)]
pub struct AdminKey {
    key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dashboard {
    pub remotes: Vec<PeerStatus>,
}

pub async fn dashboard(State(state): State<Arc<NodeState>>) -> Json<Dashboard> {
    let remotes = state.orchestrator.aggregate_status().await;
    Json(Dashboard { remotes })
}

pub async fn poweroff_all_and_self(State(state): State<Arc<NodeState>>) -> Response {
    info!("Webadmin requested poweroff of all remotes and self");
    match state.orchestrator.poweroff_all_and_self().await {
        Ok(()) => (StatusCode::OK, "Powering off remotes and self.").into_response(),
        Err(e) => {
            error!(error = %e, "Poweroff all and self failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Middleware guarding every webadmin route.
pub async fn require_admin(
    State(state): State<Arc<NodeState>>,
    Query(params): Query<AdminKey>,
    request: Request,
    next: Next,
) -> Response {
    let admin = &state.config.web_admin;

    let key_ok = params
        .key
        .as_deref()
        .is_some_and(|key| !key.is_empty() && constant_time_compare(key, &admin.uri_key));
    if !key_ok {
        warn!(path = %request.uri().path(), "Webadmin request with invalid URI key");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let password_ok = basic_auth_password(request.headers())
        .is_some_and(|password| constant_time_compare(&password, &admin.password));
    if !password_ok {
        warn!(path = %request.uri().path(), "Webadmin request with invalid password");
        let challenge = HeaderValue::from_static(BASIC_CHALLENGE);
        return (
            StatusCode::UNAUTHORIZED,
            [
                (header::WWW_AUTHENTICATE, challenge.clone()),
                (header::PROXY_AUTHENTICATE, challenge),
            ],
            "Unauthorized",
        )
            .into_response();
    }

    next.run(request).await
}

/// Password from an `Authorization: Basic` header.
fn basic_auth_password(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (_user, password) = credentials.split_once(':')?;
    Some(password.to_string())
}

/// Constant-time string comparison.
///
/// Both inputs are padded to the same length with different fill bytes, so a
/// length mismatch never matches and leaks no prefix timing.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    let max_len = std::cmp::max(a.len(), b.len());
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);
    (lengths_equal & contents_equal).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(credentials: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", general_purpose::STANDARD.encode(credentials));
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret", "secret"));
        assert!(!constant_time_compare("secret", "secreT"));
        assert!(!constant_time_compare("secret", "secret2"));
        assert!(!constant_time_compare("", "x"));
        assert!(constant_time_compare("", ""));
    }

    #[test]
    fn test_basic_auth_password() {
        assert_eq!(basic_auth_password(&basic("admin:hunter2")).as_deref(), Some("hunter2"));
        assert_eq!(basic_auth_password(&basic(":p:w")).as_deref(), Some("p:w"));
        assert_eq!(basic_auth_password(&basic("no-colon")), None);
        assert_eq!(basic_auth_password(&HeaderMap::new()), None);
    }

    #[test]
    fn test_dashboard_json() {
        let dashboard = Dashboard {
            remotes: vec![PeerStatus {
                host: "10.0.0.2".into(),
                ping_status: "online".into(),
                health_status: "offline".into(),
            }],
        };
        assert_eq!(
            serde_json::to_string(&dashboard).unwrap(),
            r#"{"Remotes":[{"Host":"10.0.0.2","PingStatus":"online","HealthStatus":"offline"}]}"#
        );
    }
}

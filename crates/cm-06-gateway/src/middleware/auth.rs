//! Mesh-token and portal-token authentication.
//!
//! The mesh token guards every route except `/register` and `/mesh/ws`
//! (which authenticates via query parameter). Comparison is constant-time.

use crate::domain::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

/// Header carrying the mesh token.
pub const MESH_TOKEN_HEADER: &str = "meshtoken";

/// Header carrying the portal service token.
pub const PORTAL_TOKEN_HEADER: &str = "x-portal-token";

/// Constant-time token equality.
pub fn token_matches(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        // No token configured: open mesh (single-node and test setups).
        return true;
    }
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// True when the request carries the portal service token.
pub fn portal_token_ok(state: &AppState, headers: &HeaderMap) -> bool {
    let presented = headers
        .get(PORTAL_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    !state.config.portal_service_token.is_empty()
        && token_matches(presented, &state.config.portal_service_token)
}

/// Middleware enforcing the mesh token on the protected sub-router.
///
/// Projection and diagnostics routes also accept the portal service token,
/// so server-to-server reads work without the mesh secret.
pub async fn mesh_token_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let presented = headers
        .get(MESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if token_matches(presented, &state.config.mesh_token) || portal_token_ok(&state, headers) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::mesh_unauthorized())
    }
}

//! Per-request authorization middleware.
//!
//! Resolves the roles the request path requires and checks them against the
//! principal stored in the session. Public paths skip the check. On success
//! the [`Principal`] is placed in the request extensions for handlers.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use tracing::debug;

use crate::access::{AccessDecision, Principal, decide};
use crate::error::AppError;
use crate::session::SESSION_PRINCIPAL;
use crate::state::AppState;

/// Middleware enforcing the dynamic path rules.
///
/// - no principal in the session: 401
/// - principal lacking every required role: 403
/// - rule lookup failure: 500
pub async fn authorize_request(
    State(state): State<AppState>,
    session: Session,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if state.is_public(&path) {
        return next.run(request).await;
    }

    let principal: Option<Principal> = match session.get(SESSION_PRINCIPAL).await {
        Ok(principal) => principal,
        Err(e) => {
            return AppError::Internal(anyhow::anyhow!("failed to read session: {e}"))
                .into_response();
        }
    };

    let required = match state.resolver().resolve_required_roles(&path).await {
        Ok(required) => required,
        Err(e) => return AppError::Internal(e).into_response(),
    };

    match decide(principal.as_ref(), &required) {
        AccessDecision::Granted => {
            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            next.run(request).await
        }
        AccessDecision::Unauthenticated => AppError::Unauthorized.into_response(),
        AccessDecision::Denied => {
            debug!(path = %path, required = ?required, "access denied");
            AppError::Forbidden.into_response()
        }
    }
}

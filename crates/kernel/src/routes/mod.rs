//! HTTP route handlers.

pub mod admin_menu;
pub mod admin_user;
pub mod auth;
pub mod health;
pub mod response;

use axum::Router;

use crate::middleware::authorize_request;
use crate::state::AppState;

/// Build the application router with authorization applied to every route.
///
/// The caller must add a session layer outside the returned router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(admin_user::router())
        .merge(admin_menu::router())
        .merge(health::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authorize_request,
        ))
        .with_state(state)
}

//! Authentication routes (login, logout) and the current user's menu.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;

use crate::access::Principal;
use crate::error::{AppError, AppResult};
use crate::menu::UserMenuInfo;
use crate::models::user::verify_login;
use crate::routes::response::ApiResponse;
use crate::session::SESSION_PRINCIPAL;
use crate::state::AppState;

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

fn session_error(e: tower_sessions::session::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("session store error: {e}"))
}

/// Login handler.
///
/// POST /login
/// - Rejects unknown users, expired accounts and wrong passwords alike
/// - Stores the principal in a fresh session
/// - Responds with the user's menu tree
async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> AppResult<ApiResponse<UserMenuInfo>> {
    let hash = state
        .store()
        .find_password_by_username_after_valid_time(&request.username, Utc::now())
        .await?;

    if !verify_login(hash.as_deref(), &request.password) {
        info!(username = %request.username, "login rejected");
        return Err(AppError::InvalidCredentials);
    }

    let roles = state
        .store()
        .find_role_names_by_username(&request.username)
        .await?;
    let principal = Principal::new(request.username.as_str(), roles);

    session.cycle_id().await.map_err(session_error)?;
    session
        .insert(SESSION_PRINCIPAL, &principal)
        .await
        .map_err(session_error)?;

    let menu = state.menus().build_menu_tree(&request.username).await?;

    info!(username = %principal.username, roles = principal.roles.len(), "user logged in");
    Ok(ApiResponse::ok(menu))
}

/// Logout handler.
///
/// POST /logout
async fn logout(
    session: Session,
    principal: Option<Extension<Principal>>,
) -> AppResult<ApiResponse<()>> {
    session.flush().await.map_err(session_error)?;

    if let Some(Extension(principal)) = principal {
        info!(username = %principal.username, "user logged out");
    }
    Ok(ApiResponse::done("logged out"))
}

/// Menu tree of the logged-in user.
///
/// GET /user/menu
async fn current_menu(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<ApiResponse<UserMenuInfo>> {
    let menu = state.menus().build_menu_tree(&principal.username).await?;
    Ok(ApiResponse::ok(menu))
}

/// Create the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/user/menu", get(current_menu))
}

//! Role and menu administration routes.
//!
//! Menus and their role grants are the path rules the authorization
//! resolver reads, so every write that can change them drops its rule cache.
//! A menu other menus hang under cannot be deleted.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{MenuNode, Role};
use crate::routes::response::ApiResponse;
use crate::state::AppState;
use crate::store::{MenuDeletion, NewMenu, NewRole};

/// Body for replacing a role's menus.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMenusRequest {
    pub menu_ids: Vec<i32>,
}

/// Query string for the required-roles lookup.
#[derive(Debug, Deserialize)]
pub struct RequiredRolesQuery {
    pub url: String,
}

/// List roles.
///
/// GET /admin/roles
async fn list_roles(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<Role>>> {
    let roles = state.store().list_roles().await?;
    Ok(ApiResponse::ok(roles))
}

/// Create a role.
///
/// POST /admin/roles
async fn create_role(
    State(state): State<AppState>,
    Json(request): Json<NewRole>,
) -> AppResult<ApiResponse<i32>> {
    if request.role_name.trim().is_empty() {
        return Err(AppError::BadRequest("roleName is required".to_string()));
    }

    let roles = state.store().list_roles().await?;
    if roles.iter().any(|r| r.role_name == request.role_name) {
        return Err(AppError::Conflict(format!(
            "role {} already exists",
            request.role_name
        )));
    }

    let role_name = request.role_name.clone();
    // A new role has no grants, so the rule set is unchanged.
    let id = state.store().create_role(request).await?;

    info!(role_id = id, role_name = %role_name, "role created");
    Ok(ApiResponse::ok(id))
}

/// Delete a role with its grants and assignments.
///
/// DELETE /admin/roles/{id}
async fn delete_role(
    State(state): State<AppState>,
    Path(role_id): Path<i32>,
) -> AppResult<ApiResponse<()>> {
    let deleted = state.store().delete_role(role_id).await?;
    state.resolver().invalidate_rules();

    if !deleted {
        return Err(AppError::NotFound(format!("role {role_id} not found")));
    }

    info!(role_id, "role deleted");
    Ok(ApiResponse::done("role deleted"))
}

/// Replace the menus granted to a role.
///
/// PUT /admin/roles/{id}/menus
async fn set_role_menus(
    State(state): State<AppState>,
    Path(role_id): Path<i32>,
    Json(request): Json<SetMenusRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .store()
        .set_role_menus(role_id, &request.menu_ids)
        .await?;
    state.resolver().invalidate_rules();

    info!(role_id, menus = ?request.menu_ids, "role menus replaced");
    Ok(ApiResponse::done("menus granted"))
}

/// List menus.
///
/// GET /admin/menus
async fn list_menus(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<MenuNode>>> {
    let menus = state.store().list_menus().await?;
    Ok(ApiResponse::ok(menus))
}

/// Create a menu.
///
/// POST /admin/menus
async fn create_menu(
    State(state): State<AppState>,
    Json(request): Json<NewMenu>,
) -> AppResult<ApiResponse<i32>> {
    if request.url.trim().is_empty() || request.menu_name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "url and menuName are required".to_string(),
        ));
    }

    if let Some(parent_id) = request.parent_id.filter(|id| *id != 0)
        && state.store().find_menu_by_id(parent_id).await?.is_none()
    {
        return Err(AppError::BadRequest(format!(
            "parent menu {parent_id} does not exist"
        )));
    }

    let url = request.url.clone();
    let id = state.store().create_menu(request).await?;
    state.resolver().invalidate_rules();

    info!(menu_id = id, url = %url, "menu created");
    Ok(ApiResponse::ok(id))
}

/// Delete a childless menu with its grants.
///
/// DELETE /admin/menus/{id}
async fn delete_menu(
    State(state): State<AppState>,
    Path(menu_id): Path<i32>,
) -> AppResult<ApiResponse<()>> {
    match state.store().delete_menu(menu_id).await? {
        MenuDeletion::Deleted => {
            state.resolver().invalidate_rules();
            info!(menu_id, "menu deleted");
            Ok(ApiResponse::done("menu deleted"))
        }
        MenuDeletion::Missing => Err(AppError::NotFound(format!("menu {menu_id} not found"))),
        MenuDeletion::HasChildren => Err(AppError::Conflict(format!(
            "menu {menu_id} still has child menus"
        ))),
    }
}

/// Roles granted the menu stored under exactly `url`.
///
/// GET /admin/menus/required-roles?url=
async fn required_roles(
    State(state): State<AppState>,
    Query(query): Query<RequiredRolesQuery>,
) -> AppResult<ApiResponse<Vec<String>>> {
    let roles = state
        .store()
        .find_required_roles_for_pattern(&query.url)
        .await?;
    Ok(ApiResponse::ok(roles))
}

/// Create the role and menu administration router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/roles", get(list_roles).post(create_role))
        .route("/admin/roles/{id}", delete(delete_role))
        .route("/admin/roles/{id}/menus", put(set_role_menus))
        .route("/admin/menus", get(list_menus).post(create_menu))
        .route("/admin/menus/required-roles", get(required_roles))
        .route("/admin/menus/{id}", delete(delete_menu))
}

//! User administration routes.

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::info;

use crate::clock::parse_timestamp;
use crate::error::{AppError, AppResult};
use crate::routes::response::ApiResponse;
use crate::state::AppState;
use crate::store::{NewUser, UserQuery, UserSummary, UserUpdate};

/// Query string for the user listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    #[serde(default = "default_page_num")]
    pub page_num: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub nickname: String,
}

fn default_page_num() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

/// Body for creating a user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    pub nickname: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// `%Y-%m-%d %H:%M:%S`; defaults to a configured number of days ahead.
    #[serde(default)]
    pub valid_time: Option<String>,
    #[serde(default)]
    pub remark: String,
}

/// Body for updating a user. Blank password or validity leaves it unchanged.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub nickname: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub valid_time: Option<String>,
    #[serde(default)]
    pub remark: String,
}

/// Body for replacing a user's roles.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRolesRequest {
    pub role_ids: Vec<i32>,
}

/// Treat empty strings the same as absent fields.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_valid_time(value: &str) -> AppResult<chrono::DateTime<Utc>> {
    parse_timestamp(value).map_err(|e| AppError::BadRequest(format!("{e:#}")))
}

/// Parse a comma-separated id list such as `3,7,12`.
fn parse_id_list(value: &str) -> AppResult<Vec<i32>> {
    let ids = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .map_err(|_| AppError::BadRequest(format!("invalid id {s:?}")))
        })
        .collect::<AppResult<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(AppError::BadRequest("no ids given".to_string()));
    }
    Ok(ids)
}

/// List users.
///
/// GET /admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> AppResult<ApiResponse<Vec<UserSummary>>> {
    if query.page_size == 0 {
        return Err(AppError::BadRequest("pageSize must be positive".to_string()));
    }

    let page = state
        .store()
        .find_users(&UserQuery {
            page_num: query.page_num,
            page_size: query.page_size,
            username: query.username,
            nickname: query.nickname,
        })
        .await?;

    Ok(ApiResponse::page(page.users, page.total))
}

/// Create a user.
///
/// POST /admin/users
async fn add_user(
    State(state): State<AppState>,
    Json(request): Json<AddUserRequest>,
) -> AppResult<ApiResponse<i32>> {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(AppError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    if state.store().username_exists(&request.username).await? {
        return Err(AppError::Conflict(format!(
            "username {} already exists",
            request.username
        )));
    }

    let valid_time = match non_blank(request.valid_time) {
        Some(value) => parse_valid_time(&value)?,
        None => Utc::now() + Duration::days(state.default_valid_days()),
    };

    let id = state
        .store()
        .add_user(NewUser {
            nickname: request.nickname,
            username: request.username.clone(),
            password: request.password,
            email: request.email,
            phone: request.phone,
            valid_time,
            remark: request.remark,
        })
        .await?;

    info!(user_id = id, username = %request.username, "user created");
    Ok(ApiResponse::ok(id))
}

/// Update a user.
///
/// PUT /admin/users/{id}
async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
    Json(request): Json<UpdateUserRequest>,
) -> AppResult<ApiResponse<()>> {
    if request.username.trim().is_empty() {
        return Err(AppError::BadRequest("username is required".to_string()));
    }

    if state
        .store()
        .username_taken_by_other(user_id, &request.username)
        .await?
    {
        return Err(AppError::Conflict(format!(
            "username {} already exists",
            request.username
        )));
    }

    let valid_time = non_blank(request.valid_time)
        .map(|value| parse_valid_time(&value))
        .transpose()?;

    let updated = state
        .store()
        .update_user(
            user_id,
            UserUpdate {
                nickname: request.nickname,
                username: request.username,
                password: non_blank(request.password),
                email: request.email,
                phone: request.phone,
                valid_time,
                remark: request.remark,
            },
        )
        .await?;

    if !updated {
        return Err(AppError::NotFound(format!("user {user_id} not found")));
    }

    info!(user_id, "user updated");
    Ok(ApiResponse::done("user updated"))
}

/// Delete one or more users.
///
/// DELETE /admin/users/{ids}
async fn delete_users(
    State(state): State<AppState>,
    Path(ids): Path<String>,
) -> AppResult<ApiResponse<u64>> {
    let ids = parse_id_list(&ids)?;
    let deleted = state.store().delete_users(&ids).await?;

    info!(requested = ids.len(), deleted, "users deleted");
    Ok(ApiResponse::ok(deleted))
}

/// Replace a user's roles.
///
/// PUT /admin/users/{id}/roles
async fn set_user_roles(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
    Json(request): Json<SetRolesRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .store()
        .set_user_roles(user_id, &request.role_ids)
        .await?;

    info!(user_id, roles = ?request.role_ids, "user roles replaced");
    Ok(ApiResponse::done("roles assigned"))
}

/// Create the user administration router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(add_user))
        .route("/admin/users/{id}", put(update_user).delete(delete_users))
        .route("/admin/users/{id}/roles", put(set_user_roles))
}

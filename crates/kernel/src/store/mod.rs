//! User store abstraction.
//!
//! Every read the authorization core performs, and every administrative
//! write, goes through [`UserStore`]. The PostgreSQL implementation is the
//! production backend; the in-memory one backs tests and local runs.
//!
//! Multi-statement writes (`set_user_roles`, `delete_users`, `delete_role`,
//! `set_role_menus`, `delete_menu`) are atomic: either every statement
//! applies or none does.

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

use crate::models::{MenuNode, Role};

/// Outcome of [`UserStore::delete_menu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuDeletion {
    Deleted,
    Missing,
    /// Other menus still name it as their parent; nothing was removed.
    HasChildren,
}

/// One (pattern → required role) association.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct PathRule {
    pub pattern: String,
    pub required_role: String,
}

impl PathRule {
    pub fn new(pattern: impl Into<String>, required_role: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            required_role: required_role.into(),
        }
    }
}

/// Profile fields shown next to the menu tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: i32,
    pub nickname: String,
    pub remark: String,
}

/// Input for creating a user account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub nickname: String,
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub valid_time: DateTime<Utc>,
    pub remark: String,
}

/// Input for updating a user account.
///
/// `password` and `valid_time` are left untouched when `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserUpdate {
    pub nickname: String,
    pub username: String,
    pub password: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub valid_time: Option<DateTime<Utc>>,
    pub remark: String,
}

/// Filter and page selection for the user listing.
#[derive(Debug, Clone)]
pub struct UserQuery {
    /// 1-based page number.
    pub page_num: u32,
    pub page_size: u32,
    /// Substring filter on username (empty = no filter).
    pub username: String,
    /// Substring filter on nickname (empty = no filter).
    pub nickname: String,
}

impl UserQuery {
    /// Number of rows to skip.
    pub fn offset(&self) -> i64 {
        i64::from(self.page_num.max(1) - 1) * i64::from(self.page_size)
    }
}

/// A role as listed next to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub id: i32,
    pub role_name: String,
}

/// One row of the user listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i32,
    pub nickname: String,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub valid_time: String,
    pub remark: String,
    pub role_list: Vec<RoleRef>,
}

/// A page of users plus the total count matching the filters.
#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<UserSummary>,
    pub total: i64,
}

/// Input for creating a menu entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMenu {
    pub url: String,
    pub menu_name: String,
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub url_pre: String,
    #[serde(default)]
    pub remark: String,
}

/// Input for creating a role.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRole {
    pub role_name: String,
    #[serde(default)]
    pub remark: String,
}

/// Persistence contract for users, roles, menus and their grants.
#[async_trait]
pub trait UserStore: Send + Sync {
    // ---- Authorization core ----

    /// Every (menu url, role name) grant in the system.
    async fn list_all_path_rules(&self) -> Result<Vec<PathRule>>;

    /// Role names granted the menu stored under exactly `pattern`.
    async fn find_required_roles_for_pattern(&self, pattern: &str) -> Result<Vec<String>>;

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>>;

    /// URL patterns of every menu granted to any of the user's roles.
    async fn find_granted_url_patterns(&self, username: &str) -> Result<Vec<String>>;

    async fn find_all_root_menus(&self) -> Result<Vec<MenuNode>>;

    async fn find_children_by_parent_id(&self, parent_id: i32) -> Result<Vec<MenuNode>>;

    /// Root menus granted directly to one of the user's roles.
    async fn find_granted_root_menus(&self, username: &str) -> Result<Vec<MenuNode>>;

    /// Parents of the non-root menus granted to the user.
    async fn find_partial_grant_root_ids(&self, username: &str) -> Result<Vec<i32>>;

    async fn find_menu_by_id(&self, id: i32) -> Result<Option<MenuNode>>;

    /// Children of `parent_id` granted to one of the user's roles.
    async fn find_granted_children(&self, username: &str, parent_id: i32)
    -> Result<Vec<MenuNode>>;

    // ---- Authentication ----

    /// Password hash of a user whose account is still valid at `now`.
    async fn find_password_by_username_after_valid_time(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>>;

    async fn find_role_names_by_username(&self, username: &str) -> Result<Vec<String>>;

    // ---- User administration ----

    async fn username_exists(&self, username: &str) -> Result<bool>;

    /// True when some user other than `user_id` already has `username`.
    async fn username_taken_by_other(&self, user_id: i32, username: &str) -> Result<bool>;

    async fn add_user(&self, input: NewUser) -> Result<i32>;

    /// Returns false when no user has `user_id`.
    async fn update_user(&self, user_id: i32, input: UserUpdate) -> Result<bool>;

    /// Delete users with their role assignments and collections.
    async fn delete_users(&self, user_ids: &[i32]) -> Result<u64>;

    /// Replace the user's role assignments.
    async fn set_user_roles(&self, user_id: i32, role_ids: &[i32]) -> Result<()>;

    async fn find_users(&self, query: &UserQuery) -> Result<UserPage>;

    // ---- Role and menu administration ----

    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn create_role(&self, input: NewRole) -> Result<i32>;

    /// Delete a role with its menu grants and user assignments.
    async fn delete_role(&self, role_id: i32) -> Result<bool>;

    /// Replace the menus granted to a role.
    async fn set_role_menus(&self, role_id: i32, menu_ids: &[i32]) -> Result<()>;

    async fn list_menus(&self) -> Result<Vec<MenuNode>>;

    async fn create_menu(&self, input: NewMenu) -> Result<i32>;

    /// Delete a childless menu with its role grants.
    async fn delete_menu(&self, menu_id: i32) -> Result<MenuDeletion>;

    // ---- Health ----

    async fn is_healthy(&self) -> bool;
}

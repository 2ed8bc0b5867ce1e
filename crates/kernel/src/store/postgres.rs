//! PostgreSQL implementation of UserStore.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    MenuDeletion, NewMenu, NewRole, NewUser, PathRule, Profile, UserPage, UserQuery, UserStore,
    UserSummary, UserUpdate,
};
use crate::clock::format_timestamp;
use crate::db;
use crate::models::{MenuNode, Role, User};

/// Store that executes SQL directly against the database.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new store on a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list_all_path_rules(&self) -> Result<Vec<PathRule>> {
        MenuNode::list_rules(&self.pool).await
    }

    async fn find_required_roles_for_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        MenuNode::role_names_for_url(&self.pool, pattern).await
    }

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        User::find_profile(&self.pool, username).await
    }

    async fn find_granted_url_patterns(&self, username: &str) -> Result<Vec<String>> {
        MenuNode::urls_for_username(&self.pool, username).await
    }

    async fn find_all_root_menus(&self) -> Result<Vec<MenuNode>> {
        MenuNode::roots(&self.pool).await
    }

    async fn find_children_by_parent_id(&self, parent_id: i32) -> Result<Vec<MenuNode>> {
        MenuNode::children(&self.pool, parent_id).await
    }

    async fn find_granted_root_menus(&self, username: &str) -> Result<Vec<MenuNode>> {
        MenuNode::granted_roots(&self.pool, username).await
    }

    async fn find_partial_grant_root_ids(&self, username: &str) -> Result<Vec<i32>> {
        MenuNode::partial_grant_root_ids(&self.pool, username).await
    }

    async fn find_menu_by_id(&self, id: i32) -> Result<Option<MenuNode>> {
        MenuNode::find_by_id(&self.pool, id).await
    }

    async fn find_granted_children(
        &self,
        username: &str,
        parent_id: i32,
    ) -> Result<Vec<MenuNode>> {
        MenuNode::granted_children(&self.pool, username, parent_id).await
    }

    async fn find_password_by_username_after_valid_time(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        User::find_password_valid_at(&self.pool, username, now).await
    }

    async fn find_role_names_by_username(&self, username: &str) -> Result<Vec<String>> {
        Role::names_for_username(&self.pool, username).await
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        User::username_exists(&self.pool, username).await
    }

    async fn username_taken_by_other(&self, user_id: i32, username: &str) -> Result<bool> {
        User::username_taken_by_other(&self.pool, user_id, username).await
    }

    async fn add_user(&self, input: NewUser) -> Result<i32> {
        User::create(&self.pool, &input).await
    }

    async fn update_user(&self, user_id: i32, input: UserUpdate) -> Result<bool> {
        User::update(&self.pool, user_id, &input).await
    }

    async fn delete_users(&self, user_ids: &[i32]) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let mut deleted = 0;

        for &id in user_ids {
            Role::clear_user(&mut tx, id).await?;
            if User::delete(&mut tx, id).await? {
                deleted += 1;
            }
            User::delete_collections(&mut tx, id).await?;
        }

        tx.commit().await.context("failed to commit user deletion")?;
        Ok(deleted)
    }

    async fn set_user_roles(&self, user_id: i32, role_ids: &[i32]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        Role::clear_user(&mut tx, user_id).await?;
        for &role_id in role_ids {
            Role::assign_to_user(&mut tx, user_id, role_id).await?;
        }

        tx.commit().await.context("failed to commit role assignment")?;
        Ok(())
    }

    async fn find_users(&self, query: &UserQuery) -> Result<UserPage> {
        let rows = User::list_page(&self.pool, query).await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            let role_list = Role::refs_for_user(&self.pool, row.id).await?;
            users.push(UserSummary {
                id: row.id,
                nickname: row.nickname,
                username: row.username,
                email: row.email,
                phone: row.phone,
                valid_time: format_timestamp(&row.valid_time),
                remark: row.remark,
                role_list,
            });
        }

        let total = User::count_filtered(&self.pool, query).await?;
        Ok(UserPage { users, total })
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        Role::list(&self.pool).await
    }

    async fn create_role(&self, input: NewRole) -> Result<i32> {
        Role::create(&self.pool, &input.role_name, &input.remark).await
    }

    async fn delete_role(&self, role_id: i32) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let deleted = Role::delete(&mut tx, role_id).await?;
        tx.commit().await.context("failed to commit role deletion")?;
        Ok(deleted)
    }

    async fn set_role_menus(&self, role_id: i32, menu_ids: &[i32]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        Role::clear_menus(&mut tx, role_id).await?;
        for &menu_id in menu_ids {
            Role::grant_menu(&mut tx, role_id, menu_id).await?;
        }

        tx.commit().await.context("failed to commit role menus")?;
        Ok(())
    }

    async fn list_menus(&self) -> Result<Vec<MenuNode>> {
        MenuNode::list(&self.pool).await
    }

    async fn create_menu(&self, input: NewMenu) -> Result<i32> {
        MenuNode::create(&self.pool, &input).await
    }

    async fn delete_menu(&self, menu_id: i32) -> Result<MenuDeletion> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        if !MenuNode::lock(&mut tx, menu_id).await? {
            return Ok(MenuDeletion::Missing);
        }
        if MenuNode::has_children(&mut tx, menu_id).await? {
            return Ok(MenuDeletion::HasChildren);
        }

        MenuNode::delete(&mut tx, menu_id).await?;
        tx.commit().await.context("failed to commit menu deletion")?;
        Ok(MenuDeletion::Deleted)
    }

    async fn is_healthy(&self) -> bool {
        db::check_health(&self.pool).await
    }
}

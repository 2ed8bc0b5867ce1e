//! Role model and role assignments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

use crate::store::RoleRef;

/// Role record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: i32,
    pub role_name: String,
    pub remark: String,
}

impl Role {
    /// List all roles.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT id, role_name, remark FROM authority_role ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .context("failed to list roles")?;

        Ok(roles)
    }

    /// Create a new role.
    pub async fn create(pool: &PgPool, role_name: &str, remark: &str) -> Result<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO authority_role (role_name, remark) VALUES ($1, $2) RETURNING id",
        )
        .bind(role_name)
        .bind(remark)
        .fetch_one(pool)
        .await
        .context("failed to create role")?;

        Ok(id)
    }

    /// Delete a role together with its menu grants and user assignments.
    pub async fn delete(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<bool> {
        sqlx::query("DELETE FROM authority_menu_role WHERE role_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to delete role menu grants")?;

        sqlx::query("DELETE FROM authority_user_role WHERE role_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to delete role assignments")?;

        let result = sqlx::query("DELETE FROM authority_role WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to delete role")?;

        Ok(result.rows_affected() > 0)
    }

    /// Role names held by a user.
    pub async fn names_for_username(pool: &PgPool, username: &str) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.role_name
            FROM authority_role r
            JOIN authority_user_role ur ON ur.role_id = r.id
            JOIN authority_user u ON u.id = ur.user_id
            WHERE u.username = $1
            ORDER BY r.role_name
            "#,
        )
        .bind(username)
        .fetch_all(pool)
        .await
        .context("failed to get role names by username")?;

        Ok(names)
    }

    /// Roles assigned to a user, for listings.
    pub async fn refs_for_user(pool: &PgPool, user_id: i32) -> Result<Vec<RoleRef>> {
        let roles = sqlx::query_as::<_, RoleRef>(
            r#"
            SELECT r.id, r.role_name
            FROM authority_role r
            JOIN authority_user_role ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("failed to get user roles")?;

        Ok(roles)
    }

    /// Remove every role from a user.
    pub async fn clear_user(tx: &mut Transaction<'_, Postgres>, user_id: i32) -> Result<()> {
        sqlx::query("DELETE FROM authority_user_role WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .context("failed to clear user roles")?;

        Ok(())
    }

    /// Assign a role to a user.
    pub async fn assign_to_user(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i32,
        role_id: i32,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO authority_user_role (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&mut **tx)
        .await
        .context("failed to assign role to user")?;

        Ok(())
    }

    /// Remove every menu grant from a role.
    pub async fn clear_menus(tx: &mut Transaction<'_, Postgres>, role_id: i32) -> Result<()> {
        sqlx::query("DELETE FROM authority_menu_role WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut **tx)
            .await
            .context("failed to clear role menus")?;

        Ok(())
    }

    /// Grant a menu to a role.
    pub async fn grant_menu(
        tx: &mut Transaction<'_, Postgres>,
        role_id: i32,
        menu_id: i32,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO authority_menu_role (menu_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(menu_id)
        .bind(role_id)
        .execute(&mut **tx)
        .await
        .context("failed to grant menu to role")?;

        Ok(())
    }
}

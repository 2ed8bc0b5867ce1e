//! Menu model.
//!
//! A menu row doubles as a protected URL pattern: the roles granted a menu
//! are the roles required to reach its `url`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

use crate::store::{NewMenu, PathRule};

/// Columns selected for every menu query.
const MENU_COLUMNS: &str = "m.id, m.url, m.menu_name, m.parent_id, m.remark, m.url_pre";

/// Roots have no parent; older rows use 0 for the same thing.
const IS_ROOT: &str = "(m.parent_id IS NULL OR m.parent_id = 0)";

/// Menu record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MenuNode {
    pub id: i32,
    pub url: String,
    pub menu_name: String,
    pub parent_id: Option<i32>,
    pub remark: String,
    pub url_pre: String,
}

impl MenuNode {
    /// Check if this menu is a top-level entry.
    pub fn is_root(&self) -> bool {
        matches!(self.parent_id, None | Some(0))
    }

    /// All (url, role) grants.
    pub async fn list_rules(pool: &PgPool) -> Result<Vec<PathRule>> {
        let rules = sqlx::query_as::<_, PathRule>(
            r#"
            SELECT m.url AS pattern, r.role_name AS required_role
            FROM authority_menu m
            JOIN authority_menu_role mr ON mr.menu_id = m.id
            JOIN authority_role r ON r.id = mr.role_id
            "#,
        )
        .fetch_all(pool)
        .await
        .context("failed to list path rules")?;

        Ok(rules)
    }

    /// Role names granted the menu stored under `url`.
    pub async fn role_names_for_url(pool: &PgPool, url: &str) -> Result<Vec<String>> {
        let roles = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT r.role_name
            FROM authority_menu m
            JOIN authority_menu_role mr ON mr.menu_id = m.id
            JOIN authority_role r ON r.id = mr.role_id
            WHERE m.url = $1
            "#,
        )
        .bind(url)
        .fetch_all(pool)
        .await
        .context("failed to fetch role names by menu url")?;

        Ok(roles)
    }

    /// URLs of every menu granted to the user.
    pub async fn urls_for_username(pool: &PgPool, username: &str) -> Result<Vec<String>> {
        let urls = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT m.url
            FROM authority_user u
            JOIN authority_user_role ur ON ur.user_id = u.id
            JOIN authority_menu_role mr ON mr.role_id = ur.role_id
            JOIN authority_menu m ON m.id = mr.menu_id
            WHERE u.username = $1
            "#,
        )
        .bind(username)
        .fetch_all(pool)
        .await
        .context("failed to fetch urls by username")?;

        Ok(urls)
    }

    /// All root menus.
    pub async fn roots(pool: &PgPool) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {MENU_COLUMNS} FROM authority_menu m WHERE {IS_ROOT} ORDER BY m.menu_order, m.id"
        );
        let menus = sqlx::query_as::<_, MenuNode>(&sql)
            .fetch_all(pool)
            .await
            .context("failed to fetch root menus")?;

        Ok(menus)
    }

    /// Direct children of a menu.
    pub async fn children(pool: &PgPool, parent_id: i32) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {MENU_COLUMNS} FROM authority_menu m WHERE m.parent_id = $1 ORDER BY m.menu_order, m.id"
        );
        let menus = sqlx::query_as::<_, MenuNode>(&sql)
            .bind(parent_id)
            .fetch_all(pool)
            .await
            .context("failed to fetch child menus")?;

        Ok(menus)
    }

    /// Root menus granted directly to one of the user's roles.
    pub async fn granted_roots(pool: &PgPool, username: &str) -> Result<Vec<Self>> {
        let sql = format!(
            r#"
            SELECT {MENU_COLUMNS}
            FROM authority_menu m
            WHERE {IS_ROOT}
              AND m.id IN (
                SELECT mr.menu_id
                FROM authority_user u
                JOIN authority_user_role ur ON ur.user_id = u.id
                JOIN authority_menu_role mr ON mr.role_id = ur.role_id
                WHERE u.username = $1
              )
            ORDER BY m.menu_order, m.id
            "#
        );
        let menus = sqlx::query_as::<_, MenuNode>(&sql)
            .bind(username)
            .fetch_all(pool)
            .await
            .context("failed to fetch granted root menus")?;

        Ok(menus)
    }

    /// Parent ids of the non-root menus granted to the user.
    pub async fn partial_grant_root_ids(pool: &PgPool, username: &str) -> Result<Vec<i32>> {
        let ids = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT m.parent_id
            FROM authority_menu m
            WHERE m.parent_id IS NOT NULL AND m.parent_id <> 0
              AND m.id IN (
                SELECT mr.menu_id
                FROM authority_user u
                JOIN authority_user_role ur ON ur.user_id = u.id
                JOIN authority_menu_role mr ON mr.role_id = ur.role_id
                WHERE u.username = $1
              )
            GROUP BY m.parent_id
            ORDER BY m.parent_id
            "#,
        )
        .bind(username)
        .fetch_all(pool)
        .await
        .context("failed to fetch partially granted root ids")?;

        Ok(ids)
    }

    /// Children of `parent_id` granted to one of the user's roles.
    pub async fn granted_children(
        pool: &PgPool,
        username: &str,
        parent_id: i32,
    ) -> Result<Vec<Self>> {
        let sql = format!(
            r#"
            SELECT {MENU_COLUMNS}
            FROM authority_menu m
            WHERE m.parent_id = $2
              AND m.id IN (
                SELECT mr.menu_id
                FROM authority_user u
                JOIN authority_user_role ur ON ur.user_id = u.id
                JOIN authority_menu_role mr ON mr.role_id = ur.role_id
                WHERE u.username = $1
              )
            ORDER BY m.menu_order, m.id
            "#
        );
        let menus = sqlx::query_as::<_, MenuNode>(&sql)
            .bind(username)
            .bind(parent_id)
            .fetch_all(pool)
            .await
            .context("failed to fetch granted child menus")?;

        Ok(menus)
    }

    /// Find a menu by ID.
    pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Self>> {
        let sql = format!("SELECT {MENU_COLUMNS} FROM authority_menu m WHERE m.id = $1");
        let menu = sqlx::query_as::<_, MenuNode>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch menu by id")?;

        Ok(menu)
    }

    /// List all menus, parents before their children.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {MENU_COLUMNS} FROM authority_menu m ORDER BY COALESCE(m.parent_id, 0), m.menu_order, m.id"
        );
        let menus = sqlx::query_as::<_, MenuNode>(&sql)
            .fetch_all(pool)
            .await
            .context("failed to list menus")?;

        Ok(menus)
    }

    /// Create a menu.
    pub async fn create(pool: &PgPool, input: &NewMenu) -> Result<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO authority_menu (url, menu_name, parent_id, url_pre, remark)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&input.url)
        .bind(&input.menu_name)
        .bind(input.parent_id)
        .bind(&input.url_pre)
        .bind(&input.remark)
        .fetch_one(pool)
        .await
        .context("failed to create menu")?;

        Ok(id)
    }

    /// Lock a menu row for the rest of the transaction; false if absent.
    pub async fn lock(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<bool> {
        let row = sqlx::query_scalar::<_, i32>(
            "SELECT id FROM authority_menu WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .context("failed to lock menu")?;

        Ok(row.is_some())
    }

    /// Whether any menu names `id` as its parent.
    pub async fn has_children(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM authority_menu WHERE parent_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .context("failed to check menu children")?;

        Ok(exists)
    }

    /// Delete a menu and its grants.
    pub async fn delete(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<bool> {
        sqlx::query("DELETE FROM authority_menu_role WHERE menu_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to delete menu grants")?;

        let result = sqlx::query("DELETE FROM authority_menu WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to delete menu")?;

        Ok(result.rows_affected() > 0)
    }
}

//! User model and CRUD operations.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};

use crate::store::{NewUser, Profile, UserQuery, UserUpdate};

/// User record, without the password hash.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub nickname: String,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub valid_time: DateTime<Utc>,
    pub remark: String,
}

impl User {
    /// Profile fields for a username.
    pub async fn find_profile(pool: &PgPool, username: &str) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, nickname, remark FROM authority_user WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user profile by username")?;

        Ok(profile)
    }

    /// Password hash of an account still valid at `now`.
    pub async fn find_password_valid_at(
        pool: &PgPool,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let pass = sqlx::query_scalar::<_, String>(
            "SELECT password FROM authority_user WHERE username = $1 AND valid_time > $2",
        )
        .bind(username)
        .bind(now)
        .fetch_optional(pool)
        .await
        .context("failed to fetch password by username")?;

        Ok(pass)
    }

    /// Check whether a username is taken.
    pub async fn username_exists(pool: &PgPool, username: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM authority_user WHERE username = $1")
                .bind(username)
                .fetch_one(pool)
                .await
                .context("failed to count users by username")?;

        Ok(count > 0)
    }

    /// Check whether a user other than `id` holds `username`.
    pub async fn username_taken_by_other(pool: &PgPool, id: i32, username: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM authority_user WHERE username = $1 AND id <> $2",
        )
        .bind(username)
        .bind(id)
        .fetch_one(pool)
        .await
        .context("failed to count users by username")?;

        Ok(count > 0)
    }

    /// Create a new user.
    pub async fn create(pool: &PgPool, input: &NewUser) -> Result<i32> {
        let pass = hash_password(&input.password)?;

        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO authority_user
                (nickname, username, password, email, phone, valid_time, create_time, update_time, remark)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW(), $7)
            RETURNING id
            "#,
        )
        .bind(&input.nickname)
        .bind(&input.username)
        .bind(&pass)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(input.valid_time)
        .bind(&input.remark)
        .fetch_one(pool)
        .await
        .context("failed to create user")?;

        Ok(id)
    }

    /// Update a user. Password and validity are kept when not supplied.
    pub async fn update(pool: &PgPool, id: i32, input: &UserUpdate) -> Result<bool> {
        let pass = input.password.as_deref().map(hash_password).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE authority_user
            SET nickname = $1, username = $2, password = COALESCE($3, password),
                email = $4, phone = $5, valid_time = COALESCE($6, valid_time),
                remark = $7, update_time = NOW()
            WHERE id = $8
            "#,
        )
        .bind(&input.nickname)
        .bind(&input.username)
        .bind(pass)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(input.valid_time)
        .bind(&input.remark)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update user")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a user row.
    pub async fn delete(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM authority_user WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to delete user")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a user's bookmarked menus.
    pub async fn delete_collections(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<()> {
        sqlx::query("DELETE FROM user_collection WHERE user_id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("failed to delete user collections")?;

        Ok(())
    }

    /// List users matching the query's filters, one page at a time.
    pub async fn list_page(pool: &PgPool, query: &UserQuery) -> Result<Vec<Self>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, nickname, username, email, phone, valid_time, remark
            FROM authority_user
            WHERE username LIKE $1 AND nickname LIKE $2
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(like_pattern(&query.username))
        .bind(like_pattern(&query.nickname))
        .bind(i64::from(query.page_size))
        .bind(query.offset())
        .fetch_all(pool)
        .await
        .context("failed to list users")?;

        Ok(users)
    }

    /// Count users matching the query's filters.
    pub async fn count_filtered(pool: &PgPool, query: &UserQuery) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM authority_user WHERE username LIKE $1 AND nickname LIKE $2",
        )
        .bind(like_pattern(&query.username))
        .bind(like_pattern(&query.nickname))
        .fetch_one(pool)
        .await
        .context("failed to count users")?;

        Ok(count)
    }
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
pub fn verify_password(hash: &str, password: &str) -> bool {
    if hash.is_empty() {
        return false;
    }

    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Hash checked when an account has none.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("restguard-absent-account").unwrap_or_default());

/// Verify a login attempt against the account's hash, if it has one.
///
/// A missing hash still costs one argon2 verification, so unknown and
/// expired usernames answer as slowly as a wrong password.
pub fn verify_login(hash: Option<&str>, password: &str) -> bool {
    match hash {
        Some(hash) => verify_password(hash, password),
        None => {
            verify_password(&DUMMY_HASH, password);
            false
        }
    }
}

/// Wrap a filter value for a substring `LIKE`, escaping its wildcards.
fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing() {
        let password = "test_password_123";
        let hash = hash_password(password).unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, password));
        assert!(!verify_password(&hash, "wrong_password"));
    }

    #[test]
    fn empty_or_garbage_hash_never_verifies() {
        assert!(!verify_password("", "anything"));
        assert!(!verify_password("not-a-phc-string", "anything"));
    }

    #[test]
    fn missing_hash_runs_argon2_and_fails() {
        assert!(DUMMY_HASH.starts_with("$argon2"));
        assert!(!verify_login(None, "restguard-absent-account"));
        assert!(!verify_login(None, ""));

        let hash = hash_password("pw").unwrap();
        assert!(verify_login(Some(&hash), "pw"));
        assert!(!verify_login(Some(&hash), "other"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(""), "%%");
        assert_eq!(like_pattern("ali"), "%ali%");
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
    }
}

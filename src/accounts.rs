//! Queries against the `users` table.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::clock::to_millis;
use crate::config::BootstrapAdminConfig;
use crate::credentials::hash_password;
use crate::error::AppResult;
use crate::types::{Role, User, UserRow, USER_COLUMNS};

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub account_verified: bool,
    pub avatar_url: Option<&'a str>,
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(User::from))
}

pub async fn find_verified_by_email(pool: &SqlitePool, email: &str) -> sqlx::Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE email = ?1 AND account_verified = 1",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(User::from))
}

/// Outstanding registration attempts for an email, newest first.
pub async fn find_unverified_by_email(pool: &SqlitePool, email: &str) -> sqlx::Result<Vec<User>> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE email = ?1 AND account_verified = 0 ORDER BY created_at DESC, rowid DESC",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(User::from).collect())
}

pub async fn count_unverified_by_email(pool: &SqlitePool, email: &str) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1 AND account_verified = 0")
        .bind(email)
        .fetch_one(pool)
        .await
}

pub async fn list_verified(pool: &SqlitePool) -> sqlx::Result<Vec<User>> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE account_verified = 1 ORDER BY created_at DESC",
        USER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(User::from).collect())
}

pub async fn insert(pool: &SqlitePool, new: NewUser<'_>, now: DateTime<Utc>) -> sqlx::Result<User> {
    let id = Uuid::new_v4().to_string();
    let now_ms = to_millis(now);
    sqlx::query(
        r#"INSERT INTO users (id, name, email, password_hash, role, account_verified, avatar_url, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"#,
    )
    .bind(&id)
    .bind(new.name)
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.role.as_str())
    .bind(new.account_verified)
    .bind(new.avatar_url)
    .bind(now_ms)
    .execute(pool)
    .await?;
    find_by_id(pool, &id).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn set_verification_code(
    pool: &SqlitePool,
    id: &str,
    code: i64,
    expires: DateTime<Utc>,
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"UPDATE users SET verification_code = ?1, verification_code_expire = ?2, otp_failures = 0,
               updated_at = ?3
           WHERE id = ?4"#,
    )
    .bind(code)
    .bind(to_millis(expires))
    .bind(to_millis(now))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Counts a wrong code against the attempt `id`. Once `max_failures` is reached the code
/// is cleared, so no later guess can verify this attempt. Returns true if it was cleared.
pub async fn record_otp_failure(
    pool: &SqlitePool,
    id: &str,
    max_failures: i64,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let failures: Option<i64> = sqlx::query_scalar(
        r#"UPDATE users SET otp_failures = otp_failures + 1,
               verification_code = CASE WHEN otp_failures + 1 >= ?1 THEN NULL ELSE verification_code END,
               verification_code_expire = CASE WHEN otp_failures + 1 >= ?1 THEN NULL ELSE verification_code_expire END,
               updated_at = ?2
           WHERE id = ?3 AND account_verified = 0
           RETURNING otp_failures"#,
    )
    .bind(max_failures)
    .bind(to_millis(now))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(failures.is_some_and(|n| n >= max_failures))
}

/// Keeps `keep_id` as the only registration attempt for `email` and marks it verified,
/// in one transaction.
pub async fn collapse_and_verify(pool: &SqlitePool, keep_id: &str, email: &str, now: DateTime<Utc>) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM users WHERE email = ?1 AND account_verified = 0 AND id <> ?2")
        .bind(email)
        .bind(keep_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r#"UPDATE users SET account_verified = 1, verification_code = NULL, verification_code_expire = NULL,
               updated_at = ?1
           WHERE id = ?2"#,
    )
    .bind(to_millis(now))
    .bind(keep_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

/// Drops every attempt except the newest, without verifying it.
pub async fn delete_other_unverified(pool: &SqlitePool, keep_id: &str, email: &str) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM users WHERE email = ?1 AND account_verified = 0 AND id <> ?2")
        .bind(email)
        .bind(keep_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn set_password(pool: &SqlitePool, id: &str, password_hash: &str, now: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query(
        r#"UPDATE users SET password_hash = ?1, reset_password_token = NULL, reset_password_expire = NULL,
               updated_at = ?2
           WHERE id = ?3"#,
    )
    .bind(password_hash)
    .bind(to_millis(now))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_reset_token(
    pool: &SqlitePool,
    id: &str,
    token_hash: Option<&str>,
    expires: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE users SET reset_password_token = ?1, reset_password_expire = ?2, updated_at = ?3 WHERE id = ?4",
    )
    .bind(token_hash)
    .bind(expires.map(to_millis))
    .bind(to_millis(now))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_reset_token(pool: &SqlitePool, token_hash: &str, now: DateTime<Utc>) -> sqlx::Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE reset_password_token = ?1 AND reset_password_expire >= ?2",
        USER_COLUMNS
    ))
    .bind(token_hash)
    .bind(to_millis(now))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(User::from))
}

/// Removes unverified registrations created before `cutoff`.
pub async fn delete_unverified_before(pool: &SqlitePool, cutoff: DateTime<Utc>) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM users WHERE account_verified = 0 AND created_at < ?1")
        .bind(to_millis(cutoff))
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Creates the configured first administrator unless a verified account already uses
/// its email. Returns the new account, if one was created.
pub async fn ensure_bootstrap_admin(
    pool: &SqlitePool,
    cfg: &BootstrapAdminConfig,
    now: DateTime<Utc>,
) -> AppResult<Option<User>> {
    let email = cfg.email.trim().to_lowercase();
    if find_verified_by_email(pool, &email).await?.is_some() {
        return Ok(None);
    }
    let password_hash = hash_password(cfg.password.clone()).await?;
    let admin = insert(
        pool,
        NewUser {
            name: cfg.name.trim(),
            email: &email,
            password_hash: &password_hash,
            role: Role::Admin,
            account_verified: true,
            avatar_url: None,
        },
        now,
    )
    .await?;
    Ok(Some(admin))
}

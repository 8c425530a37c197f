//! Borrow/return workflow over the `borrows` ledger.
//!
//! The ledger is the only record of a loan. Each state change (book counter plus
//! ledger row) commits in a single transaction, and the counter is moved with a
//! conditional `UPDATE` so concurrent borrows of the last copy cannot both win.

pub mod fine;

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::accounts;
use crate::catalog;
use crate::clock::to_millis;
use crate::config::BorrowConfig;
use crate::error::{validation, AppError};
use crate::types::{
    Book, BookRow, BorrowDetails, BorrowEntry, BorrowRecord, BorrowRow, User, UserRow, BORROW_COLUMNS,
};

/// Loan period and fine rate applied by the workflow.
#[derive(Debug, Clone, Copy)]
pub struct LoanPolicy {
    pub loan_period: Duration,
    pub fine_per_day_cents: i64,
}

impl LoanPolicy {
    pub fn from_config(cfg: &BorrowConfig) -> Self {
        Self { loan_period: Duration::days(cfg.loan_days), fine_per_day_cents: cfg.fine_per_day_cents }
    }
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self { loan_period: Duration::days(7), fine_per_day_cents: fine::FINE_PER_DAY_CENTS }
    }
}

#[derive(Debug, Error)]
pub enum BorrowError {
    #[error("Email is required")]
    EmailRequired,
    #[error("Book ID and email are required")]
    ReturnFieldsRequired,
    #[error("Invalid book id: {0}")]
    InvalidBookId(String),
    #[error("Book not found")]
    BookNotFound,
    #[error("User not found")]
    UserNotFound,
    #[error("Book not available")]
    BookUnavailable,
    #[error("Book already borrowed")]
    AlreadyBorrowed,
    #[error("Book not borrowed")]
    NotBorrowed,
    #[error("Due date out of range")]
    DueDateOutOfRange,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<BorrowError> for AppError {
    fn from(err: BorrowError) -> Self {
        match err {
            BorrowError::BookNotFound | BorrowError::UserNotFound => AppError::NotFound(err.to_string()),
            BorrowError::InvalidBookId(raw) => validation::invalid_id("book", &raw),
            BorrowError::Database(e) => AppError::from(e),
            BorrowError::DueDateOutOfRange => AppError::Internal(anyhow::anyhow!(err)),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

/// Outcome of a successful return.
#[derive(Debug, Clone)]
pub struct ReturnReceipt {
    pub record: BorrowRecord,
    pub book: Book,
}

impl ReturnReceipt {
    pub fn fine_cents(&self) -> i64 {
        self.record.fine_cents
    }
}

fn parse_book_id(raw: &str) -> Result<String, BorrowError> {
    validation::parse_uuid(raw).map(|id| id.to_string()).ok_or_else(|| BorrowError::InvalidBookId(raw.to_string()))
}

fn clean_email(email: Option<&str>) -> Option<String> {
    email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty())
}

async fn find_open_loan(pool: &SqlitePool, user_id: &str, book_id: &str) -> sqlx::Result<Option<BorrowRecord>> {
    let row: Option<BorrowRow> = sqlx::query_as(&format!(
        "SELECT {} FROM borrows WHERE user_id = ?1 AND book_id = ?2 AND return_date IS NULL",
        BORROW_COLUMNS
    ))
    .bind(user_id)
    .bind(book_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(BorrowRecord::from))
}

pub async fn find_record(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<BorrowRecord>> {
    let row: Option<BorrowRow> =
        sqlx::query_as(&format!("SELECT {} FROM borrows WHERE id = ?1", BORROW_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(BorrowRecord::from))
}

/// Records that the verified user with `email` takes one copy of `book_id`.
///
/// Checks run in order and stop at the first failure; nothing is written until all pass.
pub async fn borrow_book(
    pool: &SqlitePool,
    book_id: &str,
    email: Option<&str>,
    policy: LoanPolicy,
    now: DateTime<Utc>,
) -> Result<BorrowRecord, BorrowError> {
    let email = clean_email(email).ok_or(BorrowError::EmailRequired)?;
    let book_id = parse_book_id(book_id)?;
    let book = catalog::find_book(pool, &book_id).await?.ok_or(BorrowError::BookNotFound)?;
    let user = accounts::find_verified_by_email(pool, &email).await?.ok_or(BorrowError::UserNotFound)?;
    if book.quantity <= 0 {
        return Err(BorrowError::BookUnavailable);
    }
    if find_open_loan(pool, &user.id, &book.id).await?.is_some() {
        return Err(BorrowError::AlreadyBorrowed);
    }

    let record_id = Uuid::new_v4().to_string();
    let now_ms = to_millis(now);
    let due = now.checked_add_signed(policy.loan_period).ok_or(BorrowError::DueDateOutOfRange)?;

    let mut tx = pool.begin().await?;
    let taken = sqlx::query("UPDATE books SET quantity = quantity - 1, updated_at = ?1 WHERE id = ?2 AND quantity > 0")
        .bind(now_ms)
        .bind(&book.id)
        .execute(&mut *tx)
        .await?;
    if taken.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(BorrowError::BookUnavailable);
    }

    let inserted = sqlx::query(
        r#"INSERT INTO borrows (id, user_id, user_name, user_email, book_id, book_title, price_cents,
                                borrowed_date, due_date, return_date, fine_cents, notified, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, 0, 0, ?8)"#,
    )
    .bind(&record_id)
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&book.id)
    .bind(&book.title)
    .bind(book.price_cents)
    .bind(now_ms)
    .bind(to_millis(due))
    .execute(&mut *tx)
    .await;
    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            tx.rollback().await?;
            return Err(BorrowError::AlreadyBorrowed);
        }
        Err(e) => return Err(e.into()),
    }
    tx.commit().await?;

    tracing::info!(book_id = %book.id, user_id = %user.id, due = %due, "book borrowed");
    find_record(pool, &record_id).await?.ok_or(BorrowError::Database(sqlx::Error::RowNotFound))
}

/// Closes the open loan of `email` on `book_id`, restoring the copy and settling the fine.
pub async fn return_book(
    pool: &SqlitePool,
    book_id: &str,
    email: Option<&str>,
    policy: LoanPolicy,
    now: DateTime<Utc>,
) -> Result<ReturnReceipt, BorrowError> {
    let email = clean_email(email).ok_or(BorrowError::ReturnFieldsRequired)?;
    let book_id = parse_book_id(book_id)?;
    let book = catalog::find_book(pool, &book_id).await?.ok_or(BorrowError::BookNotFound)?;
    let user = accounts::find_verified_by_email(pool, &email).await?.ok_or(BorrowError::UserNotFound)?;
    let open = find_open_loan(pool, &user.id, &book.id).await?.ok_or(BorrowError::NotBorrowed)?;

    let fine = fine::calculate_fine(open.due_date, now, policy.fine_per_day_cents);
    let now_ms = to_millis(now);

    let mut tx = pool.begin().await?;
    let closed = sqlx::query("UPDATE borrows SET return_date = ?1, fine_cents = ?2 WHERE id = ?3 AND return_date IS NULL")
        .bind(now_ms)
        .bind(fine)
        .bind(&open.id)
        .execute(&mut *tx)
        .await?;
    if closed.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(BorrowError::NotBorrowed);
    }
    let restored = sqlx::query("UPDATE books SET quantity = quantity + 1, updated_at = ?1 WHERE id = ?2")
        .bind(now_ms)
        .bind(&book.id)
        .execute(&mut *tx)
        .await?;
    if restored.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(BorrowError::BookNotFound);
    }
    tx.commit().await?;

    tracing::info!(book_id = %book.id, user_id = %user.id, fine_cents = fine, "book returned");
    let record = find_record(pool, &open.id).await?.ok_or(BorrowError::Database(sqlx::Error::RowNotFound))?;
    let book = catalog::find_book(pool, &book.id).await?.ok_or(BorrowError::BookNotFound)?;
    Ok(ReturnReceipt { record, book })
}

/// The caller's loans, newest first.
pub async fn my_borrowed_books(pool: &SqlitePool, user_id: &str) -> sqlx::Result<Vec<BorrowEntry>> {
    let rows: Vec<BorrowRow> = sqlx::query_as(&format!(
        "SELECT {} FROM borrows WHERE user_id = ?1 ORDER BY borrowed_date DESC, rowid DESC",
        BORROW_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| BorrowEntry::from(BorrowRecord::from(r))).collect())
}

/// Every ledger record with its book and borrower, newest first. Read only.
pub async fn all_borrows(pool: &SqlitePool) -> sqlx::Result<Vec<BorrowDetails>> {
    let rows = sqlx::query(
        r#"SELECT b.id, b.user_id, b.user_name, b.user_email, b.book_id, b.book_title, b.price_cents,
                  b.borrowed_date, b.due_date, b.return_date, b.fine_cents, b.notified, b.created_at,
                  k.id AS k_id, k.title AS k_title, k.author AS k_author, k.description AS k_description,
                  k.price_cents AS k_price_cents, k.quantity AS k_quantity, k.availability AS k_availability,
                  k.created_at AS k_created_at, k.updated_at AS k_updated_at,
                  u.id AS u_id, u.name AS u_name, u.email AS u_email, u.role AS u_role,
                  u.account_verified AS u_account_verified, u.avatar_url AS u_avatar_url,
                  u.created_at AS u_created_at, u.updated_at AS u_updated_at
           FROM borrows b
           LEFT JOIN books k ON k.id = b.book_id
           LEFT JOIN users u ON u.id = b.user_id
           ORDER BY b.borrowed_date DESC, b.rowid DESC"#,
    )
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let record = BorrowRecord::from(BorrowRow {
            id: r.try_get("id")?,
            user_id: r.try_get("user_id")?,
            user_name: r.try_get("user_name")?,
            user_email: r.try_get("user_email")?,
            book_id: r.try_get("book_id")?,
            book_title: r.try_get("book_title")?,
            price_cents: r.try_get("price_cents")?,
            borrowed_date: r.try_get("borrowed_date")?,
            due_date: r.try_get("due_date")?,
            return_date: r.try_get("return_date")?,
            fine_cents: r.try_get("fine_cents")?,
            notified: r.try_get("notified")?,
            created_at: r.try_get("created_at")?,
        });
        let book = match r.try_get::<Option<String>, _>("k_id")? {
            Some(id) => Some(Book::from(BookRow {
                id,
                title: r.try_get("k_title")?,
                author: r.try_get("k_author")?,
                description: r.try_get("k_description")?,
                price_cents: r.try_get("k_price_cents")?,
                quantity: r.try_get("k_quantity")?,
                availability: r.try_get("k_availability")?,
                created_at: r.try_get("k_created_at")?,
                updated_at: r.try_get("k_updated_at")?,
            })),
            None => None,
        };
        let borrower = match r.try_get::<Option<String>, _>("u_id")? {
            Some(id) => Some(User::from(UserRow {
                id,
                name: r.try_get("u_name")?,
                email: r.try_get("u_email")?,
                password_hash: String::new(),
                role: r.try_get("u_role")?,
                account_verified: r.try_get("u_account_verified")?,
                verification_code: None,
                verification_code_expire: None,
                reset_password_token: None,
                reset_password_expire: None,
                avatar_url: r.try_get("u_avatar_url")?,
                created_at: r.try_get("u_created_at")?,
                updated_at: r.try_get("u_updated_at")?,
            })),
            None => None,
        };
        out.push(BorrowDetails { record, book, borrower });
    }
    Ok(out)
}

/// Open loans whose due date lies before `cutoff` and whose borrower has not been reminded.
pub async fn overdue_unnotified(pool: &SqlitePool, cutoff: DateTime<Utc>) -> sqlx::Result<Vec<BorrowRecord>> {
    let rows: Vec<BorrowRow> = sqlx::query_as(&format!(
        "SELECT {} FROM borrows WHERE due_date < ?1 AND return_date IS NULL AND notified = 0 ORDER BY due_date ASC",
        BORROW_COLUMNS
    ))
    .bind(to_millis(cutoff))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(BorrowRecord::from).collect())
}

/// Flips `notified` from 0 to 1. Returns false if another sweep got there first.
pub async fn claim_reminder(pool: &SqlitePool, record_id: &str) -> sqlx::Result<bool> {
    let res = sqlx::query("UPDATE borrows SET notified = 1 WHERE id = ?1 AND notified = 0")
        .bind(record_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() == 1)
}

/// Undoes a claim after a failed send so a later sweep retries.
pub async fn release_reminder(pool: &SqlitePool, record_id: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE borrows SET notified = 0 WHERE id = ?1 AND return_date IS NULL")
        .bind(record_id)
        .execute(pool)
        .await?;
    Ok(())
}

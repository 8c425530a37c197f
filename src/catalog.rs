//! Queries against the `books` table.
//!
//! `availability` is a generated column, so nothing here ever writes it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::clock::to_millis;
use crate::types::{Book, BookRow, BOOK_COLUMNS};

pub struct NewBook<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub description: &'a str,
    pub price_cents: i64,
    pub quantity: i64,
}

pub async fn find_book(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<Book>> {
    let row: Option<BookRow> = sqlx::query_as(&format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Book::from))
}

pub async fn list_books(pool: &SqlitePool) -> sqlx::Result<Vec<Book>> {
    let rows: Vec<BookRow> =
        sqlx::query_as(&format!("SELECT {} FROM books ORDER BY created_at DESC, title ASC", BOOK_COLUMNS))
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(Book::from).collect())
}

pub async fn insert_book(pool: &SqlitePool, new: NewBook<'_>, now: DateTime<Utc>) -> sqlx::Result<Book> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO books (id, title, author, description, price_cents, quantity, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)"#,
    )
    .bind(&id)
    .bind(new.title)
    .bind(new.author)
    .bind(new.description)
    .bind(new.price_cents)
    .bind(new.quantity)
    .bind(to_millis(now))
    .execute(pool)
    .await?;
    find_book(pool, &id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Deletes a book unless it has open loans. Returns `Ok(false)` when it does.
pub async fn delete_book_if_idle(pool: &SqlitePool, id: &str) -> sqlx::Result<bool> {
    let res = sqlx::query(
        r#"DELETE FROM books WHERE id = ?1
           AND NOT EXISTS (SELECT 1 FROM borrows WHERE book_id = ?1 AND return_date IS NULL)"#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

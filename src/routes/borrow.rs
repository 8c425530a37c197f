use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use super::ApiJson;
use crate::ledger::{self, ReturnReceipt};
use crate::error::AppResult;
use crate::middleware::{AdminUser, AuthUser};
use crate::state::AppState;
use crate::types::{format_cents, Book, BorrowDetails, BorrowEntry, BorrowRecord, BorrowRequest, Envelope};

#[derive(Serialize)]
pub struct BorrowBody {
    pub message: String,
    pub record: BorrowRecord,
}

#[derive(Serialize)]
pub struct ReturnBody {
    pub message: String,
    pub record: BorrowRecord,
    pub book: Book,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowedBooksBody<T: Serialize> {
    pub borrowed_books: Vec<T>,
}

/// A fine is quoted when one accrued, otherwise the book's price.
fn return_message(receipt: &ReturnReceipt) -> String {
    let fine = receipt.fine_cents();
    if fine > 0 {
        format!("The book has been returned successfully with fine ${}", format_cents(fine))
    } else {
        format!("The book has been returned successfully with fee ${}", format_cents(receipt.record.price_cents))
    }
}

pub async fn record_borrowed_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(book_id): Path<String>,
    ApiJson(req): ApiJson<BorrowRequest>,
) -> AppResult<impl IntoResponse> {
    let record =
        ledger::borrow_book(&state.db, &book_id, req.email.as_deref(), state.loan_policy(), state.clock.now())
            .await?;
    state.metrics.inc_borrows();
    tracing::debug!(record_id = %record.id, admin_id = %admin.id, "borrow recorded");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(BorrowBody { message: "Book borrowed successfully".to_string(), record })),
    ))
}

pub async fn return_borrowed_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(book_id): Path<String>,
    ApiJson(req): ApiJson<BorrowRequest>,
) -> AppResult<impl IntoResponse> {
    let receipt =
        ledger::return_book(&state.db, &book_id, req.email.as_deref(), state.loan_policy(), state.clock.now())
            .await?;
    state.metrics.record_return(receipt.fine_cents());
    tracing::debug!(record_id = %receipt.record.id, admin_id = %admin.id, "return recorded");

    let message = return_message(&receipt);
    let ReturnReceipt { record, book } = receipt;
    Ok(Json(Envelope::ok(ReturnBody { message, record, book })))
}

pub async fn my_borrowed_books(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<impl IntoResponse> {
    let borrowed_books: Vec<BorrowEntry> = ledger::my_borrowed_books(&state.db, &user.id).await?;
    Ok(Json(Envelope::ok(BorrowedBooksBody { borrowed_books })))
}

pub async fn borrowed_books_by_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<impl IntoResponse> {
    let borrowed_books: Vec<BorrowDetails> = ledger::all_borrows(&state.db).await?;
    Ok(Json(Envelope::ok(BorrowedBooksBody { borrowed_books })))
}

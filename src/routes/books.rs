use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use super::ApiJson;
use crate::catalog::{self, NewBook};
use crate::error::validation::{parse_id, required, validate_non_negative};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::{AdminUser, AuthUser};
use crate::state::AppState;
use crate::types::{AddBookRequest, Book, Envelope, MessageBody};

#[derive(Serialize)]
pub struct BooksBody {
    pub books: Vec<Book>,
}

#[derive(Serialize)]
pub struct BookBody {
    pub message: String,
    pub book: Book,
}

pub async fn list_books(State(state): State<AppState>, _user: AuthUser) -> AppResult<impl IntoResponse> {
    let books = catalog::list_books(&state.db).await?;
    Ok(Json(Envelope::ok(BooksBody { books })))
}

pub async fn add_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<AddBookRequest>,
) -> AppResult<impl IntoResponse> {
    let missing = || AppError::BadRequest("Please fill all fields.".to_string());
    let title = required(req.title, "Please fill all fields.")?;
    let author = required(req.author, "Please fill all fields.")?;
    let description = required(req.description, "Please fill all fields.")?;
    let price_cents = req.price_cents.ok_or_else(missing)?;
    let quantity = req.quantity.ok_or_else(missing)?;
    validate_non_negative(price_cents, "priceCents")?;
    validate_non_negative(quantity, "quantity")?;

    let book = catalog::insert_book(
        &state.db,
        NewBook { title: &title, author: &author, description: &description, price_cents, quantity },
        state.clock.now(),
    )
    .await?;
    tracing::info!(book_id = %book.id, admin_id = %admin.id, quantity, "book added");
    Ok((StatusCode::CREATED, Json(Envelope::ok(BookBody { message: "Book Added successfully.".to_string(), book }))))
}

pub async fn delete_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "book")?.to_string();
    catalog::find_book(&state.db, &id).await?.ok_or_not_found("Book")?;
    if !catalog::delete_book_if_idle(&state.db, &id).await? {
        return Err(AppError::BadRequest("Book has outstanding loans".to_string()));
    }
    tracing::info!(book_id = %id, admin_id = %admin.id, "book deleted");
    Ok(Json(Envelope::ok(MessageBody { message: "Book deleted successfully.".to_string() })))
}

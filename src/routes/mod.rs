//! HTTP route handlers for the Libris API.
//!
//! - `auth`: registration, OTP verification, sessions and password recovery
//! - `books`: catalog listing and administration
//! - `borrow`: the borrow/return workflow and loan listings
//! - `users`: user listing and admin provisioning
//! - `health`: liveness, readiness, metrics and version

pub mod auth;
pub mod books;
pub mod borrow;
pub mod health;
pub mod users;

use std::path::PathBuf;

use axum::{
    extract::{DefaultBodyLimit, FromRequest},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::error::AppError;
use crate::middleware::{rate_limit, security_headers, validation};
use crate::state::AppState;

/// `axum::Json` whose rejections use the API error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/verify-otp", post(auth::verify_otp))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", get(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/password/forgot", post(auth::forgot_password))
        .route("/auth/password/reset/{token}", put(auth::reset_password))
        .route("/auth/password/update", put(auth::update_password))
        .route("/book/all", get(books::list_books))
        .route("/book/admin/add", post(books::add_book))
        .route("/book/delete/{id}", delete(books::delete_book))
        .route("/borrow/record-borrow-book/{id}", post(borrow::record_borrowed_book))
        .route("/borrow/return-book/{id}", put(borrow::return_borrowed_book))
        .route("/borrow/my-borrowed-books", get(borrow::my_borrowed_books))
        .route("/borrow/borrowed-books-by-users", get(borrow::borrowed_books_by_users))
        .route("/user/all", get(users::list_users))
        .route("/user/add/new-admin", post(users::add_new_admin))
}

/// Builds the full application: versioned API, operational endpoints, uploaded files
/// and the single-page frontend as fallback.
pub fn router(state: AppState) -> Router {
    let ui_root = PathBuf::from(&state.config.server.ui_dir);
    let static_ui_service = ServeDir::new(&ui_root)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(ui_root.join("index.html")));
    let uploads_service = ServeDir::new(&state.config.uploads.dir);
    let body_limit = validation::max_body_bytes(&state);

    let app = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .nest("/api/v1", api_routes())
        .nest_service("/uploads", uploads_service)
        .fallback_service(static_ui_service)
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CookieManagerLayer::new())
        .layer(from_fn_with_state(state.clone(), validation::validate_request_middleware))
        .layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state, security_headers::security_headers_middleware));

    // Permissive CORS only for local development against a separately served UI
    if cfg!(debug_assertions) {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

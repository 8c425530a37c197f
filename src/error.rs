use axum::{
    extract::multipart::MultipartError,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// The primary error type for the application.
///
/// Every handler returns [`AppResult`]; the [`IntoResponse`] impl below is the single
/// place where failures become `{ "success": false, "message": ... }` responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// For internal server errors that are not expected to be handled by the client.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
    /// For client errors due to invalid requests.
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// For when a specific field in a request fails validation.
    #[error("Validation error on field '{field}': {message}")]
    Validation {
        /// The name of the field that failed validation.
        field: String,
        /// A message describing the validation error.
        message: String,
    },
    /// Uniqueness conflicts. Reported as 400 to clients.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Missing, invalid or expired session credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated, but the role may not use the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// For when a requested resource is not found.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    /// For when a client has sent too many requests in a given amount of time.
    #[error("Rate limited. Retry after {retry_after_seconds} seconds")]
    RateLimited {
        /// The number of seconds to wait before retrying the request.
        retry_after_seconds: u64,
    },
    /// For when a service is temporarily unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// For errors related to database operations.
    #[error("Database error: {0}")]
    Database(String),
    /// For errors related to I/O operations.
    #[error("I/O error: {0}")]
    Io(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation { .. } | AppError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::Database(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message shown to clients. Internal details never leave the server.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal Server Error".to_string(),
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Io(_) => "An I/O error occurred".to_string(),
            AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::ServiceUnavailable(msg) => msg.clone(),
            AppError::Validation { message, .. } => message.clone(),
            AppError::RateLimited { retry_after_seconds } => {
                format!("Too many requests. Please retry after {} seconds", retry_after_seconds)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "success": false,
            "message": self.client_message(),
        });

        match &self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(%error_id, "Internal error: {:?}", e);
                body["error_id"] = json!(error_id.to_string());
            }
            AppError::Database(msg) => tracing::error!("Database error: {}", msg),
            AppError::Io(msg) => tracing::error!("I/O error: {}", msg),
            AppError::Validation { field, .. } => body["field"] = json!(field),
            AppError::RateLimited { retry_after_seconds } => {
                body["retry_after_seconds"] = json!(retry_after_seconds)
            }
            _ => tracing::debug!(status = status.as_u16(), "{}", self),
        }

        // Internal detail only in debug builds
        if cfg!(debug_assertions) && status.is_server_error() {
            body["debug"] = json!(format!("{:?}", self));
        }

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Duplicate field value entered".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                AppError::BadRequest(format!("Constraint violated: {}", db_err.message()))
            }
            sqlx::Error::Database(db_err) => AppError::Database(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("Authentication token has expired".to_string())
            }
            _ => AppError::Unauthorized("Invalid authentication token".to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(format!("{}: {}", err.kind(), err))
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// An extension trait for `Option` that provides a convenient way to convert
/// an `Option` to a `Result` with a `NotFound` error.
pub trait OptionExt<T> {
    /// Converts `None` into `AppError::NotFound("<entity> not found")`.
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Field-level request validation shared by the handlers.
pub mod validation {
    use super::*;

    pub const PASSWORD_MIN_LEN: usize = 8;
    pub const PASSWORD_MAX_LEN: usize = 16;

    /// Returns the trimmed value or a 400 carrying `message`.
    pub fn required(value: Option<String>, message: &str) -> AppResult<String> {
        match value {
            Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => Err(AppError::BadRequest(message.to_string())),
        }
    }

    /// Like [`required`] but keeps surrounding whitespace (passwords).
    pub fn required_raw(value: Option<String>, message: &str) -> AppResult<String> {
        match value {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(AppError::BadRequest(message.to_string())),
        }
    }

    /// Emails are stored trimmed and lower-cased.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn validate_email(email: &str) -> AppResult<()> {
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !email.contains(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(AppError::Validation {
                field: "email".to_string(),
                message: "Please provide a valid email address".to_string(),
            });
        }
        Ok(())
    }

    /// Checks the 8..=16 character bound, counted in chars not bytes.
    pub fn validate_password_length(password: &str, message: &str) -> AppResult<()> {
        let len = password.chars().count();
        if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
            return Err(AppError::Validation { field: "password".to_string(), message: message.to_string() });
        }
        Ok(())
    }

    /// Validates that a number is not negative.
    pub fn validate_non_negative(value: i64, field: &str) -> AppResult<()> {
        if value < 0 {
            return Err(AppError::Validation {
                field: field.to_string(),
                message: format!("{} must not be negative, got {}", field, value),
            });
        }
        Ok(())
    }

    /// Parses a path id; malformed ids are a 400 rather than a 404.
    pub fn parse_id(raw: &str, entity: &str) -> AppResult<uuid::Uuid> {
        parse_uuid(raw).ok_or_else(|| invalid_id(entity, raw))
    }

    pub fn parse_uuid(raw: &str) -> Option<uuid::Uuid> {
        uuid::Uuid::parse_str(raw.trim()).ok()
    }

    pub fn invalid_id(entity: &str, raw: &str) -> AppError {
        AppError::BadRequest(format!("Resource not found. Invalid {} id: {}", entity, raw))
    }
}

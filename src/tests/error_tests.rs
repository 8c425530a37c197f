#[cfg(test)]
mod tests {
    use crate::error::{validation, AppError, AppResult, OptionExt};
    use crate::tests::support::test_pool;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::io;

    async fn body_of(error: AppError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let error = AppError::BadRequest("Invalid input".to_string());
        assert_eq!(format!("{}", error), "Bad request: Invalid input");

        let error = AppError::NotFound("Book not found".to_string());
        assert_eq!(format!("{}", error), "Not found: Book not found");

        let error = AppError::RateLimited { retry_after_seconds: 60 };
        assert_eq!(format!("{}", error), "Rate limited. Retry after 60 seconds");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Conflict("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Validation { field: "f".into(), message: "m".into() }, StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (AppError::RateLimited { retry_after_seconds: 30 }, StatusCode::TOO_MANY_REQUESTS),
            (AppError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Io("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_client_errors_use_the_envelope() {
        let (status, body) = body_of(AppError::BadRequest("Book not available".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "success": false, "message": "Book not available" }));

        let (_, body) = body_of(AppError::Validation { field: "quantity".into(), message: "bad".into() }).await;
        assert_eq!(body["field"], "quantity");
        assert_eq!(body["message"], "bad");

        let (_, body) = body_of(AppError::RateLimited { retry_after_seconds: 12 }).await;
        assert_eq!(body["retry_after_seconds"], 12);
        assert!(body["message"].as_str().unwrap().contains("12 seconds"));
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let (status, body) = body_of(AppError::Internal(anyhow::anyhow!("smtp password rejected"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Internal Server Error");
        assert!(body["error_id"].is_string());

        let (_, body) = body_of(AppError::Database("no such table: books".into())).await;
        assert_eq!(body["message"], "A database error occurred");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let app_error: AppError = io_error.into();

        match app_error {
            AppError::Io(msg) => {
                assert!(msg.contains("not found") || msg.contains("NotFound"));
                assert!(msg.contains("File not found"));
            }
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let app_error: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(app_error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unique_violation_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir).await;
        let insert = "INSERT INTO users (id, name, email, password_hash, role, account_verified, created_at, updated_at) \
                      VALUES (?1, 'A', 'a@example.com', 'x', 'User', 1, 0, 0)";
        sqlx::query(insert).bind("u1").execute(&pool).await.unwrap();
        let err = sqlx::query(insert).bind("u2").execute(&pool).await.unwrap_err();

        let app_error: AppError = err.into();
        assert!(matches!(app_error, AppError::Conflict(_)));
        assert_eq!(app_error.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_jwt_errors_are_unauthorized() {
        let err = jsonwebtoken::decode::<serde_json::Value>(
            "not.a.token",
            &jsonwebtoken::DecodingKey::from_secret(b"secret"),
            &jsonwebtoken::Validation::default(),
        )
        .unwrap_err();
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid authentication token");
    }

    #[test]
    fn test_option_ext() {
        let some_value: Option<i32> = Some(42);
        let result: AppResult<i32> = some_value.ok_or_not_found("Book");
        assert_eq!(result.unwrap(), 42);

        let none_value: Option<i32> = None;
        match none_value.ok_or_not_found("Book").unwrap_err() {
            AppError::NotFound(msg) => assert_eq!(msg, "Book not found"),
            _ => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_required_fields() {
        assert_eq!(validation::required(Some("  Dune ".into()), "missing").unwrap(), "Dune");
        assert!(validation::required(Some("   ".into()), "missing").is_err());
        assert!(validation::required(None, "missing").is_err());
        // passwords keep their whitespace
        assert_eq!(validation::required_raw(Some(" pw ".into()), "missing").unwrap(), " pw ");
    }

    #[test]
    fn test_validate_email() {
        assert!(validation::validate_email("reader@example.com").is_ok());
        for bad in ["", "reader", "reader@", "@example.com", "reader@example", "re ader@example.com"] {
            match validation::validate_email(bad).unwrap_err() {
                AppError::Validation { field, .. } => assert_eq!(field, "email"),
                _ => panic!("Expected Validation error for {:?}", bad),
            }
        }
        assert_eq!(validation::normalize_email("  Reader@Example.COM "), "reader@example.com");
    }

    #[test]
    fn test_password_length_counts_chars() {
        let msg = "Password must be between 8 and 16 characters.";
        assert!(validation::validate_password_length("12345678", msg).is_ok());
        assert!(validation::validate_password_length("1234567890123456", msg).is_ok());
        assert!(validation::validate_password_length("1234567", msg).is_err());
        assert!(validation::validate_password_length("12345678901234567", msg).is_err());
        // eight multi-byte characters
        assert!(validation::validate_password_length("ääääääää", msg).is_ok());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validation::validate_non_negative(0, "quantity").is_ok());
        match validation::validate_non_negative(-5, "quantity").unwrap_err() {
            AppError::Validation { field, message } => {
                assert_eq!(field, "quantity");
                assert!(message.contains("-5"));
            }
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn test_parse_id() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(validation::parse_id(&id.to_string(), "book").unwrap(), id);
        match validation::parse_id("42", "book").unwrap_err() {
            AppError::BadRequest(msg) => assert!(msg.contains("Invalid book id")),
            _ => panic!("Expected BadRequest"),
        }
    }

    #[tokio::test]
    async fn test_invalid_ids_read_the_same_everywhere() {
        let expected = "Resource not found. Invalid book id: 42";
        let (_, body) = body_of(validation::parse_id("42", "book").unwrap_err()).await;
        assert_eq!(body["message"], expected);

        let (status, body) = body_of(crate::ledger::BorrowError::InvalidBookId("42".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], expected);
    }
}

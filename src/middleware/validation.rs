use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::state::AppState;

/// Headroom on top of the avatar limit for the other multipart fields.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Largest request body accepted, derived from the avatar limit.
pub fn max_body_bytes(state: &AppState) -> usize {
    state.config.uploads.max_avatar_bytes + FORM_OVERHEAD_BYTES
}

/// Rejects path traversal in the URI and oversized bodies announced by `Content-Length`
/// before any handler or extractor runs.
pub async fn validate_request_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if contains_path_traversal(req.uri().path()) {
        return AppError::BadRequest("Path traversal detected in request".to_string()).into_response();
    }

    if let Some(ua) = req.headers().get("user-agent").and_then(|v| v.to_str().ok()) {
        if is_suspicious_user_agent(ua) {
            tracing::warn!(user_agent = %sanitize_for_logging(ua), "Suspicious user agent detected");
        }
    }

    if matches!(*req.method(), Method::POST | Method::PUT) {
        let declared = req
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        let limit = max_body_bytes(&state);
        if let Some(length) = declared.filter(|&l| l > limit) {
            tracing::debug!(length, limit, "request body too large");
            return AppError::PayloadTooLarge(format!("Request body exceeds maximum size of {} bytes", limit))
                .into_response();
        }
    }

    next.run(req).await
}

fn contains_path_traversal(path: &str) -> bool {
    let lower = path.to_lowercase();

    if path.contains("/..") || path.contains("\\..") || path.starts_with("..") {
        return true;
    }
    if path.contains("/./") || path.contains("\\.\\") || path.contains("....") {
        return true;
    }

    // single and double URL encoding
    const ENCODED: [&str; 11] = [
        "%2e%2e", "%252e%252e", "%2e/", "%252e%2f", "/%2e", "%2f%2e", "%2e\\", "%2e%5c", "%5c%2e", "%5c%5c", "%00",
    ];
    if ENCODED.iter().any(|p| lower.contains(p)) {
        return true;
    }

    path.contains('\0')
}

fn is_suspicious_user_agent(ua: &str) -> bool {
    let ua_lower = ua.to_lowercase();
    ua_lower.contains("scanner")
        || (ua_lower.contains("crawler") && !ua_lower.contains("googlebot") && !ua_lower.contains("bingbot"))
        || ua_lower.contains("nikto")
        || ua_lower.contains("sqlmap")
        || ua_lower.contains("havij")
        || ua_lower.contains("acunetix")
}

/// Strips control characters and caps the length of client-supplied text before logging.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .take(200)
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_traversal_detection() {
        assert!(contains_path_traversal("../etc/passwd"));
        assert!(contains_path_traversal("/uploads/../libris.db"));
        assert!(contains_path_traversal("/uploads/%2e%2e/libris.db"));
        assert!(contains_path_traversal("path\0with\0null"));

        assert!(!contains_path_traversal("/api/v1/book/all"));
        assert!(!contains_path_traversal("/uploads/avatars/3f1c.png"));
    }

    #[test]
    fn test_suspicious_user_agents() {
        assert!(is_suspicious_user_agent("nikto/2.1.5"));
        assert!(is_suspicious_user_agent("sqlmap/1.0"));
        assert!(!is_suspicious_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"));
        assert!(!is_suspicious_user_agent("Googlebot/2.1 crawler"));
    }

    #[test]
    fn test_sanitize_for_logging() {
        assert_eq!(sanitize_for_logging("normal text"), "normal text");
        let sanitized = sanitize_for_logging("text\x00with\x01control");
        assert!(!sanitized.contains('\x00'));
        assert!(!sanitized.contains('\x01'));
        assert_eq!(sanitize_for_logging(&"a".repeat(300)).len(), 200);
    }
}

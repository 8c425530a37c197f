//! Middleware and extractors for HTTP request processing.
//!
//! Request validation, rate limiting and security headers are layered onto the router;
//! session handling lives in extractors that handlers opt into.

pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod security_headers;
pub mod validation;

pub use auth::{AdminUser, AuthUser};
pub use ip::ClientIp;
pub use rate_limit::EndpointRateLimiter;

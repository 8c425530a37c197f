use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::ledger::LoanPolicy;
use crate::mail::{LogMailer, Mailer};
use crate::metrics::Metrics;
use crate::middleware::rate_limit::RateLimiter;
use crate::middleware::EndpointRateLimiter;

/// Endpoint keys used with [`EndpointRateLimiter`].
pub const LOGIN_ENDPOINT: &str = "/auth/login";
pub const REGISTER_ENDPOINT: &str = "/auth/register";
pub const VERIFY_OTP_ENDPOINT: &str = "/auth/verify-otp";
pub const FORGOT_PASSWORD_ENDPOINT: &str = "/auth/password/forgot";

/// The shared application state.
///
/// Cloned into every handler, middleware and background sweep. All members are
/// cheap handles to shared data.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: sqlx::SqlitePool,
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// Operational counters.
    pub metrics: Metrics,
    /// Global per-IP limiter applied to every request.
    pub global_limiter: RateLimiter,
    /// Tighter per-endpoint limits for the credential endpoints.
    pub rate_limiter: EndpointRateLimiter,
    /// Source of "now" for due dates, fines, token expiry and sweeps.
    pub clock: Arc<dyn Clock>,
    /// Outgoing mail transport.
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Creates the state with the system clock and the logging mailer.
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let mailer = Arc::new(LogMailer::new(config.mail.from.clone()));
        Self::with_parts(db, config, Arc::new(SystemClock), mailer)
    }

    /// Creates the state with explicit clock and mailer.
    pub fn with_parts(
        db: sqlx::SqlitePool,
        config: AppConfig,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let rl = &config.rate_limit;
        let global_limiter = RateLimiter::new(rl.max_requests, rl.window_seconds);
        let rate_limiter = EndpointRateLimiter::new().with_limits(vec![
            (LOGIN_ENDPOINT, rl.login_per_minute, 60),
            (REGISTER_ENDPOINT, rl.register_per_minute, 60),
            (VERIFY_OTP_ENDPOINT, rl.login_per_minute, 60),
            (FORGOT_PASSWORD_ENDPOINT, rl.forgot_password_per_minute, 60),
        ]);

        Self {
            db,
            config: Arc::new(config),
            metrics: Metrics::new(),
            global_limiter,
            rate_limiter,
            clock,
            mailer,
        }
    }

    pub fn loan_policy(&self) -> LoanPolicy {
        LoanPolicy::from_config(&self.config.borrow)
    }
}

use std::path::Path;

use serde::Deserialize;

use crate::ledger::fine::FINE_PER_DAY_CENTS;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the prebuilt single-page frontend.
    pub ui_dir: String,
    /// Public origin of the frontend, used for links in outgoing mail.
    pub frontend_url: String,
    /// Take the client address from `x-forwarded-for` / `x-real-ip`. Only enable
    /// behind a reverse proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expire_days: i64,
    pub cookie_expire_days: i64,
    pub cookie_secure: bool,
    pub otp_ttl_secs: i64,
    pub reset_token_ttl_secs: i64,
    pub max_unverified_attempts: i64,
    /// Wrong codes tolerated per registration attempt before its code is cleared.
    #[serde(default = "default_max_otp_failures")]
    pub max_otp_failures: i64,
}

fn default_max_otp_failures() -> i64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct BorrowConfig {
    pub loan_days: i64,
    #[serde(default = "default_fine_per_day")]
    pub fine_per_day_cents: i64,
}

fn default_fine_per_day() -> i64 {
    FINE_PER_DAY_CENTS
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub overdue_grace_secs: i64,
    pub unverified_max_age_secs: i64,
    pub reminder_concurrency: usize,
    pub send_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    pub max_avatar_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
    pub login_per_minute: usize,
    pub register_per_minute: usize,
    pub forgot_password_per_minute: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

/// First administrator, created at startup when no verified account uses `email`.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdminConfig {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub borrow: BorrowConfig,
    pub sweeps: SweepConfig,
    pub mail: MailConfig,
    pub uploads: UploadConfig,
    pub rate_limit: RateLimitConfig,
    pub security: Option<SecurityConfig>,
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdminConfig>,
}

/// Upper bound for loan periods.
pub const MAX_LOAN_DAYS: i64 = 3650;
/// Upper bound for session, code and token lifetimes and for sweep age thresholds.
pub const MAX_LIFETIME_DAYS: i64 = 365;
const MAX_LIFETIME_SECS: i64 = MAX_LIFETIME_DAYS * 24 * 60 * 60;

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: libris.toml (in CWD)
        .add_source(::config::File::with_name("libris").required(false));

    if let Ok(custom_path) = std::env::var("LIBRIS_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("LIBRIS").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }
    if cfg.database.max_connections == 0 {
        return Err(anyhow::anyhow!("database.max_connections must be > 0"));
    }

    // Auth
    if cfg.auth.jwt_secret.trim().len() < 16 {
        return Err(anyhow::anyhow!("auth.jwt_secret must be at least 16 characters"));
    }
    if !cfg!(debug_assertions) && cfg.auth.jwt_secret == AppConfig::default().auth.jwt_secret {
        return Err(anyhow::anyhow!("auth.jwt_secret must be overridden in release builds"));
    }
    let session_days = 1..=MAX_LIFETIME_DAYS;
    if !session_days.contains(&cfg.auth.jwt_expire_days) || !session_days.contains(&cfg.auth.cookie_expire_days) {
        return Err(anyhow::anyhow!(
            "auth.jwt_expire_days and auth.cookie_expire_days must be in 1..={}",
            MAX_LIFETIME_DAYS
        ));
    }
    let token_secs = 1..=MAX_LIFETIME_SECS;
    if !token_secs.contains(&cfg.auth.otp_ttl_secs) || !token_secs.contains(&cfg.auth.reset_token_ttl_secs) {
        return Err(anyhow::anyhow!("auth token lifetimes must be in 1..={} seconds", MAX_LIFETIME_SECS));
    }
    if cfg.auth.max_unverified_attempts <= 0 {
        return Err(anyhow::anyhow!("auth.max_unverified_attempts must be > 0"));
    }
    if cfg.auth.max_otp_failures <= 0 {
        return Err(anyhow::anyhow!("auth.max_otp_failures must be > 0"));
    }

    // Borrow
    if !(1..=MAX_LOAN_DAYS).contains(&cfg.borrow.loan_days) {
        return Err(anyhow::anyhow!("borrow.loan_days must be in 1..={}", MAX_LOAN_DAYS));
    }
    if cfg.borrow.fine_per_day_cents < 0 {
        return Err(anyhow::anyhow!("borrow.fine_per_day_cents must be >= 0"));
    }

    // Sweeps
    if cfg.sweeps.interval_secs == 0 {
        return Err(anyhow::anyhow!("sweeps.interval_secs must be > 0"));
    }
    if cfg.sweeps.send_timeout_secs == 0 {
        return Err(anyhow::anyhow!("sweeps.send_timeout_secs must be > 0"));
    }
    if cfg.sweeps.reminder_concurrency == 0 || cfg.sweeps.reminder_concurrency > 64 {
        return Err(anyhow::anyhow!("sweeps.reminder_concurrency must be in 1..=64"));
    }
    let ages = 0..=MAX_LIFETIME_SECS;
    if !ages.contains(&cfg.sweeps.overdue_grace_secs) || !ages.contains(&cfg.sweeps.unverified_max_age_secs) {
        return Err(anyhow::anyhow!("sweep age thresholds must be in 0..={} seconds", MAX_LIFETIME_SECS));
    }

    // Rate limiting
    if cfg.rate_limit.window_seconds == 0 || cfg.rate_limit.max_requests == 0 {
        return Err(anyhow::anyhow!("rate_limit.max_requests and rate_limit.window_seconds must be > 0"));
    }

    if let Some(admin) = &cfg.bootstrap_admin {
        let len = admin.password.chars().count();
        if admin.email.trim().is_empty() || !(8..=16).contains(&len) {
            return Err(anyhow::anyhow!("bootstrap_admin needs an email and an 8..=16 character password"));
        }
    }

    if cfg.uploads.max_avatar_bytes == 0 {
        return Err(anyhow::anyhow!("uploads.max_avatar_bytes must be > 0"));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    let path = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"));
    if let Some(path) = path {
        if path.starts_with(":memory:") {
            return Ok(());
        }
        let p = Path::new(path.split('?').next().unwrap_or(path));
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}

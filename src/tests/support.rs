//! Shared fixtures: a router over a throwaway SQLite file, a manual clock and a
//! mailer that records instead of sending.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::accounts::{self, NewUser};
use crate::catalog::{self, NewBook};
use crate::clock::{from_millis, to_millis, Clock, ManualClock};
use crate::config::AppConfig;
use crate::credentials::{hash_password, issue_token};
use crate::mail::{Email, Mailer};
use crate::routes;
use crate::state::AppState;
use crate::types::{Book, Role, User};

pub const PASSWORD: &str = "s3cret-pass";

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    failing: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<Email> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }

    pub fn fail_for(&self, to: &str) {
        self.failing.lock().unwrap().insert(to.to_string());
    }

    pub fn recover(&self, to: &str) {
        self.failing.lock().unwrap().remove(to);
        self.stalled.lock().unwrap().remove(to);
    }

    /// Sends to `to` hang until the caller gives up.
    pub fn stall_for(&self, to: &str) {
        self.stalled.lock().unwrap().insert(to.to_string());
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        let stalled = self.stalled.lock().unwrap().contains(&email.to);
        if stalled {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().unwrap().contains(&email.to) {
            anyhow::bail!("mailbox {} unavailable", email.to);
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.database.url = format!("sqlite://{}", dir.path().join("libris.db").display());
    cfg.server.ui_dir = dir.path().join("ui").display().to_string();
    cfg.server.frontend_url = "http://ui.test".to_string();
    cfg.uploads.dir = dir.path().join("uploads").display().to_string();
    cfg.auth.jwt_secret = "test-secret-with-enough-length".to_string();
    cfg.rate_limit.register_per_minute = 100;
    cfg.rate_limit.login_per_minute = 100;
    cfg.rate_limit.forgot_password_per_minute = 100;
    cfg
}

pub async fn test_pool(dir: &TempDir) -> sqlx::SqlitePool {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", dir.path().join("libris.db").display()))
        .unwrap()
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10));
    let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await.unwrap();
    crate::db::init_db(&pool).await.unwrap();
    pool
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub clock: ManualClock,
    pub mailer: Arc<RecordingMailer>,
    _dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(tweak: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(&dir);
    tweak(&mut cfg);
    let pool = test_pool(&dir).await;
    // whole milliseconds, matching storage precision
    let clock = ManualClock::new(from_millis(to_millis(Utc::now())));
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::with_parts(pool, cfg, Arc::new(clock.clone()), mailer.clone());
    let app = routes::router(state.clone());
    TestApp { app, state, clock, mailer, _dir: dir }
}

impl TestApp {
    pub fn db(&self) -> &sqlx::SqlitePool {
        &self.state.db
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send_raw(req).await;
        let json = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).unwrap_or(Value::Null) };
        (status, json)
    }

    pub async fn send_raw(&self, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    pub async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        self.send(json_request(method, uri, token, body)).await
    }

    pub async fn seed_user(&self, name: &str, email: &str, role: Role) -> User {
        let hash = hash_password(PASSWORD.to_string()).await.unwrap();
        accounts::insert(
            self.db(),
            NewUser { name, email, password_hash: &hash, role, account_verified: true, avatar_url: None },
            self.clock.now(),
        )
        .await
        .unwrap()
    }

    pub async fn seed_book(&self, title: &str, quantity: i64, price_cents: i64) -> Book {
        catalog::insert_book(
            self.db(),
            NewBook { title, author: "Anon", description: "A book", price_cents, quantity },
            self.clock.now(),
        )
        .await
        .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        let auth = &self.state.config.auth;
        issue_token(&user.id, &auth.jwt_secret, chrono::Duration::days(auth.jwt_expire_days), self.clock.now())
            .unwrap()
    }

    /// An admin and its bearer token.
    pub async fn admin(&self) -> (User, String) {
        let admin = self.seed_user("Admin", "admin@library.test", Role::Admin).await;
        let token = self.token_for(&admin);
        (admin, token)
    }

    pub async fn book_quantity(&self, id: &str) -> (i64, bool) {
        sqlx::query_as("SELECT quantity, availability FROM books WHERE id = ?1")
            .bind(id)
            .fetch_one(self.db())
            .await
            .unwrap()
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&v).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

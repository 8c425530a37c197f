use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::clock::from_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::User => "User",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "Admin" {
            Role::Admin
        } else {
            Role::User
        }
    }
}

// ---------- users ----------

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub account_verified: bool,
    pub verification_code: Option<i64>,
    pub verification_code_expire: Option<i64>,
    pub reset_password_token: Option<String>,
    pub reset_password_expire: Option<i64>,
    pub avatar_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A user account. Credentials and one-time codes are never serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub account_verified: bool,
    #[serde(skip_serializing)]
    pub verification_code: Option<i64>,
    #[serde(skip_serializing)]
    pub verification_code_expire: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_password_expire: Option<DateTime<Utc>>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            role: Role::parse(&r.role),
            account_verified: r.account_verified,
            verification_code: r.verification_code,
            verification_code_expire: r.verification_code_expire.map(from_millis),
            reset_password_token: r.reset_password_token,
            reset_password_expire: r.reset_password_expire.map(from_millis),
            avatar_url: r.avatar_url,
            created_at: from_millis(r.created_at),
            updated_at: from_millis(r.updated_at),
        }
    }
}

pub const USER_COLUMNS: &str = "id, name, email, password_hash, role, account_verified, verification_code, \
     verification_code_expire, reset_password_token, reset_password_expire, avatar_url, created_at, updated_at";

// ---------- books ----------

#[derive(Debug, Clone, FromRow)]
pub struct BookRow {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub price_cents: i64,
    pub quantity: i64,
    pub availability: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub price_cents: i64,
    pub quantity: i64,
    pub availability: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BookRow> for Book {
    fn from(r: BookRow) -> Self {
        Self {
            id: r.id,
            title: r.title,
            author: r.author,
            description: r.description,
            price_cents: r.price_cents,
            quantity: r.quantity,
            availability: r.availability,
            created_at: from_millis(r.created_at),
            updated_at: from_millis(r.updated_at),
        }
    }
}

pub const BOOK_COLUMNS: &str =
    "id, title, author, description, price_cents, quantity, availability, created_at, updated_at";

// ---------- borrow ledger ----------

#[derive(Debug, Clone, FromRow)]
pub struct BorrowRow {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub book_id: String,
    pub book_title: String,
    pub price_cents: i64,
    pub borrowed_date: i64,
    pub due_date: i64,
    pub return_date: Option<i64>,
    pub fine_cents: i64,
    pub notified: bool,
    pub created_at: i64,
}

/// Borrower identity as it was when the loan was recorded.
#[derive(Debug, Clone, Serialize)]
pub struct BorrowerSnapshot {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// One borrow event in the ledger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecord {
    pub id: String,
    pub user: BorrowerSnapshot,
    pub book_id: String,
    pub book_title: String,
    pub price_cents: i64,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub fine_cents: i64,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<BorrowRow> for BorrowRecord {
    fn from(r: BorrowRow) -> Self {
        Self {
            id: r.id,
            user: BorrowerSnapshot { id: r.user_id, name: r.user_name, email: r.user_email },
            book_id: r.book_id,
            book_title: r.book_title,
            price_cents: r.price_cents,
            borrowed_date: from_millis(r.borrowed_date),
            due_date: from_millis(r.due_date),
            return_date: r.return_date.map(from_millis),
            fine_cents: r.fine_cents,
            notified: r.notified,
            created_at: from_millis(r.created_at),
        }
    }
}

pub const BORROW_COLUMNS: &str = "id, user_id, user_name, user_email, book_id, book_title, price_cents, \
     borrowed_date, due_date, return_date, fine_cents, notified, created_at";

/// A user's view of one of their loans, derived from the ledger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowEntry {
    pub book_id: String,
    pub book_title: String,
    pub returned: bool,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub fine_cents: i64,
}

impl From<BorrowRecord> for BorrowEntry {
    fn from(r: BorrowRecord) -> Self {
        Self {
            book_id: r.book_id,
            book_title: r.book_title,
            returned: r.return_date.is_some(),
            borrowed_date: r.borrowed_date,
            due_date: r.due_date,
            return_date: r.return_date,
            fine_cents: r.fine_cents,
        }
    }
}

/// Ledger record joined with the current book and borrower documents (admin view).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowDetails {
    #[serde(flatten)]
    pub record: BorrowRecord,
    pub book: Option<Book>,
    pub borrower: Option<User>,
}

// ---------- request bodies ----------
//
// Fields are optional so that missing values produce the API's own 400 messages
// instead of a serde rejection.

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// OTPs arrive both as JSON numbers and as strings from form inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OtpInput {
    Number(i64),
    Text(String),
}

impl OtpInput {
    pub fn as_code(&self) -> Option<i64> {
        match self {
            OtpInput::Number(n) => Some(*n),
            OtpInput::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: Option<String>,
    pub otp: Option<OtpInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_new_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BorrowRequest {
    pub email: Option<String>,
}

// ---------- responses ----------

/// Success envelope: `{ "success": true, ...payload }`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionBody {
    pub message: String,
    pub user: User,
    pub token: String,
}

/// Formats integer cents as dollars, e.g. `1250` -> `12.50`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

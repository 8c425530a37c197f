//! Outgoing mail.
//!
//! Delivery sits behind [`Mailer`]. The shipped [`LogMailer`] writes each message to
//! the structured log; a transport for a real relay plugs in at the same seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        tracing::info!(
            from = %self.from,
            to = %email.to,
            subject = %email.subject,
            bytes = email.html.len(),
            "mail dispatched"
        );
        tracing::debug!(to = %email.to, body = %email.html, "mail body");
        Ok(())
    }
}

fn layout(title: &str, inner: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>{title}</title></head>
<body style="font-family: Arial, sans-serif;">
  <div style="max-width: 600px; margin: 20px auto; padding: 20px; border: 1px solid #ccc;">
    <h2 style="color: #333;">{title}</h2>
    {inner}
    <p style="font-size: 12px; color: #777;">This is an automated message from the library. Please do not reply.</p>
  </div>
</body>
</html>"#
    )
}

pub fn verification_otp(to: &str, code: i64, ttl_minutes: i64) -> Email {
    let inner = format!(
        r#"<p>Please use the following code to verify your library account:</p>
    <div style="text-align: center; padding: 20px;"><strong style="font-size: 24px; color: #007bff;">{code}</strong></div>
    <p>This code expires in {ttl_minutes} minutes. If you did not register, ignore this email.</p>"#
    );
    Email { to: to.to_string(), subject: "Verification Code (Library Management System)".to_string(), html: layout("Verification Code", &inner) }
}

pub fn password_reset(to: &str, reset_url: &str, ttl_minutes: i64) -> Email {
    let inner = format!(
        r#"<p>We received a request to reset your password. Follow the link below to choose a new one:</p>
    <p style="text-align: center;"><a href="{reset_url}" style="color: #007bff;">Reset password</a></p>
    <p>The link is valid for {ttl_minutes} minutes. If you did not request this, ignore this email.</p>"#
    );
    Email { to: to.to_string(), subject: "Library Password Recovery".to_string(), html: layout("Password Reset Request", &inner) }
}

pub fn overdue_reminder(to: &str, name: &str, book_title: &str, due: DateTime<Utc>) -> Email {
    let inner = format!(
        r#"<p>Hello {name},</p>
    <p>Your loan of <strong>{book_title}</strong> was due on {due} and is now <span style="color: #dc3545; font-weight: bold;">overdue</span>.</p>
    <p>Please return it as soon as possible. Late returns are charged per started day.</p>"#,
        due = due.format("%Y-%m-%d")
    );
    Email { to: to.to_string(), subject: "Book Return Reminder".to_string(), html: layout("Library Book Return Reminder", &inner) }
}

//! Account lifecycle: registration with OTP verification, sessions and password recovery.

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use serde::Serialize;
use tower_cookies::{
    cookie::{time::Duration as CookieDuration, SameSite},
    Cookie, Cookies,
};

use super::ApiJson;
use crate::accounts::{self, NewUser};
use crate::credentials::{
    generate_otp, generate_reset_token, hash_password, hash_reset_token, issue_token, verify_password,
};
use crate::error::validation::{normalize_email, required, required_raw, validate_email, validate_password_length};
use crate::error::{AppError, AppResult};
use crate::mail;
use crate::middleware::auth::SESSION_COOKIE;
use crate::middleware::{AuthUser, ClientIp};
use crate::state::{AppState, FORGOT_PASSWORD_ENDPOINT, LOGIN_ENDPOINT, REGISTER_ENDPOINT, VERIFY_OTP_ENDPOINT};
use crate::types::{
    Envelope, ForgotPasswordRequest, LoginRequest, MessageBody, RegisterRequest, ResetPasswordRequest,
    Role, SessionBody, UpdatePasswordRequest, User, VerifyOtpRequest,
};

const PASSWORD_LENGTH_MESSAGE: &str = "Password must be between 8 and 16 characters.";
const OTP_LOCKED_MESSAGE: &str = "Too many invalid attempts. Please register again.";

#[derive(Serialize)]
pub struct UserBody {
    pub user: User,
}

fn message(status: StatusCode, text: impl Into<String>) -> impl IntoResponse {
    (status, Json(Envelope::ok(MessageBody { message: text.into() })))
}

/// Signs a session for `user`, sets the cookie and echoes the token in the body.
fn send_session(
    state: &AppState,
    cookies: &Cookies,
    user: User,
    status: StatusCode,
    text: &str,
) -> AppResult<impl IntoResponse> {
    let auth = &state.config.auth;
    let token = issue_token(&user.id, &auth.jwt_secret, Duration::days(auth.jwt_expire_days), state.clock.now())?;
    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .secure(auth.cookie_secure)
        .max_age(CookieDuration::days(auth.cookie_expire_days))
        .build();
    cookies.add(cookie);
    Ok((status, Json(Envelope::ok(SessionBody { message: text.to_string(), user, token }))))
}

pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    state.rate_limiter.check_endpoint_limit(REGISTER_ENDPOINT, ip).await?;

    let name = required(req.name, "Please enter all fields.")?;
    let email = required(req.email, "Please enter all fields.")?;
    let password = required_raw(req.password, "Please enter all fields.")?;
    let email = normalize_email(&email);
    validate_email(&email)?;

    if accounts::find_verified_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::BadRequest("User already registered".to_string()));
    }
    let attempts = accounts::count_unverified_by_email(&state.db, &email).await?;
    if attempts >= state.config.auth.max_unverified_attempts {
        return Err(AppError::BadRequest(
            "You have exceeded the number of registration attempts. Please contact support".to_string(),
        ));
    }
    validate_password_length(&password, PASSWORD_LENGTH_MESSAGE)?;

    let now = state.clock.now();
    let password_hash = hash_password(password).await?;
    let user = accounts::insert(
        &state.db,
        NewUser {
            name: &name,
            email: &email,
            password_hash: &password_hash,
            role: Role::User,
            account_verified: false,
            avatar_url: None,
        },
        now,
    )
    .await?;

    let ttl_secs = state.config.auth.otp_ttl_secs;
    let code = generate_otp();
    accounts::set_verification_code(&state.db, &user.id, code, now + Duration::seconds(ttl_secs), now).await?;
    state
        .mailer
        .send(mail::verification_otp(&email, code, ttl_secs / 60))
        .await
        .context("Verification code failed to send")?;

    state.metrics.inc_registrations();
    tracing::info!(user_id = %user.id, attempt = attempts + 1, "registration pending verification");
    Ok(message(StatusCode::CREATED, format!("Verification code sent to {}", email)))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    cookies: Cookies,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<VerifyOtpRequest>,
) -> AppResult<impl IntoResponse> {
    state.rate_limiter.check_endpoint_limit(VERIFY_OTP_ENDPOINT, ip).await?;

    let email = required(req.email, "Email or OTP is missing.")?;
    let otp = req.otp.ok_or_else(|| AppError::BadRequest("Email or OTP is missing.".to_string()))?;
    let email = normalize_email(&email);

    let attempts = accounts::find_unverified_by_email(&state.db, &email).await?;
    let newest = attempts.into_iter().next().ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let dropped = accounts::delete_other_unverified(&state.db, &newest.id, &email).await?;
    if dropped > 0 {
        tracing::debug!(email = %email, dropped, "collapsed older registration attempts");
    }

    // An attempt without a code was locked after too many wrong guesses
    if newest.verification_code.is_none() {
        return Err(AppError::BadRequest(OTP_LOCKED_MESSAGE.to_string()));
    }
    let now = state.clock.now();
    if otp.as_code().is_none() || otp.as_code() != newest.verification_code {
        let locked =
            accounts::record_otp_failure(&state.db, &newest.id, state.config.auth.max_otp_failures, now).await?;
        if locked {
            tracing::warn!(user_id = %newest.id, "verification code locked after repeated failures");
            return Err(AppError::BadRequest(OTP_LOCKED_MESSAGE.to_string()));
        }
        return Err(AppError::BadRequest("Invalid otp".to_string()));
    }
    match newest.verification_code_expire {
        Some(expires) if expires >= now => {}
        _ => return Err(AppError::BadRequest("OTP Expired".to_string())),
    }

    accounts::collapse_and_verify(&state.db, &newest.id, &email, now).await?;
    let user = accounts::find_by_id(&state.db, &newest.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    tracing::info!(user_id = %user.id, "account verified");
    send_session(&state, &cookies, user, StatusCode::OK, "Account Verified.")
}

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    state.rate_limiter.check_endpoint_limit(LOGIN_ENDPOINT, ip).await?;

    let email = required(req.email, "Please enter all fields.")?;
    let password = required_raw(req.password, "Please enter all fields.")?;
    let email = normalize_email(&email);

    let user = accounts::find_verified_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    if !verify_password(password, user.password_hash.clone()).await? {
        return Err(AppError::Unauthorized("Incorrect password".to_string()));
    }

    state.metrics.inc_logins();
    send_session(&state, &cookies, user, StatusCode::OK, "User logged in successfully.")
}

pub async fn logout(AuthUser(user): AuthUser, cookies: Cookies) -> AppResult<impl IntoResponse> {
    let expired = Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(CookieDuration::ZERO)
        .build();
    cookies.add(expired);
    tracing::debug!(user_id = %user.id, "logged out");
    Ok(message(StatusCode::OK, "Logged out successfully."))
}

pub async fn me(AuthUser(user): AuthUser) -> AppResult<impl IntoResponse> {
    Ok(Json(Envelope::ok(UserBody { user })))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    state.rate_limiter.check_endpoint_limit(FORGOT_PASSWORD_ENDPOINT, ip).await?;

    let email = normalize_email(&required(req.email, "Email is required")?);
    let user = accounts::find_verified_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let now = state.clock.now();
    let ttl_secs = state.config.auth.reset_token_ttl_secs;
    let (raw, digest) = generate_reset_token();
    accounts::set_reset_token(&state.db, &user.id, Some(&digest), Some(now + Duration::seconds(ttl_secs)), now)
        .await?;

    let url = format!("{}/password/reset/{}", state.config.server.frontend_url.trim_end_matches('/'), raw);
    if let Err(e) = state.mailer.send(mail::password_reset(&email, &url, ttl_secs / 60)).await {
        // A token nobody received must not stay valid
        accounts::set_reset_token(&state.db, &user.id, None, None, now).await?;
        return Err(AppError::Internal(e.context("Password reset mail failed to send")));
    }

    Ok(message(StatusCode::OK, format!("Email sent to {} successfully", email)))
}

pub async fn reset_password(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(token): Path<String>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    let now = state.clock.now();
    let user = accounts::find_by_reset_token(&state.db, &hash_reset_token(token.trim()), now)
        .await?
        .ok_or_else(|| AppError::BadRequest("Reset password token is invalid or has been expired.".to_string()))?;

    let password = required_raw(req.password, "Please enter all fields.")?;
    let confirm = required_raw(req.confirm_password, "Please enter all fields.")?;
    if password != confirm {
        return Err(AppError::BadRequest("Password and confirm password do not match.".to_string()));
    }
    validate_password_length(&password, PASSWORD_LENGTH_MESSAGE)?;

    let password_hash = hash_password(password).await?;
    accounts::set_password(&state.db, &user.id, &password_hash, now).await?;
    let user = accounts::find_by_id(&state.db, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    tracing::info!(user_id = %user.id, "password reset");
    send_session(&state, &cookies, user, StatusCode::OK, "Password reset successfully.")
}

pub async fn update_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(req): ApiJson<UpdatePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    let current = required_raw(req.current_password, "Please enter all fields.")?;
    let new_password = required_raw(req.new_password, "Please enter all fields.")?;
    let confirm = required_raw(req.confirm_new_password, "Please enter all fields.")?;

    if !verify_password(current, user.password_hash.clone()).await? {
        return Err(AppError::BadRequest("Current password is incorrect.".to_string()));
    }
    validate_password_length(&new_password, PASSWORD_LENGTH_MESSAGE)?;
    if new_password != confirm {
        return Err(AppError::BadRequest("New password and confirm new password do not match.".to_string()));
    }

    let password_hash = hash_password(new_password).await?;
    accounts::set_password(&state.db, &user.id, &password_hash, state.clock.now()).await?;
    Ok(message(StatusCode::OK, "Password updated."))
}

use std::path::PathBuf;

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::accounts::{self, NewUser};
use crate::credentials::hash_password;
use crate::error::validation::{normalize_email, required, required_raw, validate_email, validate_password_length};
use crate::error::{AppError, AppResult};
use crate::middleware::AdminUser;
use crate::state::AppState;
use crate::types::{Envelope, Role, User};

#[derive(Serialize)]
pub struct UsersBody {
    pub users: Vec<User>,
}

#[derive(Serialize)]
pub struct AdminBody {
    pub message: String,
    pub admin: User,
}

/// Verified accounts only; pending registrations are not users yet.
pub async fn list_users(State(state): State<AppState>, _admin: AdminUser) -> AppResult<impl IntoResponse> {
    let users = accounts::list_verified(&state.db).await?;
    Ok(Json(Envelope::ok(UsersBody { users })))
}

struct Avatar {
    bytes: Bytes,
    extension: &'static str,
}

fn avatar_extension(content_type: Option<&str>) -> Option<&'static str> {
    match content_type? {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[derive(Default)]
struct AdminForm {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    avatar: Option<Avatar>,
}

async fn read_admin_form(mut multipart: Multipart, max_avatar_bytes: usize) -> AppResult<AdminForm> {
    let mut form = AdminForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" => form.name = Some(field.text().await?),
            "email" => form.email = Some(field.text().await?),
            "password" => form.password = Some(field.text().await?),
            "avatar" => {
                let extension = avatar_extension(field.content_type())
                    .ok_or_else(|| AppError::BadRequest("File format not supported.".to_string()))?;
                let bytes = field.bytes().await?;
                if bytes.len() > max_avatar_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "Avatar exceeds maximum size of {} bytes",
                        max_avatar_bytes
                    )));
                }
                form.avatar = Some(Avatar { bytes, extension });
            }
            other => tracing::debug!(field = %other, "ignoring unknown multipart field"),
        }
    }
    Ok(form)
}

pub async fn add_new_admin(
    State(state): State<AppState>,
    AdminUser(creator): AdminUser,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let form = read_admin_form(multipart, state.config.uploads.max_avatar_bytes).await?;
    let avatar = form.avatar.ok_or_else(|| AppError::BadRequest("Admin avatar is required.".to_string()))?;
    let name = required(form.name, "Please fill all fields.")?;
    let email = normalize_email(&required(form.email, "Please fill all fields.")?);
    let password = required_raw(form.password, "Please fill all fields.")?;
    validate_email(&email)?;

    if accounts::find_verified_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::BadRequest("User already registered".to_string()));
    }
    validate_password_length(&password, "Password must be between 8 and 16 characters.")?;
    let password_hash = hash_password(password).await?;

    // Nothing fallible may run between writing the avatar and the insert that owns it
    let dir = PathBuf::from(&state.config.uploads.dir).join("avatars");
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = format!("{}.{}", Uuid::new_v4(), avatar.extension);
    let path = dir.join(&file_name);
    tokio::fs::write(&path, &avatar.bytes).await?;
    let avatar_url = format!("/uploads/avatars/{}", file_name);

    let inserted = accounts::insert(
        &state.db,
        NewUser {
            name: &name,
            email: &email,
            password_hash: &password_hash,
            role: Role::Admin,
            account_verified: true,
            avatar_url: Some(&avatar_url),
        },
        state.clock.now(),
    )
    .await;
    let admin = match inserted {
        Ok(admin) => admin,
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), "failed to remove orphaned avatar: {}", rm);
            }
            return Err(e.into());
        }
    };

    tracing::info!(admin_id = %admin.id, created_by = %creator.id, "admin account created");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(AdminBody { message: "Admin registered successfully.".to_string(), admin })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_image_avatars_are_accepted() {
        assert_eq!(avatar_extension(Some("image/png")), Some("png"));
        assert_eq!(avatar_extension(Some("image/jpeg")), Some("jpg"));
        assert_eq!(avatar_extension(Some("image/webp")), Some("webp"));
        assert_eq!(avatar_extension(Some("image/gif")), None);
        assert_eq!(avatar_extension(Some("application/pdf")), None);
        assert_eq!(avatar_extension(None), None);
    }
}

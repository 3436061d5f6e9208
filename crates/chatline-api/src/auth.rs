use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::SaltString,
};
use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand_core::OsRng;
use tracing::{info, warn};
use uuid::Uuid;

use chatline_types::api::{
    AuthResponse, LoginRequest, ProfileResponse, RefreshResponse, SignupRequest, StatusResponse,
};
use chatline_types::models::User;

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::form::read_form;
use crate::media::{MediaFolder, Upload};
use crate::state::{AppState, blocking};

pub const REFRESH_COOKIE: &str = "refreshToken";

const MIN_PASSWORD_LEN: usize = 6;

fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let max_age = time::Duration::seconds(state.tokens.refresh_ttl().as_secs() as i64);
    Cookie::build((REFRESH_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.config.production)
        .path("/")
        .max_age(max_age)
        .build()
}

fn clear_refresh_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

/// Mint a session pair and make the refresh token the user's only valid one.
async fn start_session(state: &AppState, user_id: Uuid) -> Result<(String, String), ApiError> {
    let access = state.tokens.issue_access_token(user_id)?;
    let refresh = state.tokens.issue_refresh_token(user_id)?;

    let id = user_id.to_string();
    let stored = refresh.clone();
    blocking(state, move |db| db.set_refresh_token(&id, Some(&stored))).await?;

    Ok((access, refresh))
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if full_name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Missing details"));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("Invalid email address"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let lookup = email.clone();
    if blocking(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::validation("Account already exists"));
    }

    // Hash password with Argon2id
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))??;

    let user_id = Uuid::new_v4();
    let bio = req.bio.map(|b| b.trim().to_string()).filter(|b| !b.is_empty());

    let id = user_id.to_string();
    // The lookup above can race another signup; the UNIQUE constraint decides
    let row = blocking(&state, move |db| {
        if !db.create_user(&id, &full_name, &email, &password_hash, bio.as_deref())? {
            return Ok(None);
        }
        db.get_user_by_id(&id)
    })
    .await?
    .ok_or_else(|| ApiError::validation("Account already exists"))?;

    let (token, refresh) = start_session(&state, user_id).await?;
    info!("New account {}", user_id);

    Ok((
        StatusCode::CREATED,
        jar.add(refresh_cookie(&state, refresh)),
        Json(AuthResponse {
            success: true,
            message: "Account created successfully".into(),
            user_data: row.into_user(),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Missing details"));
    }

    let row = blocking(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::validation("Invalid credentials"))?;

    // Verify password; unparseable hashes belong to accounts that cannot log in
    let password = req.password;
    let stored_hash = row.password.clone();
    let valid = tokio::task::spawn_blocking(move || {
        PasswordHash::new(&stored_hash)
            .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;

    if !valid {
        return Err(ApiError::validation("Invalid credentials"));
    }

    let user = row.into_user();
    let (token, refresh) = start_session(&state, user.id).await?;

    Ok((
        jar.add(refresh_cookie(&state, refresh)),
        Json(AuthResponse {
            success: true,
            message: "Login successful".into(),
            user_data: user,
            token,
        }),
    ))
}

/// Verify the presented refresh token against the stored one and rotate it.
/// A verified token that no longer matches the stored value means it was
/// replayed, so the stored token is revoked and the user must log in again.
async fn rotate(state: &AppState, presented: &str) -> Result<(User, String, String), ApiError> {
    let claims = state
        .tokens
        .verify_refresh_token(presented)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    let id = claims.sub.to_string();
    let row = blocking(state, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let next = state.tokens.issue_refresh_token(claims.sub)?;

    let id = row.id.clone();
    let current = presented.to_string();
    let replacement = next.clone();
    let rotated = row.refresh_token.as_deref() == Some(presented)
        && blocking(state, move |db| db.rotate_refresh_token(&id, &current, &replacement)).await?;

    if !rotated {
        warn!("Refresh token reuse detected for {}, revoking session", claims.sub);
        let id = row.id.clone();
        blocking(state, move |db| db.set_refresh_token(&id, None)).await?;
        return Err(ApiError::unauthorized("Refresh token reuse detected, please log in again"));
    }

    let access = state.tokens.issue_access_token(claims.sub)?;
    Ok((row.into_user(), access, next))
}

pub async fn refresh_token(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(presented) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()) else {
        return ApiError::unauthorized("No refresh token").into_response();
    };

    match rotate(&state, &presented).await {
        Ok((user, token, refresh)) => (
            jar.add(refresh_cookie(&state, refresh)),
            Json(RefreshResponse {
                success: true,
                token,
                user_data: user,
            }),
        )
            .into_response(),
        Err(e) => (clear_refresh_cookie(jar), e).into_response(),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let id = user.id.to_string();
    blocking(&state, move |db| db.set_refresh_token(&id, None)).await?;
    info!("{} logged out", user.id);

    Ok((
        clear_refresh_cookie(jar),
        Json(StatusResponse {
            success: true,
            message: "Logged out".into(),
        }),
    ))
}

/// PUT /auth/update-profile: multipart `fullName`, `bio`, and `profilePic` file.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(multipart?, "profilePic").await?;
    let full_name = form.text("fullName").map(str::to_string);
    let bio = form.text("bio").map(str::to_string);

    let profile_pic = match form.file {
        Some(file) => {
            if !user.upload_enabled {
                return Err(ApiError::forbidden("Uploads are disabled for this account"));
            }
            let url = state
                .media
                .upload(Upload {
                    bytes: file.bytes,
                    content_type: file.content_type,
                    folder: MediaFolder::Avatars,
                })
                .await?;
            Some(url)
        }
        None => None,
    };

    let id = user.id.to_string();
    let row = blocking(&state, move |db| {
        db.update_profile(&id, full_name.as_deref(), bio.as_deref(), profile_pic.as_deref())?;
        db.get_user_by_id(&id)
    })
    .await?
    .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    Ok(Json(ProfileResponse {
        success: true,
        user: row.into_user(),
    }))
}

/// GET /auth/get-profile (also /auth/check)
pub async fn get_profile(Extension(user): Extension<User>) -> impl IntoResponse {
    Json(ProfileResponse {
        success: true,
        user,
    })
}

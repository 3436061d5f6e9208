use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use chatline_types::models::User;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify an access token and resolve the user it names.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = state
        .tokens
        .verify_access_token(token)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    let id = claims.sub.to_string();
    blocking(state, move |db| db.get_user_by_id(&id))
        .await?
        .map(|row| row.into_user())
        .ok_or_else(|| ApiError::unauthorized("User not found"))
}

/// Extract and validate the access token, then attach the `User` to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::unauthorized("Not authorized, no token"))?;

    let user = authenticate(&state, token).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

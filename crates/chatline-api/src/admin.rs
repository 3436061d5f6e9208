use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use chatline_types::api::{ProfileResponse, UserFlagsRequest};
use chatline_types::models::User;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::state::{AppState, blocking};

/// PUT /admin/users/{user_id}/flags: toggle a user's upload / assistant access.
pub async fn set_user_flags(
    State(state): State<AppState>,
    ApiPath(target_id): ApiPath<Uuid>,
    Extension(admin): Extension<User>,
    ApiJson(req): ApiJson<UserFlagsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.config.is_admin(&admin.email) {
        return Err(ApiError::forbidden("Admin access required"));
    }

    let id = target_id.to_string();
    let (upload_enabled, ai_enabled) = (req.upload_enabled, req.ai_enabled);
    let row = blocking(&state, move |db| {
        if !db.set_user_flags(&id, upload_enabled, ai_enabled)? {
            return Ok(None);
        }
        db.get_user_by_id(&id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(
        "{} set flags on {}: upload={:?} ai={:?}",
        admin.id, target_id, upload_enabled, ai_enabled
    );

    Ok(Json(ProfileResponse {
        success: true,
        user: row.into_user(),
    }))
}

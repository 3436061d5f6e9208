use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::media::MAX_UPLOAD_SIZE;
use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{admin, ai, auth, gateway, messages};

/// 2 MB limit for JSON bodies
const MAX_JSON_SIZE: usize = 2 * 1024 * 1024;

/// The full HTTP surface: `/api/*`, the WebSocket gateway, and `/uploads`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh-token", post(auth::refresh_token))
        .route("/socket", get(gateway::ws_upgrade))
        .route("/status", get(|| async { "Server is live" }));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route(
            "/auth/update-profile",
            put(auth::update_profile).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/auth/get-profile", get(auth::get_profile))
        .route("/auth/check", get(auth::get_profile))
        .route("/messages/users", get(messages::get_users_for_sidebar))
        .route("/messages/{user_id}", get(messages::get_messages))
        .route(
            "/messages/send/{user_id}",
            post(messages::send_message).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/messages/seen/{message_id}", put(messages::mark_seen))
        .route("/ai/chat", post(ai::chat))
        .route("/ai/limiter", get(ai::get_limiter).post(ai::set_limiter))
        .route("/admin/users/{user_id}/flags", put(admin::set_user_flags))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api = Router::new().merge(public_routes).merge(protected_routes);

    Router::new()
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(DefaultBodyLimit::max(MAX_JSON_SIZE))
        .layer(cors_layer(state.config.cors_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Cookies only travel cross-origin with an explicit origin; without one the
/// API stays permissive for header-token clients.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let Some(origin) = origin else {
        return CorsLayer::permissive();
    };

    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(value))
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        Err(e) => {
            warn!("Ignoring invalid CHATLINE_CORS_ORIGIN '{}': {}", origin, e);
            CorsLayer::permissive()
        }
    }
}

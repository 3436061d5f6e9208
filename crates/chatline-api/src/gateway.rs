use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;

use chatline_gateway::connection;

use crate::error::ApiError;
use crate::middleware::{authenticate, bearer_token};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
}

/// GET /socket: the access token is checked before the upgrade, so an
/// unauthenticated client never gets a socket. The header wins over the
/// `?token=` fallback for clients that cannot set headers.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(query.token.filter(|t| !t.is_empty()))
        .ok_or_else(|| ApiError::unauthorized("Not authorized, no token"))?;

    let user = authenticate(&state, &token).await.inspect_err(|e| {
        warn!("Rejected gateway handshake: {}", e);
    })?;

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, user.id)))
}

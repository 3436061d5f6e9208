use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::{debug, warn};
use uuid::Uuid;

use chatline_db::queries::NewMessage;
use chatline_types::api::{
    MessagesResponse, NewMessageResponse, SendMessageRequest, StatusResponse, UsersResponse,
};
use chatline_types::events::GatewayEvent;
use chatline_types::models::{Message, User};

use crate::error::ApiError;
use crate::extract::ApiPath;
use crate::form::read_form;
use crate::media::{MediaFolder, Upload, decode_data_url, image_extension};
use crate::state::{AppState, blocking};

/// GET /messages/users: everyone else, plus unseen counts keyed by sender.
pub async fn get_users_for_sidebar(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let me = user.id.to_string();
    let (rows, counts) = blocking(&state, move |db| {
        let rows = db.list_users_except(&me)?;
        let counts = db.unseen_counts(&me)?;
        Ok((rows, counts))
    })
    .await?;

    let unseen_counts: HashMap<Uuid, i64> = counts
        .into_iter()
        .filter_map(|(sender, count)| match sender.parse() {
            Ok(id) => Some((id, count)),
            Err(e) => {
                warn!("Corrupt sender_id '{}' in unseen counts: {}", sender, e);
                None
            }
        })
        .collect();

    Ok(Json(UsersResponse {
        success: true,
        users: rows.into_iter().map(|r| r.into_user()).collect(),
        unseen_counts,
    }))
}

/// GET /messages/{user_id}: full conversation; inbound messages become seen.
pub async fn get_messages(
    State(state): State<AppState>,
    ApiPath(other_id): ApiPath<Uuid>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let me = user.id.to_string();
    let other = other_id.to_string();

    let rows = blocking(&state, move |db| {
        let marked = db.mark_conversation_seen(&other, &me)?;
        if marked > 0 {
            debug!("Marked {} messages from {} as seen", marked, other);
        }
        db.get_conversation(&me, &other)
    })
    .await?;

    Ok(Json(MessagesResponse {
        success: true,
        messages: rows.into_iter().map(|r| r.into_message()).collect(),
    }))
}

/// POST /messages/send/{user_id}: JSON `{text, image}` where image is a
/// data URL, or multipart with a `text` field and an `image` file.
pub async fn send_message(
    State(state): State<AppState>,
    ApiPath(receiver_id): ApiPath<Uuid>,
    Extension(user): Extension<User>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (text, image) = if is_multipart {
        let multipart = Multipart::from_request(req, &state).await?;
        let form = read_form(multipart, "image").await?;
        let text = form.text("text").map(str::to_string);
        let image = form.file.map(|f| (f.content_type, f.bytes));
        (text, image)
    } else {
        let Json(body) = Json::<SendMessageRequest>::from_request(req, &state).await?;
        let text = body
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let image = match body.image.as_deref().map(str::trim).filter(|i| !i.is_empty()) {
            Some(url) => {
                let (content_type, bytes) = decode_data_url(url)
                    .filter(|(ct, _)| image_extension(ct).is_some())
                    .ok_or_else(|| ApiError::validation("Image must be a base64 image data URL"))?;
                Some((content_type, bytes))
            }
            None => None,
        };
        (text, image)
    };

    if text.is_none() && image.is_none() {
        return Err(ApiError::validation("Message must have text or an image"));
    }

    let receiver = receiver_id.to_string();
    if blocking(&state, move |db| db.get_user_by_id(&receiver)).await?.is_none() {
        return Err(ApiError::not_found("Receiver not found"));
    }

    // Upload first so a failed upload leaves nothing behind
    let image_url = match image {
        Some((content_type, bytes)) => {
            if !user.upload_enabled {
                return Err(ApiError::forbidden("Uploads are disabled for this account"));
            }
            let url = state
                .media
                .upload(Upload {
                    bytes,
                    content_type,
                    folder: MediaFolder::Messages,
                })
                .await?;
            Some(url)
        }
        None => None,
    };

    let new_message = deliver(&state, user.id, receiver_id, text, image_url).await?;

    Ok((
        StatusCode::CREATED,
        Json(NewMessageResponse {
            success: true,
            new_message,
        }),
    ))
}

/// PUT /messages/seen/{message_id}: only the receiver may mark; repeat calls are no-ops.
pub async fn mark_seen(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let id = message_id.to_string();
    let row = blocking(&state, move |db| db.get_message(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    if row.receiver_id != user.id.to_string() {
        return Err(ApiError::forbidden("Only the receiver can mark a message as seen"));
    }

    if !row.seen {
        blocking(&state, move |db| db.mark_message_seen(&row.id)).await?;
    }

    Ok(Json(StatusResponse {
        success: true,
        message: "Message marked as seen".into(),
    }))
}

/// Persist a message, then push it to every live connection of the receiver.
pub async fn deliver(
    state: &AppState,
    sender_id: Uuid,
    receiver_id: Uuid,
    text: Option<String>,
    image: Option<String>,
) -> Result<Message, ApiError> {
    let id = Uuid::new_v4().to_string();
    let sender = sender_id.to_string();
    let receiver = receiver_id.to_string();

    let row = blocking(state, move |db| {
        db.insert_message(&NewMessage {
            id: &id,
            sender_id: &sender,
            receiver_id: &receiver,
            text: text.as_deref(),
            image: image.as_deref(),
        })
    })
    .await?;

    let message = row.into_message();
    let delivered = state
        .dispatcher
        .send_to_user(receiver_id, GatewayEvent::NewMessage(message.clone()))
        .await;
    debug!("Message {} pushed to {} connection(s)", message.id, delivered);

    Ok(message)
}

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use axum_extra::extract::WithRejection;
use tracing::warn;
use uuid::Uuid;

use courier_types::api::{
    BlockResponse, ChatAction, ChatSummary, ChatsResponse, ContactProfile, CreateChatResponse,
};

use crate::auth::AppState;
use crate::clock_time;
use crate::error::{ApiError, Result, join_error};
use crate::middleware::Identity;

/// Display-name fallback for chats whose resolved name is missing.
const UNKNOWN_NAME: &str = "Unknown";

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ChatsResponse>> {
    let db = state.clone();
    let uid = identity.0.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.list_chats(&uid))
        .await
        .map_err(join_error)??;

    let chats = rows
        .into_iter()
        .map(|row| {
            let id = row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt chat id '{}': {}", row.id, e);
                Uuid::default()
            });
            ChatSummary {
                id,
                name: row.name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                avatar: row.avatar_url.unwrap_or_default(),
                is_online: row.peer_online,
                last_message: row.last_message.unwrap_or_default(),
                timestamp: row
                    .last_message_at
                    .as_deref()
                    .map(clock_time)
                    .unwrap_or_default(),
                unread: row.unread,
                is_typing: false,
            }
        })
        .collect();

    Ok(Json(ChatsResponse { chats }))
}

/// POST /chats dispatches on the body's `action` tag.
pub async fn chat_action(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Json(req), _): WithRejection<Json<ChatAction>, ApiError>,
) -> Result<Response> {
    match req {
        ChatAction::Create { phone } => create_chat(state, identity, phone).await,
        ChatAction::Block { chat_id } => block_chat(state, identity, chat_id).await,
    }
}

/// Find-or-create the 1:1 chat with the owner of `phone`.
async fn create_chat(state: AppState, identity: Identity, phone: String) -> Result<Response> {
    let db = state.clone();
    let lookup = phone.clone();
    let contact = tokio::task::spawn_blocking(move || db.db.user_by_phone(&lookup))
        .await
        .map_err(join_error)??
        .ok_or_else(|| ApiError::NotFound(format!("no user with phone {}", phone)))?;

    let db = state.clone();
    let uid = identity.0.to_string();
    let contact_id = contact.id.clone();
    let fresh_id = Uuid::new_v4().to_string();
    let chat_id = tokio::task::spawn_blocking(move || {
        db.db.find_or_create_direct_chat(&uid, &contact_id, &fresh_id)
    })
    .await
    .map_err(join_error)??;

    let chat_id = chat_id.parse().unwrap_or_else(|e| {
        warn!("Corrupt chat id '{}': {}", chat_id, e);
        Uuid::default()
    });
    let contact_uuid = contact.id.parse().unwrap_or_else(|e| {
        warn!("Corrupt user id '{}': {}", contact.id, e);
        Uuid::default()
    });

    Ok(Json(CreateChatResponse {
        chat_id,
        contact: ContactProfile {
            id: contact_uuid,
            name: contact.name,
            avatar: contact.avatar_url,
        },
    })
    .into_response())
}

/// One-sided block of the caller's own participant row. The chat id is not
/// validated against the caller's membership; flagging a row that does not
/// exist is a no-op.
async fn block_chat(state: AppState, identity: Identity, chat_id: Uuid) -> Result<Response> {
    let db = state.clone();
    let uid = identity.0.to_string();
    let cid = chat_id.to_string();
    tokio::task::spawn_blocking(move || db.db.block_chat(&cid, &uid))
        .await
        .map_err(join_error)??;

    Ok(Json(BlockResponse { success: true }).into_response())
}

use axum::extract::{Query, State};
use axum::{Extension, Json};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use courier_db::queries::NewMessage;
use courier_types::api::{
    Attachment, MessageStatus, MessageView, MessagesResponse, SendMessageRequest,
    SendMessageResponse,
};

use crate::auth::AppState;
use crate::clock_time;
use crate::error::{ApiError, Result, join_error};
use crate::middleware::Identity;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Optional so its absence maps to an explicit 400 rather than a bare
    /// extractor rejection.
    pub chat_id: Option<Uuid>,
}

/// Fetch a chat's full history, oldest first. Not read-only: every message
/// the caller did not send is marked read as part of the fetch, so the
/// returned statuses reflect the state the recipient saw on open.
pub async fn history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Query(query), _): WithRejection<Query<HistoryQuery>, ApiError>,
) -> Result<Json<MessagesResponse>> {
    let chat_id = query
        .chat_id
        .ok_or_else(|| ApiError::BadRequest("chatId required".to_string()))?;

    let db = state.clone();
    let uid = identity.0.to_string();
    let cid = chat_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.chat_history_marking_read(&cid, &uid))
        .await
        .map_err(join_error)??;

    let caller = identity.0.to_string();
    let messages = rows
        .into_iter()
        .map(|row| {
            let id = row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt message id '{}': {}", row.id, e);
                Uuid::default()
            });
            let attachment = row.attachment_type.map(|kind| Attachment {
                kind,
                url: row.attachment_url,
                name: row.attachment_name,
            });
            MessageView {
                id,
                timestamp: clock_time(&row.created_at),
                is_sent: row.sender_id == caller,
                status: if row.is_read {
                    MessageStatus::Read
                } else {
                    MessageStatus::Sent
                },
                text: row.text,
                attachment,
            }
        })
        .collect();

    Ok(Json(MessagesResponse { messages }))
}

/// Append a message from the caller. The attachment triple is passed through
/// as independent nullable columns.
pub async fn send(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<Json<SendMessageResponse>> {
    if req.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text required".to_string()));
    }

    let message_id = Uuid::new_v4();
    let msg = NewMessage {
        id: message_id.to_string(),
        chat_id: req.chat_id.to_string(),
        sender_id: identity.0.to_string(),
        text: req.text.clone(),
        attachment_type: req.attachment_type.clone(),
        attachment_url: req.attachment_url.clone(),
        attachment_name: req.attachment_name.clone(),
    };

    let db = state.clone();
    let created_at = tokio::task::spawn_blocking(move || db.db.append_message(&msg))
        .await
        .map_err(join_error)??;

    let attachment = req.attachment_type.map(|kind| Attachment {
        kind,
        url: req.attachment_url,
        name: req.attachment_name,
    });

    Ok(Json(SendMessageResponse {
        message: MessageView {
            id: message_id,
            text: req.text,
            timestamp: clock_time(&created_at),
            is_sent: true,
            status: MessageStatus::Sent,
            attachment,
        },
    }))
}

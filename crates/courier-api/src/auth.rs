use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use courier_db::Database;
use courier_db::queries::{NewUser, ProviderKey};
use courier_types::api::{AuthRequest, AuthResponse, UserProfile};

use crate::error::{ApiError, Result, join_error};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
}

/// Resolve-or-create an account from an identity claim.
///
/// Lookup goes through the claim's provider key; a known key returns the
/// stored profile unchanged, an unknown one inserts the claimed fields.
/// Either way the user is marked online and receives their capability token
/// (the string form of the user id).
pub async fn authenticate(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<AuthRequest>, ApiError>,
) -> Result<Json<AuthResponse>> {
    let candidate_id = Uuid::new_v4().to_string();

    let (key, new_user) = match req {
        AuthRequest::Google {
            google_id,
            email,
            name,
            avatar,
            phone,
        } => (
            ProviderKey::Google(google_id.clone()),
            NewUser {
                id: candidate_id,
                phone: phone.unwrap_or(email),
                name: name.unwrap_or_default(),
                avatar_url: avatar.unwrap_or_default(),
                google_id: Some(google_id),
                telegram_id: None,
            },
        ),
        AuthRequest::Telegram {
            telegram_id,
            username,
            first_name,
            photo_url,
            phone,
        } => (
            ProviderKey::Telegram(telegram_id.clone()),
            NewUser {
                id: candidate_id,
                name: first_name.unwrap_or_else(|| username.clone()),
                phone: phone.unwrap_or(username),
                avatar_url: photo_url.unwrap_or_default(),
                google_id: None,
                telegram_id: Some(telegram_id),
            },
        ),
        AuthRequest::Phone { phone, name } => (
            ProviderKey::Phone(phone.clone()),
            NewUser {
                id: candidate_id,
                phone,
                name: name.unwrap_or_default(),
                avatar_url: String::new(),
                google_id: None,
                telegram_id: None,
            },
        ),
    };

    let db = state.clone();
    let (user, created) = tokio::task::spawn_blocking(move || db.db.resolve_user(&key, &new_user))
        .await
        .map_err(join_error)??;

    if created {
        info!(user_id = %user.id, "Created account");
    }

    let id: Uuid = user.id.parse().map_err(|_| ApiError::Internal)?;

    Ok(Json(AuthResponse {
        user: UserProfile {
            id,
            phone: user.phone,
            name: user.name,
            bio: user.bio,
            avatar: user.avatar_url,
        },
        token: id.to_string(),
    }))
}

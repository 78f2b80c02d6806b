use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::error::ApiError;

/// Caller identity, extracted from the X-User-Id header.
///
/// The header is an opaque capability — it is not checked against a session
/// store. Handlers read `Identity` from request extensions, so moving to a
/// verified credential only touches this middleware.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Uuid);

pub const USER_ID_HEADER: &str = "x-user-id";

/// Reject requests that carry no parseable user id.
pub async fn require_identity(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uuid>().ok())
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(Identity(user_id));
    Ok(next.run(req).await)
}

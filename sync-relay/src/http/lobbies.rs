//! Lobby endpoints: create/reclaim and read-only info.

use crate::auth::{authenticate, AuthError};
use crate::error::LobbyError;
use crate::instance::rejection_message;
use crate::server::LobbyRelay;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use sync_types::{ErrorCode, LobbyCode, LobbyInfo};

/// Body of `POST /lobbies`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyRequest {
    /// Code to reclaim or initialise; omitted for a fresh code.
    #[serde(default)]
    pub code: Option<String>,
}

/// Response of `POST /lobbies`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyResponse {
    /// The lobby code.
    pub code: LobbyCode,
    /// Unix seconds at creation.
    pub created_at: u64,
}

/// JSON error body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    code: ErrorCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, err.to_string())
    }
}

impl From<LobbyError> for ApiError {
    fn from(err: LobbyError) -> Self {
        let status = match err {
            LobbyError::AlreadyInitialized(_) => StatusCode::CONFLICT,
            LobbyError::NotFound(_) | LobbyError::Gone(_) => StatusCode::NOT_FOUND,
            LobbyError::CodesExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        ApiError::new(status, err.code(), err.to_string())
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

/// `POST /lobbies`
pub async fn create_lobby_handler(
    Extension(relay): Extension<Arc<LobbyRelay>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateLobbyResponse>), ApiError> {
    if relay.rate_limits().check_global().is_err() {
        relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::RateLimited,
            rejection_message(ErrorCode::RateLimited),
        ));
    }

    let identity = authenticate(relay.verifier(), bearer(&headers)).await?;

    let request: CreateLobbyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateLobbyRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidMessage, e.to_string())
        })?
    };

    let code = request
        .code
        .as_deref()
        .map(LobbyCode::parse)
        .transpose()
        .map_err(|e| {
            ApiError::new(StatusCode::BAD_REQUEST, ErrorCode::InvalidMessage, e.to_string())
        })?;

    let record = relay.create_lobby(&identity, code).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateLobbyResponse {
            code: record.code,
            created_at: record.created_at,
        }),
    ))
}

/// `GET /lobbies/:code`
pub async fn lobby_info_handler(
    Extension(relay): Extension<Arc<LobbyRelay>>,
    Path(code): Path<String>,
) -> Result<Json<LobbyInfo>, ApiError> {
    let not_found = || {
        ApiError::new(
            StatusCode::NOT_FOUND,
            ErrorCode::LobbyNotFound,
            rejection_message(ErrorCode::LobbyNotFound),
        )
    };
    let code = LobbyCode::parse(&code).map_err(|_| not_found())?;
    relay.info(&code).await.map(Json).ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_optional() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer(&headers), Some("abc"));
        headers.insert(AUTHORIZATION, "raw".parse().unwrap());
        assert_eq!(bearer(&headers), Some("raw"));
        assert_eq!(bearer(&HeaderMap::new()), None);
    }

    #[test]
    fn lobby_errors_map_to_status() {
        let code = LobbyCode::parse("ABC234").unwrap();
        let err: ApiError = LobbyError::AlreadyInitialized(code).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, ErrorCode::AlreadyInitialized);
    }
}

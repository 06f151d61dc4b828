//! Relay lobby HTTP API.

use crate::error::{ClientError, TransportError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sync_types::{ErrorCode, LobbyCode, LobbyInfo, SyncError};

/// A lobby created or reclaimed through `POST /lobbies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedLobby {
    /// The lobby code.
    pub code: LobbyCode,
    /// Unix seconds at creation.
    pub created_at: u64,
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a LobbyCode>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
}

/// Lobby management calls.
#[async_trait]
pub trait LobbyApi: Send + Sync {
    /// Create a lobby, or reclaim `code` for the caller.
    async fn create_lobby(
        &self,
        token: &str,
        code: Option<&LobbyCode>,
    ) -> Result<CreatedLobby, ClientError>;

    /// Read-only roster and metadata.
    async fn lobby_info(&self, code: &LobbyCode) -> Result<LobbyInfo, ClientError>;
}

/// [`LobbyApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLobbyApi {
    base: String,
    http: reqwest::Client,
}

impl HttpLobbyApi {
    /// Create a client for the relay at `base` (`http://host:port`).
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn error_for(response: reqwest::Response, code: Option<&LobbyCode>) -> ClientError {
        let status = response.status();
        let body = response.json::<ErrorBody>().await.ok();
        match (status, code) {
            (StatusCode::CONFLICT, Some(code)) => ClientError::CodeTaken(code.clone()),
            (StatusCode::UNAUTHORIZED, _) => SyncError::Unauthorized.into(),
            (StatusCode::NOT_FOUND, _) => SyncError::NotFound.into(),
            _ => match body {
                Some(body) => TransportError::Rejected {
                    code: body.code,
                    message: body.message,
                }
                .into(),
                None => TransportError::ReceiveFailed(format!("unexpected status {}", status)).into(),
            },
        }
    }
}

fn request_failed(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        TransportError::Timeout.into()
    } else {
        TransportError::ConnectionFailed(err.to_string()).into()
    }
}

#[async_trait]
impl LobbyApi for HttpLobbyApi {
    async fn create_lobby(
        &self,
        token: &str,
        code: Option<&LobbyCode>,
    ) -> Result<CreatedLobby, ClientError> {
        let response = self
            .http
            .post(format!("{}/lobbies", self.base))
            .bearer_auth(token)
            .json(&CreateBody { code })
            .send()
            .await
            .map_err(request_failed)?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, code).await);
        }
        let created: CreatedLobby = response.json().await.map_err(|e| {
            ClientError::Transport(TransportError::ReceiveFailed(e.to_string()))
        })?;
        tracing::info!("Lobby {} ready", created.code);
        Ok(created)
    }

    async fn lobby_info(&self, code: &LobbyCode) -> Result<LobbyInfo, ClientError> {
        let response = self
            .http
            .get(format!("{}/lobbies/{}", self.base, code))
            .send()
            .await
            .map_err(request_failed)?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, Some(code)).await);
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Transport(TransportError::ReceiveFailed(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_body_omits_missing_code() {
        let body = serde_json::to_string(&CreateBody { code: None }).unwrap();
        assert_eq!(body, "{}");

        let code = LobbyCode::parse("ABC234").unwrap();
        let body = serde_json::to_string(&CreateBody { code: Some(&code) }).unwrap();
        assert_eq!(body, r#"{"code":"ABC234"}"#);
    }

    #[test]
    fn created_lobby_reads_camel_case() {
        let created: CreatedLobby =
            serde_json::from_str(r#"{"code":"XYZ789","createdAt":1700000000}"#).unwrap();
        assert_eq!(created.code.as_str(), "XYZ789");
        assert_eq!(created.created_at, 1_700_000_000);
    }

    #[tokio::test]
    async fn unreachable_relay_is_connection_failure() {
        let api = HttpLobbyApi::new("http://127.0.0.1:1");
        let err = api.create_lobby("tok", None).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::ConnectionFailed(_))
        ));
    }
}

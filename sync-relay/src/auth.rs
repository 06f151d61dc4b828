//! Credential verification.
//!
//! Identity issuance lives outside the relay; the relay only turns a bearer
//! token into an [`Identity`] through a [`CredentialVerifier`].

use async_trait::async_trait;
use sync_types::Identity;

use crate::server::now_secs;

/// Why a credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("missing credential")]
    Missing,
    /// Token did not verify.
    #[error("invalid credential: {0}")]
    Invalid(String),
    /// Token verified but the identity has expired.
    #[error("credential expired")]
    Expired,
}

/// Turns a bearer token into an identity.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify `token`.
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Verify a token and reject identities that are no longer valid.
pub async fn authenticate(
    verifier: &dyn CredentialVerifier,
    token: Option<&str>,
) -> Result<Identity, AuthError> {
    let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or(AuthError::Missing)?;
    let identity = verifier.verify(token).await?;
    if !identity.is_valid_at(now_secs()) {
        return Err(AuthError::Expired);
    }
    Ok(identity)
}

/// Development verifier: any non-empty token is a guest whose subject is the token.
#[derive(Debug, Clone)]
pub struct OpenVerifier {
    guest_ttl_secs: u64,
}

impl OpenVerifier {
    /// Create a verifier issuing guests valid for `guest_ttl_secs`.
    pub fn new(guest_ttl_secs: u64) -> Self {
        Self { guest_ttl_secs }
    }
}

#[async_trait]
impl CredentialVerifier for OpenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.len() > 256 {
            return Err(AuthError::Invalid("token too long".into()));
        }
        Ok(Identity::guest(
            token,
            now_secs().saturating_add(self.guest_ttl_secs),
        ))
    }
}

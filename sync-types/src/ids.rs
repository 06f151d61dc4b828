//! Identity types for tablesync: lobby codes, peer ids, verified identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::SyncError;

/// Characters a lobby code may contain.
///
/// Excludes `0 O 1 I L` so a code read aloud or off a phone screen
/// cannot be mistyped.
pub const LOBBY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of every lobby code.
pub const LOBBY_CODE_LEN: usize = 6;

/// A short, human-shareable lobby code such as `ABC234`.
///
/// Always upper-case and always [`LOBBY_CODE_LEN`] characters drawn from
/// [`LOBBY_CODE_ALPHABET`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LobbyCode(String);

impl LobbyCode {
    /// Generate a random lobby code.
    ///
    /// Uses rejection sampling over OS randomness so every character of
    /// the alphabet is equally likely.
    pub fn generate() -> Self {
        let alphabet_len = LOBBY_CODE_ALPHABET.len();
        // Largest multiple of the alphabet length that fits in a byte.
        let limit = (256 / alphabet_len) * alphabet_len;

        let mut code = String::with_capacity(LOBBY_CODE_LEN);
        let mut buf = [0u8; 16];
        while code.len() < LOBBY_CODE_LEN {
            getrandom::getrandom(&mut buf).expect("getrandom failed");
            for byte in buf {
                if code.len() == LOBBY_CODE_LEN {
                    break;
                }
                if (byte as usize) < limit {
                    code.push(LOBBY_CODE_ALPHABET[byte as usize % alphabet_len] as char);
                }
            }
        }
        Self(code)
    }

    /// Parse a user-entered code. Input is trimmed and upper-cased.
    pub fn parse(input: &str) -> Result<Self, SyncError> {
        let normalized = input.trim().to_ascii_uppercase();
        if normalized.len() != LOBBY_CODE_LEN {
            return Err(SyncError::InvalidCode(format!(
                "expected {} characters, got {}",
                LOBBY_CODE_LEN,
                normalized.chars().count()
            )));
        }
        if let Some(bad) = normalized
            .bytes()
            .find(|b| !LOBBY_CODE_ALPHABET.contains(b))
        {
            return Err(SyncError::InvalidCode(format!(
                "character {:?} is not allowed",
                bad as char
            )));
        }
        Ok(Self(normalized))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for LobbyCode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LobbyCode {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LobbyCode> for String {
    fn from(code: LobbyCode) -> Self {
        code.0
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LobbyCode({})", self.0)
    }
}

/// Identifier of a device within a lobby.
///
/// Chosen by the device and kept for the life of its session, so a
/// reconnect presents the same id and replaces the stale connection.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a new random PeerId (UUID v4).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(8).collect();
        write!(f, "PeerId({})", short)
    }
}

/// Role a device requests when attaching to a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single authoritative device.
    Host,
    /// A passive mirror.
    Client,
}

impl Role {
    /// Lower-case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Client => "client",
        }
    }
}

/// What kind of principal a credential resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IdentityKind {
    /// A signed-in user.
    User,
    /// A time-boxed guest.
    #[serde(rename_all = "camelCase")]
    Guest {
        /// Unix timestamp (seconds) after which the guest is no longer valid.
        expires_at: u64,
    },
}

/// A verified identity, produced by the credential verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable subject identifier (user id or guest id).
    pub subject: String,
    /// User or guest.
    #[serde(flatten)]
    pub kind: IdentityKind,
}

impl Identity {
    /// A signed-in user identity.
    pub fn user(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            kind: IdentityKind::User,
        }
    }

    /// A guest identity valid until `expires_at` (Unix seconds).
    pub fn guest(subject: impl Into<String>, expires_at: u64) -> Self {
        Self {
            subject: subject.into(),
            kind: IdentityKind::Guest { expires_at },
        }
    }

    /// Whether this identity is still valid at `now` (Unix seconds).
    pub fn is_valid_at(&self, now: u64) -> bool {
        match self.kind {
            IdentityKind::User => true,
            IdentityKind::Guest { expires_at } => now < expires_at,
        }
    }
}

//! Error types for the social API client.
//!
//! # Design
//! Four failure classes reach callers. `NotAuthenticated` is raised before a
//! request is built, so it never overlaps with a server-reported failure.
//! `Auth` and `Api` carry the message the server sent (or the operation's
//! fallback) and display as exactly that message. Anything that goes wrong
//! below HTTP semantics lands in `Transport`.

use thiserror::Error;

/// Failures below HTTP status semantics: the round-trip itself, or a body
/// that does not have the expected shape.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("invalid base url: {0}")]
    InvalidUrl(String),
}

/// Failures reading or writing persisted session keys.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("session storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("refusing to store a session with an empty token")]
    EmptyToken,
}

/// Errors returned by `SocialClient` operations and `SocialApi` parsers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A protected operation was called without an active session.
    #[error("User is not authenticated.")]
    NotAuthenticated,

    /// Login or registration was rejected.
    #[error("{message}")]
    Auth { status: u16, message: String },

    /// Any other non-2xx response.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ClientError {
    /// HTTP status for server-reported failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Auth { status, .. } | ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, ClientError::NotAuthenticated)
    }
}

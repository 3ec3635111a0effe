//! Error taxonomy shared by every client component.

use thiserror::Error;

use crate::models::CommentId;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The bearer token could not be decoded, or it has expired.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// No credential was available, or the server rejected it (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed to do this (403, or a local pre-check).
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Creating a comment failed; the prior tree is left as it was.
    #[error("submission failed: {0}")]
    SubmissionFailed(#[source] Box<ClientError>),

    /// Transport-level failure, no response was received.
    #[error("network failure: {0}")]
    NetworkFailure(#[source] reqwest::Error),

    /// Any other non-success status.
    #[error("server responded {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("content must not be empty")]
    EmptyContent,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Replies cannot have replies of their own.
    #[error("comment {0} is a reply and cannot be replied to")]
    InvalidParent(CommentId),

    /// A mutation is already in flight for this view.
    #[error("another {0} is still in progress")]
    Busy(&'static str),

    #[error("credential storage: {0}")]
    Storage(#[source] std::io::Error),
}

impl ClientError {
    /// True for the variants produced by a local authorization pre-check or
    /// a 403 from the server.
    pub fn is_forbidden(&self) -> bool {
        match self {
            ClientError::Forbidden(_) => true,
            ClientError::SubmissionFailed(inner) => inner.is_forbidden(),
            _ => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

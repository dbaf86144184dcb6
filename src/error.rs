//! Error taxonomy for policy reconciliation.
//!
//! Transport failures are produced by the API collaborator and passed
//! through untouched. Everything else is raised by this crate and aborts the
//! lifecycle pass that hit it; nothing here is retried.

use crate::policy::PolicyModel;
use thiserror::Error;

/// Failures raised by a [`PolicyApi`](crate::lifecycle::PolicyApi) transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fleet API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid Fleet endpoint URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to decode {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed policy response: {0}")]
    Shape(String),

    #[error("private state key {key:?} is reserved")]
    ReservedKey { key: String },

    #[error("failed to persist secret store: {0}")]
    Persist(String),

    #[error("private state storage error: {0}")]
    Storage(String),

    #[error("unresolved secret reference(s): {}", .0.join(", "))]
    UnresolvedSecrets(Vec<String>),

    /// The write reached the server; `model` is what it now holds.
    #[error(
        "policy {} was written but holds unresolved secret reference(s): {}",
        .model.id.as_deref().unwrap_or("?"),
        .unresolved.join(", ")
    )]
    UnresolvedAfterWrite {
        unresolved: Vec<String>,
        model: Box<PolicyModel>,
    },

    #[error("policy has no id; it was never created")]
    MissingId,

    #[error("resource {0:?} appears more than once in one run")]
    DuplicateResource(String),
}

impl PolicyError {
    pub fn decode(context: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { context, source }
    }
}

impl From<rusqlite::Error> for PolicyError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for PolicyError {
    fn from(e: r2d2::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;

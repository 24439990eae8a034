//! Error types for the access-control core.
//!
//! Nothing here is retryable: authorization is deterministic given the
//! current state, so retrying without a state change (a fresh search, a
//! new grant) cannot change the outcome. The core never catches these
//! internally; the embedding API layer decides the externally visible
//! response.

use crate::permission::Permission;
use thiserror::Error;

/// Result type used throughout the access-control core.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Errors surfaced to the request-handling layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The caller lacks a required basic permission.
    #[error("you do not have permission to: {}", .0.description())]
    MissingPermission(Permission),

    /// The cached search authorization has lapsed or never existed; the
    /// caller must run the search again.
    #[error("those search results are no longer available - please run the search again")]
    StaleSearchResults,

    /// Fewer items were authorized than requested. Only counts are
    /// reported; the denied ids are never named, so repeated denials
    /// cannot be used to enumerate hidden content.
    #[error(
        "you asked to access {requested} items but you were only authorised to access {authorized} of them"
    )]
    PartialAuthorization { requested: usize, authorized: usize },

    /// No profile exists for the presented access key.
    #[error("did not find an entry for that access key")]
    UnknownAccessKey,
}

impl AccessError {
    /// True for the authorization-denied family: everything except an
    /// unknown credential.
    pub fn is_authorization_denied(&self) -> bool {
        !matches!(self, AccessError::UnknownAccessKey)
    }
}

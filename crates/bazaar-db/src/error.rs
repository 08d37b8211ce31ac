use thiserror::Error;

/// Store failures, distinguished at the call site instead of raised
/// through the protocol boundary. The socket layer maps these to
/// negative acknowledgments, the HTTP layer to status codes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid, expired or mismatched session token, or the acting user
    /// lacks the required role/ownership.
    #[error("Unauthorized")]
    Unauthorized,

    /// The referenced chat/message/item/user does not exist.
    #[error("Not found")]
    NotFound,

    /// A uniqueness constraint (username/email already taken).
    #[error("Already taken")]
    Conflict,

    /// Rejected input (empty required field, unknown action string).
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

use thiserror::Error;

/// Errors raised while deriving token requirements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// A test case both requires and excludes the same permission.
    #[error("test case {test_id} requires and excludes {conflicting:?}")]
    SelfConflict {
        test_id: String,
        conflicting: Vec<String>,
    },

    /// The specification name is not one this suite knows how to consent for.
    #[error("unknown specification: `{0}`")]
    UnknownSpecType(String),
}

/// Result type for permission resolution.
pub type PermissionResult<T> = Result<T, PermissionError>;

//! Error types for context lookup, template preparation, and response validation.
//!
//! The three families map onto the failure classes a single test case can hit:
//! - [`ContextError`]: a key is absent or holds a different kind of value
//! - [`TemplateError`]: the request could not be prepared (fatal to the test case)
//! - [`ValidationError`]: one expectation rule was not met by the response

use thiserror::Error;

/// Context lookup errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Key is not present in the context.
    #[error("context key not found: {0}")]
    NotFound(String),

    /// Key is present but holds a different kind of value.
    #[error("context key {key} holds {actual}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Request preparation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `$name` token referenced a key the context does not hold.
    #[error("missing context variable: ${0}")]
    MissingContextVariable(String),

    /// A `$name` token resolved to a value that is not a string.
    #[error("context variable ${name} is not a string ({actual})")]
    NotAString { name: String, actual: &'static str },

    #[error("test case has no method")]
    EmptyMethod,

    #[error("test case has no endpoint")]
    EmptyEndpoint,

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// Claim templates could not be turned into a JWT.
    #[error("claims generation failed: {0}")]
    Claims(String),

    /// The `jwt-bearer` strategy needs a signing key in the context.
    #[error("no signing key available in context")]
    MissingSigningKey,

    #[error("unknown generation strategy: {0}")]
    UnknownStrategy(String),
}

impl From<ContextError> for TemplateError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::NotFound(key) => Self::MissingContextVariable(key),
            ContextError::TypeMismatch { key, actual, .. } => Self::NotAString { name: key, actual },
        }
    }
}

/// A single violated expectation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("(Expect:StatusCode) expected {expected}, got {actual}")]
    StatusCode { expected: u16, actual: u16 },

    #[error("({description}) header {header} not present")]
    HeaderMissing { description: String, header: String },

    #[error("({description}) header {header} expected {expected:?}, got {actual:?}")]
    HeaderValue {
        description: String,
        header: String,
        expected: String,
        actual: String,
    },

    #[error("({description}) json path {path} not found")]
    JsonPathMissing { description: String, path: String },

    #[error("({description}) json path {path} expected {expected:?}, got {actual:?}")]
    JsonValue {
        description: String,
        path: String,
        expected: String,
        actual: String,
    },

    #[error("({description}) regex {pattern} did not match {target}")]
    RegexMismatch {
        description: String,
        pattern: String,
        target: String,
    },

    #[error("({description}) invalid regex {pattern}: {reason}")]
    InvalidRegex {
        description: String,
        pattern: String,
        reason: String,
    },

    #[error("({description}) body length expected {expected}, got {actual}")]
    BodyLength {
        description: String,
        expected: usize,
        actual: usize,
    },

    #[error("({description}) no bearer token in Authorization header")]
    BearerMissing { description: String },

    #[error("({description}) match has no checkable field")]
    EmptyMatch { description: String },

    #[error("(contextPut {name}) could not extract value: {reason}")]
    ContextPut { name: String, reason: String },

    #[error("(Expect:SchemaValidation) {0}")]
    Schema(String),
}

/// Aggregated model error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid test case definition: {0}")]
    Definition(String),
}

/// Result type for context lookups.
pub type ContextResult<T> = Result<T, ContextError>;

/// Result type for request preparation.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

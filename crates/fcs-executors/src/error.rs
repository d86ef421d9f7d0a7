//! Executor, runner and consent error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::consent::TokenConsentIdItem;

/// Transport-level failure for a single request.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The prepared request cannot be expressed as an HTTP request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connection, TLS, timeout or body read failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors returned synchronously when starting a run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A run is already in progress on this runner.
    #[error("{0} runner already running")]
    AlreadyRunning(&'static str),

    /// A consent-provider component could not be loaded or prepared.
    #[error("component {name}: {reason}")]
    Component { name: String, reason: String },

    /// The context lacks parameters the component declares as inputs.
    #[error("component {component} cannot run, missing parameters {missing:?}")]
    Parameters {
        component: String,
        missing: Vec<String>,
    },
}

/// Run-level consent acquisition failures.
#[derive(Debug, Error)]
pub enum ConsentError {
    /// Fewer than `required` items arrived before the deadline.
    #[error("consent channel timeout: received {received} of {required} items")]
    Timeout {
        received: usize,
        required: usize,
        items: Vec<TokenConsentIdItem>,
    },

    /// Every flow ended but fewer than `required` items were reported.
    #[error("consent channel closed: received {received} of {required} items")]
    ChannelClosed {
        received: usize,
        required: usize,
        items: Vec<TokenConsentIdItem>,
    },

    /// At least one flow reported an error.
    #[error("consent acquisition failed: {}", .messages.join("; "))]
    FlowsFailed {
        messages: Vec<String>,
        items: Vec<TokenConsentIdItem>,
    },

    /// A flow could not be started.
    #[error("consent flow not started: {0}")]
    Dispatch(#[from] RunnerError),
}

impl ConsentError {
    /// Items received before the failure, if any.
    #[must_use]
    pub fn items(&self) -> &[TokenConsentIdItem] {
        match self {
            Self::Timeout { items, .. }
            | Self::ChannelClosed { items, .. }
            | Self::FlowsFailed { items, .. } => items,
            Self::Dispatch(_) => &[],
        }
    }
}

/// Authorization code exchange failures.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// A context value needed for the exchange is absent.
    #[error("cannot get {0} for code exchange")]
    MissingParameter(&'static str),

    /// The token endpoint answered with something other than 200.
    #[error("bad status code {status} from exchange token {endpoint}{}", oauth_suffix(.error.as_deref()))]
    BadStatus {
        status: u16,
        endpoint: String,
        /// OAuth `error` code, when the body carried one.
        error: Option<String>,
    },

    /// The token response was not the expected JSON.
    #[error("invalid token response: {0}")]
    InvalidTokenResponse(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

fn oauth_suffix(error: Option<&str>) -> String {
    error.map(|e| format!(": {e}")).unwrap_or_default()
}

/// Run configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing run config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is syntactically valid but unusable.
    #[error("invalid run config: {0}")]
    Invalid(String),

    /// The HTTP client could not be built from the transport settings.
    #[error("building HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

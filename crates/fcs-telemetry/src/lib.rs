//! FCS Telemetry - logging for the conformance suite
//!
//! - **Structured Logging**: pretty or JSON `tracing` output filtered by `RUST_LOG`
//! - **Redaction**: bearer tokens, client assertions and secrets are masked
//!   before request data is logged
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use fcs_telemetry::{TelemetryConfig, init_logging};
//!
//! init_logging(&TelemetryConfig::default().with_log_level("debug"))?;
//! tracing::info!(spec = "accounts", "starting run");
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod logging;

pub use logging::*;

use serde::{Deserialize, Serialize};

/// Key fragments whose values are always masked in log output.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "authorization",
    "token",
    "secret",
    "password",
    "assertion",
];

/// Logging configuration, usually read from the `[telemetry]` table of a run config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log level filter used when `RUST_LOG` is unset (e.g. "info", "debug").
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json_logs: bool,

    /// Extra key fragments to redact on top of [`SENSITIVE_FIELDS`].
    pub redact_fields: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            redact_fields: Vec::new(),
        }
    }
}

impl TelemetryConfig {
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    #[must_use]
    pub const fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    /// Add fields to redact from logs.
    #[must_use]
    pub fn with_redact_fields(mut self, fields: Vec<String>) -> Self {
        self.redact_fields.extend(fields);
        self
    }

    /// All fragments to redact: the defaults plus configured extras.
    #[must_use]
    pub fn all_redact_fields(&self) -> Vec<&str> {
        SENSITIVE_FIELDS
            .iter()
            .copied()
            .chain(self.redact_fields.iter().map(String::as_str))
            .collect()
    }
}

/// Telemetry error type.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}

//! Run configuration.
//!
//! ```toml
//! token_acquisition = "headless"
//! consent_timeout_secs = 30
//! request_timeout_secs = 30
//! follow_redirects = false
//!
//! [transport]
//! cert_path = "certs/transport.pem"
//! key_path = "certs/transport.key"
//!
//! [telemetry]
//! log_level = "debug"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fcs_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_CONSENT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How consent flows obtain tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenAcquisition {
    /// The PSU authorises interactively via the generated consent URL.
    #[default]
    Psu,
    /// The ASPSP auto-approves and the flow exchanges the code itself.
    Headless,
}

impl TokenAcquisition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Psu => "psu",
            Self::Headless => "headless",
        }
    }
}

impl fmt::Display for TokenAcquisition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutual TLS material for the ASPSP connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Client certificate chain, PEM.
    pub cert_path: Option<PathBuf>,
    /// Client private key, PEM.
    pub key_path: Option<PathBuf>,
    /// Extra trust anchor, PEM.
    pub ca_path: Option<PathBuf>,
    /// Skip server certificate verification (sandbox ASPSPs only).
    pub accept_invalid_certs: bool,
}

/// Settings for one conformance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub token_acquisition: TokenAcquisition,
    /// Global deadline for collecting consent flow results.
    pub consent_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub follow_redirects: bool,
    pub transport: Option<TransportConfig>,
    pub telemetry: TelemetryConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            token_acquisition: TokenAcquisition::default(),
            consent_timeout_secs: DEFAULT_CONSENT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            follow_redirects: false,
            transport: None,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parse and validate a TOML run config.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for bad TOML, [`ConfigError::Invalid`] for
    /// zero timeouts or a certificate without its key.
    pub fn from_toml_str(input: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML run config.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// # Errors
    ///
    /// [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.consent_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "consent_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(transport) = &self.transport {
            if transport.cert_path.is_some() != transport.key_path.is_some() {
                return Err(ConfigError::Invalid(
                    "transport cert_path and key_path must be set together".to_string(),
                ));
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn with_token_acquisition(mut self, mode: TokenAcquisition) -> Self {
        self.token_acquisition = mode;
        self
    }

    #[must_use]
    pub const fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub const fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    #[must_use]
    pub const fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.consent_timeout_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

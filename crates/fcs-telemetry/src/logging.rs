//! Structured logging with JSON output and sensitive data redaction.

use std::collections::BTreeMap;

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

use crate::{TelemetryConfig, TelemetryError};

const REDACTED: &str = "[REDACTED]";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.log_level` when set.
///
/// # Errors
///
/// Returns [`TelemetryError::LoggingInit`] if a global subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.json_logs {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);

        subscriber
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let pretty_layer = fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);

        subscriber
            .with(pretty_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    Ok(())
}

fn is_sensitive(key: &str, fields: &[&str]) -> bool {
    let key = key.to_lowercase();
    fields.iter().any(|f| key.contains(&f.to_lowercase()))
}

/// Redact sensitive fields from a JSON value.
///
/// Keys are matched case-insensitively by substring, so `access_token`
/// and `Authorization` are both caught by the defaults.
#[must_use]
pub fn redact_sensitive(value: &serde_json::Value, fields: &[&str]) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (key, val) in map {
                if is_sensitive(key, fields) {
                    result.insert(key.clone(), serde_json::Value::String(REDACTED.to_string()));
                } else {
                    result.insert(key.clone(), redact_sensitive(val, fields));
                }
            }
            serde_json::Value::Object(result)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(|v| redact_sensitive(v, fields)).collect())
        }
        other => other.clone(),
    }
}

/// Redact a header map before it is logged.
///
/// `fields` is usually [`TelemetryConfig::all_redact_fields`].
#[must_use]
pub fn redact_headers(headers: &BTreeMap<String, String>, fields: &[&str]) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if is_sensitive(name, fields) {
                REDACTED.to_string()
            } else {
                value.clone()
            };
            (name.clone(), shown)
        })
        .collect()
}

/// Redact sensitive `key=value` pairs of a form-encoded or query string.
///
/// A `request` parameter (a signed request object) is always masked.
#[must_use]
pub fn redact_query(query: &str, fields: &[&str]) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_sensitive(key, fields) || key == "request" => {
                format!("{key}={REDACTED}")
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SENSITIVE_FIELDS;
    use serde_json::json;

    #[test]
    fn test_init_logging_only_once() {
        let config = TelemetryConfig {
            json_logs: true,
            ..TelemetryConfig::default()
        };
        assert!(init_logging(&config).is_ok());
        assert!(matches!(
            init_logging(&TelemetryConfig::default()),
            Err(TelemetryError::LoggingInit(_))
        ));
    }

    #[test]
    fn test_redact_sensitive() {
        let value = json!({
            "user": "psu",
            "client_secret": "s3cr3t",
            "data": {
                "access_token": "tok-xyz",
                "name": "test"
            }
        });

        let redacted = redact_sensitive(&value, SENSITIVE_FIELDS);

        assert_eq!(redacted["user"], "psu");
        assert_eq!(redacted["client_secret"], REDACTED);
        assert_eq!(redacted["data"]["access_token"], REDACTED);
        assert_eq!(redacted["data"]["name"], "test");
    }

    #[test]
    fn test_redact_case_insensitive_in_arrays() {
        let value = json!([
            {"Authorization": "Bearer abc"},
            {"client_assertion": "eyJ..."},
            "plain",
            42
        ]);

        let redacted = redact_sensitive(&value, SENSITIVE_FIELDS);

        assert_eq!(redacted[0]["Authorization"], REDACTED);
        assert_eq!(redacted[1]["client_assertion"], REDACTED);
        assert_eq!(redacted[2], "plain");
        assert_eq!(redacted[3], 42);
    }

    #[test]
    fn test_redact_headers() {
        let headers = BTreeMap::from([
            ("Authorization".to_string(), "Bearer abc".to_string()),
            ("x-fapi-financial-id".to_string(), "0015800001041RHAAY".to_string()),
        ]);

        let redacted = redact_headers(&headers, SENSITIVE_FIELDS);

        assert_eq!(redacted["Authorization"], REDACTED);
        assert_eq!(redacted["x-fapi-financial-id"], "0015800001041RHAAY");
    }

    #[test]
    fn test_redact_query() {
        let query = "grant_type=client_credentials&client_assertion=eyJ&scope=accounts&request=eyJhbGc";
        assert_eq!(
            redact_query(query, SENSITIVE_FIELDS),
            "grant_type=client_credentials&client_assertion=[REDACTED]&scope=accounts&request=[REDACTED]"
        );
    }

    #[test]
    fn test_configured_fields_are_redacted() {
        let config = TelemetryConfig::default()
            .with_redact_fields(vec!["x-api-key".into(), "code".into()]);
        let fields = config.all_redact_fields();

        let headers = BTreeMap::from([
            ("x-api-key".to_string(), "k-123".to_string()),
            ("Authorization".to_string(), "Bearer abc".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ]);
        let redacted = redact_headers(&headers, &fields);
        assert_eq!(redacted["x-api-key"], REDACTED);
        assert_eq!(redacted["Authorization"], REDACTED);
        assert_eq!(redacted["Accept"], "application/json");

        assert_eq!(
            redact_query("code=abc&state=accountToken0001", &fields),
            "code=[REDACTED]&state=accountToken0001"
        );
        assert_eq!(redact_query("code=abc", SENSITIVE_FIELDS), "code=abc");
    }
}

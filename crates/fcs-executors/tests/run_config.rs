//! Loading run configs from disk and building executors from them.

use std::io::Write;
use std::time::{Duration, Instant};

use chrono::Utc;
use fcs_executors::{ConfigError, HttpExecutor, RunConfig, TokenAcquisition};
use serde_json::json;
use uuid::Uuid;

struct TestLog {
    test_name: &'static str,
    correlation_id: String,
    started_at: Instant,
}

impl TestLog {
    fn new(test_name: &'static str) -> Self {
        fcs_testkit::init_test_tracing();
        let log = Self {
            test_name,
            correlation_id: Uuid::new_v4().to_string(),
            started_at: Instant::now(),
        };
        log.emit("execute", "start", 0);
        log
    }

    fn emit(&self, phase: &str, result: &str, duration_ms: u128) {
        let payload = json!({
            "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "test_name": self.test_name,
            "module": "fcs-executors",
            "phase": phase,
            "correlation_id": self.correlation_id,
            "duration_ms": duration_ms,
            "result": result,
        });
        println!("{payload}");
    }
}

impl Drop for TestLog {
    fn drop(&mut self) {
        let result = if std::thread::panicking() { "fail" } else { "pass" };
        self.emit("verify", result, self.started_at.elapsed().as_millis());
    }
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn loads_headless_config_from_disk() {
    let _log = TestLog::new("loads_headless_config_from_disk");
    let file = write_config(
        r#"
        token_acquisition = "headless"
        consent_timeout_secs = 10

        [telemetry]
        log_level = "debug"
        json_logs = true
        "#,
    );

    let config = RunConfig::load(file.path()).unwrap();
    assert_eq!(config.token_acquisition, TokenAcquisition::Headless);
    assert_eq!(config.consent_timeout(), Duration::from_secs(10));
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.telemetry.log_level, "debug");
    assert!(config.telemetry.json_logs);
}

#[test]
fn missing_file_names_the_path() {
    let _log = TestLog::new("missing_file_names_the_path");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = RunConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn unknown_mode_is_a_parse_error() {
    let _log = TestLog::new("unknown_mode_is_a_parse_error");
    let file = write_config(r#"token_acquisition = "browser""#);
    assert!(matches!(
        RunConfig::load(file.path()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn half_configured_transport_is_rejected() {
    let _log = TestLog::new("half_configured_transport_is_rejected");
    let file = write_config(
        r#"
        [transport]
        cert_path = "certs/transport.pem"
        "#,
    );
    let err = RunConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("cert_path"));
}

// =============================================================================
// Executors
// =============================================================================

#[tokio::test]
async fn loaded_config_builds_an_executor() {
    let _log = TestLog::new("loaded_config_builds_an_executor");
    let file = write_config(
        r#"
        request_timeout_secs = 2
        follow_redirects = true

        [transport]
        accept_invalid_certs = true
        "#,
    );
    let config = RunConfig::load(file.path()).unwrap();
    assert!(HttpExecutor::from_config(&config).is_ok());
}

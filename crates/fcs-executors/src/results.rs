//! Per-test results and request metrics.

use std::time::Duration;

use fcs_model::{DetailError, TestCase};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Timing and size of one exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// From sending the request to the end of the response body.
    pub response_time: Duration,
    /// Response body size in bytes.
    pub response_size: usize,
}

impl Metrics {
    #[must_use]
    pub const fn new(response_time: Duration, response_size: usize) -> Self {
        Self {
            response_time,
            response_size,
        }
    }

    /// Response time in fractional milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn response_time_ms(&self) -> f64 {
        self.response_time.as_nanos() as f64 / 1_000_000.0
    }
}

impl Serialize for Metrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Metrics", 2)?;
        s.serialize_field("response_time", &self.response_time_ms())?;
        s.serialize_field("response_size", &self.response_size)?;
        s.end()
    }
}

/// Outcome of one executed test case.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub id: String,
    pub pass: bool,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fail: Vec<DetailError>,
    pub detail: String,
    #[serde(rename = "refURI")]
    pub ref_uri: String,
    pub endpoint: String,
    #[serde(skip)]
    pub api_name: String,
    #[serde(skip)]
    pub api_version: String,
}

impl TestResult {
    fn from_case(tc: &TestCase, pass: bool, metrics: Metrics, fail: Vec<DetailError>) -> Self {
        Self {
            id: tc.id.clone(),
            pass,
            metrics,
            fail,
            detail: tc.detail.clone(),
            ref_uri: tc.ref_uri.clone(),
            endpoint: tc.input.endpoint.clone(),
            api_name: tc.api_name.clone(),
            api_version: tc.api_version.clone(),
        }
    }

    #[must_use]
    pub fn passed(tc: &TestCase, metrics: Metrics) -> Self {
        Self::from_case(tc, true, metrics, Vec::new())
    }

    #[must_use]
    pub fn failed(tc: &TestCase, metrics: Metrics, fail: Vec<DetailError>) -> Self {
        Self::from_case(tc, false, metrics, fail)
    }

    /// The first failure message, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.fail.first().map(|d| d.general_error.as_str())
    }
}

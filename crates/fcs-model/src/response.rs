//! The HTTP response as seen by validation.

use std::collections::BTreeMap;

use serde::Serialize;

/// A response received for a [`crate::PreparedRequest`].
///
/// Header names are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Method of the request that produced this response.
    pub method: String,
    /// Path of the request that produced this response.
    pub path: String,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_request(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.method = method.into();
        self.path = path.into();
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The body parsed as JSON, if it is JSON.
    #[must_use]
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// Best-effort body for diagnostics: parsed JSON, else the raw text.
    #[must_use]
    pub fn diagnostic_body(&self) -> serde_json::Value {
        self.json()
            .unwrap_or_else(|| serde_json::Value::String(self.body.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let r = HttpResponse::new(302, "").with_header("Location", "https://tpp/cb?code=abc");
        assert_eq!(r.header("location"), Some("https://tpp/cb?code=abc"));
        assert_eq!(r.header("LOCATION"), Some("https://tpp/cb?code=abc"));
    }

    #[test]
    fn diagnostic_body_falls_back_to_text() {
        assert_eq!(
            HttpResponse::new(200, r#"{"a":1}"#).diagnostic_body(),
            serde_json::json!({"a": 1})
        );
        assert_eq!(
            HttpResponse::new(500, "<html>oops</html>").diagnostic_body(),
            serde_json::json!("<html>oops</html>")
        );
    }
}

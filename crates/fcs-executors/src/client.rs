//! HTTP execution of prepared requests.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use fcs_model::{HttpResponse, PreparedRequest};
use fcs_telemetry::{SENSITIVE_FIELDS, redact_headers, redact_query};
use reqwest::header::CONTENT_TYPE;

use crate::config::RunConfig;
use crate::error::{ConfigError, ConfigResult, ExecutionError, ExecutionResult};
use crate::results::Metrics;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Sends a prepared request and returns the response with its metrics.
#[async_trait]
pub trait Executor: Send + Sync {
    /// # Errors
    ///
    /// [`ExecutionError`] on transport failure; HTTP error statuses are
    /// ordinary responses.
    async fn execute(&self, request: &PreparedRequest) -> ExecutionResult<(HttpResponse, Metrics)>;
}

/// reqwest-backed [`Executor`].
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    redact_fields: Vec<String>,
}

impl HttpExecutor {
    /// Wrap an existing client. Logged requests mask [`SENSITIVE_FIELDS`].
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            redact_fields: SENSITIVE_FIELDS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Mask `fields` in logged headers, URLs and form bodies.
    #[must_use]
    pub fn with_redact_fields(mut self, fields: &[&str]) -> Self {
        self.redact_fields = fields.iter().map(ToString::to_string).collect();
        self
    }

    /// Build the client described by `config`.
    ///
    /// Redirects are not followed unless `follow_redirects` is set, so
    /// authorisation redirects stay visible to validation.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] for unreadable TLS material and
    /// [`ConfigError::Client`] if reqwest rejects it.
    pub fn from_config(config: &RunConfig) -> ConfigResult<Self> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .redirect(redirect)
            .use_rustls_tls();

        if let Some(transport) = &config.transport {
            if let (Some(cert), Some(key)) = (&transport.cert_path, &transport.key_path) {
                let mut pem = read_pem(cert)?;
                pem.extend(read_pem(key)?);
                builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
            }
            if let Some(ca) = &transport.ca_path {
                builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&read_pem(ca)?)?);
            }
            if transport.accept_invalid_certs {
                tracing::warn!("server certificate verification disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        Ok(Self::with_client(builder.build()?)
            .with_redact_fields(&config.telemetry.all_redact_fields()))
    }

    /// The underlying client, shared with out-of-band calls such as the code exchange.
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn redact_fields(&self) -> Vec<&str> {
        self.redact_fields.iter().map(String::as_str).collect()
    }

    /// `raw` with sensitive query values masked.
    fn loggable_url(&self, raw: &str) -> String {
        match raw.split_once('?') {
            Some((base, query)) => format!("{base}?{}", redact_query(query, &self.redact_fields())),
            None => raw.to_string(),
        }
    }
}

fn read_pem(path: &std::path::Path) -> ConfigResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, request: &PreparedRequest) -> ExecutionResult<(HttpResponse, Metrics)> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ExecutionError::InvalidRequest(format!("method {}: {e}", request.method)))?;
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| ExecutionError::InvalidRequest(format!("url {}: {e}", request.url)))?;

        let fields = self.redact_fields();
        tracing::debug!(
            method = %method,
            url = %self.loggable_url(&request.url),
            headers = ?redact_headers(&request.headers, &fields),
            "sending request"
        );

        let mut builder = self.client.request(method.clone(), url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(form) = request.form_body() {
            if !has_header(&request.headers, CONTENT_TYPE.as_str()) {
                builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
            }
            tracing::trace!(form = %redact_query(&form, &fields), "form body");
            builder = builder.body(form);
        } else if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;
        let metrics = Metrics::new(started.elapsed(), body.len());

        let mut out = HttpResponse::new(status, body).with_request(method.as_str(), url.path());
        for (name, value) in headers {
            out = out.with_header(&name, value);
        }

        tracing::debug!(
            status,
            response_time_ms = metrics.response_time_ms(),
            response_size = metrics.response_size,
            "received response"
        );
        Ok((out, metrics))
    }
}

fn has_header(headers: &BTreeMap<String, String>, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcs_testkit::MockAspsp;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn request(method: &str, url: String) -> PreparedRequest {
        PreparedRequest {
            method: method.to_string(),
            url,
            ..PreparedRequest::default()
        }
    }

    #[tokio::test]
    async fn form_data_is_url_encoded() {
        let aspsp = MockAspsp::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", FORM_CONTENT_TYPE))
            .and(body_string("grant_type=client_credentials&scope=accounts+openid"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(aspsp.inner())
            .await;

        let mut req = request("POST", aspsp.token_endpoint());
        req.form_data.insert("grant_type".into(), "client_credentials".into());
        req.form_data.insert("scope".into(), "accounts openid".into());

        let executor = HttpExecutor::from_config(&RunConfig::default()).unwrap();
        let (response, metrics) = executor.execute(&req).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.path, "/token");
        assert_eq!(metrics.response_size, 2);
    }

    #[tokio::test]
    async fn redirects_are_not_followed_by_default() {
        let aspsp = MockAspsp::start().await;
        aspsp
            .expect_authorize_redirect("https://tpp.example/cb", "code-1")
            .await;

        let executor = HttpExecutor::from_config(&RunConfig::default()).unwrap();
        let (response, _) = executor
            .execute(&request("GET", aspsp.authorisation_endpoint()))
            .await
            .unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(
            response.header("Location"),
            Some("https://tpp.example/cb#code=code-1&state=ok")
        );
    }

    #[tokio::test]
    async fn redirects_can_be_followed() {
        let aspsp = MockAspsp::start().await;
        let landing = format!("{}/landing", aspsp.base_url());
        aspsp.expect_authorize_redirect(&landing, "code-2").await;
        aspsp.expect_text("/landing", 200, "approved").await;

        let config = RunConfig::default().with_follow_redirects(true);
        let executor = HttpExecutor::from_config(&config).unwrap();
        let (response, _) = executor
            .execute(&request("GET", aspsp.authorisation_endpoint()))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "approved");
    }

    #[tokio::test]
    async fn error_status_is_a_response() {
        let aspsp = MockAspsp::start().await;
        aspsp
            .expect_get("/accounts", 403, serde_json::json!({"Code": "403 Forbidden"}))
            .await;

        let executor = HttpExecutor::from_config(&RunConfig::default()).unwrap();
        let (response, _) = executor
            .execute(&request("GET", format!("{}/accounts", aspsp.base_url())))
            .await
            .unwrap();
        assert_eq!(response.status, 403);
        assert_eq!(response.json().unwrap()["Code"], "403 Forbidden");
    }

    #[tokio::test]
    async fn unreachable_host_is_an_execution_error() {
        let executor = HttpExecutor::from_config(&RunConfig::default()).unwrap();
        let err = executor
            .execute(&request("GET", "http://127.0.0.1:1/accounts".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Http(_)));
    }

    #[test]
    fn logged_urls_hide_request_objects() {
        let executor = HttpExecutor::with_client(reqwest::Client::new());
        assert_eq!(
            executor.loggable_url("https://aspsp.example/auth?client_id=c1&request=eyJ.x.y&state=s"),
            "https://aspsp.example/auth?client_id=c1&request=[REDACTED]&state=s"
        );
        assert_eq!(
            executor.loggable_url("https://aspsp.example/token"),
            "https://aspsp.example/token"
        );
    }

    #[test]
    fn logged_urls_hide_configured_fields() {
        let mut config = RunConfig::default();
        config.telemetry = config.telemetry.with_redact_fields(vec!["client_id".into()]);
        let executor = HttpExecutor::from_config(&config).unwrap();
        assert_eq!(
            executor.loggable_url("https://aspsp.example/auth?client_id=c1&state=s&client_secret=x"),
            "https://aspsp.example/auth?client_id=[REDACTED]&state=s&client_secret=[REDACTED]"
        );
    }

    #[test]
    fn missing_certificate_file_is_reported() {
        let config = RunConfig::from_toml_str(
            "[transport]\ncert_path = \"/nonexistent/cert.pem\"\nkey_path = \"/nonexistent/key.pem\"",
        )
        .unwrap();
        assert!(matches!(
            HttpExecutor::from_config(&config),
            Err(ConfigError::Io { .. })
        ));
    }
}

//! Mock ASPSP for executor and consent-flow tests.
//!
//! Wraps wiremock with the handful of Open Banking endpoints a consent
//! flow touches: the token endpoint, the authorisation endpoint, and the
//! account-access-consents resource.

use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Token endpoint path on the mock.
pub const TOKEN_PATH: &str = "/token";

/// Authorisation endpoint path on the mock.
pub const AUTHORIZE_PATH: &str = "/authorize";

/// Account access consent resource path on the mock.
pub const ACCOUNT_ACCESS_CONSENTS_PATH: &str = "/open-banking/v3.1/aisp/account-access-consents";

/// A mock Open Banking server.
pub struct MockAspsp {
    server: MockServer,
}

impl MockAspsp {
    /// Start a new mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}{TOKEN_PATH}", self.server.uri())
    }

    #[must_use]
    pub fn authorisation_endpoint(&self) -> String {
        format!("{}{AUTHORIZE_PATH}", self.server.uri())
    }

    /// The underlying wiremock server for custom mocks.
    #[must_use]
    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Generic responses
    // ─────────────────────────────────────────────────────────────────────────────

    /// Respond to `GET request_path` with `status` and a JSON body.
    pub async fn expect_get(&self, request_path: &str, status: u16, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(json_response(status, body))
            .mount(&self.server)
            .await;
    }

    /// Respond to `POST request_path` with `status` and a JSON body.
    pub async fn expect_post(&self, request_path: &str, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(json_response(status, body))
            .mount(&self.server)
            .await;
    }

    /// Respond to any request on `request_path` with a raw text body.
    pub async fn expect_text(&self, request_path: &str, status: u16, body: &str) {
        Mock::given(path(request_path))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_string(body)
                    .insert_header("content-type", "text/html"),
            )
            .mount(&self.server)
            .await;
    }

    /// Respond to any request on `request_path` after `delay`.
    pub async fn expect_delayed(
        &self,
        request_path: &str,
        delay: Duration,
        status: u16,
        body: serde_json::Value,
    ) {
        Mock::given(path(request_path))
            .respond_with(json_response(status, body).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // OAuth and consent
    // ─────────────────────────────────────────────────────────────────────────────

    /// Client credentials grant on the token endpoint.
    pub async fn expect_client_credentials(&self, access_token: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(json_response(200, token_body(access_token)))
            .mount(&self.server)
            .await;
    }

    /// Authorization code exchange on the token endpoint, for one `code`.
    pub async fn expect_code_exchange(&self, code: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(json_response(200, token_body(access_token)))
            .mount(&self.server)
            .await;
    }

    /// A created account access consent carrying `consent_id`.
    pub async fn expect_account_access_consent(&self, consent_id: &str) {
        self.expect_post(
            ACCOUNT_ACCESS_CONSENTS_PATH,
            201,
            serde_json::json!({
                "Data": {
                    "ConsentId": consent_id,
                    "Status": "AwaitingAuthorisation",
                    "CreationDateTime": "2026-10-18T09:00:00+00:00"
                },
                "Risk": {},
                "Links": {"Self": ACCOUNT_ACCESS_CONSENTS_PATH},
                "Meta": {"TotalPages": 1}
            }),
        )
        .await;
    }

    /// A login page on the authorisation endpoint, as seen before PSU interaction.
    pub async fn expect_authorize_page(&self) {
        self.expect_text(AUTHORIZE_PATH, 200, "<html><body>login</body></html>")
            .await;
    }

    /// An auto-approving authorisation endpoint redirecting with `code`.
    pub async fn expect_authorize_redirect(&self, redirect_url: &str, code: &str) {
        Mock::given(method("GET"))
            .and(path(AUTHORIZE_PATH))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{redirect_url}#code={code}&state=ok")),
            )
            .mount(&self.server)
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────────

    /// Every request received so far.
    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Number of requests received on `request_path`.
    pub async fn request_count(&self, request_path: &str) -> usize {
        self.received_requests()
            .await
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }

    /// Assert at least one request reached `request_path`.
    ///
    /// # Panics
    ///
    /// Panics if no matching request was received.
    pub async fn assert_received(&self, request_path: &str) {
        let received = self.received_requests().await;
        assert!(
            received.iter().any(|r| r.url.path() == request_path),
            "no request received on '{request_path}', got {:?}",
            received.iter().map(|r| r.url.path().to_string()).collect::<Vec<_>>()
        );
    }
}

fn json_response(status: u16, body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_json(body)
        .insert_header("content-type", "application/json")
}

fn token_body(access_token: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "accounts"
    })
}

//! A single conformance test case: request template, expectations, and the
//! working context it carries.

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{TemplateResult, ValidationError};
use crate::expect::Expect;
use crate::input::{Input, PreparedRequest};
use crate::response::HttpResponse;
use crate::schema::SchemaValidator;
use crate::template::{Substitution, replace};

/// Context key holding a test case's required permission codes.
pub const PERMISSIONS: &str = "permissions";

/// Context key holding a test case's excluded permission codes.
pub const PERMISSIONS_EXCLUDED: &str = "permissions-excluded";

const VALIDATION_FAILED: &str = "validation failed";

/// Diagnostic record for one failure of a test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailError {
    #[serde(rename = "generalError")]
    pub general_error: String,
    /// The response body: parsed JSON when possible, else raw text.
    #[serde(
        rename = "endpointResponse",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub endpoint_response: Option<serde_json::Value>,
    #[serde(rename = "testCaseMessage", default, skip_serializing_if = "String::is_empty")]
    pub test_case_message: String,
}

impl DetailError {
    /// A failure with no response attached (preparation or transport).
    #[must_use]
    pub fn general(err: impl ToString) -> Self {
        Self {
            general_error: err.to_string(),
            endpoint_response: None,
            test_case_message: String::new(),
        }
    }

    #[must_use]
    pub fn with_response(mut self, response: &HttpResponse) -> Self {
        self.endpoint_response = Some(response.diagnostic_body());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.test_case_message = message.into();
        self
    }
}

/// Test case definition as produced by generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purpose: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    #[serde(rename = "refURI", default, skip_serializing_if = "String::is_empty")]
    pub ref_uri: String,
    #[serde(rename = "apiName", default, skip_serializing_if = "String::is_empty")]
    pub api_name: String,
    #[serde(rename = "apiVersion", default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    pub input: Input,
    #[serde(default)]
    pub context: Context,
    #[serde(default)]
    pub expect: Expect,
}

impl TestCase {
    /// Required permission codes declared in the test's context.
    #[must_use]
    pub fn permissions(&self) -> Vec<String> {
        self.context
            .get_string_slice(PERMISSIONS)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Excluded permission codes declared in the test's context.
    #[must_use]
    pub fn permissions_excluded(&self) -> Vec<String> {
        self.context
            .get_string_slice(PERMISSIONS_EXCLUDED)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Build the concrete request.
    ///
    /// Variables resolve against the test's own context overlaid with `ctx`;
    /// `ctx` wins on equal keys. Values generated from claims are written
    /// back into `ctx`.
    ///
    /// # Errors
    ///
    /// Any [`crate::TemplateError`]; no request is produced.
    pub fn prepare(&self, ctx: &mut Context) -> TemplateResult<PreparedRequest> {
        let mut working = self.context.clone();
        working.put_context(ctx);
        let request = self.input.create_request(&working)?;
        ctx.put_map(request.generated.clone());
        Ok(request)
    }

    /// Validate without schema checks. See [`Self::validate_with`].
    pub fn validate(&self, response: &HttpResponse, ctx: &mut Context) -> (bool, Vec<DetailError>) {
        self.validate_with(response, ctx, None)
    }

    /// Check `response` against the expectations.
    ///
    /// Only `ctx` is mutated (by `contextPut`). Every violated rule becomes a
    /// [`DetailError`] carrying the response body.
    pub fn validate_with(
        &self,
        response: &HttpResponse,
        ctx: &mut Context,
        schema: Option<&dyn SchemaValidator>,
    ) -> (bool, Vec<DetailError>) {
        let failures = self.expect.validate(response, ctx, schema);
        if failures.is_empty() {
            return (true, Vec::new());
        }
        for failure in &failures {
            tracing::debug!(test_case_id = %self.id, error = %failure, "expectation failed");
        }
        let details = failures
            .iter()
            .map(|f: &ValidationError| {
                DetailError::general(f)
                    .with_response(response)
                    .with_message(VALIDATION_FAILED)
            })
            .collect();
        (false, details)
    }

    /// A copy with every template field substituted in `mode`.
    ///
    /// Covers the input, the test's context values, match values, and
    /// `contextPut` names, so a consent step can write under a token name.
    ///
    /// # Errors
    ///
    /// Any [`crate::TemplateError`] raised in strict mode.
    pub fn with_replacements(&self, ctx: &Context, mode: Substitution) -> TemplateResult<Self> {
        let mut out = self.clone();
        out.input = self.input.with_replacements(ctx, mode)?;

        let keys: Vec<String> = self.context.keys().map(str::to_string).collect();
        for key in keys {
            if let Ok(value) = self.context.get_string(&key) {
                out.context.put_string(key.clone(), replace(value, ctx, mode)?);
            }
        }

        for rule in out
            .expect
            .matches
            .iter_mut()
            .chain(out.expect.context_put.matches.iter_mut())
        {
            rule.value = replace(&rule.value, ctx, mode)?;
            rule.context_name = replace(&rule.context_name, ctx, mode)?;
        }
        Ok(out)
    }

    /// Log the test case at trace level.
    pub fn dump(&self) {
        if !tracing::enabled!(tracing::Level::TRACE) {
            return;
        }
        match serde_json::to_string(self) {
            Ok(json) => tracing::trace!(test_case_id = %self.id, test_case = %json, "test case"),
            Err(err) => tracing::trace!(test_case_id = %self.id, error = %err, "test case not serializable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payment_consent_case() -> TestCase {
        serde_json::from_value(json!({
            "@id": "OB-301-DOP-100300",
            "name": "Domestic Payment consents succeeds with minimal data set",
            "input": {
                "method": "POST",
                "endpoint": "/domestic-payment-consents",
                "headers": {
                    "Content-Type": "application/json; charset=utf-8",
                    "x-fapi-financial-id": "$x-fapi-financial-id"
                },
                "bodyData": "{\"Data\":{\"Initiation\":{\"InstructedAmount\":{\"Amount\":\"1.00\",\"Currency\":\"$thisCurrency\"}}},\"Risk\":{}}"
            },
            "context": {
                "baseurl": "http://mybaseurl",
                "requestConsent": "true",
                "thisCurrency": "GBP",
                "x-fapi-financial-id": "$x-fapi-financial-id",
                "permissions": ["ReadAccountsBasic"]
            },
            "expect": {
                "status-code": 201,
                "matches": [{"json": "Data.ConsentId"}],
                "contextPut": {"matches": [{"name": "OB-301-DOP-100300-ConsentId", "json": "Data.ConsentId"}]}
            }
        }))
        .unwrap()
    }

    #[test]
    fn run_context_overrides_test_context() {
        let tc = payment_consent_case();
        let mut ctx = Context::new();
        ctx.put_string("x-fapi-financial-id", "myfapiid");

        let req = tc.prepare(&mut ctx).unwrap();
        assert_eq!(req.url, "http://mybaseurl/domestic-payment-consents");
        assert_eq!(req.headers["x-fapi-financial-id"], "myfapiid");
        assert!(req.body.unwrap().contains(r#""Currency":"GBP""#));
        assert!(!ctx.contains("baseurl"));
    }

    #[test]
    fn permissions_come_from_context() {
        let tc = payment_consent_case();
        assert_eq!(tc.permissions(), vec!["ReadAccountsBasic".to_string()]);
        assert!(tc.permissions_excluded().is_empty());
    }

    #[test]
    fn prepare_is_idempotent_on_resolved_templates() {
        let tc = payment_consent_case();
        let mut ctx = Context::new();
        ctx.put_string("x-fapi-financial-id", "myfapiid");
        let first = tc.prepare(&mut ctx).unwrap();
        let second = tc.prepare(&mut ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn validation_failures_carry_response_body() {
        let tc = payment_consent_case();
        let response = HttpResponse::new(400, r#"{"Code":"400 BadRequest"}"#);
        let (pass, details) = tc.validate(&response, &mut Context::new());
        assert!(!pass);
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].endpoint_response, Some(json!({"Code": "400 BadRequest"})));

        let serialized = serde_json::to_value(&details[0]).unwrap();
        assert!(serialized.get("generalError").is_some());
        assert!(serialized.get("endpointResponse").is_some());
    }

    #[test]
    fn successful_validation_puts_consent_id() {
        let tc = payment_consent_case();
        let response = HttpResponse::new(201, r#"{"Data":{"ConsentId":"sdp-1"}}"#);
        let mut ctx = Context::new();
        let (pass, details) = tc.validate(&response, &mut ctx);
        assert!(pass, "{details:?}");
        assert_eq!(ctx.get_string("OB-301-DOP-100300-ConsentId").unwrap(), "sdp-1");
    }

    #[test]
    fn with_replacements_rewrites_context_put_names() {
        let mut tc = payment_consent_case();
        tc.expect.context_put.matches[0].context_name = "$consent_id".into();
        let mut ctx = Context::new();
        ctx.put_string("consent_id", "accountToken0001");

        let replaced = tc.with_replacements(&ctx, Substitution::Partial).unwrap();
        assert_eq!(replaced.expect.context_put.matches[0].context_name, "accountToken0001");
        assert_eq!(replaced.input.headers["x-fapi-financial-id"], "$x-fapi-financial-id");
        assert_eq!(tc.expect.context_put.matches[0].context_name, "$consent_id");
    }
}

//! Expected outcomes: status code, match rules, schema check, and
//! `contextPut` extraction.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::ValidationError;
use crate::jsonpath;
use crate::response::HttpResponse;
use crate::schema::SchemaValidator;
use crate::template::{Substitution, replace};

/// Which check a [`Match`] performs, derived from its populated fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    HeaderValue,
    HeaderRegex,
    HeaderPresent,
    JsonValue,
    JsonRegex,
    JsonPresent,
    BodyRegex,
    BodyLength,
    Authorisation,
    Unknown,
}

impl MatchKind {
    const fn label(self) -> &'static str {
        match self {
            Self::HeaderValue => "Match:HeaderValue",
            Self::HeaderRegex => "Match:HeaderRegex",
            Self::HeaderPresent => "Match:HeaderPresent",
            Self::JsonValue => "Match:JSONValue",
            Self::JsonRegex => "Match:JSONRegex",
            Self::JsonPresent => "Match:JSONPresent",
            Self::BodyRegex => "Match:BodyRegex",
            Self::BodyLength => "Match:BodyLength",
            Self::Authorisation => "Match:Authorisation",
            Self::Unknown => "Match:Unknown",
        }
    }
}

fn is_empty(s: &str) -> bool {
    s.is_empty()
}

/// One response check. Also used by `contextPut`, where `name` says which
/// context key receives the extracted value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    #[serde(default, skip_serializing_if = "is_empty")]
    pub description: String,
    #[serde(default, rename = "name", skip_serializing_if = "is_empty")]
    pub context_name: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub header: String,
    #[serde(default, rename = "header-present", skip_serializing_if = "is_empty")]
    pub header_present: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub regex: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub json: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub value: String,
    #[serde(default, rename = "body-length", skip_serializing_if = "Option::is_none")]
    pub body_length: Option<usize>,
    /// `bearer` extracts the token from the `Authorization` header.
    #[serde(default, skip_serializing_if = "is_empty")]
    pub authorisation: String,
}

impl Match {
    /// The kind of check implied by the populated fields.
    #[must_use]
    pub fn kind(&self) -> MatchKind {
        let has = |s: &String| !s.is_empty();
        if has(&self.header) && has(&self.value) {
            MatchKind::HeaderValue
        } else if has(&self.header) && has(&self.regex) {
            MatchKind::HeaderRegex
        } else if has(&self.header_present) {
            MatchKind::HeaderPresent
        } else if has(&self.json) && has(&self.value) {
            MatchKind::JsonValue
        } else if has(&self.json) && has(&self.regex) {
            MatchKind::JsonRegex
        } else if has(&self.json) {
            MatchKind::JsonPresent
        } else if has(&self.regex) {
            MatchKind::BodyRegex
        } else if self.body_length.is_some() {
            MatchKind::BodyLength
        } else if self.authorisation.eq_ignore_ascii_case("bearer") {
            MatchKind::Authorisation
        } else {
            MatchKind::Unknown
        }
    }

    fn describe(&self) -> String {
        if self.description.is_empty() {
            self.kind().label().to_string()
        } else {
            self.description.clone()
        }
    }

    /// Apply the check, returning the value it looked at.
    ///
    /// `value` may reference context variables; unresolved ones are compared literally.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] describing why the check failed.
    pub fn check(
        &self,
        response: &HttpResponse,
        body: Option<&Value>,
        ctx: &Context,
    ) -> Result<String, ValidationError> {
        let description = self.describe();
        let expected = || {
            replace(&self.value, ctx, Substitution::Partial).unwrap_or_else(|_| self.value.clone())
        };

        match self.kind() {
            MatchKind::HeaderValue => {
                let actual = Self::header_value(response, &self.header, &description)?;
                let expected = expected();
                if actual == expected {
                    Ok(actual)
                } else {
                    Err(ValidationError::HeaderValue {
                        description,
                        header: self.header.clone(),
                        expected,
                        actual,
                    })
                }
            }
            MatchKind::HeaderRegex => {
                let actual = Self::header_value(response, &self.header, &description)?;
                self.capture(&actual, &description)
            }
            MatchKind::HeaderPresent => {
                Self::header_value(response, &self.header_present, &description)
            }
            MatchKind::JsonValue => {
                let actual = self.json_value(body, &description)?;
                let expected = expected();
                if actual == expected {
                    Ok(actual)
                } else {
                    Err(ValidationError::JsonValue {
                        description,
                        path: self.json.clone(),
                        expected,
                        actual,
                    })
                }
            }
            MatchKind::JsonRegex => {
                let actual = self.json_value(body, &description)?;
                self.capture(&actual, &description)
            }
            MatchKind::JsonPresent => self.json_value(body, &description),
            MatchKind::BodyRegex => self.capture(&response.body, &description),
            MatchKind::BodyLength => {
                let expected = self.body_length.unwrap_or_default();
                let actual = response.body.len();
                if actual == expected {
                    Ok(actual.to_string())
                } else {
                    Err(ValidationError::BodyLength {
                        description,
                        expected,
                        actual,
                    })
                }
            }
            MatchKind::Authorisation => response
                .header("authorization")
                .and_then(bearer_token)
                .map(str::to_string)
                .ok_or(ValidationError::BearerMissing { description }),
            MatchKind::Unknown => Err(ValidationError::EmptyMatch { description }),
        }
    }

    fn header_value(
        response: &HttpResponse,
        name: &str,
        description: &str,
    ) -> Result<String, ValidationError> {
        response
            .header(name)
            .map(str::to_string)
            .ok_or_else(|| ValidationError::HeaderMissing {
                description: description.to_string(),
                header: name.to_string(),
            })
    }

    fn json_value(&self, body: Option<&Value>, description: &str) -> Result<String, ValidationError> {
        body.and_then(|b| jsonpath::lookup(b, &self.json))
            .map(|v| jsonpath::as_text(&v))
            .ok_or_else(|| ValidationError::JsonPathMissing {
                description: description.to_string(),
                path: self.json.clone(),
            })
    }

    /// Match `target` against `regex`; yields capture group 1 when present.
    fn capture(&self, target: &str, description: &str) -> Result<String, ValidationError> {
        let re = Regex::new(&self.regex).map_err(|e| ValidationError::InvalidRegex {
            description: description.to_string(),
            pattern: self.regex.clone(),
            reason: e.to_string(),
        })?;
        let caps = re
            .captures(target)
            .ok_or_else(|| ValidationError::RegexMismatch {
                description: description.to_string(),
                pattern: self.regex.clone(),
                target: truncate(target),
            })?;
        let found = caps.get(1).or_else(|| caps.get(0));
        Ok(found.map_or_else(String::new, |m| m.as_str().to_string()))
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn truncate(s: &str) -> String {
    const LIMIT: usize = 120;
    if s.chars().count() <= LIMIT {
        s.to_string()
    } else {
        let head: String = s.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}

/// Values copied from a successful response into the context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPut {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<Match>,
}

impl ContextPut {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// The expected outcome of a test case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expect {
    /// Expected status; `0` skips the check.
    #[serde(default, rename = "status-code")]
    pub status_code: u16,
    #[serde(default, rename = "schema-validation")]
    pub schema_validation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<Match>,
    #[serde(default, rename = "contextPut", skip_serializing_if = "ContextPut::is_empty")]
    pub context_put: ContextPut,
}

impl Expect {
    /// Check `response` and, when every check passed, run `contextPut` into `ctx`.
    ///
    /// Returns every violated rule; an empty list means pass.
    pub fn validate(
        &self,
        response: &HttpResponse,
        ctx: &mut Context,
        schema: Option<&dyn SchemaValidator>,
    ) -> Vec<ValidationError> {
        let mut failures = Vec::new();

        if self.status_code != 0 && self.status_code != response.status {
            failures.push(ValidationError::StatusCode {
                expected: self.status_code,
                actual: response.status,
            });
        }

        let body = response.json();
        for rule in &self.matches {
            if let Err(err) = rule.check(response, body.as_ref(), ctx) {
                failures.push(err);
            }
        }

        if self.schema_validation {
            match schema {
                Some(validator) => failures.extend(
                    validator
                        .validate(response)
                        .into_iter()
                        .map(|f| ValidationError::Schema(f.to_string())),
                ),
                None => tracing::debug!("schema validation requested but no validator configured"),
            }
        }

        if failures.is_empty() {
            self.put_context(response, body.as_ref(), ctx, &mut failures);
        }
        failures
    }

    fn put_context(
        &self,
        response: &HttpResponse,
        body: Option<&Value>,
        ctx: &mut Context,
        failures: &mut Vec<ValidationError>,
    ) {
        for rule in &self.context_put.matches {
            if rule.context_name.is_empty() {
                continue;
            }
            match rule.check(response, body, ctx) {
                Ok(value) => {
                    tracing::debug!(name = %rule.context_name, "contextPut");
                    ctx.put_string(rule.context_name.clone(), value);
                }
                Err(err) => failures.push(ValidationError::ContextPut {
                    name: rule.context_name.clone(),
                    reason: err.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn consent_response() -> HttpResponse {
        HttpResponse::new(
            201,
            json!({"Data": {"ConsentId": "aac-42", "Status": "AwaitingAuthorisation"}}).to_string(),
        )
        .with_header("x-fapi-interaction-id", "b4405450")
        .with_request("POST", "/account-access-consents")
    }

    fn json_match(path: &str) -> Match {
        Match {
            json: path.into(),
            ..Match::default()
        }
    }

    #[test]
    fn kinds_from_fields() {
        let m = |f: fn(&mut Match)| {
            let mut m = Match::default();
            f(&mut m);
            m.kind()
        };
        assert_eq!(m(|m| { m.header = "h".into(); m.value = "v".into(); }), MatchKind::HeaderValue);
        assert_eq!(m(|m| { m.header = "h".into(); m.regex = "r".into(); }), MatchKind::HeaderRegex);
        assert_eq!(m(|m| m.header_present = "h".into()), MatchKind::HeaderPresent);
        assert_eq!(m(|m| { m.json = "a".into(); m.value = "v".into(); }), MatchKind::JsonValue);
        assert_eq!(m(|m| { m.json = "a".into(); m.regex = "r".into(); }), MatchKind::JsonRegex);
        assert_eq!(m(|m| m.json = "a".into()), MatchKind::JsonPresent);
        assert_eq!(m(|m| m.regex = "r".into()), MatchKind::BodyRegex);
        assert_eq!(m(|m| m.body_length = Some(0)), MatchKind::BodyLength);
        assert_eq!(m(|m| m.authorisation = "bearer".into()), MatchKind::Authorisation);
        assert_eq!(m(|_| {}), MatchKind::Unknown);
    }

    #[test]
    fn consent_id_is_put_into_context() {
        let expect = Expect {
            status_code: 201,
            matches: vec![json_match("Data.ConsentId")],
            context_put: ContextPut {
                matches: vec![Match {
                    context_name: "OB-301-DOP-100300-ConsentId".into(),
                    json: "Data.ConsentId".into(),
                    ..Match::default()
                }],
            },
            ..Expect::default()
        };
        let mut ctx = Context::new();
        let failures = expect.validate(&consent_response(), &mut ctx, None);
        assert!(failures.is_empty(), "{failures:?}");
        assert_eq!(ctx.get_string("OB-301-DOP-100300-ConsentId").unwrap(), "aac-42");
    }

    #[test]
    fn every_violation_is_reported() {
        let expect = Expect {
            status_code: 200,
            matches: vec![
                Match {
                    header_present: "x-missing".into(),
                    ..Match::default()
                },
                Match {
                    json: "Data.Status".into(),
                    value: "Authorised".into(),
                    ..Match::default()
                },
            ],
            context_put: ContextPut {
                matches: vec![Match {
                    context_name: "never".into(),
                    json: "Data.ConsentId".into(),
                    ..Match::default()
                }],
            },
            ..Expect::default()
        };
        let mut ctx = Context::new();
        let failures = expect.validate(&consent_response(), &mut ctx, None);
        assert_eq!(failures.len(), 3);
        assert!(matches!(failures[0], ValidationError::StatusCode { expected: 200, actual: 201 }));
        assert!(matches!(failures[1], ValidationError::HeaderMissing { .. }));
        assert!(matches!(failures[2], ValidationError::JsonValue { .. }));
        assert!(!ctx.contains("never"));
    }

    #[test]
    fn expected_value_may_reference_context() {
        let rule = Match {
            json: "Data.ConsentId".into(),
            value: "$consent".into(),
            ..Match::default()
        };
        let mut ctx = Context::new();
        ctx.put_string("consent", "aac-42");
        let r = consent_response();
        assert_eq!(rule.check(&r, r.json().as_ref(), &ctx).unwrap(), "aac-42");
    }

    #[test]
    fn regex_yields_first_capture_group() {
        let rule = Match {
            header: "Location".into(),
            regex: "code=([^&]+)".into(),
            ..Match::default()
        };
        let r = HttpResponse::new(302, "").with_header("Location", "https://tpp/cb?code=abc123&state=s");
        assert_eq!(rule.check(&r, None, &Context::new()).unwrap(), "abc123");

        let bad = Match {
            regex: "(".into(),
            ..Match::default()
        };
        assert!(matches!(
            bad.check(&r, None, &Context::new()),
            Err(ValidationError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn bearer_and_body_length() {
        let r = HttpResponse::new(200, "four").with_header("Authorization", "Bearer tok-1");
        let bearer = Match {
            authorisation: "bearer".into(),
            ..Match::default()
        };
        assert_eq!(bearer.check(&r, None, &Context::new()).unwrap(), "tok-1");

        let length = Match {
            body_length: Some(4),
            ..Match::default()
        };
        assert!(length.check(&r, None, &Context::new()).is_ok());

        let no_auth = HttpResponse::new(200, "");
        assert!(matches!(
            bearer.check(&no_auth, None, &Context::new()),
            Err(ValidationError::BearerMissing { .. })
        ));
    }

    #[test]
    fn schema_failures_become_errors() {
        struct AlwaysFails;
        impl SchemaValidator for AlwaysFails {
            fn validate(&self, _: &HttpResponse) -> Vec<crate::SchemaFailure> {
                vec![crate::SchemaFailure {
                    field: "/Data".into(),
                    message: "bad".into(),
                }]
            }
        }

        let expect = Expect {
            schema_validation: true,
            ..Expect::default()
        };
        let failures = expect.validate(&consent_response(), &mut Context::new(), Some(&AlwaysFails));
        assert_eq!(failures, vec![ValidationError::Schema("/Data: bad".into())]);
        assert!(expect.validate(&consent_response(), &mut Context::new(), None).is_empty());
    }

    #[test]
    fn json_field_names() {
        let e: Expect = serde_json::from_value(json!({
            "status-code": 201,
            "schema-validation": true,
            "matches": [
                {"header-present": "x-fapi-interaction-id"},
                {"json": "Data.Status", "value": "AwaitingAuthorisation"},
                {"json": "Data.ConsentId"}
            ],
            "contextPut": {"matches": [{"name": "cid", "json": "Data.ConsentId"}]}
        }))
        .unwrap();
        assert_eq!(e.status_code, 201);
        assert_eq!(e.matches[0].kind(), MatchKind::HeaderPresent);
        assert_eq!(e.matches[1].kind(), MatchKind::JsonValue);
        assert_eq!(e.context_put.matches[0].context_name, "cid");
    }
}

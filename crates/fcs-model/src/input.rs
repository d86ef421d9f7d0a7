//! Request templates and their concrete, substituted form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::claims::{self, SigningKey};
use crate::context::{Context, SIGNING_KEY};
use crate::error::{TemplateError, TemplateResult};
use crate::template::{Substitution, replace, replace_opt};

/// Context key receiving the generated PSU authorization URL.
pub const CONSENT_URL: &str = "consent_url";

/// Context key receiving the generated client assertion.
pub const JWT_BEARER: &str = "jwtbearer";

const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Claim-driven request generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Unsigned request object embedded in an authorization URL.
    ConsentUrl,
    /// RS256 client assertion added to the form body.
    JwtBearer,
}

impl Strategy {
    fn parse(name: &str) -> TemplateResult<Self> {
        match name {
            "consenturl" => Ok(Self::ConsentUrl),
            "jwt-bearer" => Ok(Self::JwtBearer),
            other => Err(TemplateError::UnknownStrategy(other.to_string())),
        }
    }
}

/// The request half of a test case, before substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub method: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub form_data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_data: Option<String>,
    /// `strategy` selects [`Strategy`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub generation: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claims: BTreeMap<String, String>,
}

/// A concrete request ready for an executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub form_data: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Context values produced while preparing (`consent_url`, `jwtbearer`).
    #[serde(skip)]
    pub generated: BTreeMap<String, String>,
}

impl PreparedRequest {
    /// Form data encoded as `application/x-www-form-urlencoded`.
    #[must_use]
    pub fn form_body(&self) -> Option<String> {
        if self.form_data.is_empty() {
            return None;
        }
        let mut encoder = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.form_data {
            encoder.append_pair(key, value);
        }
        Some(encoder.finish())
    }

    /// Path component of the URL, used for schema lookups.
    #[must_use]
    pub fn path(&self) -> String {
        url::Url::parse(&self.url).map_or_else(|_| self.url.clone(), |u| u.path().to_string())
    }
}

fn invalid_url(url: &str, err: impl ToString) -> TemplateError {
    TemplateError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

fn replace_map(
    map: &BTreeMap<String, String>,
    ctx: &Context,
    mode: Substitution,
) -> TemplateResult<BTreeMap<String, String>> {
    map.iter()
        .map(|(k, v)| replace(v, ctx, mode).map(|v| (k.clone(), v)))
        .collect()
}

impl Input {
    /// Substitute every template field and build the concrete request.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] for an empty method or endpoint, a missing
    /// context variable, a bad URL, or a claim-generation failure.
    pub fn create_request(&self, ctx: &Context) -> TemplateResult<PreparedRequest> {
        if self.method.trim().is_empty() {
            return Err(TemplateError::EmptyMethod);
        }
        if self.endpoint.trim().is_empty() {
            return Err(TemplateError::EmptyEndpoint);
        }
        let method = self.method.trim().to_ascii_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(TemplateError::InvalidMethod(self.method.clone()));
        }

        let mode = Substitution::Strict;
        let endpoint = replace(&self.endpoint, ctx, mode)?;
        let mut url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint
        } else {
            format!("{}{endpoint}", ctx.get_string("baseurl")?)
        };

        if !self.query_parameters.is_empty() {
            let mut parsed = url::Url::parse(&url).map_err(|e| invalid_url(&url, e))?;
            {
                let mut pairs = parsed.query_pairs_mut();
                for (key, value) in &self.query_parameters {
                    pairs.append_pair(key, &replace(value, ctx, mode)?);
                }
            }
            url = parsed.into();
        }

        let mut headers = BTreeMap::new();
        for (name, value) in &self.headers {
            let value = replace(value, ctx, mode)?;
            if value.contains(['\r', '\n']) {
                return Err(TemplateError::InvalidHeader {
                    name: name.clone(),
                    reason: "value contains a line break".to_string(),
                });
            }
            headers.insert(name.clone(), value);
        }

        let mut request = PreparedRequest {
            method,
            url,
            headers,
            form_data: replace_map(&self.form_data, ctx, mode)?,
            body: replace_opt(self.body_data.as_deref(), ctx, mode)?,
            generated: BTreeMap::new(),
        };

        if let Some(strategy) = self.generation.get("strategy") {
            self.apply_strategy(Strategy::parse(strategy)?, ctx, &mut request)?;
        }

        Ok(request)
    }

    fn apply_strategy(
        &self,
        strategy: Strategy,
        ctx: &Context,
        request: &mut PreparedRequest,
    ) -> TemplateResult<()> {
        let claims = replace_map(&self.claims, ctx, Substitution::Strict)?;
        match strategy {
            Strategy::ConsentUrl => {
                let url = claims::consent_url(&request.url, &claims)?;
                request.url.clone_from(&url);
                request.generated.insert(CONSENT_URL.to_string(), url);
            }
            Strategy::JwtBearer => {
                let key = ctx
                    .get_opaque::<SigningKey>(SIGNING_KEY)
                    .map_err(|_| TemplateError::MissingSigningKey)?;
                let token = claims::client_assertion(&claims, &key)?;
                request
                    .form_data
                    .insert("client_assertion".to_string(), token.clone());
                request.generated.insert(JWT_BEARER.to_string(), token);
            }
        }
        tracing::debug!(?strategy, "generated claims");
        Ok(())
    }

    /// A copy with every field substituted in `mode`.
    ///
    /// # Errors
    ///
    /// See [`replace`].
    pub fn with_replacements(&self, ctx: &Context, mode: Substitution) -> TemplateResult<Self> {
        Ok(Self {
            method: replace(&self.method, ctx, mode)?,
            endpoint: replace(&self.endpoint, ctx, mode)?,
            headers: replace_map(&self.headers, ctx, mode)?,
            query_parameters: replace_map(&self.query_parameters, ctx, mode)?,
            form_data: replace_map(&self.form_data, ctx, mode)?,
            body_data: replace_opt(self.body_data.as_deref(), ctx, mode)?,
            generation: self.generation.clone(),
            claims: replace_map(&self.claims, ctx, mode)?,
        })
    }
}

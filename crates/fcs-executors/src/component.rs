//! Consent-provider components: fixed test sequences run once per token.

use std::collections::BTreeMap;

use fcs_model::{Context, Substitution, TestCase};
use serde::Deserialize;

use crate::config::TokenAcquisition;
use crate::error::RunnerError;

pub const PSU_CONSENT_PROVIDER: &str = "PSUConsentProviderComponent";
pub const HEADLESS_TOKEN_PROVIDER: &str = "headlessTokenProviderComponent";

const PSU_CONSENT_PROVIDER_JSON: &str = include_str!("../components/psu_consent_provider.json");
const HEADLESS_TOKEN_PROVIDER_JSON: &str =
    include_str!("../components/headless_token_provider.json");

/// A named sequence of test cases with declared inputs and outputs.
#[derive(Debug, Clone, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Context keys the steps read, with a short description each.
    #[serde(rename = "inputParameters", default)]
    pub input_parameters: BTreeMap<String, String>,
    /// Context keys the steps write.
    #[serde(rename = "outputParameters", default)]
    pub output_parameters: BTreeMap<String, String>,
    #[serde(rename = "testcases", default)]
    pub tests: Vec<TestCase>,
}

impl Component {
    /// The consent provider for `mode`.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Component`] if the embedded definition does not parse.
    pub fn load(mode: TokenAcquisition) -> Result<Self, RunnerError> {
        let (name, source) = match mode {
            TokenAcquisition::Psu => (PSU_CONSENT_PROVIDER, PSU_CONSENT_PROVIDER_JSON),
            TokenAcquisition::Headless => (HEADLESS_TOKEN_PROVIDER, HEADLESS_TOKEN_PROVIDER_JSON),
        };
        Self::from_json(name, source)
    }

    /// Parse a component definition.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Component`] naming `name` if `source` is not a component.
    pub fn from_json(name: &str, source: &str) -> Result<Self, RunnerError> {
        serde_json::from_str(source).map_err(|e| RunnerError::Component {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Check that every declared input is present in `ctx`.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Parameters`] listing the missing keys.
    pub fn validate_parameters(&self, ctx: &Context) -> Result<(), RunnerError> {
        let missing: Vec<String> = self
            .input_parameters
            .keys()
            .filter(|key| !ctx.contains(key))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RunnerError::Parameters {
                component: self.name.clone(),
                missing,
            })
        }
    }

    /// Substitute what `ctx` already knows into every step.
    ///
    /// Values produced by earlier steps stay as `$name` tokens until the
    /// step is prepared.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Component`] if a template cannot be expanded.
    pub fn with_replacements(&self, ctx: &Context) -> Result<Self, RunnerError> {
        let tests = self
            .tests
            .iter()
            .map(|tc| tc.with_replacements(ctx, Substitution::Partial))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RunnerError::Component {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            tests,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcs_model::SIGNING_KEY;

    fn flow_context() -> Context {
        let mut ctx: Context = [
            ("baseurl", "https://aspsp.example"),
            ("client_id", "client-1"),
            ("token_endpoint", "https://aspsp.example/token"),
            ("authorisation_endpoint", "https://aspsp.example/authorize"),
            ("redirect_url", "https://tpp.example/cb"),
            ("basic_authentication", "Y2xpZW50LTE6c2VjcmV0"),
            ("x-fapi-financial-id", "0015800001041RHAAY"),
            ("consent_id", "accountToken0001"),
            ("token_name", "accountToken0001"),
            ("permission_list", "\"ReadAccountsBasic\",\"ReadBalances\""),
        ]
        .into_iter()
        .collect();
        ctx.put_opaque(SIGNING_KEY, ());
        ctx
    }

    #[test]
    fn embedded_components_load() {
        let psu = Component::load(TokenAcquisition::Psu).unwrap();
        assert_eq!(psu.name, PSU_CONSENT_PROVIDER);
        assert_eq!(psu.tests.len(), 3);

        let headless = Component::load(TokenAcquisition::Headless).unwrap();
        assert_eq!(headless.name, HEADLESS_TOKEN_PROVIDER);
        assert_eq!(headless.tests.len(), 4);
        assert!(headless.input_parameters.contains_key("basic_authentication"));
    }

    #[test]
    fn missing_parameters_are_listed() {
        let psu = Component::load(TokenAcquisition::Psu).unwrap();
        let mut ctx = flow_context();
        ctx.delete("token_endpoint");
        ctx.delete("client_id");
        match psu.validate_parameters(&ctx) {
            Err(RunnerError::Parameters { component, missing }) => {
                assert_eq!(component, PSU_CONSENT_PROVIDER);
                assert_eq!(missing, ["client_id", "token_endpoint"]);
            }
            other => panic!("expected missing parameters, got {other:?}"),
        }
        assert!(psu.validate_parameters(&flow_context()).is_ok());
    }

    #[test]
    fn replacements_bind_the_token_name() {
        let psu = Component::load(TokenAcquisition::Psu)
            .unwrap()
            .with_replacements(&flow_context())
            .unwrap();

        let consent = &psu.tests[1];
        assert!(
            consent
                .input
                .body_data
                .as_deref()
                .unwrap()
                .contains(r#"["ReadAccountsBasic","ReadBalances"]"#)
        );
        // Produced by the first step, so still a token.
        assert_eq!(consent.input.headers["Authorization"], "Bearer $client_access_token");
        assert_eq!(consent.expect.context_put.matches[0].context_name, "accountToken0001");
        assert_eq!(psu.tests[2].input.claims["state"], "accountToken0001");
        assert_eq!(psu.tests[2].input.claims["consentId"], "$intent_id");
    }

    #[test]
    fn garbage_definition_is_a_component_error() {
        assert!(matches!(
            Component::from_json("broken", "{\"name\": 1}"),
            Err(RunnerError::Component { .. })
        ));
    }
}

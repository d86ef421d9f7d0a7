//! Greedy first-fit grouping of test cases into consent tokens.
//!
//! Groups are kept in creation order. A test joins the first group whose
//! accumulated permissions do not clash with it, in either direction, and
//! otherwise starts a new one. A group without any permissions clashes with
//! nothing. Tests that declare no permissions join the first group that
//! still has none. This is not minimal; group count and order are part of
//! the output contract.

use std::collections::{BTreeMap, BTreeSet};

use fcs_model::{NamedPermission, SpecConsentRequirements, TestCase, TestCasesRun};
use serde::{Deserialize, Serialize};

use crate::error::{PermissionError, PermissionResult};
use crate::spec_type::{SpecType, get_spec_type};

/// Context key marking a payment test that needs its own consent.
pub const REQUEST_CONSENT: &str = "requestConsent";

/// Context key through which a payment test references another's consent.
pub const CONSENT_ID: &str = "consentId";

const CONSENT_ID_PATH: &str = "Data.ConsentId";

/// Permissions declared by one test case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCasePermission {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub perms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permsx: Vec<String>,
}

impl TestCasePermission {
    #[must_use]
    pub fn new(id: impl Into<String>, perms: &[&str], permsx: &[&str]) -> Self {
        Self {
            id: id.into(),
            perms: perms.iter().map(|p| (*p).to_string()).collect(),
            permsx: permsx.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.perms.is_empty() && self.permsx.is_empty()
    }

    fn check_self_conflict(&self) -> PermissionResult<()> {
        let conflicting: Vec<String> = self
            .perms
            .iter()
            .filter(|p| self.permsx.contains(p))
            .cloned()
            .collect();
        if conflicting.is_empty() {
            Ok(())
        } else {
            Err(PermissionError::SelfConflict {
                test_id: self.id.clone(),
                conflicting,
            })
        }
    }
}

/// A token group and, once acquired, its consent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredTokens {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub perms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permsx: Vec<String>,
    #[serde(rename = "accessToken", default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    #[serde(rename = "consentUrl", default, skip_serializing_if = "String::is_empty")]
    pub consent_url: String,
    #[serde(rename = "consentId", default, skip_serializing_if = "String::is_empty")]
    pub consent_id: String,
    /// Context name a payment consent id is stored under.
    #[serde(rename = "consentParam", default, skip_serializing_if = "String::is_empty")]
    pub consent_param: String,
}

impl RequiredTokens {
    /// True for the group of tests that need no permissions.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.perms.is_empty() && self.permsx.is_empty()
    }
}

struct Group {
    name: String,
    ids: Vec<String>,
    perms: BTreeSet<String>,
    permsx: BTreeSet<String>,
}

impl Group {
    fn accepts(&self, tcp: &TestCasePermission) -> bool {
        !self.perms.iter().any(|p| tcp.permsx.contains(p))
            && !self.permsx.iter().any(|p| tcp.perms.contains(p))
    }

    fn is_unrestricted(&self) -> bool {
        self.perms.is_empty() && self.permsx.is_empty()
    }

    fn absorb(&mut self, tcp: &TestCasePermission) {
        self.ids.push(tcp.id.clone());
        self.perms
            .extend(tcp.perms.iter().filter(|p| !p.is_empty()).cloned());
        self.permsx
            .extend(tcp.permsx.iter().filter(|p| !p.is_empty()).cloned());
    }
}

/// Sequential token-name generator and group arena.
pub struct TokenStore {
    current_id: u32,
    prefix: &'static str,
    groups: Vec<Group>,
}

impl TokenStore {
    #[must_use]
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            current_id: 0,
            prefix,
            groups: Vec::new(),
        }
    }

    /// Next name in sequence: `{prefix}Token0001`, `{prefix}Token0002`, ...
    pub fn next_token_name(&mut self) -> String {
        self.current_id += 1;
        format!("{}Token{:04}", self.prefix, self.current_id)
    }

    fn create(&mut self, tcp: &TestCasePermission) {
        let mut group = Group {
            name: self.next_token_name(),
            ids: Vec::new(),
            perms: BTreeSet::new(),
            permsx: BTreeSet::new(),
        };
        group.absorb(tcp);
        self.groups.push(group);
    }

    /// Place one test case.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::SelfConflict`] if the test requires and
    /// excludes the same permission; the store is left unchanged.
    pub fn create_or_update(&mut self, tcp: &TestCasePermission) -> PermissionResult<()> {
        tcp.check_self_conflict()?;

        let slot = if tcp.is_unrestricted() {
            self.groups.iter().position(Group::is_unrestricted)
        } else {
            self.groups.iter().position(|g| g.accepts(tcp))
        };
        match slot {
            Some(idx) => self.groups[idx].absorb(tcp),
            None => self.create(tcp),
        }
        Ok(())
    }

    #[must_use]
    pub fn into_required_tokens(self) -> Vec<RequiredTokens> {
        self.groups
            .into_iter()
            .map(|g| RequiredTokens {
                name: g.name,
                ids: g.ids,
                perms: g.perms.into_iter().collect(),
                permsx: g.permsx.into_iter().collect(),
                ..RequiredTokens::default()
            })
            .collect()
    }
}

/// Group test cases into conflict-free token requirements.
///
/// # Errors
///
/// Returns [`PermissionError::SelfConflict`] for the first self-conflicting test.
pub fn resolve(
    prefix: &'static str,
    permissions: &[TestCasePermission],
) -> PermissionResult<Vec<RequiredTokens>> {
    let mut store = TokenStore::new(prefix);
    for tcp in permissions {
        store.create_or_update(tcp)?;
    }
    Ok(store.into_required_tokens())
}

/// Permissions of every test that declares a `permissions` context key.
#[must_use]
pub fn get_test_case_permissions(tests: &[TestCase]) -> Vec<TestCasePermission> {
    tests
        .iter()
        .filter(|tc| tc.context.contains(fcs_model::PERMISSIONS))
        .map(|tc| TestCasePermission {
            id: tc.id.clone(),
            perms: tc.permissions(),
            permsx: tc.permissions_excluded(),
        })
        .collect()
}

/// Token requirements for the tests of one specification.
///
/// # Errors
///
/// Returns [`PermissionError::SelfConflict`] from permission grouping.
pub fn get_required_tokens_from_tests(
    tests: &[TestCase],
    spec_type: SpecType,
) -> PermissionResult<Vec<RequiredTokens>> {
    match spec_type {
        SpecType::Accounts | SpecType::Funds => {
            resolve(spec_type.token_prefix(), &get_test_case_permissions(tests))
        }
        SpecType::Payments => Ok(get_payment_tokens(tests)),
        SpecType::Notifications => Ok(Vec::new()),
    }
}

/// One token per payment test whose context says `requestConsent: "true"`.
///
/// Tests whose `consentId` context value is `$<consent_param>` of a token
/// are added to that token's ids.
#[must_use]
pub fn get_payment_tokens(tests: &[TestCase]) -> Vec<RequiredTokens> {
    let mut store = TokenStore::new(SpecType::Payments.token_prefix());
    let mut tokens: Vec<RequiredTokens> = tests
        .iter()
        .filter(|tc| tc.context.get_string(REQUEST_CONSENT).is_ok_and(|v| v == "true"))
        .map(|tc| RequiredTokens {
            name: store.next_token_name(),
            ids: vec![tc.id.clone()],
            consent_param: consent_param(tc),
            ..RequiredTokens::default()
        })
        .collect();

    for token in tokens.iter_mut().filter(|t| !t.consent_param.is_empty()) {
        for tc in tests {
            let references = tc
                .context
                .get_string(CONSENT_ID)
                .is_ok_and(|v| v.strip_prefix('$') == Some(token.consent_param.as_str()));
            if references && !token.ids.contains(&tc.id) {
                token.ids.push(tc.id.clone());
            }
        }
    }
    tokens
}

fn consent_param(tc: &TestCase) -> String {
    tc.expect
        .context_put
        .matches
        .iter()
        .find(|m| m.json == CONSENT_ID_PATH)
        .map(|m| m.context_name.clone())
        .unwrap_or_default()
}

/// Tokens required by one specification of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecTokens {
    pub identifier: String,
    pub spec_type: SpecType,
    pub tokens: Vec<RequiredTokens>,
}

impl SpecTokens {
    #[must_use]
    pub fn consent_requirements(&self) -> SpecConsentRequirements {
        SpecConsentRequirements {
            identifier: self.identifier.clone(),
            named_permissions: self
                .tokens
                .iter()
                .map(|t| NamedPermission {
                    name: t.name.clone(),
                    test_ids: t.ids.clone(),
                    permissions: t.perms.clone(),
                    permissions_excluded: t.permsx.clone(),
                })
                .collect(),
        }
    }
}

/// Token requirements for every specification of `run`.
///
/// Specifications that cannot be classified, or whose tests conflict with
/// themselves, are skipped with a warning.
#[must_use]
pub fn required_tokens_for_run(run: &TestCasesRun) -> Vec<SpecTokens> {
    let mut out = Vec::new();
    for spec in &run.test_cases {
        let name = &spec.specification.name;
        let spec_type = match get_spec_type(name) {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(spec = %name, error = %err, "skipping consent for specification");
                continue;
            }
        };
        match get_required_tokens_from_tests(&spec.test_cases, spec_type) {
            Ok(tokens) => {
                tracing::debug!(spec = %spec_type, tokens = tokens.len(), "token requirements resolved");
                out.push(SpecTokens {
                    identifier: name.clone(),
                    spec_type,
                    tokens,
                });
            }
            Err(err) => {
                tracing::warn!(spec = %spec_type, error = %err, "skipping consent for specification");
            }
        }
    }
    out
}

/// Point each test at its token with `Authorization: Bearer $<token name>`.
///
/// Tests in a group without permissions are left alone. Returns token name to
/// acquired token.
pub fn map_tokens_to_test_cases(
    tokens: &[RequiredTokens],
    tests: &mut [TestCase],
) -> BTreeMap<String, String> {
    for tc in tests.iter_mut() {
        match tokens.iter().find(|t| t.ids.contains(&tc.id)) {
            Some(token) if token.is_unrestricted() => {}
            Some(token) => {
                tc.input
                    .headers
                    .insert("Authorization".to_string(), format!("Bearer ${}", token.name));
            }
            None => tracing::warn!(test_case_id = %tc.id, "no token for test case"),
        }
    }
    tokens
        .iter()
        .map(|t| (t.name.clone(), t.token.clone()))
        .collect()
}

/// Render permissions for a consent body: `"A","B"`.
#[must_use]
pub fn build_permission_string(perms: &[String]) -> String {
    perms
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join(",")
}

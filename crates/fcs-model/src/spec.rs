//! Containers handed over by test generation.

use serde::{Deserialize, Serialize};

use crate::testcase::TestCase;

/// The API specification a group of test cases exercises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSpecification {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: String,
}

/// Test cases generated for one specification, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecificationTestCases {
    #[serde(rename = "apiSpecification")]
    pub specification: ApiSpecification,
    #[serde(rename = "testCases", default)]
    pub test_cases: Vec<TestCase>,
}

/// A named token and the permissions and test cases it covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPermission {
    pub name: String,
    #[serde(rename = "testIds", default)]
    pub test_ids: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(rename = "permissionsExcluded", default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_excluded: Vec<String>,
}

/// Tokens needed by one specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecConsentRequirements {
    /// Specification name.
    pub identifier: String,
    #[serde(rename = "namedPermissions", default)]
    pub named_permissions: Vec<NamedPermission>,
}

/// Everything one run executes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCasesRun {
    #[serde(rename = "specCases", default)]
    pub test_cases: Vec<SpecificationTestCases>,
    #[serde(rename = "specTokens", default)]
    pub spec_consent_requirements: Vec<SpecConsentRequirements>,
}

impl TestCasesRun {
    /// Total number of test cases across specifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.test_cases.iter().map(|s| s.test_cases.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

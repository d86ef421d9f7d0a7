//! Test fixtures: run contexts, signing keys and test case builders.

use fcs_model::{
    ApiSpecification, Context, Expect, Input, Match, SIGNING_KEY, SigningKey,
    SpecificationTestCases, TestCase, TestCasesRun,
};

/// RSA private key (PKCS#8 PEM) used to sign client assertions in tests.
pub const SIGNING_KEY_PEM: &[u8] = include_bytes!("../testdata/signing_key.pem");

pub const CLIENT_ID: &str = "8672384e-9a33-439f-8924-67bb14340d71";
pub const REDIRECT_URL: &str = "https://tpp.example/conformancesuite/callback";
pub const FINANCIAL_ID: &str = "0015800001041RHAAY";

/// `client_id:client_secret` in base64.
pub const BASIC_AUTHENTICATION: &str = "ODY3MjM4NGUtOWEzMy00MzlmLTg5MjQtNjdiYjE0MzQwZDcxOnNlY3JldA==";

pub const ACCOUNTS_SPEC: &str = "Account and Transaction API Specification";
pub const PAYMENTS_SPEC: &str = "Payment Initiation API";

// ─────────────────────────────────────────────────────────────────────────────
// Contexts
// ─────────────────────────────────────────────────────────────────────────────

/// The test signing key.
///
/// # Panics
///
/// Panics if the bundled PEM is unreadable.
#[must_use]
pub fn signing_key() -> SigningKey {
    SigningKey::from_rsa_pem(SIGNING_KEY_PEM)
        .expect("bundled signing key parses")
        .with_kid("fcs-test")
}

/// A run context pointing every endpoint at `base_url`.
///
/// Carries what the consent components need: client id, token and
/// authorisation endpoints, redirect URL, basic credentials, financial id
/// and the signing key.
#[must_use]
pub fn run_context(base_url: &str) -> Context {
    let mut ctx = Context::new();
    ctx.put_map([
        ("baseurl", base_url.to_string()),
        ("client_id", CLIENT_ID.to_string()),
        ("token_endpoint", format!("{base_url}/token")),
        ("authorisation_endpoint", format!("{base_url}/authorize")),
        ("redirect_url", REDIRECT_URL.to_string()),
        ("basic_authentication", BASIC_AUTHENTICATION.to_string()),
        ("x-fapi-financial-id", FINANCIAL_ID.to_string()),
    ]);
    ctx.put_opaque(SIGNING_KEY, signing_key());
    ctx
}

// ─────────────────────────────────────────────────────────────────────────────
// Test cases
// ─────────────────────────────────────────────────────────────────────────────

/// A minimal test case expecting `status`.
#[must_use]
pub fn test_case(id: &str, method: &str, endpoint: &str, status: u16) -> TestCase {
    TestCase {
        id: id.to_string(),
        name: format!("{method} {endpoint}"),
        input: Input {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            ..Input::default()
        },
        expect: Expect {
            status_code: status,
            ..Expect::default()
        },
        ..TestCase::default()
    }
}

/// An accounts test case declaring required and excluded permissions.
#[must_use]
pub fn permission_case(id: &str, endpoint: &str, perms: &[&str], permsx: &[&str]) -> TestCase {
    let mut tc = test_case(id, "GET", endpoint, 200);
    tc.context
        .put_string_slice("permissions", perms.iter().map(ToString::to_string).collect());
    tc.context.put_string_slice(
        "permissions-excluded",
        permsx.iter().map(ToString::to_string).collect(),
    );
    tc
}

/// A rule requiring `path` to be present in the JSON body.
#[must_use]
pub fn json_present(path: &str) -> Match {
    Match {
        json: path.to_string(),
        ..Match::default()
    }
}

/// A `contextPut` rule storing the value at `path` under `name`.
#[must_use]
pub fn json_put(name: &str, path: &str) -> Match {
    Match {
        context_name: name.to_string(),
        json: path.to_string(),
        ..Match::default()
    }
}

/// Wrap test cases into a single-specification run.
#[must_use]
pub fn single_spec_run(spec_name: &str, test_cases: Vec<TestCase>) -> TestCasesRun {
    TestCasesRun {
        test_cases: vec![SpecificationTestCases {
            specification: ApiSpecification {
                name: spec_name.to_string(),
                ..ApiSpecification::default()
            },
            test_cases,
        }],
        spec_consent_requirements: Vec::new(),
    }
}

//! Assertion helpers for contexts and validation details.

use fcs_model::{Context, DetailError};

/// Assert that `key` holds the string `expected`.
///
/// # Panics
///
/// Panics if the key is missing, not a string, or holds another value.
pub fn assert_context_string(ctx: &Context, key: &str, expected: &str) {
    match ctx.get_string(key) {
        Ok(actual) => assert_eq!(actual, expected, "context key '{key}'"),
        Err(err) => panic!("context key '{key}': {err}"),
    }
}

/// Assert that `key` is absent.
///
/// # Panics
///
/// Panics if the key is present.
pub fn assert_context_missing(ctx: &Context, key: &str) {
    assert!(!ctx.contains(key), "context key '{key}' should be absent");
}

/// Assert that some detail's general error mentions `needle`.
///
/// # Panics
///
/// Panics if no detail matches.
pub fn assert_detail_mentions(details: &[DetailError], needle: &str) {
    assert!(
        details.iter().any(|d| d.general_error.contains(needle)),
        "no detail mentions '{needle}': {:?}",
        details.iter().map(|d| d.general_error.as_str()).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_assertions() {
        let mut ctx = Context::new();
        ctx.put_string("consent_id", "aac-1");
        assert_context_string(&ctx, "consent_id", "aac-1");
        assert_context_missing(&ctx, "token_name");
    }

    #[test]
    #[should_panic(expected = "no detail mentions")]
    fn detail_assertion_fails_loudly() {
        assert_detail_mentions(&[DetailError::general("status code 500")], "ConsentId");
    }
}

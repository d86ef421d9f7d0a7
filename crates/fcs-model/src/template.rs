//! `$name` token substitution against a [`Context`].
//!
//! A token is `$` followed by one or more of `[A-Za-z0-9_-]`. Tokens may be
//! mixed with literal text (`"Bearer $access_token"`). Substitution is
//! textual and single-pass: a resolved value is inserted verbatim, even
//! when it contains `$` itself.

use std::ops::Range;

use crate::context::Context;
use crate::error::{ContextError, TemplateResult};

/// How unresolved tokens are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Substitution {
    /// A missing key is an error.
    #[default]
    Strict,
    /// Unresolvable tokens are left in place for a later pass.
    Partial,
}

struct Token<'a> {
    span: Range<usize>,
    name: &'a str,
}

const fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn scan(input: &str) -> Vec<Token<'_>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i;
            let mut end = i + 1;
            while end < bytes.len() && is_name_byte(bytes[end]) {
                end += 1;
            }
            if end > start + 1 {
                tokens.push(Token {
                    span: start..end,
                    name: &input[start + 1..end],
                });
                i = end;
                continue;
            }
        }
        i += 1;
    }
    tokens
}

/// Replace every `$name` token in `input` with its context value.
///
/// # Errors
///
/// In [`Substitution::Strict`] mode a missing key gives
/// [`TemplateError::MissingContextVariable`] and a non-string value gives
/// [`TemplateError::NotAString`].
///
/// [`TemplateError::MissingContextVariable`]: crate::TemplateError::MissingContextVariable
/// [`TemplateError::NotAString`]: crate::TemplateError::NotAString
pub fn replace(input: &str, ctx: &Context, mode: Substitution) -> TemplateResult<String> {
    let tokens = scan(input);
    if tokens.is_empty() {
        return Ok(input.to_string());
    }

    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for token in tokens {
        out.push_str(&input[last..token.span.start]);
        last = token.span.end;

        match ctx.get_string(token.name) {
            Ok(value) => out.push_str(value),
            Err(err) => match mode {
                Substitution::Strict => return Err(err.into()),
                Substitution::Partial => {
                    if let ContextError::TypeMismatch { .. } = err {
                        tracing::debug!(name = token.name, "non-string value left unresolved");
                    }
                    out.push_str(&input[token.span.clone()]);
                }
            },
        }
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// [`replace`] for optional fields; `None` stays `None`.
///
/// # Errors
///
/// See [`replace`].
pub fn replace_opt(
    input: Option<&str>,
    ctx: &Context,
    mode: Substitution,
) -> TemplateResult<Option<String>> {
    input.map(|s| replace(s, ctx, mode)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;

    fn ctx(entries: &[(&str, &str)]) -> Context {
        entries.iter().copied().collect()
    }

    #[test]
    fn literal_text_is_untouched() {
        let out = replace("no tokens here, $ alone", &Context::new(), Substitution::Strict).unwrap();
        assert_eq!(out, "no tokens here, $ alone");
    }

    #[test]
    fn mixed_tokens_and_text() {
        let c = ctx(&[("access_token", "abc"), ("b", "B")]);
        assert_eq!(
            replace("Bearer $access_token", &c, Substitution::Strict).unwrap(),
            "Bearer abc"
        );
        assert_eq!(replace("$b $b/$b", &c, Substitution::Strict).unwrap(), "B B/B");
    }

    #[test]
    fn token_stops_at_non_name_character() {
        let c = ctx(&[("baseurl", "http://aspsp")]);
        assert_eq!(
            replace("$baseurl/accounts?x=1", &c, Substitution::Strict).unwrap(),
            "http://aspsp/accounts?x=1"
        );
    }

    #[test]
    fn strict_missing_key_errors() {
        let err = replace("$nothere", &Context::new(), Substitution::Strict).unwrap_err();
        assert_eq!(err, TemplateError::MissingContextVariable("nothere".into()));
    }

    #[test]
    fn partial_leaves_unresolved_tokens() {
        let c = ctx(&[("known", "K")]);
        assert_eq!(
            replace("$known:$unknown", &c, Substitution::Partial).unwrap(),
            "K:$unknown"
        );
    }

    #[test]
    fn resolved_values_are_inserted_verbatim() {
        let c = ctx(&[
            ("replacebody", r#"{"$schema":"x","note":"pay $amount"}"#),
            ("amount", "1.00"),
        ]);
        assert_eq!(
            replace("$replacebody", &c, Substitution::Strict).unwrap(),
            r#"{"$schema":"x","note":"pay $amount"}"#
        );
    }

    #[test]
    fn self_referencing_value_is_not_expanded() {
        let c = ctx(&[("loop", "x$loop")]);
        assert_eq!(replace("[$loop]", &c, Substitution::Strict).unwrap(), "[x$loop]");
    }

    #[test]
    fn substitution_is_idempotent_once_resolved() {
        let c = ctx(&[("replacebody", "this is my body")]);
        let once = replace("$replacebody", &c, Substitution::Strict).unwrap();
        let twice = replace(&once, &c, Substitution::Strict).unwrap();
        assert_eq!(once, "this is my body");
        assert_eq!(once, twice);
    }

    #[test]
    fn string_slice_is_not_substitutable() {
        let mut c = Context::new();
        c.put_string_slice("perms", vec!["A".into()]);
        assert!(matches!(
            replace("$perms", &c, Substitution::Strict),
            Err(TemplateError::NotAString { .. })
        ));
        assert_eq!(replace("$perms", &c, Substitution::Partial).unwrap(), "$perms");
    }
}

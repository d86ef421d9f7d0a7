//! JWT generation for the `consenturl` and `jwt-bearer` strategies.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::error::{TemplateError, TemplateResult};

/// Lifetime of a generated client assertion, in seconds.
pub const CLIENT_ASSERTION_TTL_SECS: i64 = 600;

/// State value used when the claims carry none.
pub const DEFAULT_STATE: &str = "5a6b0d7832a9fb4f80f1170a";

/// RSA private key used to sign client assertions.
#[derive(Clone)]
pub struct SigningKey {
    key: EncodingKey,
    kid: Option<String>,
}

impl SigningKey {
    /// Load a PKCS#1 or PKCS#8 RSA private key.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Claims`] if the PEM is not an RSA key.
    pub fn from_rsa_pem(pem: &[u8]) -> TemplateResult<Self> {
        let key = EncodingKey::from_rsa_pem(pem)
            .map_err(|e| TemplateError::Claims(format!("invalid signing key: {e}")))?;
        Ok(Self { key, kid: None })
    }

    /// Set the `kid` header placed on signed tokens.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

fn claim<'a>(claims: &'a BTreeMap<String, String>, name: &str) -> &'a str {
    claims.get(name).map_or("", String::as_str)
}

// ─────────────────────────────────────────────────────────────────────────────
// consenturl
// ─────────────────────────────────────────────────────────────────────────────

// Field order is the serialized byte order.
#[derive(Serialize)]
struct RequestObject<'a> {
    aud: &'a str,
    claims: RequestClaims<'a>,
    iss: &'a str,
    redirect_uri: &'a str,
    scope: &'a str,
}

#[derive(Serialize)]
struct RequestClaims<'a> {
    id_token: IdTokenClaims<'a>,
}

#[derive(Serialize)]
struct IdTokenClaims<'a> {
    openbanking_intent_id: IntentId<'a>,
}

#[derive(Serialize)]
struct IntentId<'a> {
    essential: bool,
    value: &'a str,
}

/// Build the unsigned (`alg: none`) request object for a consent authorization URL.
///
/// Reads `aud`, `iss`, `redirect_url`, `scope` and `consentId` from already
/// substituted `claims`.
///
/// # Errors
///
/// Returns [`TemplateError::Claims`] if the payload cannot be serialized.
pub fn consent_request_object(claims: &BTreeMap<String, String>) -> TemplateResult<String> {
    let payload = RequestObject {
        aud: claim(claims, "aud"),
        claims: RequestClaims {
            id_token: IdTokenClaims {
                openbanking_intent_id: IntentId {
                    essential: true,
                    value: claim(claims, "consentId"),
                },
            },
        },
        iss: claim(claims, "iss"),
        redirect_uri: claim(claims, "redirect_url"),
        scope: claim(claims, "scope"),
    };
    let payload =
        serde_json::to_vec(&payload).map_err(|e| TemplateError::Claims(e.to_string()))?;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    Ok(format!("{header}.{}.", URL_SAFE_NO_PAD.encode(payload)))
}

/// Build the PSU authorization URL for `endpoint`.
///
/// # Errors
///
/// Returns [`TemplateError::InvalidUrl`] for an unparsable endpoint and
/// [`TemplateError::Claims`] if the request object cannot be built.
pub fn consent_url(endpoint: &str, claims: &BTreeMap<String, String>) -> TemplateResult<String> {
    let request = consent_request_object(claims)?;
    let mut url = url::Url::parse(endpoint).map_err(|e| TemplateError::InvalidUrl {
        url: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    let state = claims
        .get("state")
        .filter(|s| !s.is_empty())
        .map_or(DEFAULT_STATE, String::as_str);
    url.query_pairs_mut()
        .append_pair("client_id", claim(claims, "iss"))
        .append_pair("response_type", claim(claims, "responseType"))
        .append_pair("scope", claim(claims, "scope"))
        .append_pair("redirect_uri", claim(claims, "redirect_url"))
        .append_pair("state", state)
        .append_pair("request", &request);
    Ok(url.into())
}

// ─────────────────────────────────────────────────────────────────────────────
// jwt-bearer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ClientAssertion<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    scope: &'a str,
    jti: String,
    iat: i64,
    exp: i64,
}

/// Sign an RS256 client assertion from substituted `claims`.
///
/// `sub` defaults to `iss` when absent.
///
/// # Errors
///
/// Returns [`TemplateError::Claims`] if signing fails.
pub fn client_assertion(
    claims: &BTreeMap<String, String>,
    key: &SigningKey,
) -> TemplateResult<String> {
    let iss = claim(claims, "iss");
    let sub = claims.get("sub").map_or(iss, String::as_str);
    let iat = chrono::Utc::now().timestamp();
    let assertion = ClientAssertion {
        iss,
        sub,
        aud: claim(claims, "aud"),
        scope: claim(claims, "scope"),
        jti: uuid::Uuid::new_v4().to_string(),
        iat,
        exp: iat + CLIENT_ASSERTION_TTL_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.kid.clone();
    jsonwebtoken::encode(&header, &assertion, &key.key)
        .map_err(|e| TemplateError::Claims(format!("signing client assertion: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    const KEY: &[u8] = include_bytes!("../testdata/signing_key.pem");
    const PUB: &[u8] = include_bytes!("../testdata/signing_key.pub.pem");

    fn claims(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn request_object_byte_layout() {
        let c = claims(&[
            ("iss", "8672384e-9a33-439f-8924-67bb14340d71"),
            ("scope", "openid accounts"),
            ("redirect_url", "https://test.example.co.uk/redir"),
            ("responseType", "code"),
        ]);
        assert_eq!(
            consent_request_object(&c).unwrap(),
            "eyJhbGciOiJub25lIn0.eyJhdWQiOiIiLCJjbGFpbXMiOnsiaWRfdG9rZW4iOnsib3BlbmJhbmtpbmdfaW50ZW50X2lkIjp7ImVzc2VudGlhbCI6dHJ1ZSwidmFsdWUiOiIifX19LCJpc3MiOiI4NjcyMzg0ZS05YTMzLTQzOWYtODkyNC02N2JiMTQzNDBkNzEiLCJyZWRpcmVjdF91cmkiOiJodHRwczovL3Rlc3QuZXhhbXBsZS5jby51ay9yZWRpciIsInNjb3BlIjoib3BlbmlkIGFjY291bnRzIn0."
        );
    }

    #[test]
    fn consent_url_query_layout() {
        let c = claims(&[
            ("iss", "client-1"),
            ("scope", "openid accounts"),
            ("redirect_url", "https://tpp.example/cb"),
            ("responseType", "code id_token"),
        ]);
        let url = url::Url::parse(&consent_url("https://aspsp.example/auth", &c).unwrap()).unwrap();
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(
            keys,
            ["client_id", "response_type", "scope", "redirect_uri", "state", "request"]
        );
        let pairs: BTreeMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code id_token");
        assert_eq!(pairs["state"], DEFAULT_STATE);
    }

    #[test]
    fn client_assertion_verifies_with_public_key() {
        let key = SigningKey::from_rsa_pem(KEY).unwrap().with_kid("kid-1");
        let c = claims(&[("iss", "12312"), ("aud", "https://aspsp.example"), ("scope", "accounts")]);
        let token = client_assertion(&c, &key).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("kid-1"));

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["https://aspsp.example"]);
        let data = decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_rsa_pem(PUB).unwrap(),
            &validation,
        )
        .unwrap();
        assert_eq!(data.claims["iss"], "12312");
        assert_eq!(data.claims["sub"], "12312");
        assert_eq!(data.claims["scope"], "accounts");
    }

    #[test]
    fn rejects_non_rsa_pem() {
        assert!(matches!(
            SigningKey::from_rsa_pem(b"not a key"),
            Err(TemplateError::Claims(_))
        ));
    }
}

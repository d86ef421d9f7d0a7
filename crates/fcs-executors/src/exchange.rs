//! Authorization code exchange for the PSU callback.

use fcs_model::Context;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

/// Token endpoint response to an authorization code grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

fn required<'a>(ctx: &'a Context, key: &'static str) -> Result<&'a str, ExchangeError> {
    ctx.get_string(key)
        .map_err(|_| ExchangeError::MissingParameter(key))
}

/// Exchange an authorization `code` for an access token.
///
/// Posts `grant_type=authorization_code` with basic client authentication
/// to `$token_endpoint`, reading `basic_authentication`, `token_endpoint`
/// and `redirect_url` from `ctx`.
///
/// # Errors
///
/// [`ExchangeError::MissingParameter`] before any request,
/// [`ExchangeError::BadStatus`] for anything but 200, and
/// [`ExchangeError::InvalidTokenResponse`] for an unreadable body.
pub async fn exchange_code_for_access_token(
    code: &str,
    ctx: &Context,
    client: &reqwest::Client,
) -> Result<GrantToken, ExchangeError> {
    let basic_auth = required(ctx, "basic_authentication")?;
    let token_endpoint = required(ctx, "token_endpoint")?;
    let redirect_url = required(ctx, "redirect_url")?;

    tracing::debug!(token_endpoint, "exchanging code for token");
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_url),
    ];
    let response = client
        .post(token_endpoint)
        .header(reqwest::header::ACCEPT, "*/*")
        .header(reqwest::header::AUTHORIZATION, format!("Basic {basic_auth}"))
        .form(&params)
        .send()
        .await?;

    let status = response.status().as_u16();
    let body = response.text().await?;
    if status != 200 {
        let error = serde_json::from_str::<TokenErrorResponse>(&body).ok().map(|e| {
            match e.error_description {
                Some(description) => format!("{} - {description}", e.error),
                None => e.error,
            }
        });
        tracing::warn!(status, token_endpoint, "code exchange rejected");
        return Err(ExchangeError::BadStatus {
            status,
            endpoint: token_endpoint.to_string(),
            error,
        });
    }

    let token: GrantToken = serde_json::from_str(&body)?;
    tracing::debug!(token_type = %token.token_type, expires_in = ?token.expires_in, "code exchanged");
    Ok(token)
}

/// Finish a PSU consent: exchange `code` and store the access token under `token_name`.
///
/// Later requests carrying `Authorization: Bearer $<token_name>` then use it.
///
/// # Errors
///
/// See [`exchange_code_for_access_token`]; `ctx` is unchanged on error.
pub async fn complete_psu_consent(
    token_name: &str,
    code: &str,
    ctx: &mut Context,
    client: &reqwest::Client,
) -> Result<String, ExchangeError> {
    match exchange_code_for_access_token(code, ctx, client).await {
        Ok(token) => {
            ctx.put_string(token_name, token.access_token.clone());
            Ok(token.access_token)
        }
        Err(err) => {
            tracing::error!(token_name, error = %err, "exchanging code for token failed");
            Err(err)
        }
    }
}

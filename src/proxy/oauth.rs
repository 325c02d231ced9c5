//! OAuth2 client-credentials token exchange.
//!
//! Every proxied request under an oauth2 session negotiates a fresh token;
//! there is no cache, trading efficiency for simplicity and avoiding a
//! second encrypted store for short-lived tokens.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;

/// Token endpoint failure: non-2xx response, unreachable endpoint, or a
/// response body without an `access_token`.
#[derive(Debug)]
pub struct OAuthExchangeFailed(pub String);

impl std::fmt::Display for OAuthExchangeFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OAuth token exchange failed: {}", self.0)
    }
}

impl std::error::Error for OAuthExchangeFailed {}

/// Token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges client credentials for an access token.
///
/// Sends `grant_type=client_credentials` with HTTP Basic authentication to
/// the token endpoint. Not retried: a transient failure surfaces directly to
/// the caller as a failed proxied request.
pub async fn client_credentials_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    scope: &str,
) -> Result<String, OAuthExchangeFailed> {
    let basic = BASE64.encode(format!("{}:{}", client_id, client_secret));

    let mut form = String::from("grant_type=client_credentials");
    if !scope.is_empty() {
        form.push_str("&scope=");
        form.push_str(&urlencoding::encode(scope));
    }

    tracing::debug!(token_endpoint = %token_endpoint, "Negotiating client-credentials token");

    let response = client
        .post(token_endpoint)
        .header("Authorization", format!("Basic {}", basic))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Accept", "application/json")
        .body(form)
        .send()
        .await
        .map_err(|e| OAuthExchangeFailed(format!("token endpoint unreachable: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(OAuthExchangeFailed(format!(
            "token endpoint returned {}: {}",
            status, body
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| OAuthExchangeFailed(format!("invalid token response: {}", e)))?;

    tracing::debug!(
        token_type = ?token.token_type,
        expires_in = ?token.expires_in,
        "Token exchange successful"
    );

    Ok(token.access_token)
}

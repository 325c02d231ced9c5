//! Per-request outbound authentication.
//!
//! Exactly three schemes are in scope, so resolution is a closed match over
//! the credential variant rather than an open plugin mechanism: a static
//! bearer header, a freshly negotiated OAuth2 token, or a full SigV4
//! signature over the outbound request.

use super::{oauth, sigv4};
use crate::credentials::CatalogCredentials;
use reqwest::Url;

/// The exact request the proxy is about to send upstream.
///
/// SigV4 signs over method, URL and body, so this must describe the
/// fully-qualified target request, not the inbound client request.
pub struct OutboundRequest<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    pub body: &'a [u8],
}

/// Header name/value pairs to attach to the outbound request.
pub type AuthHeaders = Vec<(&'static str, String)>;

/// Resolution failure, mapped to a 502-class response by the proxy.
#[derive(Debug)]
pub enum AuthResolveError {
    OAuthExchange(oauth::OAuthExchangeFailed),
}

impl std::fmt::Display for AuthResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthResolveError::OAuthExchange(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AuthResolveError {}

/// Produces the outbound auth headers for one proxied request.
///
/// The oauth2 arm performs one token-exchange HTTP call per invocation; the
/// bearer and sigv4 arms do no I/O. No arm mutates session state.
pub async fn resolve(
    client: &reqwest::Client,
    credentials: &CatalogCredentials,
    request: &OutboundRequest<'_>,
) -> Result<AuthHeaders, AuthResolveError> {
    match credentials {
        CatalogCredentials::Bearer { token } => Ok(vec![
            ("Authorization", format!("Bearer {}", token)),
            ("Content-Type", "application/json".to_string()),
            ("Accept", "application/json".to_string()),
        ]),

        CatalogCredentials::OAuth2 {
            token_endpoint,
            client_id,
            client_secret,
            scope,
        } => {
            let access_token = oauth::client_credentials_token(
                client,
                token_endpoint,
                client_id,
                client_secret,
                scope,
            )
            .await
            .map_err(AuthResolveError::OAuthExchange)?;

            Ok(vec![
                ("Authorization", format!("Bearer {}", access_token)),
                ("Content-Type", "application/json".to_string()),
                ("Accept", "application/json".to_string()),
            ])
        }

        CatalogCredentials::SigV4 {
            access_key,
            secret_key,
            region,
            service,
        } => {
            let key = sigv4::SigningKey {
                access_key,
                secret_key,
                region,
                service,
            };
            let signed = sigv4::sign(&key, request.method, request.url, request.body);

            Ok(vec![
                ("Authorization", signed.authorization),
                ("x-amz-date", signed.amz_date),
                ("x-amz-content-sha256", signed.content_sha256),
                ("Accept", "application/json".to_string()),
            ])
        }
    }
}

//! Authenticated request proxy for Iceberg REST catalogs.
//!
//! The browser client logs in once with catalog credentials, receives an
//! opaque session id, and attaches it as `X-Session-ID` to every catalog
//! call under `/api/iceberg/*`. The proxy resolves the session, converts the
//! stored scheme into outbound authentication, forwards the request to the
//! real catalog and relays the response verbatim.

mod oauth;
mod sigv4;
mod strategy;

pub use sigv4::{sign_at, SignedHeaders, SigningKey};
pub use strategy::{AuthResolveError, OutboundRequest};

use crate::credentials::CatalogCredentials;
use crate::session::{Session, SessionError, SessionStore};
use axum::{
    body::{Body, Bytes},
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Session id header attached by the client to every authenticated call.
const SESSION_HEADER: &str = "x-session-id";

/// Shared application state for the proxy API
#[derive(Clone)]
pub struct ProxyAppState {
    pub session_store: Arc<SessionStore>,
    pub http_client: reqwest::Client,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for proxy endpoints
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Login request: endpoint + scheme tag + the fields that scheme requires
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub endpoint: String,
    pub auth_type: String,
    #[serde(default)]
    pub warehouse: Option<String>,

    // bearer
    #[serde(default)]
    pub token: Option<String>,

    // oauth2
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,

    // sigv4
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_id: String,
    pub auth_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    pub expires_at: i64,
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Non-secret session metadata for SPA state restoration
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoResponse {
    pub auth_type: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    pub expires_at: i64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Create proxy API router
pub fn create_proxy_router(state: ProxyAppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session_info))
        .route("/api/iceberg/*suffix", any(proxy_catalog))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// POST /api/auth/login
///
/// Validates the scheme-specific fields, encrypts and stores the credential
/// record, and returns the new session id and its fixed expiry.
async fn login(
    State(state): State<Arc<ProxyAppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let endpoint = body.endpoint.trim();
    if endpoint.is_empty() {
        return Err(AppError::BadRequest("'endpoint' is required".to_string()));
    }
    reqwest::Url::parse(endpoint)
        .map_err(|_| AppError::BadRequest("'endpoint' must be a valid URL".to_string()))?;

    let credentials = credentials_from_login(&body)?;

    let session = state
        .session_store
        .create(&credentials, endpoint, body.warehouse.as_deref())
        .map_err(|e| {
            warn!(error = %e, "Failed to create session");
            AppError::ServerError("Failed to create session".to_string())
        })?;

    info!(
        auth_type = %credentials.auth_type(),
        endpoint = %session.endpoint,
        "Session created"
    );

    Ok(Json(LoginResponse {
        session_id: session.session_id,
        auth_type: credentials.auth_type().to_string(),
        warehouse: session.warehouse,
        expires_at: session.expires_at,
    }))
}

/// Builds the credential record for the declared scheme, rejecting logins
/// with missing fields.
fn credentials_from_login(body: &LoginRequest) -> Result<CatalogCredentials, AppError> {
    fn required(value: &Option<String>, scheme: &str, field: &str) -> Result<String, AppError> {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(AppError::BadRequest(format!(
                "{} login requires '{}'",
                scheme, field
            ))),
        }
    }

    match body.auth_type.as_str() {
        "bearer" => Ok(CatalogCredentials::Bearer {
            token: required(&body.token, "bearer", "token")?,
        }),
        "oauth2" => Ok(CatalogCredentials::OAuth2 {
            token_endpoint: required(&body.token_endpoint, "oauth2", "tokenEndpoint")?,
            client_id: required(&body.client_id, "oauth2", "clientId")?,
            client_secret: required(&body.client_secret, "oauth2", "clientSecret")?,
            scope: body.scope.clone().unwrap_or_default(),
        }),
        "sigv4" => Ok(CatalogCredentials::SigV4 {
            access_key: required(&body.access_key, "sigv4", "accessKey")?,
            secret_key: required(&body.secret_key, "sigv4", "secretKey")?,
            region: required(&body.region, "sigv4", "region")?,
            service: required(&body.service, "sigv4", "service")?,
        }),
        other => Err(AppError::BadRequest(format!(
            "Unknown authType '{}' (expected bearer, oauth2 or sigv4)",
            other
        ))),
    }
}

/// POST /api/auth/logout
///
/// Deletes the session regardless of whether it exists or is still valid.
async fn logout(
    State(state): State<Arc<ProxyAppState>>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, AppError> {
    if let Some(session_id) = session_id_from_headers(&headers) {
        state.session_store.delete(&session_id).map_err(|e| {
            warn!(error = %e, "Failed to delete session");
            AppError::ServerError("Failed to delete session".to_string())
        })?;
        debug!("Session deleted");
    }

    Ok(Json(LogoutResponse { success: true }))
}

/// GET /api/auth/session
///
/// Returns non-secret session metadata so the SPA can restore its state
/// after a reload. Credentials never appear here.
async fn session_info(
    State(state): State<Arc<ProxyAppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionInfoResponse>, AppError> {
    let session = require_session(&state, &headers)?;

    Ok(Json(SessionInfoResponse {
        auth_type: session.credentials.auth_type().to_string(),
        endpoint: session.endpoint,
        warehouse: session.warehouse,
        expires_at: session.expires_at,
    }))
}

/// ANY /api/iceberg/*suffix
///
/// Forwards the request to `<session.endpoint>/<suffix>` with outbound
/// authentication resolved from the stored scheme, and relays the upstream
/// status and body verbatim — including upstream 401s, which tell the client
/// its stored credentials are no longer valid.
async fn proxy_catalog(
    State(state): State<Arc<ProxyAppState>>,
    Path(suffix): Path<String>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers)?;

    // SigV4 signs over the payload, so the body is read eagerly; GET/HEAD
    // are always signed over the empty payload.
    let body_bytes = if method == Method::GET || method == Method::HEAD {
        Bytes::new()
    } else {
        body
    };

    let mut target = format!("{}/{}", session.endpoint, suffix);
    if let Some(q) = &query {
        target.push('?');
        target.push_str(q);
    }
    let url = reqwest::Url::parse(&target)
        .map_err(|_| AppError::BadRequest("Invalid catalog request path".to_string()))?;

    // Auth is resolved against the fully-qualified target request: method,
    // URL and body here are exactly what gets sent upstream.
    let outbound = OutboundRequest {
        method: method.as_str(),
        url: &url,
        body: &body_bytes,
    };
    let auth_headers = strategy::resolve(&state.http_client, &session.credentials, &outbound)
        .await
        .map_err(|e| {
            warn!(error = %e, "Outbound auth resolution failed");
            AppError::BadGateway(e.to_string())
        })?;

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|_| AppError::BadRequest("Unsupported HTTP method".to_string()))?;

    let mut request = state.http_client.request(reqwest_method, url);
    for (name, value) in auth_headers {
        request = request.header(name, value);
    }
    if !body_bytes.is_empty() {
        request = request.body(body_bytes.to_vec());
    }

    let upstream = request.send().await.map_err(|e| {
        warn!(error = %e, "Upstream catalog unreachable");
        AppError::BadGateway("Upstream catalog unreachable".to_string())
    })?;

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response_body = upstream.bytes().await.map_err(|e| {
        warn!(error = %e, "Failed to read upstream response body");
        AppError::BadGateway("Upstream catalog unreachable".to_string())
    })?;

    debug!(
        method = %method,
        path = %suffix,
        status = status.as_u16(),
        "Proxied catalog request"
    );

    relay_response(status.as_u16(), content_type, response_body)
}

/// Rebuilds the upstream response for the client: status and body verbatim,
/// content type preserved, other upstream headers dropped.
fn relay_response(
    status: u16,
    content_type: Option<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let status =
        StatusCode::from_u16(status).map_err(|_| {
            AppError::BadGateway("Upstream returned an invalid status".to_string())
        })?;

    let mut builder = Response::builder().status(status);
    if let Some(ct) = content_type {
        builder = builder.header(axum::http::header::CONTENT_TYPE, ct);
    }

    builder
        .body(Body::from(body))
        .map_err(|_| AppError::ServerError("Failed to build response".to_string()))
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.is_empty())
}

/// Resolves the session for an authenticated call.
///
/// Missing header, unknown id, expired row and decryption failure all look
/// the same to the client (401, generic message); decryption failures are
/// additionally logged as a distinct event since they can indicate key loss
/// or storage corruption.
fn require_session(state: &ProxyAppState, headers: &HeaderMap) -> Result<Session, AppError> {
    let Some(session_id) = session_id_from_headers(headers) else {
        return Err(AppError::Unauthorized(
            "Missing X-Session-ID header".to_string(),
        ));
    };

    match state.session_store.get(&session_id) {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(AppError::Unauthorized(
            "Invalid or expired session".to_string(),
        )),
        Err(SessionError::Decryption(e)) => {
            warn!(error = %e, "Stored credentials failed to decrypt (key loss or corruption?)");
            Err(AppError::Unauthorized(
                "Invalid or expired session".to_string(),
            ))
        }
        Err(SessionError::Storage(e)) => {
            warn!(error = %e, "Session lookup failed");
            Err(AppError::ServerError("Session lookup failed".to_string()))
        }
    }
}

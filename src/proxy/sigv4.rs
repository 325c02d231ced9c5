//! AWS Signature Version 4 request signing.
//!
//! Implements the subset of SigV4 needed to authenticate catalog requests:
//! GET/POST-style calls signed over a fixed header set of `host`,
//! `x-amz-content-sha256` and `x-amz-date`. The canonical request, string to
//! sign and key derivation follow the AWS signing specification exactly;
//! any deviation produces a signature the service rejects.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Header names and value that participate in the signature, in the sorted
/// order the canonical request requires.
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// Signing inputs taken from stored sigv4 credentials.
pub struct SigningKey<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

/// Headers to attach to the outbound request.
///
/// `host` is not included: the HTTP client derives it from the target URL,
/// and the signature computes it from the same URL, so the two always agree.
pub struct SignedHeaders {
    pub amz_date: String,
    pub content_sha256: String,
    pub authorization: String,
}

/// Signs a request at the current instant.
///
/// The signature binds to a single timestamp; upstream clock-skew tolerance
/// (typically ±15 minutes) absorbs the gap between signing and delivery.
pub fn sign(key: &SigningKey<'_>, method: &str, url: &Url, body: &[u8]) -> SignedHeaders {
    sign_at(key, method, url, body, Utc::now())
}

/// Signs a request at an explicit instant. Deterministic for fixed inputs.
pub fn sign_at(
    key: &SigningKey<'_>,
    method: &str,
    url: &Url,
    body: &[u8],
    now: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let payload_hash = sha256_hex(body);
    let host = canonical_host(url);

    let canonical_headers = format!(
        "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
        host, payload_hash, amz_date
    );

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.to_uppercase(),
        canonical_uri(url),
        canonical_query_string(url),
        canonical_headers,
        SIGNED_HEADERS,
        payload_hash
    );

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, key.region, key.service
    );

    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    // Four-step key derivation chain per the SigV4 specification
    let k_date = hmac_sha256(
        format!("AWS4{}", key.secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, key.region.as_bytes());
    let k_service = hmac_sha256(&k_region, key.service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");

    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        key.access_key, credential_scope, SIGNED_HEADERS, signature
    );

    SignedHeaders {
        amz_date,
        content_sha256: payload_hash,
        authorization,
    }
}

/// Host component as it appears in the signed `host` header: hostname plus
/// `:port` only when the port is not the scheme default.
fn canonical_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Canonical query string: each parameter URL-decoded then re-encoded with
/// the RFC 3986 unreserved set, entries sorted lexicographically by key,
/// joined as `k=v` pairs with `&`.
fn canonical_query_string(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC-SHA256 accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key of any length is valid");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_key<'a>(region: &'a str, service: &'a str) -> SigningKey<'a> {
        SigningKey {
            access_key: "AKIDEXAMPLE",
            secret_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            region,
            service,
        }
    }

    fn pinned_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn test_reference_signature_get() {
        // Expected values computed with an independent SigV4 implementation
        // for the same inputs.
        let key = example_key("us-east-1", "glue");
        let url = Url::parse("https://glue.us-east-1.amazonaws.com/v1/config?warehouse=demo")
            .unwrap();

        let signed = sign_at(&key, "GET", &url, b"", pinned_instant());

        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert_eq!(
            signed.content_sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/glue/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, \
             Signature=ae4e162c71c6d99ecae287ddda09feb1a3ae8e8d77341f016f95109a7ab919f1"
        );
    }

    #[test]
    fn test_reference_signature_post_with_body_and_port() {
        let key = example_key("eu-west-1", "s3");
        // Unsorted query parameters with an encoded space
        let url = Url::parse("http://localhost:8181/v1/namespaces?b=2&a=1%20z").unwrap();

        let signed = sign_at(&key, "POST", &url, b"{\"filter\":\"x\"}", pinned_instant());

        assert!(signed.authorization.ends_with(
            "Signature=18445c1d983a0e6cd82647eaf3da4257af3324e2860ff4da3bb8df7445cd6dc2"
        ));
    }

    #[test]
    fn test_deterministic_for_fixed_inputs() {
        let key = example_key("us-east-1", "glue");
        let url = Url::parse("https://glue.us-east-1.amazonaws.com/v1/config").unwrap();

        let a = sign_at(&key, "GET", &url, b"", pinned_instant());
        let b = sign_at(&key, "GET", &url, b"", pinned_instant());
        assert_eq!(a.authorization, b.authorization);
    }

    #[test]
    fn test_credential_scope_segment() {
        let key = example_key("us-east-1", "glue");
        let url = Url::parse("https://example.com/v1/config").unwrap();

        let signed = sign_at(&key, "GET", &url, b"", pinned_instant());
        assert!(signed
            .authorization
            .contains("Credential=AKIDEXAMPLE/20150830/us-east-1/glue/aws4_request,"));
        assert!(signed
            .authorization
            .contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date,"));
    }

    #[test]
    fn test_canonical_query_sorting_and_encoding() {
        let url = Url::parse("https://example.com/p?z=last&a=first&key=va%20lue").unwrap();
        assert_eq!(
            canonical_query_string(&url),
            "a=first&key=va%20lue&z=last"
        );

        let none = Url::parse("https://example.com/p").unwrap();
        assert_eq!(canonical_query_string(&none), "");
    }

    #[test]
    fn test_canonical_host_ports() {
        let default_port = Url::parse("https://example.com/p").unwrap();
        assert_eq!(canonical_host(&default_port), "example.com");

        let explicit = Url::parse("http://localhost:8181/p").unwrap();
        assert_eq!(canonical_host(&explicit), "localhost:8181");
    }

    #[test]
    fn test_body_changes_signature() {
        let key = example_key("us-east-1", "glue");
        let url = Url::parse("https://example.com/v1/tables").unwrap();

        let empty = sign_at(&key, "POST", &url, b"", pinned_instant());
        let with_body = sign_at(&key, "POST", &url, b"{}", pinned_instant());
        assert_ne!(empty.authorization, with_body.authorization);
        assert_ne!(empty.content_sha256, with_body.content_sha256);
    }
}

//! Credential extraction from requests.
//!
//! Priority: `Authorization: Bearer` header, then the `jwt` query or form
//! parameter, then the credential cookie. Explicit transports win over the
//! ambient cookie.

use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::CookieJar;

/// Name of the query/form parameter carrying a credential.
pub const JWT_PARAM: &str = "jwt";

/// Token from an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let scheme = value.get(..7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    non_empty(value[7..].trim())
}

/// The `jwt` parameter of a URL-encoded query string or form body.
#[must_use]
pub fn jwt_param(encoded: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(encoded)
        .find(|(key, _)| key == JWT_PARAM)
        .and_then(|(_, value)| non_empty(value.trim()))
}

/// The credential cookie.
#[must_use]
pub fn cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(cookie_name)
        .and_then(|cookie| non_empty(cookie.value()))
}

/// Whether the body is `application/x-www-form-urlencoded`.
#[must_use]
pub fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// A header value as a string, if present and valid UTF-8.
#[must_use]
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

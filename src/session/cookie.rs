//! Session cookie helpers
//!
//! The session id travels in an `HttpOnly; SameSite=Strict` cookie scoped to `/`.

use axum::http::{header, HeaderMap, HeaderValue};

use super::SessionError;

/// Find cookie `name` across every `Cookie` header
pub fn read_session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// `Set-Cookie` value carrying the session id
pub fn session_cookie(
    name: &str,
    session_id: &str,
    max_age_secs: u64,
    secure: bool,
) -> Result<HeaderValue, SessionError> {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, session_id, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }

    HeaderValue::from_str(&cookie).map_err(|_| SessionError::Invalid("bad cookie value".to_string()))
}

/// `Set-Cookie` value that makes the browser drop the session cookie
pub fn clear_session_cookie(name: &str, secure: bool) -> Result<HeaderValue, SessionError> {
    let mut cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        name
    );
    if secure {
        cookie.push_str("; Secure");
    }

    HeaderValue::from_str(&cookie).map_err(|_| SessionError::Invalid("bad cookie value".to_string()))
}

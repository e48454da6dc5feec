// Session state
//
// Cookies, CSRF token and the authenticated flag for one controller
// session. Owned by the client and mutated only by the auth operations
// and the request pipeline; callers get read-only snapshots.

use reqwest::header::{HeaderMap, SET_COOKIE};

/// Header the controller expects the CSRF token in.
pub(crate) const CSRF_HEADER: &str = "x-csrf-token";
/// Header carrying a rotated CSRF token on any response.
pub(crate) const CSRF_ROTATE_HEADER: &str = "x-updated-csrf-token";

/// Credentials and status of the current controller session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    cookies: Option<String>,
    csrf_token: Option<String>,
    authenticated: bool,
}

impl SessionState {
    /// The `Cookie` header value issued by the controller, if any.
    pub fn cookies(&self) -> Option<&str> {
        self.cookies.as_deref()
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub(crate) fn set_csrf_token(&mut self, token: String) {
        self.csrf_token = Some(token);
    }

    /// Replace the stored cookies with the ones set by this response.
    ///
    /// Responses without `Set-Cookie` leave the session untouched.
    pub(crate) fn capture_cookies(&mut self, headers: &HeaderMap) {
        if let Some(cookies) = cookie_header_from(headers) {
            self.cookies = Some(cookies);
        }
    }

    /// Pick up a rotated CSRF token, if the response carries one.
    pub(crate) fn capture_rotated_csrf(&mut self, headers: &HeaderMap) {
        if let Some(token) = header_str(headers, CSRF_ROTATE_HEADER) {
            tracing::trace!("CSRF token rotated");
            self.csrf_token = Some(token.to_owned());
        }
    }

    /// Drop every credential and mark the session unauthenticated.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Fold every `Set-Cookie` header into a single `Cookie` header value.
///
/// Only the leading `name=value` pair of each cookie is kept; attributes
/// like `Path` or `HttpOnly` are not sent back to the server.
fn cookie_header_from(headers: &HeaderMap) -> Option<String> {
    let pairs: Vec<&str> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(set_cookies: &[&'static str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &c in set_cookies {
            map.append(SET_COOKIE, HeaderValue::from_static(c));
        }
        map
    }

    #[test]
    fn cookies_are_joined_without_attributes() {
        let mut session = SessionState::default();
        session.capture_cookies(&headers(&[
            "unifises=abc123; Path=/; Secure; HttpOnly",
            "csrf_token=xyz; Path=/",
        ]));
        assert_eq!(session.cookies(), Some("unifises=abc123; csrf_token=xyz"));
    }

    #[test]
    fn new_cookies_replace_old_ones() {
        let mut session = SessionState::default();
        session.capture_cookies(&headers(&["a=1", "b=2"]));
        session.capture_cookies(&headers(&["c=3"]));
        assert_eq!(session.cookies(), Some("c=3"));

        // No Set-Cookie: keep what we have.
        session.capture_cookies(&HeaderMap::new());
        assert_eq!(session.cookies(), Some("c=3"));
    }

    #[test]
    fn rotated_csrf_replaces_token() {
        let mut session = SessionState::default();
        session.set_csrf_token("first".into());

        let mut map = HeaderMap::new();
        map.insert(CSRF_ROTATE_HEADER, HeaderValue::from_static("second"));
        session.capture_rotated_csrf(&map);

        assert_eq!(session.csrf_token(), Some("second"));
    }

    #[test]
    fn clear_resets_everything() {
        let mut session = SessionState::default();
        session.capture_cookies(&headers(&["a=1"]));
        session.set_csrf_token("t".into());
        session.mark_authenticated();

        session.clear();
        assert_eq!(session, SessionState::default());
        assert!(!session.is_authenticated());
    }
}

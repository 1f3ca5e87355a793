//! Session authentication state and token tracking
//!
//! [`SessionState`] holds the bearer and anti-forgery tokens learned from
//! responses. [`AuthTracker`] moves tokens between that state and request
//! or response headers; it keeps no state of its own.

use crate::collection::StringMap;
use crate::config::CollectionConfig;
use crate::executor::ResponseSnapshot;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

pub const XSRF_COOKIE: &str = "XSRF-TOKEN";

static SET_COOKIE_XSRF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"XSRF-TOKEN=([^;]+)").expect("valid cookie pattern"));

/// Tokens shared by every request of the loaded collection.
///
/// Tokens only change when a newer one is extracted or the collection is
/// removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub bearer_token: Option<String>,
    pub xsrf_token: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bearer_token = None;
        self.xsrf_token = None;
    }

    pub fn has_tokens(&self) -> bool {
        self.bearer_token.is_some() || self.xsrf_token.is_some()
    }
}

/// Where a token update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    ResponseBody,
    Header,
    Cookie,
    SetCookie,
}

/// One token that changed during extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenUpdate {
    pub kind: TokenKind,
    pub source: TokenSource,
    pub preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Bearer,
    Xsrf,
}

/// Headers added to an outgoing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Injected {
    pub bearer: bool,
    pub xsrf: bool,
}

/// Applies and harvests session tokens
#[derive(Debug, Clone)]
pub struct AuthTracker {
    csrf_header: String,
    csrf_placeholder: String,
}

impl Default for AuthTracker {
    fn default() -> Self {
        Self::new(&CollectionConfig::default())
    }
}

impl AuthTracker {
    pub fn new(config: &CollectionConfig) -> Self {
        Self {
            csrf_header: config.csrf_header.clone(),
            csrf_placeholder: config.csrf_placeholder.clone(),
        }
    }

    pub fn csrf_header(&self) -> &str {
        &self.csrf_header
    }

    pub fn csrf_placeholder(&self) -> &str {
        &self.csrf_placeholder
    }

    /// True when the CSRF header is missing, empty or still the placeholder
    pub fn csrf_unset(&self, headers: &StringMap) -> bool {
        header_value(headers, &self.csrf_header)
            .map_or(true, |v| v.is_empty() || v == self.csrf_placeholder)
    }

    /// Add held tokens to `headers` without overriding explicit values.
    /// An empty header counts as absent.
    pub fn inject(&self, session: &SessionState, headers: &mut StringMap) -> Injected {
        let mut injected = Injected::default();

        if let Some(token) = &session.bearer_token {
            if header_value(headers, "Authorization").map_or(true, str::is_empty) {
                set_header(headers, "Authorization", format!("Bearer {}", token));
                injected.bearer = true;
                tracing::debug!(token = %preview(token), "Added bearer token");
            }
        }

        if let Some(token) = &session.xsrf_token {
            if self.csrf_unset(headers) {
                set_header(headers, &self.csrf_header, token.clone());
                injected.xsrf = true;
                tracing::debug!(token = %preview(token), "Added XSRF token");
            }
        }

        injected
    }

    /// Adopt tokens found in `response`. Never fails.
    ///
    /// A `token` field in a JSON body becomes the bearer token. The XSRF token
    /// is taken from the `XSRF-TOKEN` header, then cookie, then the raw
    /// `Set-Cookie` text, each overwriting when it differs.
    pub fn extract(&self, session: &mut SessionState, response: &ResponseSnapshot) -> Vec<TokenUpdate> {
        let mut updates = Vec::new();

        if let Some(token) = body_token(&response.body) {
            if session.bearer_token.as_deref() != Some(token.as_str()) {
                updates.push(TokenUpdate {
                    kind: TokenKind::Bearer,
                    source: TokenSource::ResponseBody,
                    preview: preview(&token),
                });
                session.bearer_token = Some(token);
            }
        }

        let set_cookie = response.header_values("set-cookie").join(", ");
        let candidates = [
            (TokenSource::Header, response.header(XSRF_COOKIE).map(str::to_string)),
            (TokenSource::Cookie, response.cookie(XSRF_COOKIE).map(str::to_string)),
            (
                TokenSource::SetCookie,
                SET_COOKIE_XSRF
                    .captures(&set_cookie)
                    .map(|caps| caps[1].trim().to_string()),
            ),
        ];

        for (source, candidate) in candidates {
            let Some(token) = candidate.filter(|t| !t.is_empty()) else {
                continue;
            };
            if session.xsrf_token.as_deref() != Some(token.as_str()) {
                updates.push(TokenUpdate {
                    kind: TokenKind::Xsrf,
                    source,
                    preview: preview(&token),
                });
                session.xsrf_token = Some(token);
            }
        }

        for update in &updates {
            tracing::info!(kind = ?update.kind, source = ?update.source, token = %update.preview, "Token updated");
        }
        updates
    }
}

fn body_token(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    match json.get("token")? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// First 20 characters followed by an ellipsis
pub fn preview(token: &str) -> String {
    let head: String = token.chars().take(20).collect();
    format!("{}...", head)
}

/// Case-insensitive header lookup
pub fn header_value<'a>(headers: &'a StringMap, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Set a header, replacing any existing entry that differs only in case
pub fn set_header(headers: &mut StringMap, name: &str, value: String) {
    match headers.keys().position(|k| k.eq_ignore_ascii_case(name)) {
        Some(index) => {
            if let Some((_, existing)) = headers.get_index_mut(index) {
                *existing = value;
            }
        }
        None => {
            headers.insert(name.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn response(headers: &[(&str, &str)], body: &str) -> ResponseSnapshot {
        ResponseSnapshot::new(
            200,
            Duration::from_millis(5),
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body.to_string(),
        )
    }

    #[test]
    fn test_bearer_token_round_trip() {
        let tracker = AuthTracker::default();
        let mut session = SessionState::new();

        let updates = tracker.extract(&mut session, &response(&[], r#"{"token":"abc"}"#));
        assert_eq!(updates.len(), 1);
        assert_eq!(session.bearer_token.as_deref(), Some("abc"));

        let mut headers = StringMap::new();
        let injected = tracker.inject(&session, &mut headers);
        assert!(injected.bearer);
        assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer abc"));
    }

    #[test]
    fn test_explicit_authorization_is_kept() {
        let tracker = AuthTracker::default();
        let session = SessionState {
            bearer_token: Some("abc".to_string()),
            xsrf_token: None,
        };
        let mut headers = StringMap::new();
        headers.insert("authorization".to_string(), "Basic xyz".to_string());

        tracker.inject(&session, &mut headers);
        assert_eq!(headers.len(), 1);
        assert_eq!(header_value(&headers, "Authorization"), Some("Basic xyz"));
    }

    #[test]
    fn test_empty_authorization_gets_bearer() {
        let tracker = AuthTracker::default();
        let session = SessionState {
            bearer_token: Some("abc".to_string()),
            xsrf_token: None,
        };
        let mut headers = StringMap::new();
        headers.insert("Authorization".to_string(), String::new());

        assert!(tracker.inject(&session, &mut headers).bearer);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["Authorization"], "Bearer abc");
    }

    #[test]
    fn test_xsrf_replaces_placeholder_and_empty() {
        let tracker = AuthTracker::default();
        let session = SessionState {
            bearer_token: None,
            xsrf_token: Some("csrf-1".to_string()),
        };

        for initial in ["{{xsrf_token}}", ""] {
            let mut headers = StringMap::new();
            headers.insert("X-XSRF-TOKEN".to_string(), initial.to_string());
            assert!(tracker.inject(&session, &mut headers).xsrf);
            assert_eq!(headers["X-XSRF-TOKEN"], "csrf-1");
        }

        let mut explicit = StringMap::new();
        explicit.insert("X-XSRF-TOKEN".to_string(), "mine".to_string());
        assert!(!tracker.inject(&session, &mut explicit).xsrf);
        assert_eq!(explicit["X-XSRF-TOKEN"], "mine");
    }

    #[test]
    fn test_xsrf_precedence_last_source_wins() {
        let tracker = AuthTracker::default();
        let mut session = SessionState::new();

        let resp = response(
            &[
                ("XSRF-TOKEN", "from-header"),
                ("Set-Cookie", "XSRF-TOKEN=from-cookie; Path=/"),
            ],
            "",
        );
        let updates = tracker.extract(&mut session, &resp);

        // header, then cookie (differs), then Set-Cookie text (same as cookie)
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].source, TokenSource::Header);
        assert_eq!(updates[1].source, TokenSource::Cookie);
        assert_eq!(session.xsrf_token.as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_set_cookie_fragment_among_other_cookies() {
        let tracker = AuthTracker::default();
        let mut session = SessionState::new();
        let resp = response(
            &[("Set-Cookie", "sid=1; HttpOnly"), ("Set-Cookie", "XSRF-TOKEN=xyz; Path=/")],
            "",
        );
        tracker.extract(&mut session, &resp);
        assert_eq!(session.xsrf_token.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_non_json_and_unchanged_yield_no_updates() {
        let tracker = AuthTracker::default();
        let mut session = SessionState {
            bearer_token: Some("abc".to_string()),
            xsrf_token: None,
        };

        assert!(tracker.extract(&mut session, &response(&[], "<html>")).is_empty());
        assert!(tracker
            .extract(&mut session, &response(&[], r#"{"token":"abc"}"#))
            .is_empty());
        assert!(tracker
            .extract(&mut session, &response(&[], r#"{"token":42}"#))
            .is_empty());
        assert_eq!(session.bearer_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_clear() {
        let mut session = SessionState {
            bearer_token: Some("a".to_string()),
            xsrf_token: Some("b".to_string()),
        };
        assert!(session.has_tokens());
        session.clear();
        assert!(!session.has_tokens());
    }
}

//! HTTP execution
//!
//! Sends a resolved request and classifies the result. Every call ends in an
//! [`Exchange`]; timeouts and transport errors are outcomes, not errors.

use crate::collection::{HttpMethod, StringMap};
use crate::config::HttpConfig;
use crate::error::{AppError, AppResult};
use crate::session::header_value;
use crate::templates::DynamicTemplate;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};

/// How a request ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Status below 400
    Success { status: u16 },
    /// Status 400 or above
    HttpError { status: u16 },
    Timeout { timeout_ms: u64 },
    Transport { message: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status } | Self::HttpError { status } => Some(*status),
            _ => None,
        }
    }

    fn from_status(status: u16) -> Self {
        if status < 400 {
            Self::Success { status }
        } else {
            Self::HttpError { status }
        }
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { status } | Self::HttpError { status } => write!(f, "HTTP {}", status),
            Self::Timeout { timeout_ms } => write!(f, "timeout after {} ms", timeout_ms),
            Self::Transport { message } => write!(f, "transport error: {}", message),
        }
    }
}

/// The parts of a response kept after the connection is done
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub elapsed_ms: f64,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ResponseSnapshot {
    pub fn new(status: u16, elapsed: Duration, headers: Vec<(String, String)>, body: String) -> Self {
        Self {
            status,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            headers,
            body,
        }
    }

    /// First header named `name`, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Value of cookie `name` set by any `Set-Cookie` header
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header_values("set-cookie").into_iter().find_map(|line| {
            let pair = line.split(';').next()?;
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then(|| value.trim())
        })
    }

    /// Pretty JSON when the body parses, raw text otherwise
    pub fn render_body(&self) -> String {
        if self.body.is_empty() {
            return "(Empty)".to_string();
        }
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|json| serde_json::to_string_pretty(&json).ok())
            .unwrap_or_else(|| self.body.clone())
    }
}

/// A request ready for the wire: URL joined and inputs validated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: StringMap,
    /// Parsed JSON body, if one will be sent
    pub body: Option<serde_json::Value>,
    pub params: StringMap,
}

impl OutgoingRequest {
    /// Validate a dynamic template and decide what goes on the wire.
    ///
    /// GET/HEAD/OPTIONS send params only. POST/PUT/PATCH send a JSON body
    /// (`{}` when empty) plus any params. DELETE sends the body when present,
    /// otherwise the params, otherwise nothing.
    pub fn from_template(template: &DynamicTemplate) -> AppResult<Self> {
        let url = join_url(&template.base_url, &template.path);
        if !is_valid_url(&url) {
            return Err(AppError::validation(
                "url",
                format!("'{}' is not an http(s) URL with a host", url),
            ));
        }

        let parsed_body = if template.body.trim().is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<serde_json::Value>(&template.body)
                    .map_err(|e| AppError::validation("body", format!("invalid JSON: {}", e)))?,
            )
        };

        let mut headers = template.headers.clone();
        if header_value(&headers, "Content-Type").is_none() {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }

        let (body, params) = match template.method {
            HttpMethod::Get | HttpMethod::Head | HttpMethod::Options => (None, template.params.clone()),
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => (
                Some(parsed_body.unwrap_or_else(|| serde_json::json!({}))),
                template.params.clone(),
            ),
            HttpMethod::Delete => match parsed_body {
                Some(body) => (Some(body), StringMap::new()),
                None => (None, template.params.clone()),
            },
        };

        Ok(Self {
            method: template.method,
            url,
            headers,
            body,
            params,
        })
    }
}

/// One finished call
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub request: OutgoingRequest,
    pub outcome: ExecutionOutcome,
    pub response: Option<ResponseSnapshot>,
    pub elapsed_ms: f64,
}

impl Exchange {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Sends requests through a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    timeout: Duration,
}

impl HttpExecutor {
    /// Build the client. Certificate validation follows
    /// `accept_invalid_certs`.
    pub fn new(config: &HttpConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::validation("http client", e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, request: &OutgoingRequest) -> Exchange {
        let start = Instant::now();

        tracing::debug!(method = %request.method, url = %request.url, "Sending request");

        let outcome = self.send(request).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (outcome, response) = match outcome {
            Ok(snapshot) => (ExecutionOutcome::from_status(snapshot.status), Some(snapshot)),
            Err(e) if e.is_timeout() => (
                ExecutionOutcome::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                },
                None,
            ),
            Err(e) => (
                ExecutionOutcome::Transport {
                    message: e.to_string(),
                },
                None,
            ),
        };

        tracing::info!(
            method = %request.method,
            url = %request.url,
            outcome = %outcome,
            latency_ms = %format!("{:.1}", elapsed_ms),
            "Request finished"
        );

        Exchange {
            request: request.clone(),
            outcome,
            response,
            elapsed_ms,
        }
    }

    async fn send(&self, request: &OutgoingRequest) -> Result<ResponseSnapshot, reqwest::Error> {
        let start = Instant::now();
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body).unwrap_or_default());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response.text().await?;

        Ok(ResponseSnapshot::new(status, start.elapsed(), headers, body))
    }
}

/// Join with exactly one slash between base and path
pub fn join_url(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) if !path.is_empty() => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// An http or https URL with a non-empty host
pub fn is_valid_url(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(method: HttpMethod, body: &str, params: &[(&str, &str)]) -> DynamicTemplate {
        DynamicTemplate {
            method,
            base_url: "https://api.test.io".to_string(),
            path: "/items".to_string(),
            headers: StringMap::new(),
            body: body.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://a.io", "/x"), "https://a.io/x");
        assert_eq!(join_url("https://a.io/", "/x"), "https://a.io/x");
        assert_eq!(join_url("https://a.io", "x"), "https://a.io/x");
        assert_eq!(join_url("https://a.io/", "x"), "https://a.io/x");
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("https://a.io/x"));
        assert!(is_valid_url("http://localhost:8080"));
        assert!(!is_valid_url("ftp://a.io"));
        assert!(!is_valid_url("/just/a/path"));
        assert!(!is_valid_url(""));
    }

    #[test]
    fn test_get_sends_params_only() {
        let req = OutgoingRequest::from_template(&template(HttpMethod::Get, "{\"a\":1}", &[("page", "1")]))
            .unwrap();
        assert!(req.body.is_none());
        assert_eq!(req.params.len(), 1);
        assert_eq!(header_value(&req.headers, "content-type"), Some("application/json"));
    }

    #[test]
    fn test_post_defaults_to_empty_object() {
        let req = OutgoingRequest::from_template(&template(HttpMethod::Post, "", &[])).unwrap();
        assert_eq!(req.body, Some(serde_json::json!({})));
    }

    #[test]
    fn test_delete_prefers_body_then_params() {
        let with_body =
            OutgoingRequest::from_template(&template(HttpMethod::Delete, "{\"id\":1}", &[("id", "1")]))
                .unwrap();
        assert_eq!(with_body.body, Some(serde_json::json!({"id": 1})));
        assert!(with_body.params.is_empty());

        let with_params =
            OutgoingRequest::from_template(&template(HttpMethod::Delete, "", &[("id", "1")])).unwrap();
        assert!(with_params.body.is_none());
        assert_eq!(with_params.params.len(), 1);

        let bare = OutgoingRequest::from_template(&template(HttpMethod::Delete, "", &[])).unwrap();
        assert!(bare.body.is_none());
        assert!(bare.params.is_empty());
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let bad_body = OutgoingRequest::from_template(&template(HttpMethod::Post, "{nope", &[]));
        assert!(matches!(bad_body, Err(AppError::Validation { .. })));

        let mut bad_url = template(HttpMethod::Get, "", &[]);
        bad_url.base_url = "not a url".to_string();
        assert!(matches!(
            OutgoingRequest::from_template(&bad_url),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn test_explicit_content_type_kept() {
        let mut t = template(HttpMethod::Post, "{}", &[]);
        t.headers.insert("content-type".to_string(), "text/plain".to_string());
        let req = OutgoingRequest::from_template(&t).unwrap();
        assert_eq!(req.headers.len(), 1);
        assert_eq!(header_value(&req.headers, "Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_render_body() {
        let json = ResponseSnapshot::new(200, Duration::ZERO, vec![], "{\"a\":1}".to_string());
        assert_eq!(json.render_body(), "{\n  \"a\": 1\n}");
        let text = ResponseSnapshot::new(200, Duration::ZERO, vec![], "hello".to_string());
        assert_eq!(text.render_body(), "hello");
        let empty = ResponseSnapshot::new(204, Duration::ZERO, vec![], String::new());
        assert_eq!(empty.render_body(), "(Empty)");
    }

    #[test]
    fn test_outcome_classification() {
        assert!(ExecutionOutcome::from_status(399).is_success());
        assert!(!ExecutionOutcome::from_status(400).is_success());
        assert_eq!(ExecutionOutcome::from_status(404).status(), Some(404));
        assert_eq!(ExecutionOutcome::Timeout { timeout_ms: 10 }.status(), None);
    }

    #[test]
    fn test_executor_creation() {
        let executor = HttpExecutor::new(&HttpConfig::default()).unwrap();
        assert_eq!(executor.timeout(), Duration::from_secs(30));
    }
}

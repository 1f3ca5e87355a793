//! Discovery of login-like requests anywhere in a collection

use super::catalog::StringMap;
use super::document::{CollectionDocument, ItemNode, RequestDef, UrlDef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const LOGIN_KEYWORDS: [&str; 7] = [
    "login",
    "auth",
    "authenticate",
    "signin",
    "sign-in",
    "token",
    "session",
];

/// A request that looks like it issues credentials
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginRequest {
    /// Folder path joined with `/`, ending in the request name
    pub path: String,
    pub method: String,
    pub url: String,
    pub headers: StringMap,
    pub body: String,
}

/// Walk every folder and collect requests whose name or URL mentions a
/// login keyword
pub fn find_login_requests(doc: &CollectionDocument) -> Vec<LoginRequest> {
    let mut found = Vec::new();
    for raw in &doc.item {
        search(raw, "", &mut found);
    }
    found
}

fn search(raw: &Value, parent: &str, found: &mut Vec<LoginRequest>) {
    let Ok(node) = ItemNode::parse(raw) else {
        return;
    };
    let path = if parent.is_empty() {
        node.name().to_string()
    } else {
        format!("{}/{}", parent, node.name())
    };

    if let Some(request) = node.request.as_ref().and_then(|r| RequestDef::deserialize(r).ok()) {
        let url = request.url.as_ref().map(UrlDef::to_raw).unwrap_or_default();
        if is_login_like(node.name(), &url) {
            found.push(LoginRequest {
                path,
                method: request.method.clone().unwrap_or_else(|| "POST".to_string()),
                url,
                headers: request
                    .header
                    .iter()
                    .filter(|h| h.is_enabled())
                    .map(|h| (h.key.clone(), h.value_string()))
                    .collect(),
                body: request
                    .body
                    .as_ref()
                    .filter(|b| b.mode.as_deref() == Some("raw"))
                    .and_then(|b| b.raw.clone())
                    .unwrap_or_else(|| "{}".to_string()),
            });
        }
    } else if let Some(children) = &node.item {
        for child in children {
            search(child, &path, found);
        }
    }
}

fn is_login_like(name: &str, url: &str) -> bool {
    let name = name.to_lowercase();
    let url = url.to_lowercase();
    LOGIN_KEYWORDS
        .iter()
        .any(|keyword| name.contains(keyword) || url.contains(keyword))
}

//! Request collection document types (Postman v2.x shape)
//!
//! Items are kept as raw JSON until they are visited so that one malformed
//! entry cannot fail the whole document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCHEMA_V21: &str = "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

/// Root of a collection document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<DocumentInfo>,
    #[serde(default)]
    pub item: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable: Vec<Value>,
}

impl CollectionDocument {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Top-level `{key, value}` pairs; entries without both are ignored
    pub fn variables(&self) -> Vec<(String, String)> {
        self.variable
            .iter()
            .filter_map(|var| {
                let key = var.get("key")?.as_str()?;
                let value = var.get("value")?;
                Some((key.to_string(), value_to_string(value)))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// A node of the item tree: a folder when `item` is present, else a request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
}

impl ItemNode {
    pub fn parse(value: &Value) -> serde_json::Result<Self> {
        ItemNode::deserialize(value)
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// A folder with at least one child
    pub fn is_populated_folder(&self) -> bool {
        self.item.as_ref().is_some_and(|items| !items.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<UrlDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header: Vec<KeyValueDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyDef>,
}

impl RequestDef {
    pub fn query(&self) -> &[KeyValueDef] {
        match &self.url {
            Some(UrlDef::Structured(url)) => &url.query,
            _ => &[],
        }
    }
}

/// Either a plain URL string or a structured breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlDef {
    Raw(String),
    Structured(StructuredUrl),
}

impl UrlDef {
    /// The URL as text, assembled from parts when `raw` is absent
    pub fn to_raw(&self) -> String {
        match self {
            Self::Raw(raw) => raw.clone(),
            Self::Structured(url) => url.to_raw(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredUrl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<Segments>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Segments>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<KeyValueDef>,
}

impl StructuredUrl {
    fn to_raw(&self) -> String {
        if let Some(raw) = self.raw.as_deref().filter(|raw| !raw.is_empty()) {
            return raw.to_string();
        }

        let path = self
            .path
            .as_ref()
            .map(|p| p.join("/"))
            .unwrap_or_default();
        let path = if path.is_empty() || path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };

        let Some(host) = self.host.as_ref().map(|h| h.join(".")) else {
            return path;
        };
        let mut url = match &self.protocol {
            Some(protocol) => format!("{}://{}", protocol, host),
            None => host,
        };
        if let Some(port) = &self.port {
            url.push(':');
            url.push_str(&value_to_string(port));
        }
        url.push_str(&path);
        url
    }
}

/// `host`/`path` may be given as one string or as a list of segments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segments {
    One(String),
    Many(Vec<String>),
}

impl Segments {
    pub fn join(&self, sep: &str) -> String {
        match self {
            Self::One(s) => s.clone(),
            Self::Many(parts) => parts.join(sep),
        }
    }
}

/// Header, query param or form field entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyValueDef {
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

impl KeyValueDef {
    pub fn enabled(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(Value::String(value.into())),
            enabled: Some(true),
            disabled: None,
        }
    }

    /// Absent flags mean enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true) && !self.disabled.unwrap_or(false)
    }

    pub fn value_string(&self) -> String {
        self.value.as_ref().map(value_to_string).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formdata: Vec<KeyValueDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urlencoded: Vec<KeyValueDef>,
}

impl BodyDef {
    pub fn raw(content: impl Into<String>) -> Self {
        Self {
            mode: Some("raw".to_string()),
            raw: Some(content.into()),
            ..Self::default()
        }
    }
}

/// Strings verbatim, `null` as empty, anything else as JSON text
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

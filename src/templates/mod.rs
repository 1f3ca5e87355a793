//! Request template store
//!
//! Layers user-saved overrides over the imported [`Catalog`] and derives the
//! ready-to-send [`DynamicTemplate`] for a method key. Imported templates are
//! never modified; edits only ever land in [`OverrideLayers`].

use crate::collection::{
    split_url, Catalog, HttpMethod, ImportedCollection, MethodKey, RequestTemplate, StringMap,
};
use crate::config::CollectionConfig;
use crate::error::{AppError, AppResult};
use crate::executor::is_valid_url;
use crate::session::{set_header, SessionState};
use crate::variables::VariableScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Collection variable consulted when a request names no host
pub const BASE_URL_VARIABLE: &str = "baseUrl";

/// The user-editable fields of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideField {
    Headers,
    Body,
    Params,
    BaseUrl,
    Path,
}

impl OverrideField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Headers => "headers",
            Self::Body => "body",
            Self::Params => "params",
            Self::BaseUrl => "base_url",
            Self::Path => "path",
        }
    }
}

impl fmt::Display for OverrideField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headers" => Ok(Self::Headers),
            "body" => Ok(Self::Body),
            "params" => Ok(Self::Params),
            "base_url" | "url" => Ok(Self::BaseUrl),
            "path" => Ok(Self::Path),
            other => Err(AppError::validation(
                "field",
                format!("unknown field '{}'", other),
            )),
        }
    }
}

/// Fields the user explicitly saved, per method key.
///
/// A missing entry means "use the imported value".
#[derive(Debug, Clone, Default)]
pub struct OverrideLayers {
    headers: HashMap<MethodKey, StringMap>,
    body: HashMap<MethodKey, String>,
    params: HashMap<MethodKey, StringMap>,
    base_url: HashMap<MethodKey, String>,
    path: HashMap<MethodKey, String>,
}

impl OverrideLayers {
    pub fn headers(&self, key: &MethodKey) -> Option<&StringMap> {
        self.headers.get(key)
    }

    pub fn body(&self, key: &MethodKey) -> Option<&str> {
        self.body.get(key).map(String::as_str)
    }

    pub fn params(&self, key: &MethodKey) -> Option<&StringMap> {
        self.params.get(key)
    }

    pub fn base_url(&self, key: &MethodKey) -> Option<&str> {
        self.base_url.get(key).map(String::as_str)
    }

    pub fn path(&self, key: &MethodKey) -> Option<&str> {
        self.path.get(key).map(String::as_str)
    }

    /// Fields saved for `key`
    pub fn saved_fields(&self, key: &MethodKey) -> Vec<OverrideField> {
        [
            (OverrideField::Headers, self.headers.contains_key(key)),
            (OverrideField::Body, self.body.contains_key(key)),
            (OverrideField::Params, self.params.contains_key(key)),
            (OverrideField::BaseUrl, self.base_url.contains_key(key)),
            (OverrideField::Path, self.path.contains_key(key)),
        ]
        .into_iter()
        .filter_map(|(field, saved)| saved.then_some(field))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
            && self.body.is_empty()
            && self.params.is_empty()
            && self.base_url.is_empty()
            && self.path.is_empty()
    }

    fn retain(&mut self, keep: impl Fn(&MethodKey) -> bool) {
        self.headers.retain(|k, _| keep(k));
        self.body.retain(|k, _| keep(k));
        self.params.retain(|k, _| keep(k));
        self.base_url.retain(|k, _| keep(k));
        self.path.retain(|k, _| keep(k));
    }

    fn clear(&mut self) {
        self.retain(|_| false);
    }
}

/// Whether the body and params fields apply to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldVisibility {
    pub body: bool,
    pub params: bool,
}

impl FieldVisibility {
    /// Body applies to POST/PUT or when one already exists; params apply to
    /// GET or when some already exist
    pub fn of(method: HttpMethod, body: &str, params: &StringMap) -> Self {
        Self {
            body: matches!(method, HttpMethod::Post | HttpMethod::Put) || !body.trim().is_empty(),
            params: method == HttpMethod::Get || !params.is_empty(),
        }
    }
}

/// A fully resolved request, ready to be validated and sent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicTemplate {
    pub method: HttpMethod,
    pub base_url: String,
    pub path: String,
    pub headers: StringMap,
    pub body: String,
    pub params: StringMap,
}

impl DynamicTemplate {
    pub fn visibility(&self) -> FieldVisibility {
        FieldVisibility::of(self.method, &self.body, &self.params)
    }
}

/// Catalog, collection variables and override layers of the loaded collection
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    catalog: Catalog,
    variables: VariableScope,
    overrides: OverrideLayers,
    materialized: HashMap<MethodKey, DynamicTemplate>,
    config: CollectionConfig,
    /// Set by `load` even when the import produced no templates
    loaded: bool,
}

impl TemplateStore {
    pub fn new(config: CollectionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Replace the catalog with a fresh import.
    ///
    /// Overrides and cached templates survive only for keys that still exist.
    pub fn load(&mut self, imported: ImportedCollection) {
        self.catalog = imported.catalog;
        self.variables = imported.variables;
        self.loaded = true;

        let catalog = &self.catalog;
        self.overrides.retain(|key| catalog.contains(key));
        self.materialized.retain(|key, _| catalog.contains(key));
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn variables(&self) -> &VariableScope {
        &self.variables
    }

    pub fn overrides(&self) -> &OverrideLayers {
        &self.overrides
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn has_collection(&self) -> bool {
        self.loaded
    }

    /// Look up a rendered `"{category} - {name}"` key
    pub fn key(&self, raw: &str) -> AppResult<MethodKey> {
        if !self.has_collection() {
            return Err(AppError::NoCollection);
        }
        self.catalog.require(raw)
    }

    fn template(&self, key: &MethodKey) -> AppResult<&RequestTemplate> {
        if !self.has_collection() {
            return Err(AppError::NoCollection);
        }
        self.catalog
            .get(key)
            .ok_or_else(|| AppError::UnknownMethod(key.to_string()))
    }

    /// Saved base URL, else the template's, else the `baseUrl` variable,
    /// else the configured fallback host
    pub fn effective_base_url(&self, key: &MethodKey) -> AppResult<String> {
        let template = self.template(key)?;
        let candidates = [
            self.overrides.base_url(key).map(str::to_string),
            template.base_url.clone(),
            self.variables.get(BASE_URL_VARIABLE).map(str::to_string),
        ];

        Ok(candidates
            .into_iter()
            .flatten()
            .map(|url| self.variables.resolve(&url))
            .find(|url| !url.is_empty())
            .unwrap_or_else(|| self.config.fallback_base_url.clone()))
    }

    /// Derive the dynamic template for `key` without caching it.
    ///
    /// Saved headers are used exactly as saved. Without them the imported
    /// headers are resolved and the CSRF header is forced to the known token,
    /// or to the placeholder while none is known.
    pub fn resolve(&self, key: &MethodKey, session: &SessionState) -> AppResult<DynamicTemplate> {
        let template = self.template(key)?;

        let base_url = self.effective_base_url(key)?;
        let path = match self.overrides.path(key) {
            Some(path) => self.variables.resolve(path),
            None => template.path.clone(),
        };

        let headers = match self.overrides.headers(key) {
            Some(saved) => self.resolve_values(saved),
            None => {
                let mut headers = self.resolve_values(&template.headers);
                let csrf = session
                    .xsrf_token
                    .clone()
                    .unwrap_or_else(|| self.config.csrf_placeholder.clone());
                set_header(&mut headers, &self.config.csrf_header, csrf);
                headers
            }
        };

        let body = self
            .overrides
            .body(key)
            .unwrap_or(template.body.as_str())
            .to_string();
        let params = self
            .overrides
            .params(key)
            .unwrap_or(&template.params)
            .clone();

        let visible = FieldVisibility::of(template.method, &body, &params);

        Ok(DynamicTemplate {
            method: template.method,
            base_url,
            path,
            headers,
            body: if visible.body { body } else { String::new() },
            params: if visible.params { params } else { StringMap::new() },
        })
    }

    /// Re-derive the dynamic template for `key` and cache it
    pub fn materialize(&mut self, key: &MethodKey, session: &SessionState) -> AppResult<DynamicTemplate> {
        let dynamic = self.resolve(key, session)?;
        self.materialized.insert(key.clone(), dynamic.clone());
        tracing::debug!(key = %key, "Materialized dynamic template");
        Ok(dynamic)
    }

    pub fn cached(&self, key: &MethodKey) -> Option<&DynamicTemplate> {
        self.materialized.get(key)
    }

    /// The cached template when one exists, else a freshly resolved one
    pub fn prepared(&self, key: &MethodKey, session: &SessionState) -> AppResult<DynamicTemplate> {
        match self.cached(key) {
            Some(dynamic) => Ok(dynamic.clone()),
            None => self.resolve(key, session),
        }
    }

    /// Validate `value` and store it as the override of `field` for `key`.
    ///
    /// Saving the same value twice leaves the same state. Nothing is written
    /// when validation fails.
    pub fn save(&mut self, field: OverrideField, key: &MethodKey, value: &str) -> AppResult<()> {
        self.template(key)?;

        match field {
            OverrideField::Headers => {
                let headers = parse_object("headers", value)?;
                self.overrides.headers.insert(key.clone(), headers);
            }
            OverrideField::Body => {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    serde_json::from_str::<Value>(trimmed)
                        .map_err(|e| AppError::validation("body", format!("invalid JSON: {}", e)))?;
                }
                self.overrides.body.insert(key.clone(), trimmed.to_string());
            }
            OverrideField::Params => {
                let params = parse_params(value)?;
                self.overrides.params.insert(key.clone(), params);
            }
            OverrideField::BaseUrl => {
                let url = value.trim().trim_end_matches('/').to_string();
                if !is_valid_url(&self.variables.resolve(&url)) {
                    return Err(AppError::validation(
                        "base_url",
                        format!("'{}' is not an http(s) URL with a host", value.trim()),
                    ));
                }
                self.overrides.base_url.insert(key.clone(), url);
            }
            OverrideField::Path => {
                let path = extract_path(value);
                if path.is_empty() {
                    return Err(AppError::validation("path", "path must not be empty"));
                }
                self.overrides.path.insert(key.clone(), path);
            }
        }

        tracing::info!(key = %key, field = %field, "Saved override");
        Ok(())
    }

    /// Forget the catalog, variables, overrides and cached templates
    pub fn clear(&mut self) {
        self.catalog.clear();
        self.variables.clear();
        self.overrides.clear();
        self.materialized.clear();
        self.loaded = false;
    }

    fn resolve_values(&self, map: &StringMap) -> StringMap {
        map.iter()
            .map(|(k, v)| (k.clone(), self.variables.resolve(v)))
            .collect()
    }
}

/// The path of a URL, or the input itself with a leading `/` when it has
/// no scheme
pub fn extract_path(url_or_path: &str) -> String {
    let trimmed = url_or_path.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let (_, path, _) = split_url(trimmed.split_once('?').map_or(trimmed, |(head, _)| head));
    path
}

fn parse_object(field: &str, value: &str) -> AppResult<StringMap> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(StringMap::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, crate::collection::document::value_to_string(&v)))
            .collect()),
        Ok(_) => Err(AppError::validation(field, "expected a JSON object")),
        Err(e) => Err(AppError::validation(field, format!("invalid JSON: {}", e))),
    }
}

/// Params as a JSON object, or `a=1&b=2` text
fn parse_params(value: &str) -> AppResult<StringMap> {
    let trimmed = value.trim();
    if trimmed.starts_with('{') || trimmed.is_empty() {
        return parse_object("params", trimmed);
    }
    serde_urlencoded::from_str::<Vec<(String, String)>>(trimmed.trim_start_matches('?'))
        .map(|pairs| pairs.into_iter().collect())
        .map_err(|e| AppError::validation("params", e.to_string()))
}

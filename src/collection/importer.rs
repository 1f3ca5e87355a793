//! Flattens a collection document into a [`Catalog`]

use super::catalog::{CategoryKey, Catalog, HttpMethod, RequestTemplate, StringMap};
use super::document::{BodyDef, CollectionDocument, ItemNode, RequestDef, UrlDef};
use super::IMPORTED_APIS_CATEGORY;
use crate::variables::VariableScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request that could not be imported
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportIssue {
    /// Folder path and item name, e.g. `Users/Admin/Ban`
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ImportIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of one import
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub issues: Vec<ImportIssue>,
    /// Category key to number of templates imported under it
    pub categories: Vec<(String, usize)>,
}

/// Result of importing: the catalog plus the variables it was resolved with
#[derive(Debug, Clone, Default)]
pub struct ImportedCollection {
    pub variables: VariableScope,
    pub catalog: Catalog,
    pub report: ImportReport,
}

/// Imports requests from selected top-level categories.
///
/// Never fails as a whole: malformed items are skipped and reported.
pub struct Importer<'a> {
    selection: Option<&'a [String]>,
    variables: VariableScope,
    catalog: Catalog,
    report: ImportReport,
}

impl<'a> Importer<'a> {
    /// `selection == None` imports everything
    pub fn new(selection: Option<&'a [String]>) -> Self {
        Self {
            selection,
            variables: VariableScope::new(),
            catalog: Catalog::new(),
            report: ImportReport::default(),
        }
    }

    pub fn import(mut self, doc: &CollectionDocument) -> ImportedCollection {
        self.variables = VariableScope::from_pairs(doc.variables());
        if !self.variables.is_empty() {
            tracing::debug!(
                variables = ?self.variables.keys().collect::<Vec<_>>(),
                "Found collection variables"
            );
        }

        for raw in &doc.item {
            let node = match ItemNode::parse(raw) {
                Ok(node) => node,
                Err(e) => {
                    self.skip("<root>", format!("unreadable item: {}", e));
                    continue;
                }
            };

            if node.is_populated_folder() {
                let folder = node.name().to_string();
                if !self.is_selected(&folder) {
                    tracing::debug!(folder = %folder, "Skipping unselected folder");
                    continue;
                }
                for child in node.item.iter().flatten() {
                    self.visit(child, &folder, None);
                }
            } else if self.is_selected(IMPORTED_APIS_CATEGORY) {
                self.import_request(&node, CategoryKey::new(IMPORTED_APIS_CATEGORY, None), "");
            }
        }

        self.report.imported = self.catalog.len();
        self.report.categories = self
            .catalog
            .category_keys()
            .map(|key| (key.to_string(), self.catalog.method_count(key)))
            .collect();

        tracing::info!(
            imported = self.report.imported,
            skipped = self.report.skipped,
            categories = self.report.categories.len(),
            "Collection imported"
        );

        ImportedCollection {
            variables: self.variables,
            catalog: self.catalog,
            report: self.report,
        }
    }

    fn is_selected(&self, category: &str) -> bool {
        self.selection
            .map_or(true, |selected| selected.iter().any(|s| s == category))
    }

    /// Visit a node below a top-level folder. The first nested folder name
    /// becomes the subcategory; deeper folders reuse it.
    fn visit(&mut self, raw: &Value, main: &str, sub: Option<&str>) {
        let node = match ItemNode::parse(raw) {
            Ok(node) => node,
            Err(e) => {
                self.skip(main, format!("unreadable item: {}", e));
                return;
            }
        };

        if node.request.is_some() {
            let parent = match sub {
                Some(sub) => format!("{}/{}", main, sub),
                None => main.to_string(),
            };
            self.import_request(&node, CategoryKey::new(main, sub), &parent);
        } else if let Some(children) = &node.item {
            let sub = sub.unwrap_or(node.name());
            tracing::debug!(folder = %main, subfolder = %node.name(), items = children.len(), "Processing subfolder");
            for child in children {
                self.visit(child, main, Some(sub));
            }
        } else {
            self.skip(&format!("{}/{}", main, node.name()), "item has no request data");
        }
    }

    fn import_request(&mut self, node: &ItemNode, category: CategoryKey, parent: &str) {
        let path = if parent.is_empty() {
            node.name().to_string()
        } else {
            format!("{}/{}", parent, node.name())
        };

        match self.build_template(node) {
            Ok(template) => {
                let name = if node.name().is_empty() {
                    format!("{} {}", template.method, template.path)
                } else {
                    node.name().to_string()
                };
                let method = template.method;
                let unique = self.catalog.insert(category.clone(), &name, template);
                tracing::debug!(category = %category, name = %unique, method = %method, "Imported request");
            }
            Err(message) => self.skip(&path, message),
        }
    }

    fn build_template(&self, node: &ItemNode) -> Result<RequestTemplate, String> {
        let request = match &node.request {
            Some(raw @ Value::Object(map)) if !map.is_empty() => RequestDef::deserialize(raw)
                .map_err(|e| format!("malformed request: {}", e))?,
            _ => return Err("item has no request data".to_string()),
        };

        let method = match request.method.as_deref() {
            Some(method) => method.parse::<HttpMethod>().map_err(|e| e.to_string())?,
            None => HttpMethod::Get,
        };

        let raw_url = request.url.as_ref().map(UrlDef::to_raw).unwrap_or_default();
        let resolved = self.variables.resolve(&raw_url);
        let (base_url, path, url_query) = split_url(&resolved);

        let headers: StringMap = request
            .header
            .iter()
            .filter(|h| h.is_enabled() && !h.key.is_empty())
            .map(|h| (h.key.clone(), h.value_string()))
            .collect();

        let mut params: StringMap = request
            .query()
            .iter()
            .filter(|q| q.is_enabled() && !q.key.is_empty())
            .map(|q| (q.key.clone(), q.value_string()))
            .collect();
        if params.is_empty() && !matches!(request.url, Some(UrlDef::Structured(_))) {
            params = url_query;
        }

        Ok(RequestTemplate {
            method,
            base_url,
            path,
            headers,
            body: request.body.as_ref().map(body_text).unwrap_or_default(),
            params,
        })
    }

    fn skip(&mut self, path: &str, message: impl Into<String>) {
        let issue = ImportIssue {
            path: path.to_string(),
            message: message.into(),
        };
        tracing::warn!(path = %issue.path, reason = %issue.message, "Skipped collection item");
        self.report.skipped += 1;
        self.report.issues.push(issue);
    }
}

/// Raw bodies verbatim; form bodies as a pretty JSON object of enabled fields
fn body_text(body: &BodyDef) -> String {
    match body.mode.as_deref() {
        Some("raw") => body.raw.clone().unwrap_or_default(),
        Some("formdata") | Some("urlencoded") => {
            let fields = if body.mode.as_deref() == Some("formdata") {
                &body.formdata
            } else {
                &body.urlencoded
            };
            let form: serde_json::Map<String, Value> = fields
                .iter()
                .filter(|f| f.is_enabled())
                .map(|f| (f.key.clone(), Value::String(f.value_string())))
                .collect();
            serde_json::to_string_pretty(&form).unwrap_or_default()
        }
        _ => String::new(),
    }
}

/// Split a resolved URL into `(base_url, path, query)`.
///
/// Without a scheme the whole string is a path and there is no base.
pub fn split_url(resolved: &str) -> (Option<String>, String, StringMap) {
    let (without_query, query) = match resolved.split_once('?') {
        Some((head, query)) => (head, query),
        None => (resolved, ""),
    };
    let params: StringMap = serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .unwrap_or_default()
        .into_iter()
        .collect();

    if !without_query.contains("://") {
        return (None, ensure_leading_slash(without_query), params);
    }

    match url::Url::parse(without_query) {
        Ok(url) if url.has_host() => {
            let base = url.origin().ascii_serialization();
            let path = if url.path().is_empty() { "/" } else { url.path() };
            (Some(base), path.to_string(), params)
        }
        _ => {
            // Unparseable: split after the authority by hand
            let (scheme, rest) = without_query.split_once("://").unwrap_or_default();
            match rest.split_once('/') {
                Some((host, path)) if !host.is_empty() => (
                    Some(format!("{}://{}", scheme, host)),
                    format!("/{}", path),
                    params,
                ),
                _ if !rest.is_empty() => (Some(format!("{}://{}", scheme, rest)), "/".to_string(), params),
                _ => (None, "/".to_string(), params),
            }
        }
    }
}

fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

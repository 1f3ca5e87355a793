//! Request collections
//!
//! Parsing of externally authored collection documents, flattening them
//! into an addressable [`Catalog`], discovering login requests, and writing
//! the current state back out as a document.

pub mod catalog;
pub mod document;
pub mod export;
pub mod importer;
pub mod login;

pub use catalog::{
    Catalog, CategoryKey, CategoryNode, HttpMethod, MethodKey, RequestTemplate, StringMap,
    MAIN_SUBCATEGORY,
};
pub use document::CollectionDocument;
pub use export::export_collection;
pub use importer::{split_url, ImportIssue, ImportReport, ImportedCollection, Importer};
pub use login::{find_login_requests, LoginRequest};

use document::ItemNode;
use std::collections::BTreeSet;

/// Category holding requests that sit at the top level, outside any folder
pub const IMPORTED_APIS_CATEGORY: &str = "Imported APIs";

/// Selectable categories: top-level folder names, sorted.
///
/// `"Imported APIs"` is offered when loose top-level requests exist.
/// Nested folders are never offered on their own.
pub fn find_categories(doc: &CollectionDocument) -> Vec<String> {
    let mut categories = BTreeSet::new();
    let mut has_loose = false;

    for node in doc.item.iter().filter_map(|raw| ItemNode::parse(raw).ok()) {
        if node.is_populated_folder() {
            if !node.name().is_empty() {
                categories.insert(node.name().to_string());
            }
        } else if node.request.is_some() {
            has_loose = true;
        }
    }

    let mut categories: Vec<String> = categories.into_iter().collect();
    if has_loose {
        categories.push(IMPORTED_APIS_CATEGORY.to_string());
    }
    categories
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_categories_top_level_only() {
        let doc: CollectionDocument = serde_json::from_value(json!({
            "item": [
                {"name": "Users", "item": [
                    {"name": "Admin", "item": [{"name": "x", "request": {"url": "/x"}}]}
                ]},
                {"name": "Auth", "item": [{"name": "Login", "request": {"url": "/login"}}]},
                {"name": "Empty", "item": []},
                {"name": "Ping", "request": {"url": "/ping"}}
            ]
        }))
        .unwrap();

        assert_eq!(
            find_categories(&doc),
            vec!["Auth".to_string(), "Users".to_string(), IMPORTED_APIS_CATEGORY.to_string()]
        );
    }

    #[test]
    fn test_import_is_deterministic() {
        let doc: CollectionDocument = serde_json::from_value(json!({
            "item": [
                {"name": "Users", "item": [
                    {"name": "Get", "request": {"method": "GET", "url": "/users"}},
                    {"name": "Get", "request": {"method": "GET", "url": "/users/1"}}
                ]}
            ]
        }))
        .unwrap();

        let selection = find_categories(&doc);
        let first = Importer::new(Some(&selection)).import(&doc);
        let second = Importer::new(Some(&selection)).import(&doc);

        assert_eq!(first.report.categories, second.report.categories);
        assert_eq!(first.catalog.keys(), second.catalog.keys());
        let names: Vec<String> = first.catalog.keys().into_iter().map(|k| k.name).collect();
        assert_eq!(names, vec!["Get".to_string(), "Get (2)".to_string()]);
    }
}

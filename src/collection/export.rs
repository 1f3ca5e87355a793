//! Regenerates a collection document from the loaded templates

use super::catalog::{HttpMethod, MethodKey, StringMap, MAIN_SUBCATEGORY};
use super::document::{
    BodyDef, CollectionDocument, DocumentInfo, KeyValueDef, RequestDef, Segments, StructuredUrl,
    UrlDef, SCHEMA_V21,
};
use crate::error::{AppError, AppResult};
use crate::executor::join_url;
use crate::templates::TemplateStore;
use indexmap::IndexMap;
use serde_json::{json, Value};

/// Build a v2.1 document from the current catalog with saved overrides
/// applied.
///
/// Each main category becomes a folder. Requests of the `"Main"`
/// subcategory sit directly in it; other subcategories become subfolders.
pub fn export_collection(store: &TemplateStore) -> AppResult<CollectionDocument> {
    let catalog = store.catalog();
    let mut folders: IndexMap<String, IndexMap<String, Vec<Value>>> = IndexMap::new();

    for category in catalog.category_keys() {
        for (name, _) in catalog.methods(category) {
            let key = MethodKey::new(category.clone(), name.clone());
            let item = export_item(store, &key)?;
            folders
                .entry(category.main().to_string())
                .or_default()
                .entry(category.sub().to_string())
                .or_default()
                .push(item);
        }
    }

    let item = folders
        .into_iter()
        .map(|(main, subfolders)| {
            let mut children = Vec::new();
            for (sub, items) in subfolders {
                if sub == MAIN_SUBCATEGORY {
                    children.extend(items);
                } else {
                    children.push(json!({"name": sub, "item": items}));
                }
            }
            json!({"name": main, "item": children})
        })
        .collect();

    let variable = store
        .variables()
        .sorted()
        .into_iter()
        .map(|(key, value)| json!({"key": key, "value": value}))
        .collect();

    tracing::info!(categories = catalog.category_count(), requests = catalog.len(), "Exported collection");

    Ok(CollectionDocument {
        info: Some(DocumentInfo {
            name: Some("Exported API Collection".to_string()),
            description: Some("Requests exported with saved overrides applied".to_string()),
            schema: Some(SCHEMA_V21.to_string()),
        }),
        item,
        variable,
    })
}

fn export_item(store: &TemplateStore, key: &MethodKey) -> AppResult<Value> {
    let template = store
        .catalog()
        .get(key)
        .ok_or_else(|| AppError::UnknownMethod(key.to_string()))?;
    let overrides = store.overrides();

    let base_url = store.effective_base_url(key)?;
    let path = overrides.path(key).unwrap_or(template.path.as_str());
    let raw = join_url(&base_url, path);

    let headers = overrides.headers(key).unwrap_or(&template.headers);
    let params = overrides.params(key).unwrap_or(&template.params);
    let body = overrides.body(key).unwrap_or(template.body.as_str());

    let (protocol, host, port) = match url::Url::parse(&base_url) {
        Ok(url) => (
            Some(url.scheme().to_string()),
            url.host_str().map(|h| Segments::One(h.to_string())),
            url.port().map(|p| json!(p.to_string())),
        ),
        Err(_) => (None, None, None),
    };

    let request = RequestDef {
        method: Some(template.method.to_string()),
        url: Some(UrlDef::Structured(StructuredUrl {
            raw: Some(raw),
            protocol,
            host,
            port,
            path: Some(Segments::Many(
                path.split('/')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            query: key_values(params),
        })),
        header: key_values(headers),
        body: export_body(template.method, body),
    };

    Ok(json!({
        "name": key.name,
        "request": serde_json::to_value(request)?,
    }))
}

fn key_values(map: &StringMap) -> Vec<KeyValueDef> {
    map.iter().map(|(k, v)| KeyValueDef::enabled(k, v)).collect()
}

/// JSON bodies are re-indented; non-JSON text is kept as is
fn export_body(method: HttpMethod, body: &str) -> Option<BodyDef> {
    if !matches!(method, HttpMethod::Post | HttpMethod::Put) || body.trim().is_empty() {
        return None;
    }
    let raw = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string());
    Some(BodyDef::raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{find_categories, Importer};
    use crate::config::CollectionConfig;
    use crate::templates::OverrideField;

    fn loaded_store() -> TemplateStore {
        let doc: CollectionDocument = serde_json::from_value(json!({
            "variable": [{"key": "baseUrl", "value": "https://api.test.io"}],
            "item": [{
                "name": "Users",
                "item": [
                    {"name": "List", "request": {"method": "GET", "url": "{{baseUrl}}/users"}},
                    {"name": "Admin", "item": [
                        {"name": "Ban", "request": {
                            "method": "POST",
                            "url": "{{baseUrl}}/ban",
                            "header": [{"key": "X-Reason", "value": "spam"}],
                            "body": {"mode": "raw", "raw": "{\"id\":1}"}
                        }}
                    ]}
                ]
            }]
        }))
        .unwrap();
        let mut store = TemplateStore::new(CollectionConfig::default());
        store.load(Importer::new(None).import(&doc));
        store
    }

    #[test]
    fn test_export_groups_folders() {
        let store = loaded_store();
        let exported = export_collection(&store).unwrap();

        assert_eq!(exported.item.len(), 1);
        let users = &exported.item[0];
        assert_eq!(users["name"], "Users");
        assert_eq!(users["item"][0]["name"], "List");
        assert_eq!(users["item"][1]["name"], "Admin");
        assert_eq!(users["item"][1]["item"][0]["name"], "Ban");

        let ban = &users["item"][1]["item"][0]["request"];
        assert_eq!(ban["url"]["raw"], "https://api.test.io/ban");
        assert_eq!(ban["header"][0]["key"], "X-Reason");
        assert_eq!(ban["header"][0]["enabled"], true);
        assert_eq!(ban["body"]["raw"], "{\n  \"id\": 1\n}");
        assert_eq!(exported.variable.len(), 1);
    }

    #[test]
    fn test_export_applies_overrides() {
        let mut store = loaded_store();
        let key = store.key("Users - List").unwrap();
        store.save(OverrideField::Path, &key, "/v2/users").unwrap();
        store.save(OverrideField::Params, &key, "page=3").unwrap();

        let exported = export_collection(&store).unwrap();
        let list = &exported.item[0]["item"][0]["request"];
        assert_eq!(list["url"]["raw"], "https://api.test.io/v2/users");
        assert_eq!(list["url"]["query"][0]["value"], "3");
        assert!(list.get("body").is_none());
    }

    #[test]
    fn test_export_reimports_to_same_keys() {
        let store = loaded_store();
        let exported = export_collection(&store).unwrap();

        let selection = find_categories(&exported);
        let reimported = Importer::new(Some(&selection)).import(&exported);
        assert_eq!(reimported.catalog.keys(), store.catalog().keys());
    }
}

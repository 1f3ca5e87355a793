//! Workspace: the single owner of all mutable application state
//!
//! Front ends (CLI, control API, TUI) and the automation sequencer reach the
//! catalog, overrides, session tokens and queue only through a
//! [`SharedWorkspace`]. The lock is held for synchronous sections only and
//! never across an `.await`.

use crate::automation::AutomationQueue;
use crate::collection::{
    export_collection, find_categories, find_login_requests, CategoryNode, CollectionDocument,
    ImportReport, Importer, LoginRequest, MethodKey,
};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::executor::{Exchange, OutgoingRequest};
use crate::session::{AuthTracker, SessionState, TokenUpdate};
use crate::templates::{DynamicTemplate, OverrideField, TemplateStore};
use crate::transcript::SharedTranscript;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

pub struct Workspace {
    document: Option<CollectionDocument>,
    store: TemplateStore,
    session: SessionState,
    tracker: AuthTracker,
    queue: AutomationQueue,
    transcript: SharedTranscript,
}

impl Workspace {
    pub fn new(config: &AppConfig, transcript: SharedTranscript) -> Self {
        Self {
            document: None,
            store: TemplateStore::new(config.collection.clone()),
            session: SessionState::new(),
            tracker: AuthTracker::new(&config.collection),
            queue: AutomationQueue::new(),
            transcript,
        }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn queue(&self) -> &AutomationQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut AutomationQueue {
        &mut self.queue
    }

    pub fn transcript(&self) -> &SharedTranscript {
        &self.transcript
    }

    pub fn has_collection(&self) -> bool {
        self.store.has_collection()
    }

    /// Import `doc`, keeping only `selection` when given.
    ///
    /// The previous catalog is replaced. Session tokens are kept; overrides
    /// and queue entries survive only for keys present in the new catalog.
    pub fn import_document(&mut self, doc: CollectionDocument, selection: Option<&[String]>) -> ImportReport {
        self.transcript.info("Importing collection...");

        let imported = Importer::new(selection).import(&doc);
        let report = imported.report.clone();
        self.store.load(imported);

        let catalog = self.store.catalog();
        let before = self.queue.len();
        self.queue.retain(|key| catalog.contains(key));
        if self.queue.len() < before {
            tracing::info!(dropped = before - self.queue.len(), "Dropped stale queue entries");
        }
        self.document = Some(doc);

        for issue in &report.issues {
            self.transcript.warn(format!("Skipped {}", issue));
        }
        for (category, count) in &report.categories {
            self.transcript.info(format!("{}: {} requests", category, count));
        }
        if report.imported > 0 {
            self.transcript.success(format!(
                "Imported {} requests in {} categories",
                report.imported,
                report.categories.len()
            ));
        } else {
            self.transcript.warn("No requests imported");
        }

        report
    }

    /// Read and import a collection file
    pub fn import_file(&mut self, path: impl AsRef<Path>, selection: Option<&[String]>) -> AppResult<ImportReport> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let doc = CollectionDocument::from_json(&text)?;
        tracing::info!(path = %path.as_ref().display(), "Loaded collection file");
        Ok(self.import_document(doc, selection))
    }

    /// Forget the collection, overrides, tokens and queue
    pub fn remove_collection(&mut self) -> AppResult<()> {
        if self.document.take().is_none() {
            return Err(AppError::NoCollection);
        }
        self.store.clear();
        self.session.clear();
        self.queue.clear();
        self.transcript.info("Collection removed");
        tracing::info!("Collection removed");
        Ok(())
    }

    /// Top-level categories offered by the loaded document
    pub fn categories(&self) -> AppResult<Vec<String>> {
        self.document
            .as_ref()
            .map(find_categories)
            .ok_or(AppError::NoCollection)
    }

    pub fn category_tree(&self) -> AppResult<Vec<CategoryNode>> {
        self.require_collection()?;
        Ok(self.store.catalog().category_tree())
    }

    pub fn login_requests(&self) -> AppResult<Vec<LoginRequest>> {
        self.document
            .as_ref()
            .map(find_login_requests)
            .ok_or(AppError::NoCollection)
    }

    pub fn key(&self, raw: &str) -> AppResult<MethodKey> {
        self.require_collection()?;
        self.store.key(raw)
    }

    pub fn resolve(&self, key: &MethodKey) -> AppResult<DynamicTemplate> {
        self.store.resolve(key, &self.session)
    }

    pub fn materialize(&mut self, key: &MethodKey) -> AppResult<DynamicTemplate> {
        self.store.materialize(key, &self.session)
    }

    /// Save one field and re-derive the cached template from it
    pub fn save_override(&mut self, field: OverrideField, key: &MethodKey, value: &str) -> AppResult<DynamicTemplate> {
        self.store.save(field, key, value)?;
        self.transcript.success(format!("Saved {} for {}", field, key));
        self.materialize(key)
    }

    /// Build the outgoing request for `key` with session tokens applied.
    ///
    /// A CSRF header still holding the placeholder is not sent.
    pub fn prepare_request(&self, key: &MethodKey) -> AppResult<OutgoingRequest> {
        let mut template = self.store.prepared(key, &self.session)?;
        self.tracker.inject(&self.session, &mut template.headers);

        let (csrf_header, placeholder) = (self.tracker.csrf_header(), self.tracker.csrf_placeholder());
        template
            .headers
            .retain(|name, value| !(name.eq_ignore_ascii_case(csrf_header) && value.as_str() == placeholder));

        OutgoingRequest::from_template(&template)
    }

    /// Log a finished exchange and adopt any tokens it carried
    pub fn absorb_exchange(&mut self, exchange: &Exchange) -> Vec<TokenUpdate> {
        self.transcript.record_exchange(exchange);

        let Some(response) = &exchange.response else {
            return Vec::new();
        };
        let updates = self.tracker.extract(&mut self.session, response);
        for update in &updates {
            self.transcript.success(format!("{:?} token updated: {}", update.kind, update.preview));
        }
        updates
    }

    /// Queue `key`, deriving its dynamic template first
    pub fn enqueue(&mut self, key: &MethodKey) -> AppResult<()> {
        self.require_collection()?;
        if self.queue.contains(key) {
            return Err(AppError::AlreadyQueued(key.to_string()));
        }
        self.materialize(key)?;
        self.queue.add(key.clone())?;
        self.transcript.info(format!("Added to automation: {}", key));
        Ok(())
    }

    /// Queue every catalog method not already queued
    pub fn enqueue_all(&mut self) -> AppResult<usize> {
        self.require_collection()?;
        let added = self.queue.add_all(self.store.catalog().keys());
        self.transcript.info(format!("Added {} methods to automation", added));
        Ok(added)
    }

    pub fn dequeue(&mut self, index: usize) -> AppResult<MethodKey> {
        let key = self.queue.remove(index)?;
        self.transcript.info(format!("Removed from automation: {}", key));
        Ok(key)
    }

    pub fn export_collection(&self) -> AppResult<CollectionDocument> {
        self.require_collection()?;
        let doc = export_collection(&self.store)?;
        self.transcript.success(format!(
            "Exported {} categories",
            self.store.catalog().category_count()
        ));
        Ok(doc)
    }

    fn require_collection(&self) -> AppResult<()> {
        if self.has_collection() {
            Ok(())
        } else {
            Err(AppError::NoCollection)
        }
    }
}

/// Shared workspace for use across tasks
pub type SharedWorkspace = Arc<RwLock<Workspace>>;

pub fn create_shared_workspace(config: &AppConfig, transcript: SharedTranscript) -> SharedWorkspace {
    Arc::new(RwLock::new(Workspace::new(config, transcript)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{HttpMethod, StringMap};
    use crate::executor::{ExecutionOutcome, ResponseSnapshot};
    use crate::transcript::create_shared_transcript;
    use serde_json::json;
    use std::time::Duration;

    fn workspace() -> Workspace {
        let mut ws = Workspace::new(&AppConfig::default(), create_shared_transcript(100));
        let doc: CollectionDocument = serde_json::from_value(json!({
            "variable": [{"key": "baseUrl", "value": "https://api.test.io"}],
            "item": [
                {"name": "Auth", "item": [
                    {"name": "Login", "request": {"method": "POST", "url": "{{baseUrl}}/login",
                        "body": {"mode": "raw", "raw": "{\"user\":\"a\"}"}}}
                ]},
                {"name": "Users", "item": [
                    {"name": "GET /users", "request": {"method": "GET", "url": "/users"}},
                    {"name": "POST /users", "request": {"method": "POST", "url": "/users"}}
                ]}
            ]
        }))
        .unwrap();
        ws.import_document(doc, None);
        ws
    }

    fn exchange_with_body(body: &str) -> Exchange {
        Exchange {
            request: OutgoingRequest {
                method: HttpMethod::Post,
                url: "https://api.test.io/login".to_string(),
                headers: StringMap::new(),
                body: None,
                params: StringMap::new(),
            },
            outcome: ExecutionOutcome::Success { status: 200 },
            response: Some(ResponseSnapshot::new(
                200,
                Duration::from_millis(1),
                vec![("Set-Cookie".to_string(), "XSRF-TOKEN=x1; Path=/".to_string())],
                body.to_string(),
            )),
            elapsed_ms: 1.0,
        }
    }

    #[test]
    fn test_end_to_end_import_and_resolve() {
        let ws = workspace();
        assert_eq!(ws.categories().unwrap(), vec!["Auth".to_string(), "Users".to_string()]);
        assert_eq!(ws.store().catalog().method_count(&"Users".into()), 2);

        let key = ws.key("Users - GET /users").unwrap();
        let resolved = ws.resolve(&key).unwrap();
        assert_eq!(resolved.base_url, "https://api.test.io");
        assert_eq!(resolved.path, "/users");
    }

    #[test]
    fn test_tokens_flow_into_prepared_requests() {
        let mut ws = workspace();
        let key = ws.key("Users - GET /users").unwrap();

        let before = ws.prepare_request(&key).unwrap();
        assert!(!before.headers.contains_key("Authorization"));
        assert!(!before.headers.contains_key("X-XSRF-TOKEN"));

        let updates = ws.absorb_exchange(&exchange_with_body(r#"{"token":"abc"}"#));
        assert_eq!(updates.len(), 2);

        let after = ws.prepare_request(&key).unwrap();
        assert_eq!(after.headers["Authorization"], "Bearer abc");
        assert_eq!(after.headers["X-XSRF-TOKEN"], "x1");
        assert_eq!(after.url, "https://api.test.io/users");
    }

    #[test]
    fn test_queue_operations() {
        let mut ws = workspace();
        let login = ws.key("Auth - Login").unwrap();

        ws.enqueue(&login).unwrap();
        assert!(ws.store().cached(&login).is_some());
        assert!(matches!(ws.enqueue(&login), Err(AppError::AlreadyQueued(_))));

        assert_eq!(ws.enqueue_all().unwrap(), 2);
        assert_eq!(ws.queue().len(), 3);

        assert_eq!(ws.dequeue(0).unwrap(), login);
        assert!(matches!(ws.dequeue(10), Err(AppError::QueuePosition(10))));
    }

    #[test]
    fn test_save_override_rematerializes() {
        let mut ws = workspace();
        let key = ws.key("Users - GET /users").unwrap();
        ws.enqueue(&key).unwrap();

        ws.save_override(OverrideField::Path, &key, "/v2/users").unwrap();
        assert_eq!(ws.prepare_request(&key).unwrap().url, "https://api.test.io/v2/users");

        assert!(ws.save_override(OverrideField::Headers, &key, "nope").is_err());
        assert_eq!(ws.store().overrides().headers(&key), None);
    }

    #[test]
    fn test_reimport_prunes_queue_and_keeps_tokens() {
        let mut ws = workspace();
        ws.enqueue_all().unwrap();
        ws.absorb_exchange(&exchange_with_body(r#"{"token":"abc"}"#));

        let selection = vec!["Users".to_string()];
        let doc = ws.document.clone().unwrap();
        ws.import_document(doc, Some(&selection));

        assert_eq!(ws.queue().len(), 2);
        assert_eq!(ws.session().bearer_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_remove_collection() {
        let mut ws = workspace();
        ws.enqueue_all().unwrap();
        ws.absorb_exchange(&exchange_with_body(r#"{"token":"abc"}"#));

        ws.remove_collection().unwrap();
        assert!(!ws.has_collection());
        assert!(!ws.session().has_tokens());
        assert!(ws.queue().is_empty());
        assert!(matches!(ws.categories(), Err(AppError::NoCollection)));
        assert!(matches!(ws.remove_collection(), Err(AppError::NoCollection)));
    }

    #[test]
    fn test_empty_selection_still_counts_as_loaded() {
        let mut ws = workspace();
        let doc = ws.document.clone().unwrap();
        let selection = vec!["Nothing".to_string()];
        let report = ws.import_document(doc, Some(&selection));

        assert_eq!(report.imported, 0);
        assert!(ws.has_collection());
        assert!(ws.store().has_collection());
        assert!(matches!(
            ws.key("Users - GET /users"),
            Err(AppError::UnknownMethod(_))
        ));
        assert!(ws.categories().is_ok());
    }

    #[test]
    fn test_login_discovery() {
        let ws = workspace();
        let logins = ws.login_requests().unwrap();
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0].path, "Auth/Login");
    }
}

// src/store.rs
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

pub const EMPLOYEES_COLLECTION: &str = "employees";
pub const SUMMARY_COLLECTION: &str = "dashboard_summary";
pub const THRESHOLDS_COLLECTION: &str = "thresholds";
pub const THRESHOLD_CHANGES_COLLECTION: &str = "threshold_changes";
pub const SYSTEM_CONFIG_PATH: &str = "system/config";
pub const LATEST_THRESHOLDS_DOC: &str = "latest";

pub fn employees_path(period_key: &str) -> String {
    format!("{}/{}/all_data/data", EMPLOYEES_COLLECTION, period_key)
}

pub fn summary_path(period_key: &str) -> String {
    format!("{}/{}", SUMMARY_COLLECTION, period_key)
}

pub fn thresholds_path(period_key: &str) -> String {
    format!("{}/{}", THRESHOLDS_COLLECTION, period_key)
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("Rate limit exceeded (Status 429)")]
    RateLimited,

    #[error("Permission denied for '{path}'")]
    PermissionDenied { path: String },

    #[error("Document store error: Status={status}, Message='{message}'")]
    Api { status: u16, message: String },

    #[error("Malformed document at '{path}': {detail}")]
    Malformed { path: String, detail: String },
}

/// Credentials attached to a store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAuth {
    /// The signed-in user's identity-provider ID token.
    User(String),
    /// Project API key only; subject to the store's public rules.
    Anonymous,
}

impl StoreAuth {
    pub fn bearer(&self) -> Option<&str> {
        match self {
            StoreAuth::User(token) => Some(token.as_str()),
            StoreAuth::Anonymous => None,
        }
    }
}

/// Minimal document-store surface the dashboard needs. Paths are slash-separated
/// (`collection/doc/collection/doc`) and documents are plain JSON objects.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, path: &str, auth: &StoreAuth)
        -> Result<Option<Value>, StoreError>;

    /// Replaces the whole document, creating it when missing.
    async fn set_document(&self, path: &str, value: &Value, auth: &StoreAuth)
        -> Result<(), StoreError>;

    /// Appends a document with a store-generated id and returns that id.
    async fn add_document(
        &self,
        collection: &str,
        value: &Value,
        auth: &StoreAuth,
    ) -> Result<String, StoreError>;
}

/// In-process store. Backs the offline demo mode and the test suites.
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<BTreeMap<String, Value>>>,
    next_id: Arc<Mutex<u64>>,
    failing_paths: Arc<Mutex<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a fixture file shaped as `{ "<document path>": { ...document... } }`.
    pub fn from_fixture_file(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| StoreError::Io {
            source: e,
            context: format!("Failed to read fixture file: {:?}", path),
        })?;
        let parsed: Value = serde_json::from_str(&raw)?;
        let Value::Object(entries) = parsed else {
            return Err(StoreError::Malformed {
                path: path.display().to_string(),
                detail: "fixture root must be an object keyed by document path".to_string(),
            });
        };

        let store = Self::new();
        for (doc_path, doc) in entries {
            store.insert(&doc_path, doc);
        }
        info!(
            "Loaded {} fixture documents from {:?}",
            store.document_count(),
            path
        );
        Ok(store)
    }

    pub fn insert(&self, path: &str, value: Value) {
        self.lock_documents().insert(path.to_string(), value);
    }

    pub fn document(&self, path: &str) -> Option<Value> {
        self.lock_documents().get(path).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.lock_documents().len()
    }

    /// Documents directly under `collection` (one path segment deeper).
    pub fn documents_in(&self, collection: &str) -> Vec<(String, Value)> {
        let prefix = format!("{}/", collection);
        self.lock_documents()
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .map_or(false, |rest| !rest.contains('/'))
            })
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect()
    }

    /// Makes every call touching `path` fail, to exercise degraded loading.
    pub fn fail_on(&self, path: &str) {
        if let Ok(mut failing) = self.failing_paths.lock() {
            failing.push(path.to_string());
        }
    }

    fn check_failure(&self, path: &str) -> Result<(), StoreError> {
        let failing = match self.failing_paths.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if failing.iter().any(|p| p == path) {
            return Err(StoreError::Api {
                status: 503,
                message: format!("simulated outage for {}", path),
            });
        }
        Ok(())
    }

    fn lock_documents(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        match self.documents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(
        &self,
        path: &str,
        _auth: &StoreAuth,
    ) -> Result<Option<Value>, StoreError> {
        self.check_failure(path)?;
        debug!("MemoryStore get {}", path);
        Ok(self.document(path))
    }

    async fn set_document(
        &self,
        path: &str,
        value: &Value,
        _auth: &StoreAuth,
    ) -> Result<(), StoreError> {
        self.check_failure(path)?;
        debug!("MemoryStore set {}", path);
        self.insert(path, value.clone());
        Ok(())
    }

    async fn add_document(
        &self,
        collection: &str,
        value: &Value,
        _auth: &StoreAuth,
    ) -> Result<String, StoreError> {
        self.check_failure(collection)?;
        let id = {
            let mut next = match self.next_id.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *next += 1;
            format!("auto{:06}", *next)
        };
        self.insert(&format!("{}/{}", collection, id), value.clone());
        Ok(id)
    }
}

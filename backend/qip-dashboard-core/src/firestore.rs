// src/firestore.rs
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::firestore_value::{encode_fields, fields_to_json};
use crate::store::{DocumentStore, StoreAuth, StoreError};

pub const FIRESTORE_API_BASE_URL: &str = "https://firestore.googleapis.com/v1";

#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub api_key: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key: String::new(),
            base_url: FIRESTORE_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

// --- Firestore error payload (keep for parsing error bodies) ---
#[derive(Debug, Clone, Deserialize)]
struct FirestoreErrorInformation {
    message: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FirestoreErrorPayload {
    error: FirestoreErrorInformation,
}

#[derive(Debug, Clone, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

/// Firestore REST v1 client implementing [`DocumentStore`].
#[derive(Clone)]
pub struct FirestoreStore {
    config: Arc<FirestoreConfig>,
    http_client: Client,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Result<Self, StoreError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id
        )
    }

    pub fn document_url(&self, path: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.documents_root(),
            path.trim_matches('/')
        ))?;
        if !self.config.api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", &self.config.api_key);
        }
        Ok(url)
    }

    fn build_request(&self, method: Method, url: Url, auth: &StoreAuth) -> RequestBuilder {
        let builder = self
            .http_client
            .request(method, url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        match auth.bearer() {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// Sends the request and returns the body for 2xx, `None` for 404.
    async fn send(
        &self,
        request_builder: RequestBuilder,
        path: &str,
        context_msg: &str,
    ) -> Result<Option<Value>, StoreError> {
        let request = request_builder.build()?;
        debug!("Sending request for '{}' ({})", context_msg, path);

        let response = match self.http_client.execute(request).await {
            Ok(resp) => resp,
            Err(e) => {
                error!(
                    "HTTP execution failed before receiving response for '{}' ({}): {}",
                    context_msg, path, e
                );
                return Err(StoreError::Request(e));
            }
        };

        let status = response.status();
        info!(
            "Received response for '{}' ({}): Status={}",
            context_msg, path, status
        );

        if status.is_success() {
            let body = response.json::<Value>().await?;
            return Ok(Some(body));
        }

        if status == StatusCode::NOT_FOUND {
            debug!("Document not found: {}", path);
            return Ok(None);
        }

        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        let message = match serde_json::from_str::<FirestoreErrorPayload>(&error_body) {
            Ok(parsed) => {
                let detail = parsed.error.message.unwrap_or_default();
                match parsed.error.status {
                    Some(code) => format!("{}: {}", code, detail),
                    None => detail,
                }
            }
            Err(_) => error_body,
        };

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Rate limit hit for '{}' ({})", context_msg, path);
                Err(StoreError::RateLimited)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Permission denied for '{}' ({}): {}", context_msg, path, message);
                Err(StoreError::PermissionDenied {
                    path: path.to_string(),
                })
            }
            _ => {
                error!(
                    "Firestore error for '{}' ({}): Status={}, Msg={}",
                    context_msg, path, status, message
                );
                Err(StoreError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    fn parse_document(path: &str, body: Value) -> Result<FirestoreDocument, StoreError> {
        serde_json::from_value::<FirestoreDocument>(body).map_err(|e| StoreError::Malformed {
            path: path.to_string(),
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get_document(
        &self,
        path: &str,
        auth: &StoreAuth,
    ) -> Result<Option<Value>, StoreError> {
        let url = self.document_url(path)?;
        let request = self.build_request(Method::GET, url, auth);
        let Some(body) = self.send(request, path, "get document").await? else {
            return Ok(None);
        };
        let document = Self::parse_document(path, body)?;
        Ok(Some(fields_to_json(&document.fields)))
    }

    async fn set_document(
        &self,
        path: &str,
        value: &Value,
        auth: &StoreAuth,
    ) -> Result<(), StoreError> {
        let Some(map) = value.as_object() else {
            return Err(StoreError::Malformed {
                path: path.to_string(),
                detail: "documents must be JSON objects".to_string(),
            });
        };
        let url = self.document_url(path)?;
        let request = self
            .build_request(Method::PATCH, url, auth)
            .json(&json!({ "fields": encode_fields(map) }));
        self.send(request, path, "set document").await?;
        Ok(())
    }

    async fn add_document(
        &self,
        collection: &str,
        value: &Value,
        auth: &StoreAuth,
    ) -> Result<String, StoreError> {
        let Some(map) = value.as_object() else {
            return Err(StoreError::Malformed {
                path: collection.to_string(),
                detail: "documents must be JSON objects".to_string(),
            });
        };
        let url = self.document_url(collection)?;
        let request = self
            .build_request(Method::POST, url, auth)
            .json(&json!({ "fields": encode_fields(map) }));
        let body = self
            .send(request, collection, "add document")
            .await?
            .ok_or_else(|| StoreError::Api {
                status: 404,
                message: format!("collection '{}' not reachable", collection),
            })?;
        let document = Self::parse_document(collection, body)?;
        let id = document
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(id)
    }
}

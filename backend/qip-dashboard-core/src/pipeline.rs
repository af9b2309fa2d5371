// src/pipeline.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::clock::Clock;
use crate::period::Period;

pub const GITHUB_API_BASE_URL: &str = "https://api.github.com";

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Pipeline trigger is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("Workflow dispatch rejected: Status={status}, Message='{message}'")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub api_base_url: String,
    pub owner: String,
    pub repo: String,
    pub workflow: String,
    pub git_ref: String,
    /// Server-side CI credential; never read from the document store.
    pub token: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: GITHUB_API_BASE_URL.to_string(),
            owner: String::new(),
            repo: String::new(),
            workflow: "monthly-calculation.yml".to_string(),
            git_ref: "main".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReceipt {
    pub period: Period,
    pub workflow: String,
    pub requested_by: String,
    pub dispatched_at: DateTime<Utc>,
}

/// Starts the external calculation run for a period.
#[async_trait]
pub trait PipelineTrigger: Send + Sync {
    async fn trigger(&self, period: Period, requested_by: &str)
        -> Result<DispatchReceipt, TriggerError>;
}

/// Request body of the workflow dispatch call.
pub fn dispatch_body(git_ref: &str, period: &Period) -> Value {
    json!({
        "ref": git_ref,
        "inputs": {
            "month": period.month.to_string(),
            "year": period.year.to_string(),
        }
    })
}

pub struct WorkflowDispatch {
    config: PipelineConfig,
    http_client: Client,
    clock: Arc<dyn Clock>,
}

impl WorkflowDispatch {
    pub fn new(config: PipelineConfig, clock: Arc<dyn Clock>) -> Result<Self, TriggerError> {
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            config,
            http_client,
            clock,
        })
    }

    pub fn dispatch_url(&self) -> Result<Url, TriggerError> {
        if self.config.owner.is_empty() || self.config.repo.is_empty() {
            return Err(TriggerError::NotConfigured("owner and repo are required"));
        }
        let raw = format!(
            "{}/repos/{}/{}/actions/workflows/{}/dispatches",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.config.workflow
        );
        Ok(Url::parse(&raw)?)
    }
}

#[async_trait]
impl PipelineTrigger for WorkflowDispatch {
    async fn trigger(
        &self,
        period: Period,
        requested_by: &str,
    ) -> Result<DispatchReceipt, TriggerError> {
        let token = self
            .config
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(TriggerError::NotConfigured("no CI token"))?;
        let url = self.dispatch_url()?;

        info!("Dispatching {} for {} ({})", self.config.workflow, period, requested_by);
        let response = self
            .http_client
            .post(url.clone())
            .header(ACCEPT, "application/vnd.github+json")
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(USER_AGENT, "qip-dashboard")
            .json(&dispatch_body(&self.config.git_ref, &period))
            .send()
            .await
            .map_err(|e| {
                error!("Workflow dispatch request to {} failed: {}", url, e);
                e
            })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            info!("Workflow dispatch accepted for {}", period);
            return Ok(DispatchReceipt {
                period,
                workflow: self.config.workflow.clone(),
                requested_by: requested_by.to_string(),
                dispatched_at: self.clock.now(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        warn!("Workflow dispatch rejected: Status={}, Body='{}'", status, message);
        Err(TriggerError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Receipts an offline trigger keeps; older ones are dropped first.
pub const RECORDED_DISPATCH_LIMIT: usize = 100;

/// Records dispatches instead of sending them. Used in offline mode.
#[derive(Clone)]
pub struct RecordingTrigger {
    clock: Arc<dyn Clock>,
    dispatched: Arc<Mutex<Vec<DispatchReceipt>>>,
}

impl RecordingTrigger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            dispatched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn dispatched(&self) -> Vec<DispatchReceipt> {
        match self.dispatched.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl PipelineTrigger for RecordingTrigger {
    async fn trigger(
        &self,
        period: Period,
        requested_by: &str,
    ) -> Result<DispatchReceipt, TriggerError> {
        let receipt = DispatchReceipt {
            period,
            workflow: "offline".to_string(),
            requested_by: requested_by.to_string(),
            dispatched_at: self.clock.now(),
        };
        info!("Recorded offline pipeline trigger for {}", period);
        let mut dispatched = match self.dispatched.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if dispatched.len() >= RECORDED_DISPATCH_LIMIT {
            let excess = dispatched.len() + 1 - RECORDED_DISPATCH_LIMIT;
            dispatched.drain(..excess);
        }
        dispatched.push(receipt.clone());
        Ok(receipt)
    }
}

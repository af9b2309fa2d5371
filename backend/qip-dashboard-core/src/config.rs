// src/config.rs
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::{DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL_SECS};
use crate::clock::MAX_SPAN_SECS;
use crate::firestore::{FirestoreConfig, FIRESTORE_API_BASE_URL};
use crate::identity::{IDENTITY_TOOLKIT_URL, SECURE_TOKEN_URL};
use crate::pipeline::{PipelineConfig, GITHUB_API_BASE_URL};
use crate::views::table::DEFAULT_PAGE_SIZE;

pub const ENV_PREFIX: &str = "QIP_";

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}
fn default_firestore_base_url() -> String {
    FIRESTORE_API_BASE_URL.to_string()
}
fn default_identity_base_url() -> String {
    IDENTITY_TOOLKIT_URL.to_string()
}
fn default_token_base_url() -> String {
    SECURE_TOKEN_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_cache_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}
fn default_session_idle_secs() -> u64 {
    8 * 60 * 60
}
fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_ci_api_base_url() -> String {
    GITHUB_API_BASE_URL.to_string()
}
fn default_ci_workflow() -> String {
    PipelineConfig::default().workflow
}
fn default_ci_ref() -> String {
    PipelineConfig::default().git_ref
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{name} is {value}s, longer than the {max}s limit")]
    SpanTooLong {
        name: &'static str,
        value: u64,
        max: i64,
    },
}

/// Server settings, read from `QIP_*` environment variables (and `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,

    #[serde(default)]
    pub firebase_project_id: String,
    #[serde(default)]
    pub firebase_api_key: String,
    #[serde(default = "default_firestore_base_url")]
    pub firestore_base_url: String,
    #[serde(default = "default_identity_base_url")]
    pub identity_base_url: String,
    #[serde(default = "default_token_base_url")]
    pub token_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default)]
    pub ci_owner: String,
    #[serde(default)]
    pub ci_repo: String,
    #[serde(default = "default_ci_workflow")]
    pub ci_workflow: String,
    #[serde(default = "default_ci_ref")]
    pub ci_ref: String,
    pub ci_token: Option<String>,
    #[serde(default = "default_ci_api_base_url")]
    pub ci_api_base_url: String,

    /// Serve from a JSON fixture with a static login instead of Firebase.
    pub offline_fixture: Option<PathBuf>,
    /// `email:password` pairs accepted in offline mode, comma-separated.
    pub offline_accounts: Option<String>,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let config = envy::prefixed(ENV_PREFIX).from_env::<DashboardConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects TTLs and lifetimes that do not fit a chrono span.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let spans = [
            ("QIP_CACHE_TTL_SECS", self.cache_ttl_secs),
            ("QIP_SESSION_IDLE_SECS", self.session_idle_secs),
        ];
        for (name, value) in spans {
            if i64::try_from(value).map_or(true, |secs| secs > MAX_SPAN_SECS) {
                return Err(ConfigError::SpanTooLong {
                    name,
                    value,
                    max: MAX_SPAN_SECS,
                });
            }
        }
        Ok(())
    }

    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        }
    }

    pub fn firestore(&self) -> FirestoreConfig {
        FirestoreConfig {
            project_id: self.firebase_project_id.clone(),
            api_key: self.firebase_api_key.clone(),
            base_url: self.firestore_base_url.clone(),
            request_timeout_secs: self.request_timeout_secs,
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            api_base_url: self.ci_api_base_url.clone(),
            owner: self.ci_owner.clone(),
            repo: self.ci_repo.clone(),
            workflow: self.ci_workflow.clone(),
            git_ref: self.ci_ref.clone(),
            token: self.ci_token.clone().filter(|t| !t.is_empty()),
        }
    }

    /// Parses `offline_accounts`; entries without a `:` are skipped.
    pub fn offline_account_list(&self) -> Vec<(String, String)> {
        self.offline_accounts
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|pair| pair.trim().split_once(':'))
            .map(|(email, password)| (email.trim().to_string(), password.to_string()))
            .filter(|(email, _)| !email.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> DashboardConfig {
        envy::prefixed(ENV_PREFIX)
            .from_iter::<_, DashboardConfig>(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string())),
            )
            .unwrap()
    }

    #[test]
    fn every_optional_value_has_a_default() {
        let config = from_pairs(&[]);
        assert_eq!(config.bind_address, default_bind_address());
        assert_eq!(config.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.tls_paths().is_none());
        assert!(config.pipeline().token.is_none());
        assert_eq!(config.firestore().base_url, FIRESTORE_API_BASE_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn absurd_ttl_is_a_config_error() {
        let config = from_pairs(&[("QIP_CACHE_TTL_SECS", "18446744073709551615")]);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SpanTooLong { name: "QIP_CACHE_TTL_SECS", .. }
        ));

        let config = from_pairs(&[("QIP_SESSION_IDLE_SECS", "9223372036854775807")]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SpanTooLong { name: "QIP_SESSION_IDLE_SECS", .. })
        ));
    }

    #[test]
    fn prefixed_variables_are_read() {
        let config = from_pairs(&[
            ("QIP_BIND_ADDRESS", "0.0.0.0:8443"),
            ("QIP_TLS_CERT_PATH", "certs/cert.pem"),
            ("QIP_TLS_KEY_PATH", "certs/key.pem"),
            ("QIP_FIREBASE_PROJECT_ID", "hwk-qip-incentive-dashboard"),
            ("QIP_CI_TOKEN", ""),
            ("QIP_OFFLINE_ACCOUNTS", "admin@example.com:secret, viewer@example.com:pw,broken"),
        ]);
        assert_eq!(config.bind_address.port(), 8443);
        assert!(config.tls_paths().is_some());
        assert_eq!(config.firestore().project_id, "hwk-qip-incentive-dashboard");
        assert!(config.pipeline().token.is_none());
        assert_eq!(
            config.offline_account_list(),
            vec![
                ("admin@example.com".to_string(), "secret".to_string()),
                ("viewer@example.com".to_string(), "pw".to_string())
            ]
        );
    }
}

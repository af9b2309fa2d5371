// src/identity.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

// Provider error codes that mean "wrong email or password", not an outage.
const CREDENTIAL_ERROR_CODES: [&str; 6] = [
    "INVALID_PASSWORD",
    "EMAIL_NOT_FOUND",
    "INVALID_LOGIN_CREDENTIALS",
    "INVALID_EMAIL",
    "USER_DISABLED",
    "MISSING_PASSWORD",
];

const REFRESH_ERROR_CODES: [&str; 4] = [
    "TOKEN_EXPIRED",
    "INVALID_REFRESH_TOKEN",
    "USER_NOT_FOUND",
    "USER_DISABLED",
];

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Refresh token rejected: {0}")]
    RefreshRejected(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityTokens {
    pub id_token: String,
    pub refresh_token: String,
    /// Lifetime of `id_token` in seconds.
    pub expires_in: i64,
    /// Only present on sign-in; refresh responses carry no email.
    pub email: Option<String>,
    pub uid: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<IdentityTokens, IdentityError>;

    async fn refresh(&self, refresh_token: &str) -> Result<IdentityTokens, IdentityError>;
}

// --- Firebase Auth REST ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    email: Option<String>,
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorInfo,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorInfo {
    message: String,
}

/// Extracts the leading error code, e.g. `"INVALID_PASSWORD : detail"` -> `INVALID_PASSWORD`.
fn provider_error_code(body: &str) -> Option<String> {
    let parsed: ProviderErrorBody = serde_json::from_str(body).ok()?;
    let code = parsed
        .error
        .message
        .split(|c: char| c == ' ' || c == ':')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

#[derive(Clone)]
pub struct FirebaseIdentity {
    api_key: String,
    identity_base_url: String,
    token_base_url: String,
    http_client: Client,
}

impl FirebaseIdentity {
    pub fn new(
        api_key: String,
        identity_base_url: String,
        token_base_url: String,
    ) -> Result<Self, IdentityError> {
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            api_key,
            identity_base_url,
            token_base_url,
            http_client,
        })
    }

    fn endpoint(&self, base: &str, path: &str) -> Result<Url, IdentityError> {
        let mut url = Url::parse(&format!("{}/{}", base.trim_end_matches('/'), path))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

fn parse_expiry(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(3600)
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<IdentityTokens, IdentityError> {
        let url = self.endpoint(&self.identity_base_url, "accounts:signInWithPassword")?;
        debug!("Signing in {} with identity provider", email);

        let response = self
            .http_client
            .post(url)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match provider_error_code(&body) {
                Some(code) if CREDENTIAL_ERROR_CODES.contains(&code.as_str()) => {
                    warn!("Sign-in rejected for {}: {}", email, code);
                    Err(IdentityError::InvalidCredentials)
                }
                Some(code) => {
                    error!("Identity provider error during sign-in: {} ({})", code, status);
                    Err(IdentityError::Provider(code))
                }
                None => {
                    error!("Identity provider returned {} with unparseable body", status);
                    Err(IdentityError::Provider(format!("status {}", status.as_u16())))
                }
            };
        }

        let parsed: SignInResponse = response.json().await?;
        info!("Identity provider sign-in succeeded for {}", email);
        Ok(IdentityTokens {
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            expires_in: parse_expiry(&parsed.expires_in),
            email: parsed.email.or_else(|| Some(email.to_string())),
            uid: parsed.local_id,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IdentityTokens, IdentityError> {
        let url = self.endpoint(&self.token_base_url, "token")?;
        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token);

        let response = self.http_client.post(url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match provider_error_code(&body) {
                Some(code) if REFRESH_ERROR_CODES.contains(&code.as_str()) => {
                    warn!("Refresh token rejected: {}", code);
                    Err(IdentityError::RefreshRejected(code))
                }
                Some(code) => Err(IdentityError::Provider(code)),
                None => Err(IdentityError::Provider(format!("status {}", status.as_u16()))),
            };
        }

        let parsed: RefreshResponse = response.json().await?;
        debug!("Refreshed ID token for uid {}", parsed.user_id);
        Ok(IdentityTokens {
            id_token: parsed.id_token,
            refresh_token: parsed.refresh_token,
            expires_in: parse_expiry(&parsed.expires_in),
            email: None,
            uid: parsed.user_id,
        })
    }
}

// --- Offline provider ---

/// Fixed email/password accounts. Tokens are opaque strings that the
/// in-memory store ignores.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity {
    accounts: HashMap<String, String>,
    token_lifetime_secs: i64,
}

impl StaticIdentity {
    pub fn new(token_lifetime_secs: i64) -> Self {
        Self {
            accounts: HashMap::new(),
            token_lifetime_secs,
        }
    }

    pub fn with_account(mut self, email: &str, password: &str) -> Self {
        self.accounts
            .insert(email.trim().to_ascii_lowercase(), password.to_string());
        self
    }

    fn uid_for(email: &str) -> String {
        format!("static-{}", email)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<IdentityTokens, IdentityError> {
        let key = email.trim().to_ascii_lowercase();
        match self.accounts.get(&key) {
            Some(expected) if expected == password => Ok(IdentityTokens {
                id_token: format!("id:{}", key),
                refresh_token: format!("refresh:{}", key),
                expires_in: self.token_lifetime_secs,
                email: Some(key.clone()),
                uid: Self::uid_for(&key),
            }),
            _ => Err(IdentityError::InvalidCredentials),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IdentityTokens, IdentityError> {
        let Some(key) = refresh_token.strip_prefix("refresh:") else {
            return Err(IdentityError::RefreshRejected("INVALID_REFRESH_TOKEN".to_string()));
        };
        if !self.accounts.contains_key(key) {
            return Err(IdentityError::RefreshRejected("USER_NOT_FOUND".to_string()));
        }
        Ok(IdentityTokens {
            id_token: format!("id:{}", key),
            refresh_token: refresh_token.to_string(),
            expires_in: self.token_lifetime_secs,
            email: None,
            uid: Self::uid_for(key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_provider_error_code() {
        let body = r#"{"error":{"code":400,"message":"INVALID_PASSWORD","errors":[]}}"#;
        assert_eq!(provider_error_code(body).as_deref(), Some("INVALID_PASSWORD"));

        let body = r#"{"error":{"code":400,"message":"TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"}}"#;
        assert_eq!(
            provider_error_code(body).as_deref(),
            Some("TOO_MANY_ATTEMPTS_TRY_LATER")
        );

        assert_eq!(provider_error_code("<html>bad gateway</html>"), None);
    }

    #[tokio::test]
    async fn static_identity_checks_password_case_insensitive_email() {
        let provider = StaticIdentity::new(3600).with_account("Admin@Example.com", "pw");

        let tokens = provider.sign_in(" admin@example.com ", "pw").await.unwrap();
        assert_eq!(tokens.email.as_deref(), Some("admin@example.com"));
        assert_eq!(tokens.expires_in, 3600);

        let err = provider.sign_in("admin@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[tokio::test]
    async fn static_identity_refresh() {
        let provider = StaticIdentity::new(60).with_account("viewer@example.com", "pw");
        let tokens = provider.sign_in("viewer@example.com", "pw").await.unwrap();
        let refreshed = provider.refresh(&tokens.refresh_token).await.unwrap();
        assert_eq!(refreshed.uid, tokens.uid);

        assert!(matches!(
            provider.refresh("garbage").await,
            Err(IdentityError::RefreshRejected(_))
        ));
    }
}

// src/admin.rs
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::info;

use crate::session::normalize_email;
use crate::store::{DocumentStore, StoreAuth, StoreError, SYSTEM_CONFIG_PATH};
use crate::thresholds::{FieldError, FormErrors};

const RECIPIENTS_KEY: &str = "email_recipients";
pub const SUPPORTED_LANGS: [&str; 3] = ["ko", "en", "vi"];
pub const DEFAULT_LANG: &str = "ko";

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").ok());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .map_or(false, |re| re.is_match(email.trim()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: String,
    pub lang: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipientForm {
    pub email: String,
    pub name: Option<String>,
    pub lang: Option<String>,
}

#[derive(Error, Debug)]
pub enum RecipientError {
    #[error("Recipient form is invalid")]
    Invalid(#[from] FormErrors),
    #[error("Document store error")]
    Store(#[from] StoreError),
}

/// Entries may be plain address strings or `{ email, name, lang }` objects.
pub fn recipients_from_config(config: &Value) -> Vec<Recipient> {
    let Some(items) = config.get(RECIPIENTS_KEY).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(email) => Some(Recipient {
                email: email.trim().to_string(),
                name: default_name(email),
                lang: DEFAULT_LANG.to_string(),
            }),
            Value::Object(map) => {
                let email = map.get("email")?.as_str()?.trim().to_string();
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| default_name(&email));
                let lang = map
                    .get("lang")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_LANG)
                    .to_string();
                Some(Recipient { email, name, lang })
            }
            _ => None,
        })
        .filter(|r| !r.email.is_empty())
        .collect()
}

fn default_name(email: &str) -> String {
    email
        .trim()
        .split('@')
        .next()
        .unwrap_or_default()
        .to_string()
}

async fn read_config(
    store: &dyn DocumentStore,
    auth: &StoreAuth,
) -> Result<Map<String, Value>, StoreError> {
    Ok(store
        .get_document(SYSTEM_CONFIG_PATH, auth)
        .await?
        .and_then(|doc| doc.as_object().cloned())
        .unwrap_or_default())
}

async fn write_recipients(
    store: &dyn DocumentStore,
    auth: &StoreAuth,
    mut config: Map<String, Value>,
    recipients: &[Recipient],
) -> Result<(), StoreError> {
    config.insert(RECIPIENTS_KEY.into(), json!(recipients));
    store
        .set_document(SYSTEM_CONFIG_PATH, &Value::Object(config), auth)
        .await
}

pub async fn list_recipients(
    store: &dyn DocumentStore,
    auth: &StoreAuth,
) -> Result<Vec<Recipient>, StoreError> {
    let config = read_config(store, auth).await?;
    Ok(recipients_from_config(&Value::Object(config)))
}

impl RecipientForm {
    fn validate(&self, existing: &[Recipient]) -> Result<Recipient, FormErrors> {
        let mut errors = Vec::new();
        let email = self.email.trim();

        if !is_valid_email(email) {
            errors.push(("email", format!("'{}' is not a valid email address", email)));
        } else if existing
            .iter()
            .any(|r| normalize_email(&r.email) == normalize_email(email))
        {
            errors.push(("email", format!("{} is already a recipient", email)));
        }

        let lang = self
            .lang
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LANG)
            .to_ascii_lowercase();
        if !SUPPORTED_LANGS.contains(&lang.as_str()) {
            errors.push(("lang", format!("must be one of {}", SUPPORTED_LANGS.join(", "))));
        }

        if !errors.is_empty() {
            return Err(FormErrors {
                errors: errors
                    .into_iter()
                    .map(|(field, message)| FieldError {
                        field: field.to_string(),
                        message,
                    })
                    .collect(),
            });
        }

        Ok(Recipient {
            email: email.to_string(),
            name: self
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default_name(email)),
            lang,
        })
    }
}

/// Appends a recipient to `system/config`; other config keys are kept.
pub async fn add_recipient(
    store: &dyn DocumentStore,
    auth: &StoreAuth,
    form: &RecipientForm,
) -> Result<Vec<Recipient>, RecipientError> {
    let config = read_config(store, auth).await?;
    let mut recipients = recipients_from_config(&Value::Object(config.clone()));
    let recipient = form.validate(&recipients)?;
    info!("Adding report recipient {}", recipient.email);
    recipients.push(recipient);
    write_recipients(store, auth, config, &recipients).await?;
    Ok(recipients)
}

pub async fn remove_recipient(
    store: &dyn DocumentStore,
    auth: &StoreAuth,
    email: &str,
) -> Result<Vec<Recipient>, RecipientError> {
    let config = read_config(store, auth).await?;
    let mut recipients = recipients_from_config(&Value::Object(config.clone()));
    let wanted = normalize_email(email);
    let before = recipients.len();
    recipients.retain(|r| normalize_email(&r.email) != wanted);
    if recipients.len() == before {
        return Err(FormErrors::single("email", format!("{} is not a recipient", email.trim())).into());
    }
    info!("Removed report recipient {}", wanted);
    write_recipients(store, auth, config, &recipients).await?;
    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store_with_config() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(
            SYSTEM_CONFIG_PATH,
            json!({
                "admin_emails": ["admin@example.com"],
                "email_recipients": [
                    "plain@example.com",
                    { "email": "Lead@Example.com", "name": "Lead", "lang": "en" }
                ],
                "email_settings": { "enabled": true }
            }),
        );
        store
    }

    fn form(email: &str) -> RecipientForm {
        RecipientForm {
            email: email.to_string(),
            ..RecipientForm::default()
        }
    }

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("qa.lead+report@hsvina.com"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("two words@example.com"));
    }

    #[test]
    fn mixed_recipient_shapes_are_read() {
        let config = store_with_config().document(SYSTEM_CONFIG_PATH).unwrap();
        let recipients = recipients_from_config(&config);
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].name, "plain");
        assert_eq!(recipients[0].lang, DEFAULT_LANG);
        assert_eq!(recipients[1].lang, "en");
    }

    #[tokio::test]
    async fn add_keeps_other_config_keys() {
        let store = store_with_config();
        let recipients = add_recipient(&store, &StoreAuth::Anonymous, &form("new@example.com"))
            .await
            .unwrap();
        assert_eq!(recipients.len(), 3);
        assert_eq!(recipients[2].name, "new");

        let config = store.document(SYSTEM_CONFIG_PATH).unwrap();
        assert_eq!(config["admin_emails"], json!(["admin@example.com"]));
        assert_eq!(config["email_settings"]["enabled"], true);
        assert_eq!(config["email_recipients"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_and_invalid_addresses_are_form_errors() {
        let store = store_with_config();
        let err = add_recipient(&store, &StoreAuth::Anonymous, &form(" lead@example.COM "))
            .await
            .unwrap_err();
        match err {
            RecipientError::Invalid(errors) => assert_eq!(errors.errors[0].field, "email"),
            other => panic!("unexpected error: {:?}", other),
        }

        let bad = RecipientForm {
            email: "nope".to_string(),
            lang: Some("fr".to_string()),
            ..RecipientForm::default()
        };
        let err = add_recipient(&store, &StoreAuth::Anonymous, &bad).await.unwrap_err();
        match err {
            RecipientError::Invalid(errors) => assert_eq!(errors.errors.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn remove_is_case_insensitive() {
        let store = store_with_config();
        let recipients = remove_recipient(&store, &StoreAuth::Anonymous, "LEAD@example.com")
            .await
            .unwrap();
        assert_eq!(recipients.len(), 1);

        let err = remove_recipient(&store, &StoreAuth::Anonymous, "ghost@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, RecipientError::Invalid(_)));
    }

    #[tokio::test]
    async fn missing_config_starts_empty() {
        let store = MemoryStore::new();
        assert!(list_recipients(&store, &StoreAuth::Anonymous).await.unwrap().is_empty());
        add_recipient(&store, &StoreAuth::Anonymous, &form("first@example.com"))
            .await
            .unwrap();
        assert_eq!(list_recipients(&store, &StoreAuth::Anonymous).await.unwrap().len(), 1);
    }
}

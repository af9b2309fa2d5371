// src/thresholds.rs
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::normalize::{coerce_decimal, coerce_f64};
use crate::period::Period;
use crate::store::{
    thresholds_path, DocumentStore, StoreAuth, StoreError, LATEST_THRESHOLDS_DOC,
    THRESHOLD_CHANGES_COLLECTION,
};

pub const PROGRESSION_MONTHS: usize = 15;

pub const DEFAULT_ATTENDANCE_RATE: f64 = 88.0;
pub const DEFAULT_UNAPPROVED_ABSENCE: f64 = 2.0;
pub const DEFAULT_MINIMUM_WORKING_DAYS: f64 = 12.0;
pub const DEFAULT_AREA_REJECT_RATE: f64 = 3.0;
pub const DEFAULT_PRS_PASS_RATE: f64 = 95.0;
pub const DEFAULT_PRS_MIN_QTY: f64 = 100.0;
pub const DEFAULT_CONSECUTIVE_AQL_MONTHS: u32 = 3;

pub fn default_progression_table() -> Vec<Decimal> {
    vec![
        dec!(150000),
        dec!(250000),
        dec!(300000),
        dec!(350000),
        dec!(400000),
        dec!(450000),
        dec!(500000),
        dec!(650000),
        dec!(750000),
        dec!(850000),
        dec!(950000),
        dec!(1000000),
        dec!(1000000),
        dec!(1000000),
        dec!(1000000),
    ]
}

/// Policy parameters for one period, always complete: any key missing from
/// the stored document takes its default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thresholds {
    pub attendance_rate: f64,
    pub unapproved_absence: f64,
    pub minimum_working_days: f64,
    pub area_reject_rate: f64,
    #[serde(rename = "5prs_pass_rate")]
    pub prs_pass_rate: f64,
    #[serde(rename = "5prs_min_qty")]
    pub prs_min_qty: f64,
    pub consecutive_aql_months: u32,
    /// Overrides the working-day count of the month when set.
    pub working_days: Option<u32>,
    pub progression_table: Vec<Decimal>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            attendance_rate: DEFAULT_ATTENDANCE_RATE,
            unapproved_absence: DEFAULT_UNAPPROVED_ABSENCE,
            minimum_working_days: DEFAULT_MINIMUM_WORKING_DAYS,
            area_reject_rate: DEFAULT_AREA_REJECT_RATE,
            prs_pass_rate: DEFAULT_PRS_PASS_RATE,
            prs_min_qty: DEFAULT_PRS_MIN_QTY,
            consecutive_aql_months: DEFAULT_CONSECUTIVE_AQL_MONTHS,
            working_days: None,
            progression_table: default_progression_table(),
        }
    }
}

fn decimal_to_json(amount: &Decimal) -> Value {
    if amount.fract().is_zero() {
        if let Some(whole) = amount.to_i64() {
            return json!(whole);
        }
    }
    amount.to_f64().map(|f| json!(f)).unwrap_or(Value::Null)
}

/// Accepts `[150000, ...]` or `{ "1": 150000, ... }`.
fn progression_from_value(value: &Value) -> Option<Vec<Decimal>> {
    let mut table = default_progression_table();
    match value {
        Value::Array(items) => {
            for (slot, item) in table.iter_mut().zip(items.iter()) {
                if let Some(amount) = coerce_decimal(item) {
                    *slot = amount;
                }
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let Ok(month) = key.trim().parse::<usize>() else {
                    continue;
                };
                if (1..=PROGRESSION_MONTHS).contains(&month) {
                    if let Some(amount) = coerce_decimal(item) {
                        table[month - 1] = amount;
                    }
                }
            }
        }
        _ => return None,
    }
    Some(table)
}

impl Thresholds {
    /// Merges a stored threshold document over the defaults. Metadata keys
    /// (`updated_at`, `updated_by`, ...) are ignored.
    pub fn from_document(document: &Value) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: f64| {
            document.get(key).and_then(coerce_f64).unwrap_or(default)
        };

        Self {
            attendance_rate: number("attendance_rate", defaults.attendance_rate),
            unapproved_absence: number("unapproved_absence", defaults.unapproved_absence),
            minimum_working_days: number("minimum_working_days", defaults.minimum_working_days),
            area_reject_rate: number("area_reject_rate", defaults.area_reject_rate),
            prs_pass_rate: number("5prs_pass_rate", defaults.prs_pass_rate),
            prs_min_qty: number("5prs_min_qty", defaults.prs_min_qty),
            consecutive_aql_months: document
                .get("consecutive_aql_months")
                .and_then(coerce_f64)
                .filter(|m| *m >= 1.0)
                .map(|m| m as u32)
                .unwrap_or(defaults.consecutive_aql_months),
            working_days: document
                .get("working_days")
                .and_then(coerce_f64)
                .filter(|d| *d >= 1.0)
                .map(|d| d as u32),
            progression_table: document
                .get("progression_table")
                .and_then(progression_from_value)
                .unwrap_or(defaults.progression_table),
        }
    }

    /// The document shape written back to the store.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("attendance_rate".into(), json!(self.attendance_rate));
        doc.insert("unapproved_absence".into(), json!(self.unapproved_absence));
        doc.insert("minimum_working_days".into(), json!(self.minimum_working_days));
        doc.insert("area_reject_rate".into(), json!(self.area_reject_rate));
        doc.insert("5prs_pass_rate".into(), json!(self.prs_pass_rate));
        doc.insert("5prs_min_qty".into(), json!(self.prs_min_qty));
        doc.insert(
            "consecutive_aql_months".into(),
            json!(self.consecutive_aql_months),
        );
        doc.insert(
            "working_days".into(),
            self.working_days.map(|d| json!(d)).unwrap_or(Value::Null),
        );
        doc.insert(
            "progression_table".into(),
            Value::Array(self.progression_table.iter().map(decimal_to_json).collect()),
        );
        doc
    }
}

// --- Admin form ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{} field(s) failed validation", .errors.len())]
pub struct FormErrors {
    pub errors: Vec<FieldError>,
}

impl FormErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }
}

// `Some(None)` when the key is present as null, `None` when absent.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Edit payload from the admin form. Absent fields keep their current value;
/// `working_days: null` clears the override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThresholdForm {
    pub attendance_rate: Option<f64>,
    pub unapproved_absence: Option<f64>,
    pub minimum_working_days: Option<f64>,
    pub area_reject_rate: Option<f64>,
    #[serde(rename = "5prs_pass_rate")]
    pub prs_pass_rate: Option<f64>,
    #[serde(rename = "5prs_min_qty")]
    pub prs_min_qty: Option<f64>,
    pub consecutive_aql_months: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub working_days: Option<Option<i64>>,
    pub progression_table: Option<Vec<Decimal>>,
}

impl ThresholdForm {
    /// Validates the form against `current` and returns the edited thresholds.
    pub fn apply(&self, current: &Thresholds) -> Result<Thresholds, FormErrors> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(FieldError {
                field: field.to_string(),
                message,
            })
        };

        let mut percent = |field: &str, value: Option<f64>, current: f64| match value {
            Some(v) if !(0.0..=100.0).contains(&v) || v.is_nan() => {
                push(field, format!("must be between 0 and 100, got {}", v));
                current
            }
            Some(v) => v,
            None => current,
        };
        let attendance_rate = percent("attendance_rate", self.attendance_rate, current.attendance_rate);
        let area_reject_rate = percent("area_reject_rate", self.area_reject_rate, current.area_reject_rate);
        let prs_pass_rate = percent("5prs_pass_rate", self.prs_pass_rate, current.prs_pass_rate);

        let mut non_negative = |field: &str, value: Option<f64>, current: f64| match value {
            Some(v) if v < 0.0 || v.is_nan() => {
                push(field, format!("must not be negative, got {}", v));
                current
            }
            Some(v) => v,
            None => current,
        };
        let unapproved_absence =
            non_negative("unapproved_absence", self.unapproved_absence, current.unapproved_absence);
        let prs_min_qty = non_negative("5prs_min_qty", self.prs_min_qty, current.prs_min_qty);

        let minimum_working_days = match self.minimum_working_days {
            Some(v) if !(0.0..=31.0).contains(&v) => {
                push("minimum_working_days", format!("must be between 0 and 31, got {}", v));
                current.minimum_working_days
            }
            Some(v) => v,
            None => current.minimum_working_days,
        };

        let consecutive_aql_months = match self.consecutive_aql_months {
            Some(m) if !(1..=12).contains(&m) => {
                push("consecutive_aql_months", format!("must be between 1 and 12, got {}", m));
                current.consecutive_aql_months
            }
            Some(m) => m as u32,
            None => current.consecutive_aql_months,
        };

        let working_days = match self.working_days {
            Some(Some(d)) if !(1..=31).contains(&d) => {
                push("working_days", format!("must be between 1 and 31, got {}", d));
                current.working_days
            }
            Some(Some(d)) => Some(d as u32),
            Some(None) => None,
            None => current.working_days,
        };

        let progression_table = match &self.progression_table {
            Some(table) if table.len() != PROGRESSION_MONTHS => {
                push(
                    "progression_table",
                    format!("needs {} amounts, got {}", PROGRESSION_MONTHS, table.len()),
                );
                current.progression_table.clone()
            }
            Some(table) if table.iter().any(|a| a.is_sign_negative() && !a.is_zero()) => {
                push("progression_table", "amounts must not be negative".to_string());
                current.progression_table.clone()
            }
            Some(table) if table.windows(2).any(|w| w[1] < w[0]) => {
                push(
                    "progression_table",
                    "amounts must not decrease from one month to the next".to_string(),
                );
                current.progression_table.clone()
            }
            Some(table) => table.iter().map(|a| a.normalize()).collect(),
            None => current.progression_table.clone(),
        };

        if !errors.is_empty() {
            return Err(FormErrors { errors });
        }

        Ok(Thresholds {
            attendance_rate,
            unapproved_absence,
            minimum_working_days,
            area_reject_rate,
            prs_pass_rate,
            prs_min_qty,
            consecutive_aql_months,
            working_days,
            progression_table,
        })
    }
}

fn parse_field<T: FromStr>(field: &str, raw: &str, errors: &mut Vec<FieldError>) -> Option<T> {
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(FieldError {
                field: field.to_string(),
                message: format!("'{}' is not a number", raw),
            });
            None
        }
    }
}

impl ThresholdForm {
    /// Reads the admin page's urlencoded fields. Blank inputs keep the current
    /// value, except `working_days`, where blank clears the override. Each
    /// `progression_table` field is one month, in order.
    pub fn from_form_fields(fields: &[(String, String)]) -> Result<Self, FormErrors> {
        let mut form = ThresholdForm::default();
        let mut errors = Vec::new();
        let mut progression = Vec::new();

        for (name, raw) in fields {
            let raw = raw.trim();
            let errors = &mut errors;
            match name.as_str() {
                "attendance_rate" => form.attendance_rate = parse_field(name, raw, errors),
                "unapproved_absence" => form.unapproved_absence = parse_field(name, raw, errors),
                "minimum_working_days" => {
                    form.minimum_working_days = parse_field(name, raw, errors)
                }
                "area_reject_rate" => form.area_reject_rate = parse_field(name, raw, errors),
                "5prs_pass_rate" => form.prs_pass_rate = parse_field(name, raw, errors),
                "5prs_min_qty" => form.prs_min_qty = parse_field(name, raw, errors),
                "consecutive_aql_months" => {
                    form.consecutive_aql_months = parse_field(name, raw, errors)
                }
                "working_days" => form.working_days = Some(parse_field(name, raw, errors)),
                "progression_table" => {
                    if raw.is_empty() {
                        errors.push(FieldError {
                            field: name.clone(),
                            message: format!("month {} has no amount", progression.len() + 1),
                        });
                    }
                    if let Some(amount) = parse_field::<Decimal>(name, raw, errors) {
                        progression.push(amount);
                    }
                }
                _ => {}
            }
        }

        if !errors.is_empty() {
            return Err(FormErrors { errors });
        }
        if !progression.is_empty() {
            form.progression_table = Some(progression);
        }
        Ok(form)
    }
}

// --- Change log ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDelta {
    pub field: String,
    pub before: Value,
    pub after: Value,
}

/// Field-by-field difference, in document key order.
pub fn diff(before: &Thresholds, after: &Thresholds) -> Vec<FieldDelta> {
    let old = before.to_document();
    let new = after.to_document();
    new.iter()
        .filter_map(|(field, after_value)| {
            let before_value = old.get(field).cloned().unwrap_or(Value::Null);
            if before_value == *after_value {
                None
            } else {
                Some(FieldDelta {
                    field: field.clone(),
                    before: before_value,
                    after: after_value.clone(),
                })
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeLogEntry {
    pub id: String,
    pub period: Period,
    pub changes: Vec<FieldDelta>,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
}

impl ChangeLogEntry {
    fn to_document(&self) -> Value {
        json!({
            "period": self.period.to_string(),
            "changes": self.changes,
            "changed_at": self.changed_at.to_rfc3339(),
            "changed_by": self.changed_by,
        })
    }
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Threshold form is invalid")]
    Invalid(#[from] FormErrors),
    #[error("Document store error")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub thresholds: Thresholds,
    pub changes: Vec<FieldDelta>,
    /// `None` when nothing changed and nothing was written.
    pub entry: Option<ChangeLogEntry>,
}

/// Current thresholds for `period`: the period document, else `latest`, else
/// defaults. Returns the raw document too so unknown keys survive a rewrite.
pub async fn read_thresholds(
    store: &dyn DocumentStore,
    auth: &StoreAuth,
    period: &Period,
) -> Result<(Thresholds, Option<Value>), StoreError> {
    if let Some(doc) = store
        .get_document(&thresholds_path(&period.to_string()), auth)
        .await?
    {
        return Ok((Thresholds::from_document(&doc), Some(doc)));
    }
    let latest = store
        .get_document(&thresholds_path(LATEST_THRESHOLDS_DOC), auth)
        .await?;
    let thresholds = latest
        .as_ref()
        .map(Thresholds::from_document)
        .unwrap_or_default();
    Ok((thresholds, None))
}

/// Read-modify-write of `thresholds/{period}` plus one change-log entry.
/// With no changed field nothing is written at all.
pub async fn save_thresholds(
    store: &dyn DocumentStore,
    auth: &StoreAuth,
    period: &Period,
    form: &ThresholdForm,
    editor: &str,
    clock: &dyn Clock,
) -> Result<SaveOutcome, SaveError> {
    let (before, existing) = read_thresholds(store, auth, period).await?;
    let after = form.apply(&before)?;
    let changes = diff(&before, &after);

    if changes.is_empty() {
        debug!("Threshold save for {} changed nothing", period);
        return Ok(SaveOutcome {
            thresholds: after,
            changes,
            entry: None,
        });
    }

    // Log first: a threshold write never lands without its entry.
    let now = clock.now();
    let mut entry = ChangeLogEntry {
        id: String::new(),
        period: *period,
        changes: changes.clone(),
        changed_at: now,
        changed_by: editor.to_string(),
    };
    entry.id = store
        .add_document(THRESHOLD_CHANGES_COLLECTION, &entry.to_document(), auth)
        .await?;

    let mut document = existing
        .and_then(|doc| doc.as_object().cloned())
        .unwrap_or_default();
    document.extend(after.to_document());
    document.insert("updated_at".into(), json!(now.to_rfc3339()));
    document.insert("updated_by".into(), json!(editor));
    if let Err(e) = store
        .set_document(
            &thresholds_path(&period.to_string()),
            &Value::Object(document),
            auth,
        )
        .await
    {
        error!(
            "Thresholds for {} not written after change log {} was appended: {}",
            period, entry.id, e
        );
        return Err(e.into());
    }
    info!(
        "Thresholds for {} saved by {} ({} field(s) changed, log {})",
        period,
        editor,
        changes.len(),
        entry.id
    );

    Ok(SaveOutcome {
        thresholds: after,
        changes,
        entry: Some(entry),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn period() -> Period {
        Period::parse("february_2026").unwrap()
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let doc = json!({
            "attendance_rate": "90",
            "5prs_min_qty": 120,
            "updated_by": "someone@example.com",
            "progression_table": { "1": 200000 }
        });
        let thresholds = Thresholds::from_document(&doc);
        assert_eq!(thresholds.attendance_rate, 90.0);
        assert_eq!(thresholds.prs_min_qty, 120.0);
        assert_eq!(thresholds.unapproved_absence, DEFAULT_UNAPPROVED_ABSENCE);
        assert_eq!(thresholds.consecutive_aql_months, 3);
        assert_eq!(thresholds.working_days, None);
        assert_eq!(thresholds.progression_table[0], dec!(200000));
        assert_eq!(thresholds.progression_table[14], dec!(1000000));
    }

    #[test]
    fn document_round_trips_through_from_document() {
        let original = Thresholds {
            working_days: Some(22),
            area_reject_rate: 2.5,
            ..Thresholds::default()
        };
        let restored = Thresholds::from_document(&Value::Object(original.to_document()));
        assert_eq!(restored, original);
    }

    #[test]
    fn form_validation_reports_every_bad_field() {
        let form: ThresholdForm = serde_json::from_value(json!({
            "attendance_rate": 120,
            "unapproved_absence": -1,
            "consecutive_aql_months": 0,
            "working_days": 40,
            "progression_table": [1, 2, 3]
        }))
        .unwrap();
        let errors = form.apply(&Thresholds::default()).unwrap_err();
        let fields: Vec<&str> = errors.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "attendance_rate",
                "unapproved_absence",
                "consecutive_aql_months",
                "working_days",
                "progression_table"
            ]
        );
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn admin_page_fields_become_a_form() {
        let mut pairs = vec![
            ("attendance_rate", " 90 "),
            ("unapproved_absence", ""),
            ("consecutive_aql_months", "2"),
            ("working_days", ""),
            ("note", "ignored"),
        ];
        let amounts: Vec<String> = (1..=PROGRESSION_MONTHS).map(|m| (m * 100_000).to_string()).collect();
        pairs.extend(amounts.iter().map(|a| ("progression_table", a.as_str())));

        let form = ThresholdForm::from_form_fields(&fields(&pairs)).unwrap();
        assert_eq!(form.attendance_rate, Some(90.0));
        assert_eq!(form.unapproved_absence, None);
        assert_eq!(form.consecutive_aql_months, Some(2));
        assert_eq!(form.working_days, Some(None));
        let table = form.progression_table.clone().unwrap();
        assert_eq!(table.len(), PROGRESSION_MONTHS);
        assert_eq!(table[1], dec!(200000));

        let current = Thresholds {
            working_days: Some(20),
            ..Thresholds::default()
        };
        let applied = form.apply(&current).unwrap();
        assert_eq!(applied.working_days, None);
        assert_eq!(applied.unapproved_absence, DEFAULT_UNAPPROVED_ABSENCE);
    }

    #[test]
    fn unparseable_admin_page_fields_are_reported() {
        let err = ThresholdForm::from_form_fields(&fields(&[
            ("attendance_rate", "ninety"),
            ("working_days", "22.5"),
            ("progression_table", "100000"),
            ("progression_table", ""),
        ]))
        .unwrap_err();
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["attendance_rate", "working_days", "progression_table"]);
        assert_eq!(err.errors[2].message, "month 2 has no amount");
    }

    #[test]
    fn decreasing_progression_is_rejected() {
        let mut table = default_progression_table();
        table[5] = dec!(100);
        let form = ThresholdForm {
            progression_table: Some(table),
            ..ThresholdForm::default()
        };
        assert!(form.apply(&Thresholds::default()).is_err());
    }

    #[test]
    fn null_working_days_clears_override() {
        let current = Thresholds {
            working_days: Some(20),
            ..Thresholds::default()
        };
        let absent: ThresholdForm = serde_json::from_value(json!({})).unwrap();
        assert_eq!(absent.apply(&current).unwrap().working_days, Some(20));

        let cleared: ThresholdForm = serde_json::from_value(json!({ "working_days": null })).unwrap();
        assert_eq!(cleared.apply(&current).unwrap().working_days, None);
    }

    #[test]
    fn diff_lists_only_changed_fields() {
        let before = Thresholds::default();
        let after = Thresholds {
            attendance_rate: 90.0,
            prs_min_qty: 150.0,
            ..Thresholds::default()
        };
        let changes = diff(&before, &after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "attendance_rate");
        assert_eq!(changes[0].before, json!(88.0));
        assert_eq!(changes[0].after, json!(90.0));
        assert_eq!(changes[1].field, "5prs_min_qty");
    }

    #[tokio::test]
    async fn save_without_changes_writes_nothing() {
        let store = MemoryStore::new();
        let clock = ManualClock::new("2026-02-20 10:00:00");
        let form: ThresholdForm =
            serde_json::from_value(json!({ "attendance_rate": 88, "5prs_pass_rate": 95 })).unwrap();

        let outcome = save_thresholds(
            &store,
            &StoreAuth::Anonymous,
            &period(),
            &form,
            "admin@example.com",
            &clock,
        )
        .await
        .unwrap();

        assert!(outcome.changes.is_empty());
        assert!(outcome.entry.is_none());
        assert_eq!(store.document_count(), 0);
        assert!(store.documents_in(THRESHOLD_CHANGES_COLLECTION).is_empty());
    }

    #[tokio::test]
    async fn save_with_k_changes_appends_one_entry_with_k_deltas() {
        let store = MemoryStore::new();
        store.insert(
            "thresholds/february_2026",
            json!({ "attendance_rate": 88, "note": "keep me" }),
        );
        let clock = ManualClock::new("2026-02-20 10:00:00");
        let form: ThresholdForm = serde_json::from_value(json!({
            "attendance_rate": 90,
            "area_reject_rate": 2.5,
            "consecutive_aql_months": 2
        }))
        .unwrap();

        let outcome = save_thresholds(
            &store,
            &StoreAuth::Anonymous,
            &period(),
            &form,
            "admin@example.com",
            &clock,
        )
        .await
        .unwrap();

        assert_eq!(outcome.changes.len(), 3);
        let log = store.documents_in(THRESHOLD_CHANGES_COLLECTION);
        assert_eq!(log.len(), 1);
        let (_, entry_doc) = &log[0];
        assert_eq!(entry_doc["changes"].as_array().unwrap().len(), 3);
        assert_eq!(entry_doc["changed_by"], "admin@example.com");
        assert_eq!(entry_doc["period"], "february_2026");

        let saved = store.document("thresholds/february_2026").unwrap();
        assert_eq!(saved["attendance_rate"], json!(90.0));
        assert_eq!(saved["note"], "keep me");
        assert_eq!(saved["updated_by"], "admin@example.com");

        let entry = outcome.entry.unwrap();
        assert!(!entry.id.is_empty());
        assert_eq!(entry.changes.len(), 3);
    }

    #[tokio::test]
    async fn failed_log_append_leaves_thresholds_untouched() {
        let store = MemoryStore::new();
        store.insert("thresholds/february_2026", json!({ "attendance_rate": 88 }));
        store.fail_on(THRESHOLD_CHANGES_COLLECTION);
        let clock = ManualClock::new("2026-02-20 10:00:00");
        let form: ThresholdForm =
            serde_json::from_value(json!({ "attendance_rate": 90 })).unwrap();

        let err = save_thresholds(
            &store,
            &StoreAuth::Anonymous,
            &period(),
            &form,
            "admin@example.com",
            &clock,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SaveError::Store(_)));
        let saved = store.document("thresholds/february_2026").unwrap();
        assert_eq!(saved["attendance_rate"], json!(88));
        assert!(saved.get("updated_by").is_none());
    }

    #[tokio::test]
    async fn first_save_of_a_period_starts_from_latest() {
        let store = MemoryStore::new();
        store.insert("thresholds/latest", json!({ "attendance_rate": 92 }));
        let clock = ManualClock::new("2026-02-20 10:00:00");
        let form: ThresholdForm =
            serde_json::from_value(json!({ "attendance_rate": 92, "5prs_min_qty": 110 })).unwrap();

        let outcome = save_thresholds(
            &store,
            &StoreAuth::Anonymous,
            &period(),
            &form,
            "admin@example.com",
            &clock,
        )
        .await
        .unwrap();

        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].field, "5prs_min_qty");
        assert!(store.document("thresholds/february_2026").is_some());
    }

    #[tokio::test]
    async fn invalid_form_is_not_saved() {
        let store = MemoryStore::new();
        let clock = ManualClock::new("2026-02-20 10:00:00");
        let form: ThresholdForm =
            serde_json::from_value(json!({ "area_reject_rate": -3 })).unwrap();
        let err = save_thresholds(
            &store,
            &StoreAuth::Anonymous,
            &period(),
            &form,
            "admin@example.com",
            &clock,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SaveError::Invalid(_)));
        assert_eq!(store.document_count(), 0);
    }
}

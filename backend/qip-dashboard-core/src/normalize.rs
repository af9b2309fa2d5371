// src/normalize.rs
//
// Employee documents exist in two historical shapes: the legacy CSV-derived
// rows with capitalized keys ("Employee No", "Final Incentive amount", ...)
// and the newer nested snake_case documents. Every record goes through
// `normalize_employee` exactly once, at load time.

use rust_decimal::prelude::*;
use serde_json::Value;

use crate::model::{
    Aql, Attendance, ConditionResult, Employee, Prs, RoleTier, CONDITION_COUNT,
};

const MONTH_PREFIXES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

// --- Field spellings, canonical path first ---

const EMP_NO: &[&str] = &["emp_no", "Employee No", "employee_no", "EmployeeNo", "ID No"];
const FULL_NAME: &[&str] = &["full_name", "Full Name", "FULL NAME", "name", "Name"];
const POSITION: &[&str] = &[
    "position",
    "QIP POSITION 1ST  NAME",
    "QIP POSITION 1ST NAME",
    "Position",
];
const POSITION_CODE: &[&str] = &["position_code", "FINAL QIP POSITION NAME CODE"];
const BUILDING: &[&str] = &["building", "BUILDING", "Building"];
const ROLE_TIER: &[&str] = &["role_tier", "type", "ROLE TYPE STD", "role_type", "Type"];
const BOSS_ID: &[&str] = &["boss_id", "direct boss id", "Direct Boss ID"];
const BOSS_NAME: &[&str] = &["boss_name", "direct boss name", "Direct Boss Name"];
const ENTRANCE_DATE: &[&str] = &["entrance_date", "Entrance Date"];
const STOP_WORKING_DATE: &[&str] = &["stop_working_date", "Stop working Date"];

const ATTENDANCE_RATE: &[&str] = &[
    "attendance.rate",
    "attendance_rate",
    "Attendance Rate",
    "출근율_Attendance_Rate_Percent",
    "Attendance Rate (%)",
];
const TOTAL_DAYS: &[&str] = &["attendance.total_days", "total_working_days", "Total Working Days"];
const ACTUAL_DAYS: &[&str] = &[
    "attendance.actual_days",
    "actual_working_days",
    "Actual Working Days",
];
const UNAPPROVED_ABSENCE: &[&str] = &[
    "attendance.unapproved_absence",
    "unapproved_absence",
    "Unapproved Absences",
    "Unapproved Absence Days",
];
const APPROVED_LEAVE: &[&str] = &["attendance.approved_leave", "approved_leave", "Approved Leave Days"];
const ABSENCE_RATE: &[&str] = &[
    "attendance.absence_rate",
    "absence_rate",
    "결근율_Absence_Rate_Percent",
];

const AQL_FAILURES: &[&str] = &["aql.failures", "aql_failures", "AQL Failures"];
const CONTINUOUS_FAIL: &[&str] = &[
    "aql.continuous_fail_label",
    "aql.continuous_fail",
    "continuous_fail",
    "Continuous_FAIL",
];
const AREA_REJECT_RATE: &[&str] = &["aql.area_reject_rate", "area_reject_rate", "Area_Reject_Rate"];
const AQL_TOTAL_TESTS: &[&str] = &["aql.total_tests", "AQL_Total_Tests"];
const AQL_PASS_COUNT: &[&str] = &["aql.pass_count", "AQL_Pass_Count"];
const AQL_FAIL_PERCENT: &[&str] = &["aql.fail_percent", "AQL_Fail_Percent"];

const PRS_PASS_RATE: &[&str] = &["prs.pass_rate", "5prs_pass_rate", "5PRS_Pass_Rate"];
const PRS_INSPECTION_QTY: &[&str] = &["prs.inspection_qty", "5prs_inspection_qty", "5PRS_Inspection_Qty"];
const PRS_TOTAL_QTY: &[&str] = &["prs.total_qty", "Total Valiation Qty", "Total Validation Qty"];
const PRS_TOTAL_PASS: &[&str] = &["prs.total_pass", "Total Pass Qty"];

const CURRENT_INCENTIVE: &[&str] = &["current_incentive", "Final Incentive amount", "incentive"];
const PREVIOUS_INCENTIVE: &[&str] = &[
    "previous_incentive",
    "Previous_Month_Incentive",
    "previous_month_incentive",
];
const CONTINUOUS_MONTHS: &[&str] = &["continuous_months", "Continuous_Months"];
const PREVIOUS_CONTINUOUS_MONTHS: &[&str] = &[
    "previous_continuous_months",
    "Previous_Continuous_Months",
];
const NEXT_MONTH_EXPECTED: &[&str] = &["next_month_expected", "Next_Month_Expected"];
const TALENT_POOL_MEMBER: &[&str] = &["talent_pool_member", "Talent_Pool_Member"];
const TALENT_POOL_BONUS: &[&str] = &["talent_pool_bonus", "Talent_Pool_Bonus"];

// --- Lookup ---

fn lookup_path<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    // Legacy keys may contain spaces but never dots, so a dot means nesting.
    if let Some(direct) = raw.get(path) {
        return Some(direct);
    }
    let mut current = raw;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let t = s.trim();
            t.is_empty() || t.eq_ignore_ascii_case("nan") || t.eq_ignore_ascii_case("none")
        }
        Value::Number(n) => n.as_f64().map_or(true, f64::is_nan),
        _ => false,
    }
}

/// First spelling that is present and non-blank.
fn pick<'a>(raw: &'a Value, spellings: &[&str]) -> Option<&'a Value> {
    spellings
        .iter()
        .filter_map(|path| lookup_path(raw, path))
        .find(|value| !is_blank(value))
}

/// Keys like `February_Incentive` or `February AQL Failures`, named after the
/// month the upstream sheet was built for.
fn pick_month_keyed<'a>(raw: &'a Value, suffix: &str) -> Option<&'a Value> {
    let map = raw.as_object()?;
    MONTH_PREFIXES
        .iter()
        .filter_map(|month| map.get(&format!("{}{}", month, suffix)))
        .find(|value| !is_blank(value))
}

// --- Coercion ---

pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_end_matches('%')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            cleaned.trim().parse::<f64>().ok().filter(|f| f.is_finite())
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("nan") || t.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(t.to_string())
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                // Spreadsheet ids come through as 620030001.0.
                n.as_f64().filter(|f| f.is_finite()).map(|f| {
                    if f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Bool(b) => Some(if *b { "YES" } else { "NO" }.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub fn coerce_decimal(value: &Value) -> Option<Decimal> {
    let parsed = match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .ok()
                .or_else(|| Decimal::from_scientific(&text).ok())
                .or_else(|| n.as_f64().and_then(Decimal::from_f64))
        }
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_end_matches("VND")
                .trim_end_matches('₫')
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Decimal::from_str(&cleaned)
                    .ok()
                    .or_else(|| Decimal::from_scientific(&cleaned).ok())
            }
        }
        _ => None,
    }?;
    Some(parsed.normalize())
}

fn coerce_u32(value: &Value) -> Option<u32> {
    coerce_f64(value).map(|f| if f <= 0.0 { 0 } else { f as u32 })
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "YES" | "Y" | "TRUE" | "1" | "O" => Some(true),
            "NO" | "N" | "FALSE" | "0" | "X" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn text(raw: &Value, spellings: &[&str]) -> String {
    pick(raw, spellings)
        .and_then(coerce_string)
        .unwrap_or_default()
}

fn number(raw: &Value, spellings: &[&str]) -> f64 {
    pick(raw, spellings).and_then(coerce_f64).unwrap_or(0.0)
}

fn count(raw: &Value, spellings: &[&str]) -> u32 {
    pick(raw, spellings).and_then(coerce_u32).unwrap_or(0)
}

fn amount(raw: &Value, spellings: &[&str]) -> Decimal {
    pick(raw, spellings)
        .and_then(coerce_decimal)
        .unwrap_or(Decimal::ZERO)
}

// --- Conditions ---

fn stored_condition(raw: &Value, n: usize) -> Option<ConditionResult> {
    let candidates = [
        raw.get("conditions").and_then(|c| c.get(format!("c{}", n))),
        raw.get("conditions")
            .and_then(Value::as_array)
            .and_then(|items| items.get(n - 1)),
        raw.get(format!("cond_{}", n)),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter(|value| !is_blank(value))
        .find_map(|value| match value {
            Value::String(s) => ConditionResult::parse(s),
            Value::Bool(b) => Some(ConditionResult::from_bool(*b)),
            _ => None,
        })
}

fn stored_condition_number(raw: &Value, n: usize, kind: &str) -> Option<f64> {
    let array_field = match kind {
        "value" => "condition_values",
        _ => "condition_thresholds",
    };
    let candidates = [
        raw.get("condition_values")
            .and_then(|c| c.get(format!("c{}_{}", n, kind))),
        raw.get(array_field)
            .and_then(Value::as_array)
            .and_then(|items| items.get(n - 1)),
        raw.get(format!("cond_{}_{}", n, kind)),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter(|value| !is_blank(value))
        .find_map(coerce_f64)
}

fn continuous_fail(raw: &Value) -> (bool, String) {
    let Some(value) = pick(raw, CONTINUOUS_FAIL) else {
        return (false, String::new());
    };
    match value {
        Value::Bool(b) => (*b, if *b { "YES".to_string() } else { String::new() }),
        other => {
            let label = coerce_string(other).unwrap_or_default().to_ascii_uppercase();
            let failing = label.starts_with("YES") || label == "TRUE" || label == "Y";
            if failing {
                (true, label)
            } else {
                (false, String::new())
            }
        }
    }
}

/// Maps one raw record, in either schema, to the canonical [`Employee`].
pub fn normalize_employee(raw: &Value) -> Employee {
    let (continuous_fail, continuous_fail_label) = continuous_fail(raw);

    let aql_failures = pick(raw, AQL_FAILURES)
        .or_else(|| pick_month_keyed(raw, " AQL Failures"))
        .and_then(coerce_u32)
        .unwrap_or(0);

    let current_incentive = pick(raw, CURRENT_INCENTIVE)
        .or_else(|| pick_month_keyed(raw, "_Incentive"))
        .and_then(coerce_decimal)
        .unwrap_or(Decimal::ZERO);

    let mut conditions = [None; CONDITION_COUNT];
    let mut condition_values = [None; CONDITION_COUNT];
    let mut condition_thresholds = [None; CONDITION_COUNT];
    for n in 1..=CONDITION_COUNT {
        conditions[n - 1] = stored_condition(raw, n);
        condition_values[n - 1] = stored_condition_number(raw, n, "value");
        condition_thresholds[n - 1] = stored_condition_number(raw, n, "threshold");
    }

    Employee {
        emp_no: text(raw, EMP_NO),
        full_name: text(raw, FULL_NAME),
        position: text(raw, POSITION),
        position_code: text(raw, POSITION_CODE),
        building: text(raw, BUILDING),
        role_tier: pick(raw, ROLE_TIER)
            .and_then(coerce_string)
            .map(|s| RoleTier::parse(&s))
            .unwrap_or_default(),
        boss_id: text(raw, BOSS_ID),
        boss_name: text(raw, BOSS_NAME),
        entrance_date: text(raw, ENTRANCE_DATE),
        stop_working_date: text(raw, STOP_WORKING_DATE),

        attendance: Attendance {
            rate: number(raw, ATTENDANCE_RATE),
            total_days: number(raw, TOTAL_DAYS),
            actual_days: number(raw, ACTUAL_DAYS),
            unapproved_absence: number(raw, UNAPPROVED_ABSENCE),
            approved_leave: number(raw, APPROVED_LEAVE),
            absence_rate: number(raw, ABSENCE_RATE),
        },
        aql: Aql {
            failures: aql_failures,
            continuous_fail,
            continuous_fail_label,
            area_reject_rate: number(raw, AREA_REJECT_RATE),
            total_tests: number(raw, AQL_TOTAL_TESTS),
            pass_count: number(raw, AQL_PASS_COUNT),
            fail_percent: number(raw, AQL_FAIL_PERCENT),
        },
        prs: Prs {
            pass_rate: number(raw, PRS_PASS_RATE),
            inspection_qty: number(raw, PRS_INSPECTION_QTY),
            total_qty: number(raw, PRS_TOTAL_QTY),
            total_pass: number(raw, PRS_TOTAL_PASS),
        },

        current_incentive,
        previous_incentive: amount(raw, PREVIOUS_INCENTIVE),
        continuous_months: count(raw, CONTINUOUS_MONTHS),
        previous_continuous_months: count(raw, PREVIOUS_CONTINUOUS_MONTHS),
        next_month_expected: amount(raw, NEXT_MONTH_EXPECTED),
        talent_pool_member: pick(raw, TALENT_POOL_MEMBER)
            .and_then(coerce_bool)
            .unwrap_or(false),
        talent_pool_bonus: amount(raw, TALENT_POOL_BONUS),

        conditions,
        condition_values,
        condition_thresholds,
    }
}

/// Normalizes the `employees` array of an `all_data/data` document. Records
/// without an employee number are dropped.
pub fn normalize_employee_list(document: &Value) -> Vec<Employee> {
    let rows: &[Value] = match document {
        Value::Array(items) => items.as_slice(),
        other => other
            .get("employees")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
    };
    rows.iter()
        .map(normalize_employee)
        .filter(|employee| !employee.emp_no.is_empty())
        .collect()
}

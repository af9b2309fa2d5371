// src/views/mod.rs
//
// Everything the dashboard shows is derived here from a `LoadedPeriod`.

pub mod charts;
pub mod detail;
pub mod kpi;
pub mod report;
pub mod table;

use rust_decimal::prelude::*;

/// Shown in place of a ratio whose denominator is zero.
pub const PLACEHOLDER: &str = "--";

/// `part / whole * 100`, or `None` when `whole` is zero.
pub fn percent(part: f64, whole: f64) -> Option<f64> {
    if whole == 0.0 || !whole.is_finite() {
        None
    } else {
        Some(part / whole * 100.0)
    }
}

pub fn format_percent(ratio: Option<f64>) -> String {
    match ratio {
        Some(value) if value.is_finite() => format!("{:.1}%", value),
        _ => PLACEHOLDER.to_string(),
    }
}

/// `1250000` -> `"1,250,000 VND"`. Amounts are rounded to whole dong.
pub fn format_vnd(amount: Decimal) -> String {
    let rounded = amount.round_dp(0);
    let digits = rounded.abs().trunc().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}{} VND", sign, grouped)
}

/// Signed variant for trend deltas: `+50,000 VND`, `-20,000 VND`.
pub fn format_vnd_delta(amount: Decimal) -> String {
    if amount > Decimal::ZERO {
        format!("+{}", format_vnd(amount))
    } else {
        format_vnd(amount)
    }
}

pub(crate) fn decimal_to_f64(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}

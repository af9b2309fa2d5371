// src/derive.rs
//
// Pure helpers over a normalized `Employee`. Every view goes through these;
// none of them touch raw documents.

use rust_decimal::Decimal;
use serde::Serialize;
use std::ops::RangeInclusive;

use crate::model::{ConditionResult, Employee, RoleTier, CONDITION_COUNT};
use crate::thresholds::{Thresholds, PROGRESSION_MONTHS};

/// First condition that only applies to tier 1 (quality and inspection).
pub const FIRST_QUALITY_CONDITION: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    Current,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// value >= threshold
    AtLeast,
    /// value <= threshold
    AtMost,
    /// value < threshold
    Below,
    /// value > threshold
    Above,
}

impl Direction {
    pub fn symbol(&self) -> &'static str {
        match self {
            Direction::AtLeast => ">=",
            Direction::AtMost => "<=",
            Direction::Below => "<",
            Direction::Above => ">",
        }
    }
}

pub fn threshold_comparison(value: f64, threshold: f64, direction: Direction) -> ConditionResult {
    let passed = match direction {
        Direction::AtLeast => value >= threshold,
        Direction::AtMost => value <= threshold,
        Direction::Below => value < threshold,
        Direction::Above => value > threshold,
    };
    ConditionResult::from_bool(passed)
}

struct ConditionRule {
    label: &'static str,
    direction: Direction,
    metric: fn(&Employee) -> f64,
    threshold: fn(&Thresholds) -> f64,
}

fn streak_months(employee: &Employee) -> f64 {
    employee.aql.continuous_fail_months().unwrap_or(0) as f64
}

static RULES: [ConditionRule; CONDITION_COUNT] = [
    ConditionRule {
        label: "Attendance rate",
        direction: Direction::AtLeast,
        metric: |e| e.attendance.rate,
        threshold: |t| t.attendance_rate,
    },
    ConditionRule {
        label: "Unapproved absences",
        direction: Direction::AtMost,
        metric: |e| e.attendance.unapproved_absence,
        threshold: |t| t.unapproved_absence,
    },
    ConditionRule {
        label: "Actual working days",
        direction: Direction::Above,
        metric: |e| e.attendance.actual_days,
        threshold: |_| 0.0,
    },
    ConditionRule {
        label: "Minimum working days",
        direction: Direction::AtLeast,
        metric: |e| e.attendance.actual_days,
        threshold: |t| t.minimum_working_days,
    },
    ConditionRule {
        label: "AQL failures this month",
        direction: Direction::AtMost,
        metric: |e| e.aql.failures as f64,
        threshold: |_| 0.0,
    },
    ConditionRule {
        label: "Consecutive AQL failures",
        direction: Direction::Below,
        metric: streak_months,
        threshold: |t| t.consecutive_aql_months as f64,
    },
    ConditionRule {
        label: "Area reject rate",
        direction: Direction::Below,
        metric: |e| e.aql.area_reject_rate,
        threshold: |t| t.area_reject_rate,
    },
    ConditionRule {
        label: "Own AQL fail rate",
        direction: Direction::Below,
        metric: |e| e.aql.fail_percent,
        threshold: |t| t.area_reject_rate,
    },
    ConditionRule {
        label: "5PRS pass rate",
        direction: Direction::AtLeast,
        metric: |e| e.prs.pass_rate,
        threshold: |t| t.prs_pass_rate,
    },
    ConditionRule {
        label: "5PRS inspection quantity",
        direction: Direction::AtLeast,
        metric: |e| e.prs.inspection_qty,
        threshold: |t| t.prs_min_qty,
    },
];

fn rule(n: usize) -> Option<&'static ConditionRule> {
    if (1..=CONDITION_COUNT).contains(&n) {
        Some(&RULES[n - 1])
    } else {
        None
    }
}

pub fn condition_label(n: usize) -> &'static str {
    rule(n).map(|r| r.label).unwrap_or("Unknown condition")
}

pub fn condition_direction(n: usize) -> Option<Direction> {
    rule(n).map(|r| r.direction)
}

pub fn incentive_amount(employee: &Employee, which: Which) -> Decimal {
    match which {
        Which::Current => employee.current_incentive,
        Which::Previous => employee.previous_incentive,
    }
}

pub fn has_received_incentive(employee: &Employee) -> bool {
    employee.current_incentive > Decimal::ZERO
}

pub fn had_previous_incentive(employee: &Employee) -> bool {
    employee.previous_incentive > Decimal::ZERO
}

/// Tier 3 is categorically ineligible; unknown tiers are treated the same.
pub fn is_eligible_tier(tier: RoleTier) -> bool {
    matches!(tier, RoleTier::Tier1 | RoleTier::Tier2)
}

pub fn applicable_conditions(tier: RoleTier) -> RangeInclusive<usize> {
    match tier {
        RoleTier::Tier1 => 1..=CONDITION_COUNT,
        RoleTier::Tier2 | RoleTier::Tier3 | RoleTier::Unknown => 1..=(FIRST_QUALITY_CONDITION - 1),
    }
}

/// Result of condition `n` (1..=10). Quality and inspection conditions are
/// never applicable below tier 1, whatever the stored data says.
pub fn condition_result(employee: &Employee, thresholds: &Thresholds, n: usize) -> ConditionResult {
    let Some(rule) = rule(n) else {
        return ConditionResult::NotApplicable;
    };
    if !applicable_conditions(employee.role_tier).contains(&n) {
        return ConditionResult::NotApplicable;
    }
    if let Some(stored) = employee.stored_condition(n) {
        return stored;
    }
    threshold_comparison(
        (rule.metric)(employee),
        (rule.threshold)(thresholds),
        rule.direction,
    )
}

pub fn condition_value(employee: &Employee, n: usize) -> Option<f64> {
    let rule = rule(n)?;
    employee.condition_values[n - 1].or_else(|| Some((rule.metric)(employee)))
}

pub fn condition_threshold(employee: &Employee, thresholds: &Thresholds, n: usize) -> Option<f64> {
    let rule = rule(n)?;
    employee.condition_thresholds[n - 1].or_else(|| Some((rule.threshold)(thresholds)))
}

/// `(passed, applicable)` over the conditions that apply to the record.
pub fn condition_summary(employee: &Employee, thresholds: &Thresholds) -> (usize, usize) {
    applicable_conditions(employee.role_tier)
        .map(|n| condition_result(employee, thresholds, n))
        .filter(|result| *result != ConditionResult::NotApplicable)
        .fold((0, 0), |(passed, applicable), result| {
            let passed = passed + usize::from(result == ConditionResult::Pass);
            (passed, applicable + 1)
        })
}

/// Payout for the `months`-th consecutive qualifying month. Months beyond the
/// table use its last step; zero months pay nothing.
pub fn progression_amount(thresholds: &Thresholds, months: u32) -> Decimal {
    if months == 0 {
        return Decimal::ZERO;
    }
    let step = (months as usize).clamp(1, PROGRESSION_MONTHS);
    thresholds
        .progression_table
        .get(step - 1)
        .or_else(|| thresholds.progression_table.last())
        .copied()
        .unwrap_or(Decimal::ZERO)
}

/// Expected payout next month if the record keeps qualifying. The pipeline's
/// own figure wins when present.
pub fn next_month_amount(employee: &Employee, thresholds: &Thresholds) -> Decimal {
    if employee.next_month_expected > Decimal::ZERO {
        return employee.next_month_expected;
    }
    if !is_eligible_tier(employee.role_tier) {
        return Decimal::ZERO;
    }
    let next = if has_received_incentive(employee) {
        employee.continuous_months.saturating_add(1)
    } else {
        1
    };
    progression_amount(thresholds, next)
}

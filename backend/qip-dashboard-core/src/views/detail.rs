// src/views/detail.rs
use rust_decimal::Decimal;
use serde::Serialize;

use crate::derive::{
    applicable_conditions, condition_direction, condition_label, condition_result,
    condition_summary, condition_threshold, condition_value, has_received_incentive,
    is_eligible_tier, next_month_amount, progression_amount, FIRST_QUALITY_CONDITION,
};
use crate::model::{ConditionResult, Employee, RoleTier, CONDITION_COUNT};
use crate::thresholds::{Thresholds, PROGRESSION_MONTHS};

/// A section that only exists for some role tiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Applicable(T),
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub emp_no: String,
    pub full_name: String,
    pub position: String,
    pub position_code: String,
    pub building: String,
    pub role_tier: RoleTier,
    pub boss_id: String,
    pub boss_name: String,
    pub entrance_date: String,
    pub stop_working_date: String,
    pub resigned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSection {
    pub rate: f64,
    pub actual_days: f64,
    pub total_days: f64,
    pub unapproved_absence: f64,
    pub approved_leave: f64,
    pub absence_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionRow {
    pub number: usize,
    pub label: &'static str,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub comparison: Option<&'static str>,
    pub result: ConditionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionStep {
    pub month: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub reached: bool,
    pub current: bool,
    pub next: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncentiveSection {
    #[serde(with = "rust_decimal::serde::str")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub previous: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub delta: Decimal,
    pub received: bool,
    pub eligible_tier: bool,
    pub continuous_months: u32,
    pub previous_continuous_months: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub next_month_expected: Decimal,
    pub talent_pool_member: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub talent_pool_bonus: Decimal,
    pub progression: Vec<ProgressionStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySection {
    pub failures: u32,
    pub continuous_fail: bool,
    pub continuous_fail_label: String,
    pub area_reject_rate: f64,
    pub total_tests: f64,
    pub pass_count: f64,
    pub fail_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionSection {
    pub pass_rate: f64,
    pub inspection_qty: f64,
    pub total_qty: f64,
    pub total_pass: f64,
}

/// Payload of the per-employee detail modal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeDetail {
    pub profile: Profile,
    pub attendance: AttendanceSection,
    pub conditions: Vec<ConditionRow>,
    pub conditions_passed: usize,
    pub conditions_applicable: usize,
    pub incentive: IncentiveSection,
    pub quality: Section<QualitySection>,
    pub inspection: Section<InspectionSection>,
}

/// Fifteen steps of the payout table. `current` marks the month the record
/// is in now (capped at the last step); `next` the step it moves to if it
/// keeps qualifying.
pub fn progression_steps(employee: &Employee, thresholds: &Thresholds) -> Vec<ProgressionStep> {
    let last = PROGRESSION_MONTHS as u32;
    let current = if has_received_incentive(employee) {
        employee.continuous_months.min(last)
    } else {
        0
    };
    let next = if is_eligible_tier(employee.role_tier) {
        Some((current + 1).min(last))
    } else {
        None
    };

    (1..=last)
        .map(|month| ProgressionStep {
            month,
            amount: progression_amount(thresholds, month),
            reached: month <= current,
            current: month == current,
            next: next == Some(month) && month != current,
        })
        .collect()
}

impl EmployeeDetail {
    pub fn build(employee: &Employee, thresholds: &Thresholds) -> Self {
        let applicable = applicable_conditions(employee.role_tier);
        let conditions = (1..=CONDITION_COUNT)
            .map(|n| {
                let result = condition_result(employee, thresholds, n);
                let shown = applicable.contains(&n);
                ConditionRow {
                    number: n,
                    label: condition_label(n),
                    value: shown.then(|| condition_value(employee, n)).flatten(),
                    threshold: shown
                        .then(|| condition_threshold(employee, thresholds, n))
                        .flatten(),
                    comparison: shown
                        .then(|| condition_direction(n).map(|d| d.symbol()))
                        .flatten(),
                    result,
                }
            })
            .collect();
        let (conditions_passed, conditions_applicable) = condition_summary(employee, thresholds);
        let quality_applies = applicable.contains(&FIRST_QUALITY_CONDITION);

        Self {
            profile: Profile {
                emp_no: employee.emp_no.clone(),
                full_name: employee.full_name.clone(),
                position: employee.position.clone(),
                position_code: employee.position_code.clone(),
                building: employee.building.clone(),
                role_tier: employee.role_tier,
                boss_id: employee.boss_id.clone(),
                boss_name: employee.boss_name.clone(),
                entrance_date: employee.entrance_date.clone(),
                stop_working_date: employee.stop_working_date.clone(),
                resigned: employee.is_resigned(),
            },
            attendance: AttendanceSection {
                rate: employee.attendance.rate,
                actual_days: employee.attendance.actual_days,
                total_days: employee.attendance.total_days,
                unapproved_absence: employee.attendance.unapproved_absence,
                approved_leave: employee.attendance.approved_leave,
                absence_rate: employee.attendance.absence_rate,
            },
            conditions,
            conditions_passed,
            conditions_applicable,
            incentive: IncentiveSection {
                current: employee.current_incentive,
                previous: employee.previous_incentive,
                delta: employee.current_incentive - employee.previous_incentive,
                received: has_received_incentive(employee),
                eligible_tier: is_eligible_tier(employee.role_tier),
                continuous_months: employee.continuous_months,
                previous_continuous_months: employee.previous_continuous_months,
                next_month_expected: next_month_amount(employee, thresholds),
                talent_pool_member: employee.talent_pool_member,
                talent_pool_bonus: employee.talent_pool_bonus,
                progression: progression_steps(employee, thresholds),
            },
            quality: if quality_applies {
                Section::Applicable(QualitySection {
                    failures: employee.aql.failures,
                    continuous_fail: employee.aql.continuous_fail,
                    continuous_fail_label: employee.aql.continuous_fail_label.clone(),
                    area_reject_rate: employee.aql.area_reject_rate,
                    total_tests: employee.aql.total_tests,
                    pass_count: employee.aql.pass_count,
                    fail_percent: employee.aql.fail_percent,
                })
            } else {
                Section::NotApplicable
            },
            inspection: if quality_applies {
                Section::Applicable(InspectionSection {
                    pass_rate: employee.prs.pass_rate,
                    inspection_qty: employee.prs.inspection_qty,
                    total_qty: employee.prs.total_qty,
                    total_pass: employee.prs.total_pass,
                })
            } else {
                Section::NotApplicable
            },
        }
    }
}

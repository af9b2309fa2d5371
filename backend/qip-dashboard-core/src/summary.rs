// src/summary.rs
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::derive::{condition_result, had_previous_incentive, has_received_incentive};
use crate::model::{ConditionResult, Employee, RoleTier, CONDITION_COUNT};
use crate::normalize::{coerce_decimal, coerce_f64};
use crate::thresholds::Thresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    /// Read from `dashboard_summary/{period}`.
    Stored,
    /// Rebuilt from the employee list because no stored summary exists.
    Computed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Breakdown {
    pub count: usize,
    pub receiving: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct ConditionStat {
    pub pass: usize,
    pub fail: usize,
    pub not_applicable: usize,
}

/// Month-level aggregate shown on the KPI cards and charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub source: SummarySource,
    pub total_employees: usize,
    pub eligible_employees: usize,
    pub receiving_employees: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_incentive: Decimal,
    pub previous_total_incentive: Option<Decimal>,
    pub previous_receiving_employees: Option<usize>,
    pub type_breakdown: BTreeMap<String, Breakdown>,
    pub building_breakdown: BTreeMap<String, Breakdown>,
    /// Index 0 is condition 1.
    pub condition_stats: Vec<ConditionStat>,
    pub working_days: u32,
    pub data_updated_at: Option<String>,
}

fn empty_type_breakdown() -> BTreeMap<String, Breakdown> {
    RoleTier::ALL
        .iter()
        .map(|tier| (tier.as_str().to_string(), Breakdown::default()))
        .collect()
}

fn count_field(document: &Value, key: &str) -> usize {
    document
        .get(key)
        .and_then(coerce_f64)
        .map(|f| if f <= 0.0 { 0 } else { f as usize })
        .unwrap_or(0)
}

fn breakdown_map(document: &Value, key: &str) -> BTreeMap<String, Breakdown> {
    let Some(map) = document.get(key).and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    map.iter()
        .map(|(label, entry)| {
            (
                label.clone(),
                Breakdown {
                    count: count_field(entry, "count"),
                    receiving: count_field(entry, "receiving"),
                    total_amount: entry
                        .get("total_amount")
                        .and_then(coerce_decimal)
                        .unwrap_or(Decimal::ZERO),
                },
            )
        })
        .collect()
}

impl Summary {
    pub fn empty() -> Self {
        Self {
            source: SummarySource::Computed,
            total_employees: 0,
            eligible_employees: 0,
            receiving_employees: 0,
            total_incentive: Decimal::ZERO,
            previous_total_incentive: None,
            previous_receiving_employees: None,
            type_breakdown: empty_type_breakdown(),
            building_breakdown: BTreeMap::new(),
            condition_stats: vec![ConditionStat::default(); CONDITION_COUNT],
            working_days: 0,
            data_updated_at: None,
        }
    }

    /// Parses a stored `dashboard_summary` document.
    pub fn from_document(document: &Value) -> Self {
        let mut type_breakdown = empty_type_breakdown();
        type_breakdown.extend(breakdown_map(document, "type_breakdown"));

        let stats = document.get("condition_stats");
        let condition_stats = (1..=CONDITION_COUNT)
            .map(|n| {
                let stat = |suffix: &str| {
                    stats
                        .map(|s| count_field(s, &format!("c{}_{}", n, suffix)))
                        .unwrap_or(0)
                };
                ConditionStat {
                    pass: stat("pass"),
                    fail: stat("fail"),
                    not_applicable: stat("na"),
                }
            })
            .collect();

        Self {
            source: SummarySource::Stored,
            total_employees: count_field(document, "total_employees"),
            eligible_employees: count_field(document, "eligible_employees"),
            receiving_employees: count_field(document, "receiving_employees"),
            total_incentive: document
                .get("total_incentive")
                .and_then(coerce_decimal)
                .unwrap_or(Decimal::ZERO),
            previous_total_incentive: document
                .get("previous_total_incentive")
                .and_then(coerce_decimal),
            previous_receiving_employees: document
                .get("previous_receiving_employees")
                .and_then(coerce_f64)
                .map(|f| f.max(0.0) as usize),
            type_breakdown,
            building_breakdown: breakdown_map(document, "building_breakdown"),
            condition_stats,
            working_days: count_field(document, "working_days") as u32,
            data_updated_at: document
                .get("data_updated_at")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// Rebuilds the aggregate from normalized records. Condition counts use
    /// the same scoping as the detail view, so tier 2/3 records count as N/A
    /// for quality and inspection conditions.
    pub fn from_employees(employees: &[Employee], thresholds: &Thresholds) -> Self {
        let mut summary = Self::empty();
        summary.total_employees = employees.len();
        summary.working_days = thresholds.working_days.unwrap_or_else(|| {
            employees
                .iter()
                .map(|e| e.attendance.total_days)
                .find(|d| *d > 0.0)
                .map(|d| d as u32)
                .unwrap_or(0)
        });

        let mut previous_total = Decimal::ZERO;
        let mut previous_receiving = 0;

        for employee in employees {
            let received = has_received_incentive(employee);
            if !employee.is_resigned() {
                summary.eligible_employees += 1;
            }
            if received {
                summary.receiving_employees += 1;
                summary.total_incentive += employee.current_incentive;
            }
            if had_previous_incentive(employee) {
                previous_receiving += 1;
                previous_total += employee.previous_incentive;
            }

            if employee.role_tier != RoleTier::Unknown {
                let entry = summary
                    .type_breakdown
                    .entry(employee.role_tier.as_str().to_string())
                    .or_default();
                add_to_breakdown(entry, employee, received);
            }
            let building = employee.building.trim();
            if !building.is_empty() {
                let entry = summary
                    .building_breakdown
                    .entry(building.to_string())
                    .or_default();
                add_to_breakdown(entry, employee, received);
            }

            for (index, stat) in summary.condition_stats.iter_mut().enumerate() {
                match condition_result(employee, thresholds, index + 1) {
                    ConditionResult::Pass => stat.pass += 1,
                    ConditionResult::Fail => stat.fail += 1,
                    ConditionResult::NotApplicable => stat.not_applicable += 1,
                }
            }
        }

        summary.previous_total_incentive = Some(previous_total);
        summary.previous_receiving_employees = Some(previous_receiving);
        summary
    }
}

fn add_to_breakdown(entry: &mut Breakdown, employee: &Employee, received: bool) {
    entry.count += 1;
    if received {
        entry.receiving += 1;
        entry.total_amount += employee.current_incentive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_employee;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn computed_summary_matches_records() {
        let employees: Vec<Employee> = [
            json!({ "emp_no": "1", "type": "TYPE-1", "building": "A", "current_incentive": 250000, "previous_incentive": 150000 }),
            json!({ "emp_no": "2", "type": "TYPE-2", "building": "A", "current_incentive": 0, "previous_incentive": 100000 }),
            json!({ "emp_no": "3", "type": "TYPE-3", "building": "B", "current_incentive": 0, "stop_working_date": "2026-02-10" }),
        ]
        .iter()
        .map(normalize_employee)
        .collect();

        let summary = Summary::from_employees(&employees, &Thresholds::default());
        assert_eq!(summary.source, SummarySource::Computed);
        assert_eq!(summary.total_employees, 3);
        assert_eq!(summary.eligible_employees, 2);
        assert_eq!(summary.receiving_employees, 1);
        assert_eq!(summary.total_incentive, dec!(250000));
        assert_eq!(summary.previous_total_incentive, Some(dec!(250000)));
        assert_eq!(summary.previous_receiving_employees, Some(2));
        assert_eq!(summary.type_breakdown["TYPE-1"].receiving, 1);
        assert_eq!(summary.type_breakdown["TYPE-3"].count, 1);
        assert_eq!(summary.building_breakdown["A"].count, 2);
        // Tier 2 and 3 records count as N/A for condition 5.
        assert_eq!(summary.condition_stats[4].not_applicable, 2);
    }

    #[test]
    fn parses_stored_document() {
        let doc = json!({
            "total_employees": 120,
            "eligible_employees": 118,
            "receiving_employees": 80,
            "total_incentive": 24500000.0,
            "type_breakdown": { "TYPE-1": { "count": 20, "receiving": 15, "total_amount": 6000000 } },
            "building_breakdown": { "B": { "count": 60, "receiving": 40, "total_amount": 12000000 } },
            "condition_stats": { "c1_pass": 100, "c1_fail": 20, "c1_na": 0 },
            "working_days": 22,
            "data_updated_at": "2026-02-28T00:00:00Z"
        });
        let summary = Summary::from_document(&doc);
        assert_eq!(summary.source, SummarySource::Stored);
        assert_eq!(summary.receiving_employees, 80);
        assert_eq!(summary.total_incentive, dec!(24500000));
        assert_eq!(summary.type_breakdown.len(), 3);
        assert_eq!(summary.type_breakdown["TYPE-2"], Breakdown::default());
        assert_eq!(summary.condition_stats[0].fail, 20);
        assert_eq!(summary.condition_stats[9], ConditionStat::default());
        assert_eq!(summary.previous_total_incentive, None);
    }

    #[test]
    fn empty_list_gives_zeroed_summary() {
        let summary = Summary::from_employees(&[], &Thresholds::default());
        assert_eq!(summary.total_employees, 0);
        assert_eq!(summary.total_incentive, Decimal::ZERO);
        assert_eq!(summary.condition_stats.len(), CONDITION_COUNT);
    }
}

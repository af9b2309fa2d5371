// src/views/charts.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::decimal_to_f64;
use crate::derive::{condition_label, condition_result, has_received_incentive};
use crate::loader::LoadedPeriod;
use crate::model::{ConditionResult, CONDITION_COUNT};
use crate::summary::Breakdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    StackedBar,
    Doughnut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
}

/// Chart data only; the browser-side library draws it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub id: &'static str,
    pub kind: ChartKind,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

// Upper bounds (inclusive) of the payout histogram buckets, in VND.
const HISTOGRAM_BOUNDS: [Decimal; 5] = [
    dec!(200000),
    dec!(400000),
    dec!(600000),
    dec!(800000),
    dec!(1000000),
];

fn breakdown_chart<'a>(
    id: &'static str,
    kind: ChartKind,
    rows: impl Iterator<Item = (&'a String, &'a Breakdown)>,
) -> ChartSpec {
    let mut labels = Vec::new();
    let mut count = Vec::new();
    let mut receiving = Vec::new();
    let mut amount = Vec::new();
    for (label, breakdown) in rows {
        labels.push(label.clone());
        count.push(breakdown.count as f64);
        receiving.push(breakdown.receiving as f64);
        amount.push(decimal_to_f64(breakdown.total_amount));
    }
    ChartSpec {
        id,
        kind,
        labels,
        datasets: vec![
            Dataset {
                label: "Employees".to_string(),
                data: count,
            },
            Dataset {
                label: "Receiving".to_string(),
                data: receiving,
            },
            Dataset {
                label: "Total amount (VND)".to_string(),
                data: amount,
            },
        ],
    }
}

pub fn type_breakdown(loaded: &LoadedPeriod) -> ChartSpec {
    breakdown_chart(
        "type_breakdown",
        ChartKind::Bar,
        loaded.summary.type_breakdown.iter(),
    )
}

pub fn building_breakdown(loaded: &LoadedPeriod) -> ChartSpec {
    breakdown_chart(
        "building_breakdown",
        ChartKind::Bar,
        loaded.summary.building_breakdown.iter(),
    )
}

/// Pass/fail/N-A per condition, always computed from the records so tier
/// scoping matches the detail view.
pub fn condition_results(loaded: &LoadedPeriod) -> ChartSpec {
    let mut pass = vec![0.0; CONDITION_COUNT];
    let mut fail = vec![0.0; CONDITION_COUNT];
    let mut not_applicable = vec![0.0; CONDITION_COUNT];

    for employee in loaded.employees.iter() {
        for n in 1..=CONDITION_COUNT {
            let slot = match condition_result(employee, &loaded.thresholds, n) {
                ConditionResult::Pass => &mut pass,
                ConditionResult::Fail => &mut fail,
                ConditionResult::NotApplicable => &mut not_applicable,
            };
            slot[n - 1] += 1.0;
        }
    }

    ChartSpec {
        id: "condition_results",
        kind: ChartKind::StackedBar,
        labels: (1..=CONDITION_COUNT)
            .map(|n| format!("{}. {}", n, condition_label(n)))
            .collect(),
        datasets: vec![
            Dataset {
                label: "Pass".to_string(),
                data: pass,
            },
            Dataset {
                label: "Fail".to_string(),
                data: fail,
            },
            Dataset {
                label: "N/A".to_string(),
                data: not_applicable,
            },
        ],
    }
}

fn histogram_labels() -> Vec<String> {
    let mut labels = vec!["Not receiving".to_string()];
    let mut lower = Decimal::ZERO;
    for upper in HISTOGRAM_BOUNDS {
        labels.push(format!("{}k-{}k", lower / dec!(1000), upper / dec!(1000)));
        lower = upper;
    }
    labels.push(format!("> {}k", lower / dec!(1000)));
    labels
}

pub fn incentive_histogram(loaded: &LoadedPeriod) -> ChartSpec {
    let mut counts = vec![0.0; HISTOGRAM_BOUNDS.len() + 2];
    for employee in loaded.employees.iter() {
        let bucket = if !has_received_incentive(employee) {
            0
        } else {
            HISTOGRAM_BOUNDS
                .iter()
                .position(|upper| employee.current_incentive <= *upper)
                .map(|i| i + 1)
                .unwrap_or(HISTOGRAM_BOUNDS.len() + 1)
        };
        counts[bucket] += 1.0;
    }
    ChartSpec {
        id: "incentive_histogram",
        kind: ChartKind::Bar,
        labels: histogram_labels(),
        datasets: vec![Dataset {
            label: "Employees".to_string(),
            data: counts,
        }],
    }
}

/// Receiving vs not receiving, for the doughnut next to the KPI cards.
pub fn receiving_share(loaded: &LoadedPeriod) -> ChartSpec {
    let receiving = loaded
        .employees
        .iter()
        .filter(|e| has_received_incentive(e))
        .count();
    let not_receiving = loaded.employees.len() - receiving;
    ChartSpec {
        id: "receiving_share",
        kind: ChartKind::Doughnut,
        labels: vec!["Receiving".to_string(), "Not receiving".to_string()],
        datasets: vec![Dataset {
            label: "Employees".to_string(),
            data: vec![receiving as f64, not_receiving as f64],
        }],
    }
}

pub fn all_charts(loaded: &LoadedPeriod) -> Vec<ChartSpec> {
    vec![
        receiving_share(loaded),
        type_breakdown(loaded),
        building_breakdown(loaded),
        condition_results(loaded),
        incentive_histogram(loaded),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_employee;
    use crate::period::Period;
    use crate::summary::Summary;
    use crate::thresholds::Thresholds;
    use serde_json::json;
    use std::sync::Arc;

    fn loaded() -> LoadedPeriod {
        let employees: Vec<_> = [
            json!({ "emp_no": "1", "type": "TYPE-1", "building": "A", "current_incentive": 150000 }),
            json!({ "emp_no": "2", "type": "TYPE-2", "building": "B", "current_incentive": 650000,
                    "conditions": { "c7": "NO" } }),
            json!({ "emp_no": "3", "type": "TYPE-3", "building": "B", "current_incentive": 1200000 }),
            json!({ "emp_no": "4", "type": "TYPE-1", "building": "A" }),
        ]
        .iter()
        .map(normalize_employee)
        .collect();
        let thresholds = Thresholds::default();
        LoadedPeriod {
            period: Period::parse("february_2026").unwrap(),
            summary: Summary::from_employees(&employees, &thresholds),
            employees: Arc::new(employees),
            thresholds,
            banners: Vec::new(),
        }
    }

    #[test]
    fn condition_chart_applies_tier_scoping() {
        let chart = condition_results(&loaded());
        assert_eq!(chart.labels.len(), CONDITION_COUNT);
        assert_eq!(chart.labels[0], "1. Attendance rate");
        let na = &chart.datasets[2].data;
        // Condition 7: the tier 2 stored NO must not count as a failure.
        assert_eq!(na[6], 2.0);
        assert_eq!(chart.datasets[1].data[6] + chart.datasets[0].data[6], 2.0);
        for n in 0..CONDITION_COUNT {
            let total: f64 = chart.datasets.iter().map(|d| d.data[n]).sum();
            assert_eq!(total, 4.0);
        }
    }

    #[test]
    fn histogram_buckets_by_amount() {
        let chart = incentive_histogram(&loaded());
        assert_eq!(chart.labels.first().map(String::as_str), Some("Not receiving"));
        assert_eq!(chart.labels[1], "0k-200k");
        assert_eq!(chart.labels.last().map(String::as_str), Some("> 1000k"));
        assert_eq!(chart.datasets[0].data, vec![1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn breakdown_charts_follow_summary() {
        let loaded = loaded();
        let chart = type_breakdown(&loaded);
        assert_eq!(chart.labels, vec!["TYPE-1", "TYPE-2", "TYPE-3"]);
        assert_eq!(chart.datasets[0].data, vec![2.0, 1.0, 1.0]);
        let buildings = building_breakdown(&loaded);
        assert_eq!(buildings.labels, vec!["A", "B"]);
        assert_eq!(all_charts(&loaded).len(), 5);
        assert_eq!(receiving_share(&loaded).datasets[0].data, vec![3.0, 1.0]);
    }
}

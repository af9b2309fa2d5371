// src/views/kpi.rs
use rust_decimal::Decimal;
use serde::Serialize;

use super::{format_percent, format_vnd, format_vnd_delta, percent, PLACEHOLDER};
use crate::derive::{had_previous_incentive, has_received_incentive};
use crate::loader::LoadedPeriod;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiCard {
    pub id: &'static str,
    pub label: &'static str,
    pub value: String,
    pub delta: Option<String>,
}

/// Headline numbers for the top of the dashboard. Raw values are kept next to
/// the rendered cards so JSON clients do not have to parse strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiCards {
    pub total_employees: usize,
    pub eligible_employees: usize,
    pub receiving_employees: usize,
    pub receiving_rate: Option<f64>,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_payout: Decimal,
    pub average_payout: Option<Decimal>,
    pub payout_delta: Option<Decimal>,
    pub receiving_delta: Option<i64>,
    pub cards: Vec<KpiCard>,
}

impl KpiCards {
    pub fn build(loaded: &LoadedPeriod) -> Self {
        let employees = loaded.employees.as_slice();
        let summary = &loaded.summary;

        // Records win over the summary when both exist; the summary covers
        // periods whose employee document failed to load.
        let (total_employees, eligible_employees, receiving_employees, total_payout) =
            if employees.is_empty() {
                (
                    summary.total_employees,
                    summary.eligible_employees,
                    summary.receiving_employees,
                    summary.total_incentive,
                )
            } else {
                let receiving: Vec<_> =
                    employees.iter().filter(|e| has_received_incentive(e)).collect();
                (
                    employees.len(),
                    employees.iter().filter(|e| !e.is_resigned()).count(),
                    receiving.len(),
                    receiving.iter().map(|e| e.current_incentive).sum(),
                )
            };

        let previous_total = summary.previous_total_incentive.or_else(|| {
            (!employees.is_empty()).then(|| {
                employees
                    .iter()
                    .filter(|e| had_previous_incentive(e))
                    .map(|e| e.previous_incentive)
                    .sum()
            })
        });
        let previous_receiving = summary.previous_receiving_employees.or_else(|| {
            (!employees.is_empty())
                .then(|| employees.iter().filter(|e| had_previous_incentive(e)).count())
        });

        let receiving_rate = percent(receiving_employees as f64, total_employees as f64);
        let average_payout = if receiving_employees == 0 {
            None
        } else {
            Some(total_payout / Decimal::from(receiving_employees))
        };
        let payout_delta = previous_total.map(|previous| total_payout - previous);
        let receiving_delta =
            previous_receiving.map(|previous| receiving_employees as i64 - previous as i64);

        let cards = vec![
            KpiCard {
                id: "total_employees",
                label: "Total employees",
                value: total_employees.to_string(),
                delta: None,
            },
            KpiCard {
                id: "eligible_employees",
                label: "Active employees",
                value: eligible_employees.to_string(),
                delta: None,
            },
            KpiCard {
                id: "receiving_employees",
                label: "Receiving incentive",
                value: receiving_employees.to_string(),
                delta: receiving_delta.map(|d| format!("{:+}", d)),
            },
            KpiCard {
                id: "receiving_rate",
                label: "Receiving rate",
                value: format_percent(receiving_rate),
                delta: None,
            },
            KpiCard {
                id: "total_payout",
                label: "Total payout",
                value: format_vnd(total_payout),
                delta: payout_delta.map(format_vnd_delta),
            },
            KpiCard {
                id: "average_payout",
                label: "Average per recipient",
                value: average_payout
                    .map(format_vnd)
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
                delta: None,
            },
        ];

        Self {
            total_employees,
            eligible_employees,
            receiving_employees,
            receiving_rate,
            total_payout,
            average_payout,
            payout_delta,
            receiving_delta,
            cards,
        }
    }

    pub fn card(&self, id: &str) -> Option<&KpiCard> {
        self.cards.iter().find(|card| card.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Employee;
    use crate::normalize::normalize_employee;
    use crate::period::Period;
    use crate::summary::Summary;
    use crate::thresholds::Thresholds;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;

    fn loaded(employees: Vec<Employee>) -> LoadedPeriod {
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
    fn zero_employees_render_placeholders() {
        let kpis = KpiCards::build(&loaded(Vec::new()));
        assert_eq!(kpis.total_employees, 0);
        assert_eq!(kpis.receiving_employees, 0);
        assert_eq!(kpis.total_payout, Decimal::ZERO);
        assert_eq!(kpis.receiving_rate, None);
        assert_eq!(kpis.average_payout, None);
        assert_eq!(kpis.card("receiving_rate").unwrap().value, PLACEHOLDER);
        assert_eq!(kpis.card("average_payout").unwrap().value, PLACEHOLDER);
        assert_eq!(kpis.card("total_payout").unwrap().value, "0 VND");
    }

    #[test]
    fn totals_and_trend_deltas() {
        let employees = vec![
            normalize_employee(&json!({ "emp_no": "1", "current_incentive": 300000, "previous_incentive": 250000 })),
            normalize_employee(&json!({ "emp_no": "2", "current_incentive": 150000 })),
            normalize_employee(&json!({ "emp_no": "3", "previous_incentive": 150000 })),
            normalize_employee(&json!({ "emp_no": "4", "stop_working_date": "2026-02-03" })),
        ];
        let kpis = KpiCards::build(&loaded(employees));
        assert_eq!(kpis.total_employees, 4);
        assert_eq!(kpis.eligible_employees, 3);
        assert_eq!(kpis.receiving_employees, 2);
        assert_eq!(kpis.receiving_rate, Some(50.0));
        assert_eq!(kpis.total_payout, dec!(450000));
        assert_eq!(kpis.average_payout, Some(dec!(225000)));
        assert_eq!(kpis.payout_delta, Some(dec!(50000)));
        assert_eq!(kpis.receiving_delta, Some(0));
        assert_eq!(
            kpis.card("total_payout").unwrap().delta.as_deref(),
            Some("+50,000 VND")
        );
    }

    #[test]
    fn stored_summary_previous_values_take_precedence() {
        let mut period = loaded(vec![normalize_employee(
            &json!({ "emp_no": "1", "current_incentive": 200000, "previous_incentive": 100000 }),
        )]);
        period.summary.previous_total_incentive = Some(dec!(500000));
        period.summary.previous_receiving_employees = Some(3);
        let kpis = KpiCards::build(&period);
        assert_eq!(kpis.payout_delta, Some(dec!(-300000)));
        assert_eq!(kpis.receiving_delta, Some(-2));
    }
}

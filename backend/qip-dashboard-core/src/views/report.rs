// src/views/report.rs
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

use crate::derive::has_received_incentive;
use crate::loader::LoadedPeriod;
use crate::model::{Employee, RoleTier};
use crate::period::Period;
use crate::summary::Summary;

const CONTENT_HASH_LEN: usize = 12;
const UNKNOWN_BUILDING: &str = "Unknown";
const MISSING: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedEmployee {
    pub emp_no: String,
    pub name: String,
    pub building: String,
    pub position: String,
    pub role_tier: RoleTier,
    /// The figure that put the employee on the list.
    pub metric: f64,
    pub boss_id: String,
    pub boss_name: String,
    pub boss_boss_name: String,
    pub boss_boss_position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingQuality {
    pub building: String,
    pub count: usize,
    pub tests: f64,
    pub fail_count: u32,
    pub receiving: usize,
    pub reject_rate: f64,
    pub fail_employees: Vec<FlaggedEmployee>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportThresholds {
    pub attendance_rate: f64,
    pub unapproved_absence: f64,
    #[serde(rename = "5prs_pass_rate")]
    pub prs_pass_rate: f64,
    #[serde(rename = "5prs_min_qty")]
    pub prs_min_qty: f64,
}

/// Who needs to act on what this month, grouped for the supervisors' report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReport {
    pub period: Period,
    pub summary: Summary,
    pub building_quality: Vec<BuildingQuality>,
    pub continuous_3m: Vec<FlaggedEmployee>,
    pub continuous_2m: Vec<FlaggedEmployee>,
    pub low_prs_rate: Vec<FlaggedEmployee>,
    pub low_prs_qty: Vec<FlaggedEmployee>,
    pub low_attendance: Vec<FlaggedEmployee>,
    pub high_absence: Vec<FlaggedEmployee>,
    pub thresholds: ReportThresholds,
    /// Changes whenever the summary does; a sender compares it with the hash
    /// of the last report it sent.
    pub content_hash: String,
}

/// First 12 hex digits of the SHA-256 of the serialized summary.
pub fn content_hash(summary: &Summary) -> String {
    let bytes = serde_json::to_vec(summary).unwrap_or_default();
    let mut digest = hex::encode(Sha256::digest(&bytes));
    digest.truncate(CONTENT_HASH_LEN);
    digest
}

struct BossLookup<'a> {
    by_emp_no: HashMap<&'a str, &'a Employee>,
}

impl<'a> BossLookup<'a> {
    fn new(employees: &'a [Employee]) -> Self {
        Self {
            by_emp_no: employees
                .iter()
                .filter(|e| !e.emp_no.is_empty())
                .map(|e| (e.emp_no.as_str(), e))
                .collect(),
        }
    }

    fn flag(&self, employee: &Employee, metric: f64) -> FlaggedEmployee {
        let boss_id = employee.boss_id.trim();
        let boss_boss = self
            .by_emp_no
            .get(boss_id)
            .and_then(|boss| self.by_emp_no.get(boss.boss_id.trim()));

        FlaggedEmployee {
            emp_no: employee.emp_no.clone(),
            name: employee.full_name.clone(),
            building: non_blank_or(&employee.building, MISSING),
            position: employee.position.clone(),
            role_tier: employee.role_tier,
            metric,
            boss_id: boss_id.to_string(),
            boss_name: non_blank_or(&employee.boss_name, MISSING),
            boss_boss_name: boss_boss
                .map(|e| non_blank_or(&e.full_name, MISSING))
                .unwrap_or_else(|| MISSING.to_string()),
            boss_boss_position: boss_boss.map(|e| e.position.clone()).unwrap_or_default(),
        }
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn building_quality(employees: &[Employee], bosses: &BossLookup<'_>) -> Vec<BuildingQuality> {
    let mut by_building: BTreeMap<String, BuildingQuality> = BTreeMap::new();
    for employee in employees {
        let building = non_blank_or(&employee.building, UNKNOWN_BUILDING);
        let entry = by_building
            .entry(building.clone())
            .or_insert_with(|| BuildingQuality {
                building,
                count: 0,
                tests: 0.0,
                fail_count: 0,
                receiving: 0,
                reject_rate: 0.0,
                fail_employees: Vec::new(),
            });
        entry.count += 1;
        entry.tests += employee.aql.total_tests.max(0.0).trunc();
        if has_received_incentive(employee) {
            entry.receiving += 1;
        }
        if employee.aql.failures > 0 {
            entry.fail_count += employee.aql.failures;
            let mut flagged = bosses.flag(employee, employee.aql.failures as f64);
            flagged.building = entry.building.clone();
            entry.fail_employees.push(flagged);
        }
    }

    by_building
        .into_values()
        .map(|mut quality| {
            quality.reject_rate = if quality.tests > 0.0 {
                quality.fail_count as f64 / quality.tests * 100.0
            } else {
                0.0
            };
            quality
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Streak {
    ThreeMonths,
    TwoMonths,
}

fn streak(label: &str) -> Option<Streak> {
    let label = label.trim().to_ascii_uppercase();
    if label.starts_with("YES_3") {
        Some(Streak::ThreeMonths)
    } else if label.starts_with("YES_2") || (label.starts_with("YES") && label.contains('2')) {
        Some(Streak::TwoMonths)
    } else {
        None
    }
}

impl ActionReport {
    pub fn build(loaded: &LoadedPeriod) -> Self {
        let employees = loaded.employees.as_slice();
        let thresholds = &loaded.thresholds;
        let bosses = BossLookup::new(employees);

        let mut continuous_3m = Vec::new();
        let mut continuous_2m = Vec::new();
        let mut low_prs_rate = Vec::new();
        let mut low_prs_qty = Vec::new();
        let mut low_attendance = Vec::new();
        let mut high_absence = Vec::new();

        for employee in employees {
            match streak(&employee.aql.continuous_fail_label) {
                Some(Streak::ThreeMonths) => continuous_3m.push(bosses.flag(employee, 3.0)),
                Some(Streak::TwoMonths) => continuous_2m.push(bosses.flag(employee, 2.0)),
                None => {}
            }

            if employee.role_tier == RoleTier::Tier1 {
                let rate = employee.prs.pass_rate;
                if rate > 0.0 && rate < thresholds.prs_pass_rate {
                    low_prs_rate.push(bosses.flag(employee, rate));
                }
                let qty = employee.prs.inspection_qty;
                if qty > 0.0 && qty < thresholds.prs_min_qty {
                    low_prs_qty.push(bosses.flag(employee, qty));
                }
            }

            // Not working yet this month.
            if employee.attendance.actual_days.trunc() <= 0.0 {
                continue;
            }
            let rate = employee.attendance.rate;
            if rate > 0.0 && rate < thresholds.attendance_rate {
                low_attendance.push(bosses.flag(employee, rate));
            }
            let absences = employee.attendance.unapproved_absence;
            if absences > thresholds.unapproved_absence {
                high_absence.push(bosses.flag(employee, absences));
            }
        }

        Self {
            period: loaded.period,
            content_hash: content_hash(&loaded.summary),
            summary: loaded.summary.clone(),
            building_quality: building_quality(employees, &bosses),
            continuous_3m,
            continuous_2m,
            low_prs_rate,
            low_prs_qty,
            low_attendance,
            high_absence,
            thresholds: ReportThresholds {
                attendance_rate: thresholds.attendance_rate,
                unapproved_absence: thresholds.unapproved_absence,
                prs_pass_rate: thresholds.prs_pass_rate,
                prs_min_qty: thresholds.prs_min_qty,
            },
        }
    }

    pub fn flagged_count(&self) -> usize {
        self.continuous_3m.len()
            + self.continuous_2m.len()
            + self.low_prs_rate.len()
            + self.low_prs_qty.len()
            + self.low_attendance.len()
            + self.high_absence.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_employee;
    use crate::thresholds::Thresholds;
    use serde_json::json;
    use std::sync::Arc;

    fn loaded() -> LoadedPeriod {
        let employees: Vec<_> = [
            json!({ "emp_no": "100", "full_name": "GROUP LEADER", "position": "GL", "building": "A" }),
            json!({ "emp_no": "200", "full_name": "LINE LEADER", "position": "LL", "building": "A", "boss_id": "100" }),
            json!({ "emp_no": "1", "full_name": "INSPECTOR ONE", "type": "TYPE-1", "building": "A",
                    "boss_id": "200", "boss_name": "LINE LEADER",
                    "aql": { "failures": 2, "total_tests": 40, "continuous_fail": "YES_3MONTHS" },
                    "prs": { "pass_rate": 90, "inspection_qty": 80 },
                    "attendance": { "rate": 80, "actual_days": 18, "unapproved_absence": 3 } }),
            json!({ "emp_no": "2", "full_name": "INSPECTOR TWO", "type": "TYPE-2", "building": "",
                    "aql": { "continuous_fail": "YES_2MONTHS" },
                    "prs": { "pass_rate": 50, "inspection_qty": 10 },
                    "attendance": { "rate": 10, "actual_days": 0, "unapproved_absence": 9 } }),
            json!({ "emp_no": "3", "type": "TYPE-1", "building": "A", "current_incentive": 150000,
                    "aql": { "total_tests": 60 }, "attendance": { "rate": 99, "actual_days": 22 } }),
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
    fn flags_employees_with_boss_chain() {
        let report = ActionReport::build(&loaded());

        assert_eq!(report.continuous_3m.len(), 1);
        let flagged = &report.continuous_3m[0];
        assert_eq!(flagged.emp_no, "1");
        assert_eq!(flagged.boss_id, "200");
        assert_eq!(flagged.boss_name, "LINE LEADER");
        assert_eq!(flagged.boss_boss_name, "GROUP LEADER");
        assert_eq!(flagged.boss_boss_position, "GL");

        assert_eq!(report.continuous_2m.len(), 1);
        assert_eq!(report.continuous_2m[0].boss_boss_name, "-");

        // Tier 2 is never on the 5PRS lists.
        assert_eq!(report.low_prs_rate.len(), 1);
        assert_eq!(report.low_prs_qty.len(), 1);
        // Zero actual days skips the attendance lists.
        assert_eq!(report.low_attendance.len(), 1);
        assert_eq!(report.high_absence.len(), 1);
        assert_eq!(report.high_absence[0].metric, 3.0);
        assert_eq!(report.flagged_count(), 6);
    }

    #[test]
    fn building_quality_aggregates_reject_rate() {
        let report = ActionReport::build(&loaded());
        let names: Vec<&str> = report
            .building_quality
            .iter()
            .map(|b| b.building.as_str())
            .collect();
        assert_eq!(names, vec!["A", "Unknown"]);

        let a = &report.building_quality[0];
        assert_eq!(a.count, 4);
        assert_eq!(a.tests, 100.0);
        assert_eq!(a.fail_count, 2);
        assert_eq!(a.receiving, 1);
        assert_eq!(a.reject_rate, 2.0);
        assert_eq!(a.fail_employees.len(), 1);
        assert_eq!(report.building_quality[1].reject_rate, 0.0);
    }

    #[test]
    fn content_hash_tracks_summary() {
        let period = loaded();
        let first = ActionReport::build(&period);
        assert_eq!(first.content_hash.len(), 12);
        assert_eq!(first.content_hash, ActionReport::build(&period).content_hash);

        let mut changed = period.clone();
        changed.summary.total_employees += 1;
        assert_ne!(first.content_hash, ActionReport::build(&changed).content_hash);
    }
}

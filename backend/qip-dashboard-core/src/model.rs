// src/model.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CONDITION_COUNT: usize = 10;

/// Role classification deciding which eligibility conditions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum RoleTier {
    #[serde(rename = "TYPE-1")]
    Tier1,
    #[serde(rename = "TYPE-2")]
    Tier2,
    #[serde(rename = "TYPE-3")]
    Tier3,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl RoleTier {
    pub const ALL: [RoleTier; 3] = [RoleTier::Tier1, RoleTier::Tier2, RoleTier::Tier3];

    /// Accepts `TYPE-1`, `type-1`, `TYPE 1`, `1`, `Tier1` and the like.
    pub fn parse(raw: &str) -> Self {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.as_str() {
            "1" => RoleTier::Tier1,
            "2" => RoleTier::Tier2,
            "3" => RoleTier::Tier3,
            _ => RoleTier::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleTier::Tier1 => "TYPE-1",
            RoleTier::Tier2 => "TYPE-2",
            RoleTier::Tier3 => "TYPE-3",
            RoleTier::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RoleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionResult {
    #[serde(rename = "YES")]
    Pass,
    #[serde(rename = "NO")]
    Fail,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl ConditionResult {
    /// Stored labels: `YES`/`NO`/`N/A`, also `PASS`/`FAIL`, `TRUE`/`FALSE`, `NA`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "YES" | "Y" | "PASS" | "TRUE" | "O" => Some(ConditionResult::Pass),
            "NO" | "N" | "FAIL" | "FALSE" | "X" => Some(ConditionResult::Fail),
            "N/A" | "NA" | "-" => Some(ConditionResult::NotApplicable),
            _ => None,
        }
    }

    pub fn from_bool(passed: bool) -> Self {
        if passed {
            ConditionResult::Pass
        } else {
            ConditionResult::Fail
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionResult::Pass => "YES",
            ConditionResult::Fail => "NO",
            ConditionResult::NotApplicable => "N/A",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Attendance {
    pub rate: f64,
    pub total_days: f64,
    pub actual_days: f64,
    pub unapproved_absence: f64,
    pub approved_leave: f64,
    pub absence_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Aql {
    pub failures: u32,
    pub continuous_fail: bool,
    /// Raw upstream label such as `YES_3MONTHS`; empty when not failing.
    pub continuous_fail_label: String,
    pub area_reject_rate: f64,
    pub total_tests: f64,
    pub pass_count: f64,
    pub fail_percent: f64,
}

impl Aql {
    /// Length of the consecutive failure streak encoded in the label
    /// (`YES_3MONTHS` -> 3). A bare `YES` counts as the full window.
    pub fn continuous_fail_months(&self) -> Option<u32> {
        if !self.continuous_fail {
            return None;
        }
        let digits: String = self
            .continuous_fail_label
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        digits.parse::<u32>().ok().or(Some(3))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Prs {
    pub pass_rate: f64,
    pub inspection_qty: f64,
    pub total_qty: f64,
    pub total_pass: f64,
}

/// Canonical employee record, produced once by `normalize::normalize_employee`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Employee {
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

    pub attendance: Attendance,
    pub aql: Aql,
    pub prs: Prs,

    #[serde(with = "rust_decimal::serde::str")]
    pub current_incentive: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub previous_incentive: Decimal,
    pub continuous_months: u32,
    pub previous_continuous_months: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub next_month_expected: Decimal,
    pub talent_pool_member: bool,
    #[serde(with = "rust_decimal::serde::str")]
    pub talent_pool_bonus: Decimal,

    /// Stored results for conditions 1..=10; index 0 is condition 1.
    pub conditions: [Option<ConditionResult>; CONDITION_COUNT],
    pub condition_values: [Option<f64>; CONDITION_COUNT],
    pub condition_thresholds: [Option<f64>; CONDITION_COUNT],
}

impl Employee {
    pub fn is_resigned(&self) -> bool {
        !self.stop_working_date.trim().is_empty()
    }

    /// Building prefix used by the table filter, e.g. `A` for `A1`.
    pub fn building_prefix(&self) -> String {
        self.building
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase()
    }

    pub fn stored_condition(&self, n: usize) -> Option<ConditionResult> {
        if (1..=CONDITION_COUNT).contains(&n) {
            self.conditions[n - 1]
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_role_tier_spellings() {
        assert_eq!(RoleTier::parse("TYPE-1"), RoleTier::Tier1);
        assert_eq!(RoleTier::parse("type-2"), RoleTier::Tier2);
        assert_eq!(RoleTier::parse(" 3 "), RoleTier::Tier3);
        assert_eq!(RoleTier::parse("TYPE 1"), RoleTier::Tier1);
        assert_eq!(RoleTier::parse(""), RoleTier::Unknown);
        assert_eq!(RoleTier::parse("TYPE-12"), RoleTier::Unknown);
    }

    #[test]
    fn parses_condition_labels() {
        assert_eq!(ConditionResult::parse("yes"), Some(ConditionResult::Pass));
        assert_eq!(ConditionResult::parse("FAIL"), Some(ConditionResult::Fail));
        assert_eq!(ConditionResult::parse("n/a"), Some(ConditionResult::NotApplicable));
        assert_eq!(ConditionResult::parse("maybe"), None);
    }

    #[test]
    fn continuous_fail_months_from_label() {
        let mut aql = Aql {
            continuous_fail: true,
            continuous_fail_label: "YES_2MONTHS".to_string(),
            ..Aql::default()
        };
        assert_eq!(aql.continuous_fail_months(), Some(2));
        aql.continuous_fail_label = "YES".to_string();
        assert_eq!(aql.continuous_fail_months(), Some(3));
        aql.continuous_fail = false;
        assert_eq!(aql.continuous_fail_months(), None);
    }

    #[test]
    fn building_prefix_strips_digits() {
        let employee = Employee {
            building: "b2".to_string(),
            ..Employee::default()
        };
        assert_eq!(employee.building_prefix(), "B");
    }
}

// src/views/table.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::derive::{condition_summary, has_received_incentive};
use crate::model::Employee;
use crate::thresholds::Thresholds;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 500;
pub const PAGE_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    EmpNo,
    FullName,
    Position,
    Building,
    RoleTier,
    AttendanceRate,
    CurrentIncentive,
    PreviousIncentive,
    ContinuousMonths,
    ConditionsPassed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortColumn {
    /// Query-string value, matching the serde name.
    pub fn as_str(self) -> &'static str {
        match self {
            SortColumn::EmpNo => "emp_no",
            SortColumn::FullName => "full_name",
            SortColumn::Position => "position",
            SortColumn::Building => "building",
            SortColumn::RoleTier => "role_tier",
            SortColumn::AttendanceRate => "attendance_rate",
            SortColumn::CurrentIncentive => "current_incentive",
            SortColumn::PreviousIncentive => "previous_incentive",
            SortColumn::ContinuousMonths => "continuous_months",
            SortColumn::ConditionsPassed => "conditions_passed",
        }
    }
}

impl SortDir {
    pub fn toggled(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }
}

// HTML selects submit `received=` for "any".
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Query-string parameters of the employee table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableQuery {
    pub search: Option<String>,
    pub position: Option<String>,
    #[serde(alias = "building")]
    pub building_prefix: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub received: Option<bool>,
    pub sort: Option<SortColumn>,
    pub dir: Option<SortDir>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub emp_no: String,
    pub full_name: String,
    pub position: String,
    pub building: String,
    pub role_tier: String,
    pub attendance_rate: f64,
    #[serde(with = "rust_decimal::serde::str")]
    pub current_incentive: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub previous_incentive: Decimal,
    pub continuous_months: u32,
    pub conditions_passed: usize,
    pub conditions_applicable: usize,
    pub received: bool,
}

impl TableRow {
    pub fn from_employee(employee: &Employee, thresholds: &Thresholds) -> Self {
        let (passed, applicable) = condition_summary(employee, thresholds);
        Self {
            emp_no: employee.emp_no.clone(),
            full_name: employee.full_name.clone(),
            position: employee.position.clone(),
            building: employee.building.clone(),
            role_tier: employee.role_tier.to_string(),
            attendance_rate: employee.attendance.rate,
            current_incentive: employee.current_incentive,
            previous_incentive: employee.previous_incentive,
            continuous_months: employee.continuous_months,
            conditions_passed: passed,
            conditions_applicable: applicable,
            received: has_received_incentive(employee),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePage {
    pub rows: Vec<TableRow>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub filtered_count: usize,
    pub total_count: usize,
    pub page_numbers: Vec<usize>,
    pub sort: SortColumn,
    pub dir: SortDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub page: usize,
    pub total_pages: usize,
    pub start: usize,
    pub end: usize,
}

/// 1-based page arithmetic. Page 0 becomes 1, pages past the end clamp to the
/// last page and an empty list still has one (empty) page.
pub fn paginate(count: usize, page: usize, page_size: usize) -> PageBounds {
    let page_size = page_size.max(1);
    let total_pages = count.div_ceil(page_size).max(1);
    let page = page.clamp(1, total_pages);
    let start = ((page - 1) * page_size).min(count);
    let end = (start + page_size).min(count);
    PageBounds {
        page,
        total_pages,
        start,
        end,
    }
}

/// At most `width` page numbers around `current`, shifted to stay in range.
pub fn page_window(current: usize, total_pages: usize, width: usize) -> Vec<usize> {
    if total_pages == 0 || width == 0 {
        return Vec::new();
    }
    let current = current.clamp(1, total_pages);
    let mut start = current.saturating_sub(width / 2).max(1);
    let end = (start + width - 1).min(total_pages);
    start = end.saturating_sub(width - 1).max(1);
    (start..=end).collect()
}

/// Case-insensitive comparison where digit runs compare by value, so `A2`
/// sorts before `A10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().flat_map(char::to_lowercase).peekable();
    let mut right = b.chars().flat_map(char::to_lowercase).peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let mut l_digits = String::new();
                while let Some(c) = left.peek().copied().filter(char::is_ascii_digit) {
                    l_digits.push(c);
                    left.next();
                }
                let mut r_digits = String::new();
                while let Some(c) = right.peek().copied().filter(char::is_ascii_digit) {
                    r_digits.push(c);
                    right.next();
                }
                let l_trimmed = l_digits.trim_start_matches('0');
                let r_trimmed = r_digits.trim_start_matches('0');
                let ordering = l_trimmed
                    .len()
                    .cmp(&r_trimmed.len())
                    .then_with(|| l_trimmed.cmp(r_trimmed));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn compare_rows(a: &TableRow, b: &TableRow, column: SortColumn) -> Ordering {
    match column {
        SortColumn::EmpNo => natural_cmp(&a.emp_no, &b.emp_no),
        SortColumn::FullName => natural_cmp(&a.full_name, &b.full_name),
        SortColumn::Position => natural_cmp(&a.position, &b.position),
        SortColumn::Building => natural_cmp(&a.building, &b.building),
        SortColumn::RoleTier => natural_cmp(&a.role_tier, &b.role_tier),
        SortColumn::AttendanceRate => a.attendance_rate.total_cmp(&b.attendance_rate),
        SortColumn::CurrentIncentive => a.current_incentive.cmp(&b.current_incentive),
        SortColumn::PreviousIncentive => a.previous_incentive.cmp(&b.previous_incentive),
        SortColumn::ContinuousMonths => a.continuous_months.cmp(&b.continuous_months),
        SortColumn::ConditionsPassed => a.conditions_passed.cmp(&b.conditions_passed),
    }
}

fn matches_query(employee: &Employee, query: &TableQuery) -> bool {
    if let Some(needle) = non_empty(&query.search) {
        let needle = needle.to_lowercase();
        let hit = employee.emp_no.to_lowercase().contains(&needle)
            || employee.full_name.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }
    if let Some(position) = non_empty(&query.position) {
        if employee.position != position {
            return false;
        }
    }
    if let Some(prefix) = non_empty(&query.building_prefix) {
        if !employee
            .building
            .to_ascii_uppercase()
            .starts_with(&prefix.to_ascii_uppercase())
        {
            return false;
        }
    }
    if let Some(received) = query.received {
        if has_received_incentive(employee) != received {
            return false;
        }
    }
    true
}

/// Filtered and sorted rows across all pages.
pub fn filtered_rows(
    employees: &[Employee],
    thresholds: &Thresholds,
    query: &TableQuery,
) -> Vec<TableRow> {
    let mut rows: Vec<TableRow> = employees
        .iter()
        .filter(|employee| matches_query(employee, query))
        .map(|employee| TableRow::from_employee(employee, thresholds))
        .collect();

    let column = query.sort.unwrap_or_default();
    let dir = query.dir.unwrap_or_default();
    // `sort_by` is stable, so ties keep input order in both directions.
    rows.sort_by(|a, b| {
        let ordering = compare_rows(a, b, column);
        match dir {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    });
    rows
}

#[cfg(test)]
pub fn build_page(employees: &[Employee], thresholds: &Thresholds, query: &TableQuery) -> TablePage {
    build_page_with_size(employees, thresholds, query, DEFAULT_PAGE_SIZE)
}

pub fn build_page_with_size(
    employees: &[Employee],
    thresholds: &Thresholds,
    query: &TableQuery,
    default_page_size: usize,
) -> TablePage {
    let rows = filtered_rows(employees, thresholds, query);
    let page_size = query
        .page_size
        .filter(|size| *size > 0)
        .unwrap_or(default_page_size)
        .clamp(1, MAX_PAGE_SIZE);
    let bounds = paginate(rows.len(), query.page.unwrap_or(1), page_size);
    let filtered_count = rows.len();

    TablePage {
        rows: rows[bounds.start..bounds.end].to_vec(),
        page: bounds.page,
        page_size,
        total_pages: bounds.total_pages,
        filtered_count,
        total_count: employees.len(),
        page_numbers: page_window(bounds.page, bounds.total_pages, PAGE_WINDOW),
        sort: query.sort.unwrap_or_default(),
        dir: query.dir.unwrap_or_default(),
    }
}

/// CSV of every filtered row, in table order.
pub fn export_csv(
    employees: &[Employee],
    thresholds: &Thresholds,
    query: &TableQuery,
) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in filtered_rows(employees, thresholds, query) {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropdownOptions {
    pub positions: Vec<String>,
    pub building_prefixes: Vec<String>,
}

pub fn dropdown_options(employees: &[Employee]) -> DropdownOptions {
    let mut positions: Vec<String> = employees
        .iter()
        .map(|e| e.position.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    positions.sort_by(|a, b| natural_cmp(a, b));

    let building_prefixes = employees
        .iter()
        .map(Employee::building_prefix)
        .filter(|p| !p.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    DropdownOptions {
        positions,
        building_prefixes,
    }
}

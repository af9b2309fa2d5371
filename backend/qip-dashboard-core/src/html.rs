// src/html.rs
//
// Server-rendered pages. The JSON API carries the full data.

use std::fmt::Write;
use url::form_urlencoded;

use crate::admin::Recipient;
use crate::loader::LoadedPeriod;
use crate::period::Period;
use crate::session::Session;
use crate::thresholds::{FormErrors, Thresholds};
use crate::views::format_vnd;
use crate::views::kpi::KpiCards;
use crate::views::table::{
    dropdown_options, non_empty, SortColumn, SortDir, TablePage, TableQuery,
};

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    )
}

pub fn login_page(error: Option<&str>) -> String {
    let notice = error
        .map(|message| format!("<p class=\"error\">{}</p>", escape(message)))
        .unwrap_or_default();
    let body = format!(
        r#"<h1>QIP Incentive Dashboard</h1>
{}
<form method="post" action="/login">
  <label>Email <input type="email" name="email" required></label>
  <label>Password <input type="password" name="password" required></label>
  <button type="submit">Sign in</button>
</form>"#,
        notice
    );
    page("Sign in", &body)
}

fn header(session: &Session) -> String {
    let admin_link = if session.is_admin {
        "<a href=\"/admin\">Admin</a> "
    } else {
        ""
    };
    format!(
        "<header>{} {}<form method=\"post\" action=\"/logout\" style=\"display:inline\"><button>Sign out</button></form></header>",
        escape(&session.email),
        admin_link
    )
}

// Months offered by the period selector, newest first.
const PERIOD_CHOICES: usize = 12;

const TABLE_COLUMNS: [(SortColumn, &str); 7] = [
    (SortColumn::EmpNo, "ID"),
    (SortColumn::FullName, "Name"),
    (SortColumn::Position, "Position"),
    (SortColumn::Building, "Building"),
    (SortColumn::RoleTier, "Type"),
    (SortColumn::CurrentIncentive, "Incentive"),
    (SortColumn::ConditionsPassed, "Conditions"),
];

fn append_table_state(
    params: &mut form_urlencoded::Serializer<'_, String>,
    query: &TableQuery,
    sort: SortColumn,
    dir: SortDir,
) {
    if let Some(search) = non_empty(&query.search) {
        params.append_pair("search", search);
    }
    if let Some(position) = non_empty(&query.position) {
        params.append_pair("position", position);
    }
    if let Some(building) = non_empty(&query.building_prefix) {
        params.append_pair("building", building);
    }
    if let Some(received) = query.received {
        params.append_pair("received", if received { "true" } else { "false" });
    }
    params.append_pair("sort", sort.as_str());
    params.append_pair("dir", dir.as_str());
    if let Some(size) = query.page_size {
        params.append_pair("page_size", &size.to_string());
    }
}

/// Dashboard URL for `period` that keeps the active search, filters and sort.
pub fn dashboard_href(
    period: Period,
    query: &TableQuery,
    sort: SortColumn,
    dir: SortDir,
    page: usize,
) -> String {
    let mut params = form_urlencoded::Serializer::new(String::new());
    params.append_pair("period", &period.to_string());
    append_table_state(&mut params, query, sort, dir);
    if page > 1 {
        params.append_pair("page", &page.to_string());
    }
    format!("/?{}", params.finish())
}

fn csv_href(period: Period, query: &TableQuery, sort: SortColumn, dir: SortDir) -> String {
    let mut params = form_urlencoded::Serializer::new(String::new());
    append_table_state(&mut params, query, sort, dir);
    format!("/api/periods/{}/employees.csv?{}", period, params.finish())
}

fn options(values: &[String], selected: Option<&str>, any_label: &str) -> String {
    let mut out = format!("<option value=\"\">{}</option>", escape(any_label));
    for value in values {
        let mark = if Some(value.as_str()) == selected { " selected" } else { "" };
        let _ = write!(
            out,
            "<option value=\"{}\"{}>{}</option>",
            escape(value),
            mark,
            escape(value)
        );
    }
    out
}

fn period_nav(current: Period, latest: Period, query: &TableQuery, table: &TablePage) -> String {
    let previous = current.previous();
    let mut nav = format!(
        "<nav class=\"periods\"><a rel=\"prev\" href=\"{}\">&laquo; {}</a> ",
        escape(&dashboard_href(previous, query, table.sort, table.dir, 1)),
        escape(&previous.label())
    );

    let mut choices = Vec::with_capacity(PERIOD_CHOICES + 1);
    let mut choice = latest;
    for _ in 0..PERIOD_CHOICES {
        choices.push(choice);
        choice = choice.previous();
    }
    if !choices.contains(&current) {
        choices.push(current);
    }
    nav.push_str("<form method=\"get\" action=\"/\" style=\"display:inline\"><select name=\"period\">");
    for choice in choices {
        let mark = if choice == current { " selected" } else { "" };
        let _ = write!(
            nav,
            "<option value=\"{}\"{}>{}</option>",
            choice,
            mark,
            escape(&choice.label())
        );
    }
    nav.push_str("</select><button type=\"submit\">Go</button></form>");

    if current < latest {
        let next = current.next();
        let _ = write!(
            nav,
            " <a rel=\"next\" href=\"{}\">{} &raquo;</a>",
            escape(&dashboard_href(next, query, table.sort, table.dir, 1)),
            escape(&next.label())
        );
    }
    nav.push_str("</nav>");
    nav
}

fn filter_form(period: Period, query: &TableQuery, table: &TablePage, loaded: &LoadedPeriod) -> String {
    let dropdowns = dropdown_options(&loaded.employees);
    let received = match query.received {
        Some(true) => ["", " selected", ""],
        Some(false) => ["", "", " selected"],
        None => [" selected", "", ""],
    };
    let page_size = query
        .page_size
        .map(|size| format!("<input type=\"hidden\" name=\"page_size\" value=\"{}\">", size))
        .unwrap_or_default();
    format!(
        r#"<form class="filters" method="get" action="/">
  <input type="hidden" name="period" value="{}">
  <input type="hidden" name="sort" value="{}">
  <input type="hidden" name="dir" value="{}">{}
  <input type="search" name="search" placeholder="ID or name" value="{}">
  <select name="position">{}</select>
  <select name="building">{}</select>
  <select name="received"><option value=""{}>Any</option><option value="true"{}>Received</option><option value="false"{}>Not received</option></select>
  <button type="submit">Filter</button>
  <a href="{}">CSV</a>
</form>"#,
        period,
        table.sort.as_str(),
        table.dir.as_str(),
        page_size,
        escape(non_empty(&query.search).unwrap_or_default()),
        options(&dropdowns.positions, non_empty(&query.position), "All positions"),
        options(
            &dropdowns.building_prefixes,
            non_empty(&query.building_prefix),
            "All buildings"
        ),
        received[0],
        received[1],
        received[2],
        escape(&csv_href(period, query, table.sort, table.dir))
    )
}

/// `latest` is the newest period the selector offers.
pub fn dashboard_page(
    session: &Session,
    loaded: &LoadedPeriod,
    kpis: &KpiCards,
    table: &TablePage,
    query: &TableQuery,
    latest: Period,
) -> String {
    let period = loaded.period;
    let mut body = header(session);
    let _ = write!(body, "<h1>QIP Incentive {}</h1>", escape(&period.label()));
    body.push_str(&period_nav(period, latest, query, table));

    for banner in &loaded.banners {
        let _ = write!(
            body,
            "<div class=\"banner\" data-source=\"{}\">{}</div>",
            escape(&banner.source),
            escape(&banner.message)
        );
    }

    body.push_str("<section class=\"kpis\">");
    for card in &kpis.cards {
        let delta = card
            .delta
            .as_deref()
            .map(|d| format!(" <small>{}</small>", escape(d)))
            .unwrap_or_default();
        let _ = write!(
            body,
            "<div class=\"kpi\" id=\"{}\"><span>{}</span> <strong>{}</strong>{}</div>",
            card.id,
            escape(card.label),
            escape(&card.value),
            delta
        );
    }
    body.push_str("</section>");
    body.push_str(&filter_form(period, query, table, loaded));

    body.push_str("<table><thead><tr>");
    for (column, title) in TABLE_COLUMNS {
        let (dir, marker) = if column == table.sort {
            let marker = match table.dir {
                SortDir::Asc => " &#9650;",
                SortDir::Desc => " &#9660;",
            };
            (table.dir.toggled(), marker)
        } else {
            (SortDir::Asc, "")
        };
        let _ = write!(
            body,
            "<th><a href=\"{}\">{}</a>{}</th>",
            escape(&dashboard_href(period, query, column, dir, 1)),
            title,
            marker
        );
    }
    body.push_str("</tr></thead><tbody>");
    for row in &table.rows {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td></tr>",
            escape(&row.emp_no),
            escape(&row.full_name),
            escape(&row.position),
            escape(&row.building),
            escape(&row.role_tier),
            format_vnd(row.current_incentive),
            row.conditions_passed,
            row.conditions_applicable
        );
    }
    body.push_str("</tbody></table><nav class=\"pages\">");
    for number in &table.page_numbers {
        if *number == table.page {
            let _ = write!(body, "<strong>{}</strong> ", number);
        } else {
            let _ = write!(
                body,
                "<a href=\"{}\">{}</a> ",
                escape(&dashboard_href(period, query, table.sort, table.dir, *number)),
                number
            );
        }
    }
    let _ = write!(
        body,
        "</nav><p>{} of {} employees</p>",
        table.filtered_count, table.total_count
    );

    page("QIP Incentive Dashboard", &body)
}

/// `saved` is the changed-field count after a successful form post.
pub fn admin_page(
    session: &Session,
    period: Period,
    thresholds: &Thresholds,
    recipients: &[Recipient],
    saved: Option<usize>,
    errors: Option<&FormErrors>,
) -> String {
    let mut body = header(session);
    let _ = write!(
        body,
        "<h1>Thresholds for {}</h1><nav class=\"periods\"><a rel=\"prev\" href=\"/admin?period={}\">&laquo; {}</a> <a rel=\"next\" href=\"/admin?period={}\">{} &raquo;</a></nav>",
        escape(&period.label()),
        period.previous(),
        escape(&period.previous().label()),
        period.next(),
        escape(&period.next().label())
    );
    if let Some(count) = saved {
        let _ = write!(
            body,
            "<p class=\"notice\">Saved, {} field(s) changed.</p>",
            count
        );
    }
    if let Some(errors) = errors {
        body.push_str("<ul class=\"errors\">");
        for error in &errors.errors {
            let _ = write!(
                body,
                "<li>{}: {}</li>",
                escape(&error.field),
                escape(&error.message)
            );
        }
        body.push_str("</ul>");
    }

    let _ = write!(
        body,
        "<form id=\"thresholds\" method=\"post\" action=\"/admin/thresholds?period={}\" data-period=\"{}\">",
        period, period
    );
    let fields = [
        ("attendance_rate", thresholds.attendance_rate),
        ("unapproved_absence", thresholds.unapproved_absence),
        ("minimum_working_days", thresholds.minimum_working_days),
        ("area_reject_rate", thresholds.area_reject_rate),
        ("5prs_pass_rate", thresholds.prs_pass_rate),
        ("5prs_min_qty", thresholds.prs_min_qty),
    ];
    for (name, value) in fields {
        let _ = write!(
            body,
            "<label>{} <input type=\"number\" step=\"any\" name=\"{}\" value=\"{}\"></label>",
            name, name, value
        );
    }
    let _ = write!(
        body,
        "<label>consecutive_aql_months <input type=\"number\" min=\"1\" max=\"12\" name=\"consecutive_aql_months\" value=\"{}\"></label>",
        thresholds.consecutive_aql_months
    );
    let working_days = thresholds
        .working_days
        .map(|d| d.to_string())
        .unwrap_or_default();
    let _ = write!(
        body,
        "<label>working_days <input type=\"number\" min=\"1\" max=\"31\" name=\"working_days\" value=\"{}\"></label>",
        working_days
    );
    body.push_str("<ol class=\"progression\">");
    for amount in &thresholds.progression_table {
        let _ = write!(
            body,
            "<li><input type=\"number\" step=\"any\" min=\"0\" name=\"progression_table\" value=\"{}\"> <small>{}</small></li>",
            amount,
            format_vnd(*amount)
        );
    }
    body.push_str("</ol><button type=\"submit\">Save thresholds</button></form><h2>Report recipients</h2><ul>");
    for recipient in recipients {
        let _ = write!(
            body,
            "<li>{} &lt;{}&gt; [{}]</li>",
            escape(&recipient.name),
            escape(&recipient.email),
            escape(&recipient.lang)
        );
    }
    body.push_str("</ul>");
    page("QIP Admin", &body)
}

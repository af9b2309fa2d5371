// src/main.rs
//
// Smoke test against a running qip-dashboard-core server:
//   QIP_CLIENT_BASE_URL=http://127.0.0.1:8080 \
//   QIP_CLIENT_EMAIL=admin@example.com QIP_CLIENT_PASSWORD=secret \
//   cargo run -p qip-dashboard-test-client -- february_2026

use reqwest::{redirect, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::error::Error;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct TablePage {
    rows: Vec<Value>,
    page: usize,
    total_pages: usize,
    filtered_count: usize,
    total_count: usize,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url = env_or("QIP_CLIENT_BASE_URL", "http://127.0.0.1:8080");
    let email = env_or("QIP_CLIENT_EMAIL", "admin@example.com");
    let password = env_or("QIP_CLIENT_PASSWORD", "secret");
    let period = env::args().nth(1).unwrap_or_else(|| "february_2026".to_string());

    let client = Client::builder()
        .cookie_store(true)
        .redirect(redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .build()?;

    // Test 1: Health check
    println!("\n🔍 Testing health check endpoint...");
    let health = client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .json::<HealthResponse>()
        .await?;
    println!("Health check response: {:?}", health);

    // Test 2: Protected API without a session
    println!("\n🔍 Testing dashboard API without a session...");
    let anonymous = client
        .get(format!("{}/api/periods/{}/dashboard", base_url, period))
        .send()
        .await?;
    println!("Anonymous status: {} (expected 401)", anonymous.status());

    // Test 3: Sign in
    println!("\n🔍 Signing in as {}...", email);
    let login = client
        .post(format!("{}/login", base_url))
        .form(&[("email", email.as_str()), ("password", password.as_str())])
        .send()
        .await?;
    if login.status() != StatusCode::SEE_OTHER {
        println!("❌ Sign-in failed with status {}", login.status());
        return Ok(());
    }
    println!("✅ Signed in");

    // Test 4: Dashboard data
    println!("\n🔍 Fetching dashboard for {}...", period);
    let dashboard = client
        .get(format!("{}/api/periods/{}/dashboard", base_url, period))
        .send()
        .await?
        .json::<Value>()
        .await?;
    for card in dashboard["kpis"]["cards"].as_array().into_iter().flatten() {
        println!("  {}: {}", card["label"], card["value"]);
    }
    for banner in dashboard["banners"].as_array().into_iter().flatten() {
        println!("  ⚠️  {}", banner["message"]);
    }

    // Test 5: First table page
    println!("\n🔍 Fetching the employee table...");
    let table = client
        .get(format!(
            "{}/api/periods/{}/employees?sort=current_incentive&dir=desc&page_size=5",
            base_url, period
        ))
        .send()
        .await?
        .json::<TablePage>()
        .await?;
    println!(
        "Page {}/{}: {} rows shown, {} of {} employees match",
        table.page,
        table.total_pages,
        table.rows.len(),
        table.filtered_count,
        table.total_count
    );

    // Test 6: Action report
    println!("\n🔍 Fetching the action report...");
    let report = client
        .get(format!("{}/api/periods/{}/report", base_url, period))
        .send()
        .await?;
    println!("Report status: {}", report.status());
    if report.status().is_success() {
        let report = report.json::<Value>().await?;
        println!("Report hash: {}", report["content_hash"]);
    }

    println!("\n✅ Smoke test finished");
    Ok(())
}

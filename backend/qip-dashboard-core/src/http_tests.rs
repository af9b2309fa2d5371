// src/http_tests.rs

#[cfg(test)]
mod tests {
    use crate::clock::{Clock, ManualClock};
    use crate::http::*;
    use crate::identity::StaticIdentity;
    use crate::loader::DashboardLoader;
    use crate::pipeline::RecordingTrigger;
    use crate::session::SessionStore;
    use crate::store::{MemoryStore, SYSTEM_CONFIG_PATH};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const ADMIN: &str = "admin@example.com";
    const VIEWER: &str = "viewer@example.com";
    const PASSWORD: &str = "pw";

    struct Harness {
        app: Router,
        trigger: RecordingTrigger,
        store: MemoryStore,
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(SYSTEM_CONFIG_PATH, json!({ "admin_emails": [ADMIN] }));
        store.insert(
            "employees/february_2026/all_data/data",
            json!({
                "employees": [
                    {
                        "emp_no": "620030001",
                        "full_name": "NGUYEN VAN A",
                        "building": "B1",
                        "position": "ASSEMBLY INSPECTOR",
                        "type": "TYPE-1",
                        "current_incentive": 250000
                    },
                    {
                        "emp_no": "620030002",
                        "full_name": "TRAN THI B",
                        "building": "C2",
                        "position": "AUDIT & TRAINING",
                        "type": "TYPE-2",
                        "current_incentive": 0
                    }
                ]
            }),
        );
        store
    }

    fn harness() -> Harness {
        let store = seeded_store();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new("2026-02-20 10:00:00"));
        let identity = StaticIdentity::new(3600)
            .with_account(ADMIN, PASSWORD)
            .with_account(VIEWER, PASSWORD);
        let trigger = RecordingTrigger::new(clock.clone());
        let state = AppState {
            sessions: Arc::new(SessionStore::new(
                Arc::new(identity),
                Arc::new(store.clone()),
                clock.clone(),
                3600,
                300,
                false,
            )),
            loader: Arc::new(DashboardLoader::new(
                Arc::new(store.clone()),
                clock.clone(),
                300,
                16,
            )),
            pipeline: Arc::new(trigger.clone()),
            clock,
            page_size: 20,
        };
        Harness {
            app: router(state),
            trigger,
            store,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, cookie: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn form_request(uri: &str, cookie: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn login(app: &Router, email: &str) -> String {
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("email={}&password={}", email, PASSWORD)))
            .unwrap();
        let (status, headers, _) = send(app, request).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let set_cookie = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    fn as_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = harness();
        let (status, _, body) = send(&h.app, get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body)["status"], "ok");
    }

    #[tokio::test]
    async fn anonymous_callers_are_turned_away() {
        let h = harness();
        let (status, _, body) =
            send(&h.app, get("/api/periods/february_2026/dashboard", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(as_json(&body)["error"].is_string());

        let (status, headers, _) = send(&h.app, get("/", None)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers.get(header::LOCATION).unwrap(), "/login");
    }

    #[tokio::test]
    async fn wrong_password_shows_login_again() {
        let h = harness();
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("email=viewer%40example.com&password=nope"))
            .unwrap();
        let (status, headers, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert!(String::from_utf8(body).unwrap().contains("incorrect"));
    }

    #[tokio::test]
    async fn signed_in_viewer_sees_dashboard() {
        let h = harness();
        let cookie = login(&h.app, VIEWER).await;

        let (status, _, body) = send(
            &h.app,
            get("/api/periods/2026-02/dashboard", Some(&cookie)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let dashboard = as_json(&body);
        assert_eq!(dashboard["kpis"]["total_employees"], 2);
        assert_eq!(dashboard["charts"].as_array().unwrap().len(), 5);
        assert!(dashboard["banners"].as_array().unwrap().is_empty());

        let (status, _, body) = send(&h.app, get("/?period=february_2026", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("NGUYEN VAN A"));
        assert!(!page.contains("href=\"/admin\""));
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let h = harness();
        let cookie = login(&h.app, VIEWER).await;
        let request = Request::builder()
            .method("POST")
            .uri("/logout")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let (status, _, _) =
            send(&h.app, get("/api/periods/february_2026/report", Some(&cookie))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_period_is_a_bad_request() {
        let h = harness();
        let cookie = login(&h.app, VIEWER).await;
        let (status, _, _) =
            send(&h.app, get("/api/periods/smarch_2026/dashboard", Some(&cookie))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn table_pages_and_filters() {
        let h = harness();
        let cookie = login(&h.app, VIEWER).await;

        let (status, _, body) = send(
            &h.app,
            get(
                "/api/periods/february_2026/employees?page_size=1&sort=full_name&dir=desc",
                Some(&cookie),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page = as_json(&body);
        assert_eq!(page["total_count"], 2);
        assert_eq!(page["total_pages"], 2);
        assert_eq!(page["rows"][0]["full_name"], "TRAN THI B");

        let (_, _, body) = send(
            &h.app,
            get("/api/periods/february_2026/employees?received=true", Some(&cookie)),
        )
        .await;
        let page = as_json(&body);
        assert_eq!(page["filtered_count"], 1);
        assert_eq!(page["rows"][0]["emp_no"], "620030001");
    }

    #[tokio::test]
    async fn csv_export_is_an_attachment() {
        let h = harness();
        let cookie = login(&h.app, VIEWER).await;
        let (status, headers, body) = send(
            &h.app,
            get("/api/periods/february_2026/employees.csv?building=C", Some(&cookie)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
        assert!(headers
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("qip_february_2026.csv"));
        let csv = String::from_utf8(body).unwrap();
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains("620030002"));
    }

    #[tokio::test]
    async fn employee_detail_and_missing_employee() {
        let h = harness();
        let cookie = login(&h.app, VIEWER).await;
        let (status, _, body) = send(
            &h.app,
            get("/api/periods/february_2026/employees/620030001", Some(&cookie)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body)["profile"]["emp_no"], "620030001");

        let (status, _, _) = send(
            &h.app,
            get("/api/periods/february_2026/employees/999", Some(&cookie)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn viewers_cannot_edit_thresholds() {
        let h = harness();
        let cookie = login(&h.app, VIEWER).await;
        let (status, _, _) = send(
            &h.app,
            json_request(
                "PUT",
                "/api/periods/february_2026/thresholds",
                &cookie,
                json!({ "attendance_rate": 90.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_threshold_edits_are_validated_and_logged() {
        let h = harness();
        let cookie = login(&h.app, ADMIN).await;

        let (status, _, body) = send(
            &h.app,
            json_request(
                "PUT",
                "/api/periods/february_2026/thresholds",
                &cookie,
                json!({ "attendance_rate": 150.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(as_json(&body)["errors"][0]["field"], "attendance_rate");

        let (status, _, body) = send(
            &h.app,
            json_request(
                "PUT",
                "/api/periods/february_2026/thresholds",
                &cookie,
                json!({ "attendance_rate": 90.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let saved = as_json(&body);
        assert_eq!(saved["thresholds"]["attendance_rate"], 90.0);
        assert_eq!(saved["changes"].as_array().unwrap().len(), 1);
        assert!(h.store.document("thresholds/february_2026").is_some());

        let (status, _, body) = send(
            &h.app,
            get("/api/periods/february_2026/thresholds", Some(&cookie)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body)["thresholds"]["attendance_rate"], 90.0);
    }

    #[tokio::test]
    async fn admin_manages_recipients() {
        let h = harness();
        let cookie = login(&h.app, ADMIN).await;

        let (status, _, body) = send(
            &h.app,
            json_request(
                "POST",
                "/api/admin/recipients",
                &cookie,
                json!({ "email": "qa.lead@example.com", "lang": "en" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body)["recipients"][0]["name"], "qa.lead");

        let (status, _, _) = send(
            &h.app,
            json_request(
                "POST",
                "/api/admin/recipients",
                &cookie,
                json!({ "email": "not-an-address" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/admin/recipients/QA.LEAD@example.com")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(as_json(&body)["recipients"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn admin_triggers_pipeline() {
        let h = harness();
        let cookie = login(&h.app, ADMIN).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/periods/february_2026/pipeline")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(as_json(&body)["requested_by"], ADMIN);
        assert_eq!(h.trigger.dispatched().len(), 1);

        let (status, _, body) = send(&h.app, get("/admin", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("Thresholds for"));
    }

    #[tokio::test]
    async fn dashboard_page_links_keep_filters_and_sort() {
        let h = harness();
        let cookie = login(&h.app, VIEWER).await;
        let (status, _, body) = send(
            &h.app,
            get(
                "/?period=february_2026&search=&received=&sort=full_name&dir=desc&page_size=1",
                Some(&cookie),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("TRAN THI B"));
        assert!(!page.contains("NGUYEN VAN A"));
        assert!(page.contains(
            "href=\"/?period=february_2026&amp;sort=full_name&amp;dir=desc&amp;page_size=1&amp;page=2\""
        ));
        assert!(page.contains("rel=\"prev\" href=\"/?period=january_2026"));

        let (status, _, body) = send(
            &h.app,
            get("/?period=february_2026&building=C&received=false", Some(&cookie)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("1 of 2 employees"));
        assert!(page.contains("<option value=\"false\" selected>"));
    }

    #[tokio::test]
    async fn admin_form_saves_thresholds() {
        let h = harness();
        let cookie = login(&h.app, ADMIN).await;
        let (status, headers, _) = send(
            &h.app,
            form_request(
                "/admin/thresholds?period=february_2026",
                &cookie,
                "attendance_rate=91&unapproved_absence=&working_days=",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let location = headers.get(header::LOCATION).unwrap().to_str().unwrap().to_string();
        assert_eq!(location, "/admin?period=february_2026&saved=1");
        let saved = h.store.document("thresholds/february_2026").unwrap();
        assert_eq!(saved["attendance_rate"], json!(91.0));
        assert_eq!(saved["updated_by"], ADMIN);
        assert_eq!(h.store.documents_in("threshold_changes").len(), 1);

        let (status, _, body) = send(&h.app, get(&location, Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("Saved, 1 field(s) changed."));
        assert!(page.contains("name=\"attendance_rate\" value=\"91\""));
    }

    #[tokio::test]
    async fn admin_form_errors_re_render_the_page() {
        let h = harness();
        let cookie = login(&h.app, ADMIN).await;
        let (status, _, body) = send(
            &h.app,
            form_request(
                "/admin/thresholds?period=february_2026",
                &cookie,
                "attendance_rate=150&5prs_min_qty=lots",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("<li>5prs_min_qty: &#39;lots&#39; is not a number</li>"));
        assert!(page.contains("id=\"thresholds\""));
        assert!(h.store.document("thresholds/february_2026").is_none());

        let (status, _, body) = send(
            &h.app,
            form_request("/admin/thresholds?period=february_2026", &cookie, "attendance_rate=150"),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(String::from_utf8(body).unwrap().contains("<li>attendance_rate: must be between"));
    }

    #[tokio::test]
    async fn viewer_form_post_is_sent_to_login() {
        let h = harness();
        let cookie = login(&h.app, VIEWER).await;
        let (status, headers, _) = send(
            &h.app,
            form_request("/admin/thresholds?period=february_2026", &cookie, "attendance_rate=91"),
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers.get(header::LOCATION).unwrap(), "/login");
        assert!(h.store.document("thresholds/february_2026").is_none());
    }
}

// src/web/routes.rs
use crate::{
    state::AppState,
    web::{admin_handlers, auth_handlers, merit_handlers, mw_admin, mw_auth, user_handlers},
};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn create_router(app_state: AppState) -> Router {
    // --- Public ---
    let public_routes = Router::new()
        .route("/", get(|| async { axum::response::Redirect::to("/login") }))
        .route("/login", get(auth_handlers::show_login_form).post(auth_handlers::handle_login))
        .route("/logout", get(auth_handlers::handle_logout))
        .route("/signup", post(auth_handlers::handle_signup))
        .route("/health", get(auth_handlers::health));

    // --- Admin, nested under /api/admin ---
    let admin_routes = Router::new()
        .route("/teachers", get(admin_handlers::list_teachers).post(admin_handlers::create_teacher))
        .route("/teachers/{id}/status", post(admin_handlers::set_teacher_status))
        .route("/accounts/{id}/password", post(admin_handlers::reset_password))
        .route("/accounts/{id}", delete(admin_handlers::delete_account))
        .route("/classes", get(admin_handlers::list_classes).post(admin_handlers::create_class))
        .route("/classes/{id}", put(admin_handlers::update_class).delete(admin_handlers::delete_class))
        .route(
            "/students/import",
            post(admin_handlers::import_students).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/students/export.xlsx", get(admin_handlers::export_students))
        .route("/records/export.xlsx", get(admin_handlers::export_records))
        .route("/records/{id}", delete(admin_handlers::delete_record))
        .route("/reasons", post(admin_handlers::create_reason))
        .route("/reasons/{id}", delete(admin_handlers::delete_reason))
        .route("/logs", get(admin_handlers::list_logs))
        .route("/reset/initiate", post(admin_handlers::initiate_reset))
        .route("/reset/status", get(admin_handlers::reset_status))
        .route("/reset/execute", post(admin_handlers::execute_reset))
        .route("/inquiries/{id}/answer", post(admin_handlers::answer_inquiry))
        .route("/reports/test", post(admin_handlers::send_test_report))
        .route("/reports/run", post(admin_handlers::run_daily_reports))
        .route_layer(middleware::from_fn(mw_admin::require_admin));

    // --- Teachers and admins ---
    let staff_routes = Router::new()
        .route("/api/students", get(merit_handlers::list_students))
        .route("/api/merits", post(merit_handlers::award))
        .route("/api/requests/pending", get(merit_handlers::pending_requests))
        .route("/api/requests/mine", get(merit_handlers::my_requests))
        .route("/api/requests/{id}/approve", post(merit_handlers::approve_request))
        .route("/api/requests/{id}/reject", post(merit_handlers::reject_request))
        .route("/api/reasons", get(merit_handlers::list_reasons))
        .route("/api/class/students", get(merit_handlers::class_students))
        .route("/api/class/export.xlsx", get(merit_handlers::export_class_records))
        .route("/api/reset/consent", post(merit_handlers::respond_reset))
        .route_layer(middleware::from_fn(mw_admin::require_staff));

    // --- Any logged-in account ---
    // require_auth wraps everything below, including the nested admin routes.
    let authenticated_routes = Router::new()
        .route("/dashboard", get(user_handlers::dashboard))
        .route("/api/me", get(user_handlers::me))
        .route("/api/me/password", post(user_handlers::change_password))
        .route("/api/students/{id}/records", get(user_handlers::student_records))
        .route("/api/inquiries", get(user_handlers::list_inquiries).post(user_handlers::create_inquiry))
        .merge(staff_routes)
        .nest("/api/admin", admin_routes)
        .route_layer(middleware::from_fn_with_state(app_state.clone(), mw_auth::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        db,
        models::account::Role,
        services::account_service::tests as fixtures,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use tower::ServiceExt;
    use tower_sessions::SessionManagerLayer;
    use tower_sessions_sqlx_store::SqliteStore;

    async fn test_app() -> (Router, SqlitePool) {
        let pool = db::test_pool().await;
        let store = SqliteStore::new(pool.clone()).with_table_name("sessions").unwrap();
        store.migrate().await.unwrap();

        let secret = "k".repeat(64);
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "SESSION_SECRET" => Some(secret.clone()),
            _ => None,
        })
        .unwrap();
        let state = AppState {
            db_pool: pool.clone(),
            config: Arc::new(config),
        };
        let app = create_router(state).layer(SessionManagerLayer::new(store).with_secure(false));
        (app, pool)
    }

    async fn login(app: &Router, username: &str, password: &str) -> Response {
        let request = Request::post("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={username}&password={password}")))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    fn session_cookie(response: &Response) -> String {
        let raw = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .unwrap();
        raw.split(';').next().unwrap().to_string()
    }

    async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::get(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        app.clone().oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn anonymous_requests_are_turned_away() {
        let (app, _pool) = test_app().await;

        let api = get(&app, "/api/me", None).await;
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
        assert!(json_body(api).await["error"].is_string());

        let page = get(&app, "/dashboard", None).await;
        assert_eq!(page.status(), StatusCode::SEE_OTHER);
        assert_eq!(page.headers()[header::LOCATION], "/login");

        assert_eq!(get(&app, "/health", None).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_logs_in_and_reaches_admin_routes() {
        let (app, pool) = test_app().await;
        fixtures::admin(&pool).await;

        let response = login(&app, "admin", "admin-pass").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");
        let cookie = session_cookie(&response);

        let me = json_body(get(&app, "/api/me", Some(&cookie)).await).await;
        assert_eq!(me["role"], "super_admin");
        assert!(me.get("password_hash").is_none());

        let teachers = get(&app, "/api/admin/teachers", Some(&cookie)).await;
        assert_eq!(teachers.status(), StatusCode::OK);

        let dashboard = get(&app, "/dashboard", Some(&cookie)).await;
        assert_eq!(dashboard.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_renders_login_page_with_error() {
        let (app, pool) = test_app().await;
        fixtures::admin(&pool).await;

        let response = login(&app, "admin", "nope").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("아이디 또는 비밀번호"));
    }

    #[tokio::test]
    async fn students_only_see_their_own_records_and_no_staff_routes() {
        let (app, pool) = test_app().await;
        let me = fixtures::student(&pool, "10101", 1, 1, 1).await;
        let other = fixtures::student(&pool, "10102", 1, 1, 2).await;

        let cookie = session_cookie(&login(&app, "10101", "090314").await);

        let own = get(&app, &format!("/api/students/{}/records", me.id), Some(&cookie)).await;
        assert_eq!(own.status(), StatusCode::OK);
        let other = get(&app, &format!("/api/students/{}/records", other.id), Some(&cookie)).await;
        assert_eq!(other.status(), StatusCode::FORBIDDEN);

        assert_eq!(get(&app, "/api/students", Some(&cookie)).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(get(&app, "/api/admin/logs", Some(&cookie)).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn pending_teacher_cannot_log_in_until_approved() {
        let (app, pool) = test_app().await;

        let signup = Request::post("/signup")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"email":"Kim@School.kr","name":"김교사","password":"secret","role":"subject_teacher","subject":"수학"}"#,
            ))
            .unwrap();
        let response = app.clone().oneshot(signup).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["status"], "pending");

        assert_eq!(login(&app, "kim@school.kr", "secret").await.status(), StatusCode::FORBIDDEN);

        let id = created["id"].as_str().unwrap();
        crate::services::account_service::set_status(&pool, id, crate::models::account::AccountStatus::Active)
            .await
            .unwrap();
        let response = login(&app, "kim@school.kr", "secret").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let cookie = session_cookie(&response);
        let me = json_body(get(&app, "/api/me", Some(&cookie)).await).await;
        assert_eq!(me["role"], Role::SubjectTeacher.as_str());
    }
}

pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;
use crate::{
    auth, filtering, jobs, matching, organization, registrations, reports, resumes, settings,
    tenants, users,
};

/// Headroom above the upload limit for multipart framing.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload_max_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::readiness_handler))
        .nest("/api/v1", api_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth_routes())
        .merge(admin_routes())
        .merge(user_routes())
        .merge(organization_routes())
        .merge(job_routes())
        .merge(resume_routes())
        .merge(matching_routes())
        .merge(report_routes())
}

fn auth_routes() -> Router<AppState> {
    use auth::handlers::*;
    use registrations::handlers::handle_register;

    Router::new()
        .route("/auth/login", post(handle_login))
        .route("/auth/refresh", post(handle_refresh))
        .route("/auth/register", post(handle_register))
}

fn admin_routes() -> Router<AppState> {
    use settings::handlers::*;
    use tenants::handlers::*;

    Router::new()
        .route("/tenants/current", get(handle_current_tenant))
        .route(
            "/admin/tenants",
            get(handle_list_tenants).post(handle_create_tenant),
        )
        .route(
            "/admin/tenants/:id",
            get(handle_get_tenant)
                .put(handle_update_tenant)
                .delete(handle_delete_tenant),
        )
        .route("/admin/tenants/:id/activate", post(handle_activate_tenant))
        .route("/admin/tenants/:id/suspend", post(handle_suspend_tenant))
        .route(
            "/admin/tenants/:id/subscription",
            post(handle_change_subscription),
        )
        .route("/admin/tenants/:id/stats", get(handle_tenant_stats))
        .route(
            "/admin/system/config",
            get(handle_get_system_config).put(handle_update_system_config),
        )
        .route("/admin/system/stats", get(handle_system_stats))
        .merge(registration_routes())
}

fn registration_routes() -> Router<AppState> {
    use registrations::handlers::*;

    Router::new()
        .route("/admin/registration-requests", get(handle_list_registrations))
        .route(
            "/admin/registration-requests/:id",
            get(handle_get_registration),
        )
        .route(
            "/admin/registration-requests/:id/review",
            post(handle_review_registration),
        )
}

fn user_routes() -> Router<AppState> {
    use users::handlers::*;

    Router::new()
        .route("/users/me", get(handle_get_me).put(handle_update_me))
        .route("/users/me/password", put(handle_change_password))
        .route(
            "/users/me/llm-config",
            get(handle_get_llm_config)
                .put(handle_put_llm_config)
                .delete(handle_delete_llm_config),
        )
        .route("/users/me/llm-config/test", post(handle_test_llm_config))
        .route(
            "/tenant-users",
            get(handle_list_tenant_users).post(handle_create_tenant_user),
        )
        .route(
            "/tenant-users/:id",
            put(handle_update_tenant_user).delete(handle_delete_tenant_user),
        )
}

fn organization_routes() -> Router<AppState> {
    use organization::handlers::*;

    Router::new()
        .route(
            "/organization/departments",
            get(handle_department_tree).post(handle_create_department),
        )
        .route(
            "/organization/departments/:id",
            get(handle_get_department)
                .put(handle_update_department)
                .delete(handle_delete_department),
        )
        .route(
            "/organization/company-info",
            get(handle_get_company_info).put(handle_put_company_info),
        )
}

fn job_routes() -> Router<AppState> {
    use filtering::handlers::*;
    use jobs::handlers::*;
    use matching::models::*;

    Router::new()
        .route("/jobs/positions", get(handle_list_jobs).post(handle_create_job))
        .route(
            "/jobs/positions/:id",
            get(handle_get_job)
                .put(handle_update_job)
                .delete(handle_delete_job),
        )
        .route("/jobs/positions/:id/publish", post(handle_publish_job))
        .route("/jobs/positions/:id/close", post(handle_close_job))
        .route("/jobs/positions/:id/parse-profile", post(handle_parse_profile))
        .route("/jobs/positions/:id/vectorize", post(handle_vectorize))
        .route(
            "/jobs/filter-rules",
            get(handle_list_rules).post(handle_create_rule),
        )
        .route(
            "/jobs/filter-rules/:id",
            get(handle_get_rule)
                .put(handle_update_rule)
                .delete(handle_delete_rule),
        )
        .route("/jobs/filter/execute", post(handle_execute_filter))
        .route("/jobs/filter/batch-execute", post(handle_batch_execute_filter))
        .route(
            "/jobs/match-models",
            get(handle_list_models).post(handle_create_model),
        )
        .route(
            "/jobs/match-models/:id",
            get(handle_get_model)
                .put(handle_update_model)
                .delete(handle_delete_model),
        )
}

fn resume_routes() -> Router<AppState> {
    use resumes::handlers::*;

    Router::new()
        .route(
            "/resumes",
            get(handle_list_resumes).post(handle_upload_resume),
        )
        .route(
            "/resumes/:id",
            get(handle_get_resume).delete(handle_delete_resume),
        )
        .route("/resumes/:id/reparse", post(handle_reparse_resume))
        .route("/resumes/:id/file", get(handle_download_resume))
}

fn matching_routes() -> Router<AppState> {
    use matching::handlers::*;

    Router::new()
        .route("/matching/match", post(handle_match))
        .route("/matching/batch", post(handle_batch_match))
        .route("/matching/results", get(handle_list_results))
        .route("/matching/results/:id", get(handle_get_result))
        .route("/matching/results/:id/status", put(handle_update_status))
}

fn report_routes() -> Router<AppState> {
    use reports::handlers::*;

    Router::new()
        .route(
            "/reports",
            get(handle_list_reports).post(handle_create_report),
        )
        .route(
            "/reports/:id",
            get(handle_get_report).delete(handle_delete_report),
        )
        .route("/reports/:id/download", get(handle_download_report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = build_router(AppState::for_tests());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "talentry-api");
    }

    #[tokio::test]
    async fn protected_routes_require_a_bearer_token() {
        for path in ["/api/v1/users/me", "/api/v1/resumes", "/api/v1/matching/results"] {
            let app = build_router(AppState::for_tests());
            let response = app
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
            let body = json_body(response).await;
            assert!(body["detail"].is_string());
        }
    }

    #[tokio::test]
    async fn malformed_authorization_header_is_rejected() {
        let app = build_router(AppState::for_tests());
        let response = app
            .oneshot(
                Request::get("/api/v1/reports")
                    .header(header::AUTHORIZATION, "Basic abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_login_body_gets_error_envelope() {
        let app = build_router(AppState::for_tests());
        let response = app
            .oneshot(
                Request::post("/api/v1/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email": 42"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let app = build_router(AppState::for_tests());
        let response = app
            .oneshot(Request::get("/api/v1/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

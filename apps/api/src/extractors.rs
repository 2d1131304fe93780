//! `Json`, `Query` and `Path` with rejections routed through `AppError`, so
//! malformed input gets the same `{"detail","code"}` body as every other error.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::errors::AppError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;
    use serde::Deserialize;
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Debug, Deserialize, Serialize)]
    struct Login {
        email: String,
    }

    #[derive(Debug, Deserialize)]
    struct Paging {
        page: u32,
    }

    async fn echo(Json(body): Json<Login>) -> Json<Login> {
        Json(body)
    }

    async fn paged(Query(q): Query<Paging>) -> String {
        q.page.to_string()
    }

    async fn by_id(Path(id): Path<Uuid>) -> String {
        id.to_string()
    }

    fn app() -> Router {
        Router::new()
            .route("/echo", post(echo))
            .route("/paged", get(paged))
            .route("/items/:id", get(by_id))
    }

    async fn error_body(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn malformed_json_uses_error_envelope() {
        let (status, body) = error_body(
            Request::post("/echo")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"email": 42"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn missing_content_type_uses_error_envelope() {
        let (status, body) =
            error_body(Request::post("/echo").body(Body::from(r#"{"email":"a@b.c"}"#)).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn bad_query_and_path_use_error_envelope() {
        let (status, body) =
            error_body(Request::get("/paged?page=abc").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) =
            error_body(Request::get("/items/not-a-uuid").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn valid_json_round_trips() {
        let response = app()
            .oneshot(
                Request::post("/echo")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email":"a@b.c"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

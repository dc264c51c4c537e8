pub mod process;

use crate::{
    config::RouteConfig,
    task::{ProgressSnapshot, TaskStatus},
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

// Create our own JSON extractor by wrapping `axum::Json`. This makes it easy to override the
// rejection and provide our own which formats errors to match our application.
//
// `axum::Json` responds with plain text if the input is invalid.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl<T> IntoResponse for AppJson<T>
where
    axum::Json<T>: IntoResponse,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

// Same for query strings, so a missing `id_process` answers with our error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// Error body shared by every endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub enum AppError {
    JsonRejection(JsonRejection),
    QueryRejection(QueryRejection),
    MultipartRejection(MultipartRejection),
    MultipartError(MultipartError),
    BadRequest(anyhow::Error),
    NotFoundError(anyhow::Error),
    InternalServerError(anyhow::Error),
}

// Tell axum how `AppError` should be converted into a response.
//
// This is also a convenient place to log errors.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::JsonRejection(rejection) => {
                // This error is caused by bad user input so don't log it
                (rejection.status(), rejection.body_text())
            }
            AppError::QueryRejection(rejection) => (rejection.status(), rejection.body_text()),
            AppError::MultipartRejection(rejection) => (rejection.status(), rejection.body_text()),
            AppError::MultipartError(error) => (
                error.status(),
                format!("invalid multipart body: {}", error.body_text()),
            ),
            AppError::BadRequest(error) => (StatusCode::BAD_REQUEST, error.to_string()),
            AppError::NotFoundError(error) => {
                (StatusCode::NOT_FOUND, format!("Not found: {}", error))
            }
            AppError::InternalServerError(error) => {
                tracing::error!("Internal Server Error: {:#}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, AppJson(ErrorResponse { error })).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::JsonRejection(rejection)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::QueryRejection(rejection)
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::MultipartRejection(rejection)
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        Self::MultipartError(error)
    }
}

pub async fn health_check() -> &'static str {
    "ok"
}

#[derive(OpenApi)]
#[openapi(
    paths(process::submit, process::progress, process::download),
    components(schemas(
        process::SubmitForm,
        process::SubmitResponse,
        ProgressSnapshot,
        TaskStatus,
        ErrorResponse
    )),
    tags((name = "Task", description = "Spreadsheet processing tasks"))
)]
pub struct ApiDoc;

/// OpenAPI document with the documented default paths moved to the configured ones.
pub fn openapi(routes: &RouteConfig) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    for (documented, configured) in [
        ("/process_excel", &routes.process),
        ("/progress", &routes.progress),
        ("/download", &routes.download),
    ] {
        if let Some(item) = doc.paths.paths.remove(documented) {
            doc.paths.paths.insert(format!("/{}", configured), item);
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_follows_configured_routes() {
        let routes = RouteConfig {
            process: "rt/upload".into(),
            ..RouteConfig::default()
        };

        let doc = openapi(&routes);
        assert!(doc.paths.paths.contains_key("/rt/upload"));
        assert!(doc.paths.paths.contains_key("/progress"));
        assert!(!doc.paths.paths.contains_key("/process_excel"));
    }
}

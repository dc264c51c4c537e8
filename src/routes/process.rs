use super::{AppError, AppJson, AppQuery};
use crate::{
    state::AppState,
    task::{worker::spawn_worker, ProgressSnapshot},
};
use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use utoipa::{IntoParams, ToSchema};

const OPENAPI_TAG: &str = "Task";

/// Multipart body of a submission.
#[derive(Debug, ToSchema)]
pub struct SubmitForm {
    /// Spreadsheet to process (xlsx, xls, xlsb or ods).
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    /// Value handed to the transform. `parameter` is accepted as an alias.
    numero: String,
}

impl SubmitForm {
    /// Collect the fields, rejecting an empty file or a blank `numero`.
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut file: Option<Vec<u8>> = None;
        let mut numero: Option<String> = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => file = Some(field.bytes().await?.to_vec()),
                "numero" | "parameter" => numero = Some(field.text().await?),
                other => tracing::debug!("ignoring multipart field `{}`", other),
            }
        }

        let file = file.filter(|f| !f.is_empty()).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("missing or empty `file` field"))
        })?;
        let numero = numero
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("missing `numero` field")))?;

        Ok(Self { file, numero })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    pub message: String,
    pub id_process: String,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskQuery {
    id_process: String,
}

/// Submit spreadsheet
///
/// Store the upload and start processing it in the background.
/// Returns immediately with the id used to poll and download.
#[utoipa::path(
    post,
    path = "/process_excel",
    request_body(content = SubmitForm, content_type = "multipart/form-data"),
    responses((
        status = OK,
        body = SubmitResponse
    ), (
        status = BAD_REQUEST,
        description = "Missing or invalid field.",
        body = ErrorResponse
    )),
    tag = OPENAPI_TAG
)]
pub async fn submit(
    State(app_state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<AppJson<SubmitResponse>, AppError> {
    let SubmitForm { file, numero: parameter } = SubmitForm::from_multipart(multipart?).await?;

    let transform = app_state.transform();
    if transform.requires_numeric() && parameter.parse::<f64>().is_err() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "`numero` must be a number, got `{}`",
            parameter
        )));
    }

    let task_id = uuid::Uuid::new_v4().to_string();
    let task = app_state.task_registry().create(&task_id).await;
    task.write().await.accept_upload(file, &parameter);

    tracing::info!("task {} submitted with parameter `{}`", task_id, parameter);

    spawn_worker(task, transform, app_state.output_target().clone());

    Ok(AppJson(SubmitResponse {
        message: "processing started".to_string(),
        id_process: task_id,
    }))
}

/// Poll progress
///
/// Get the progress snapshot of a submitted task.
#[utoipa::path(
    get,
    path = "/progress",
    params(TaskQuery),
    responses((
        status = OK,
        body = ProgressSnapshot
    ), (
        status = NOT_FOUND,
        description = "Task not found.",
        body = ErrorResponse
    )),
    tag = OPENAPI_TAG
)]
pub async fn progress(
    State(app_state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<TaskQuery>,
) -> Result<AppJson<ProgressSnapshot>, AppError> {
    let task = app_state
        .task_registry()
        .get(&query.id_process)
        .await
        .ok_or_else(|| AppError::NotFoundError(anyhow::anyhow!("task not found")))?;

    let snapshot = task.read().await.snapshot();
    Ok(AppJson(snapshot))
}

/// Download result
///
/// Get the produced spreadsheet of a completed task.
/// Unfinished and failed tasks have no result.
#[utoipa::path(
    get,
    path = "/download",
    params(TaskQuery),
    responses((
        status = OK,
        description = "Processed spreadsheet.",
    ), (
        status = NOT_FOUND,
        description = "Task or file not found.",
        body = ErrorResponse
    )),
    tag = OPENAPI_TAG
)]
pub async fn download(
    State(app_state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<TaskQuery>,
) -> Result<Response, AppError> {
    let task = app_state
        .task_registry()
        .get(&query.id_process)
        .await
        .ok_or_else(|| AppError::NotFoundError(anyhow::anyhow!("task not found")))?;

    let (output_path, media_type) = {
        let state = task.read().await;
        let output_path = state
            .output_path()
            .cloned()
            .ok_or_else(|| AppError::NotFoundError(anyhow::anyhow!("file not available")))?;
        (output_path, state.media_type().to_string())
    };

    let file = match tokio::fs::File::open(&output_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFoundError(anyhow::anyhow!("file not found")));
        }
        Err(e) => return Err(AppError::InternalServerError(e.into())),
    };
    let length = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .len();

    let file_name = output_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result.xlsx".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, media_type),
            (header::CONTENT_LENGTH, length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

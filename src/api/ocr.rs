use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::{ListQuery, PaginatedResponse};
use crate::api::validation;
use crate::core::state::AppState;
use crate::db::models::OcrJob;
use crate::repositories::{grading_results, ocr_jobs, test_defs};
use crate::schemas::ocr::{GradingResultResponse, OcrJobResponse, UploadResponse};
use crate::services::ocr_pipeline::{self, UploadParams};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/", get(list_jobs))
        .route("/:job_id", get(get_job))
        .route("/tests/:test_id/results", get(test_results))
        .merge(crate::api::exports::router())
}

struct UploadedImage {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

async fn upload(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let Some(storage) = state.storage() else {
        return Err(ApiError::ServiceUnavailable("File storage is not configured".to_string()));
    };

    let max_bytes = state.settings().storage().max_upload_size_mb as usize * 1024 * 1024;
    let mut image: Option<UploadedImage> = None;
    let mut test_id: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart payload: {e}")))?
    {
        match field.name() {
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("Image must have a filename".to_string()))?;
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();

                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?
                {
                    if bytes.len() + chunk.len() > max_bytes {
                        return Err(ApiError::BadRequest(format!(
                            "File exceeds the {} MB upload limit",
                            state.settings().storage().max_upload_size_mb
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }

                image = Some(UploadedImage { file_name, content_type, bytes });
            }
            Some("test_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid test_id field: {e}")))?;
                let value = value.trim().to_string();
                if !value.is_empty() {
                    test_id = Some(value);
                }
            }
            _ => {}
        }
    }

    let Some(image) = image else {
        return Err(ApiError::BadRequest("An 'image' file field is required".to_string()));
    };
    if image.bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    validation::validate_image_upload(
        &image.file_name,
        &image.content_type,
        &state.settings().storage().allowed_image_extensions,
    )?;

    if let Some(test_id) = test_id.as_deref() {
        let test = test_defs::find_by_id(state.db(), test_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load test"))?;
        if test.is_none() {
            return Err(ApiError::NotFound("Test not found".to_string()));
        }
    }

    let outcome = ocr_pipeline::process_upload(
        &state,
        storage,
        UploadParams {
            user_id: &user.id,
            test_id: test_id.as_deref(),
            file_name: &image.file_name,
            content_type: &image.content_type,
            bytes: image.bytes,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to process upload"))?;

    let response = UploadResponse {
        message: "Upload processed".to_string(),
        job: OcrJobResponse::from_job(outcome.job, None),
        result: outcome.result.map(GradingResultResponse::from),
        grading_error: outcome.grading_error,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_jobs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaginatedResponse<OcrJobResponse>>, ApiError> {
    let (skip, limit) = query.window();

    let jobs = ocr_jobs::list_by_user(state.db(), &user.id, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list jobs"))?;
    let total_count = ocr_jobs::count_by_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count jobs"))?;

    let items = jobs.into_iter().map(|job| OcrJobResponse::from_job(job, None)).collect();

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}

async fn get_job(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(job_id): Path<String>,
) -> Result<Json<OcrJobResponse>, ApiError> {
    let job = ocr_jobs::find_by_id_for_user(state.db(), &job_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load job"))?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;

    let image_url = presign_image(&state, &job).await;

    Ok(Json(OcrJobResponse::from_job(job, image_url)))
}

async fn test_results(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(test_id): Path<String>,
) -> Result<Json<Vec<GradingResultResponse>>, ApiError> {
    let test = test_defs::find_by_id_for_author(state.db(), &test_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load test"))?;
    if test.is_none() {
        return Err(ApiError::NotFound("Test not found".to_string()));
    }

    let results = grading_results::list_by_test(state.db(), &test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list grading results"))?;

    Ok(Json(results.into_iter().map(GradingResultResponse::from).collect()))
}

/// Best effort: a presigning failure downgrades to a missing URL instead of
/// failing the whole request.
async fn presign_image(state: &AppState, job: &OcrJob) -> Option<String> {
    let storage = state.storage()?;
    let expires_in =
        Duration::from_secs(state.settings().storage().presigned_url_expire_minutes * 60);

    match storage.presign_get(&job.image_key, expires_in).await {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::warn!(job_id = %job.id, error = %err, "Failed to presign image URL");
            None
        }
    }
}

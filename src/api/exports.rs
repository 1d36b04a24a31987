use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::{ListQuery, PaginatedResponse};
use crate::core::state::AppState;
use crate::repositories::{exports, grading_results, test_defs};
use crate::schemas::export::ExportResponse;
use crate::services::export::{self, XLSX_CONTENT_TYPE};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/tests/:test_id/export", post(create_export))
        .route("/exports", get(list_exports))
        .route("/exports/:export_id/download", get(download_export))
}

async fn create_export(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(test_id): Path<String>,
) -> Result<(StatusCode, Json<ExportResponse>), ApiError> {
    let Some(storage) = state.storage() else {
        return Err(ApiError::ServiceUnavailable("File storage is not configured".to_string()));
    };

    let test = test_defs::find_by_id_for_author(state.db(), &test_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load test"))?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;

    let results = grading_results::list_by_test(state.db(), &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load grading results"))?;
    if results.is_empty() {
        return Err(ApiError::BadRequest("Test has no grading results to export".to_string()));
    }

    let export = export::export_test_results(state.db(), storage, &user.id, &test, &results)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to export results"))?;

    Ok((StatusCode::CREATED, Json(ExportResponse::from(export))))
}

async fn list_exports(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaginatedResponse<ExportResponse>>, ApiError> {
    let (skip, limit) = query.window();

    let items = exports::list_by_user(state.db(), &user.id, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exports"))?;
    let total_count = exports::count_by_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exports"))?;

    Ok(Json(PaginatedResponse {
        items: items.into_iter().map(ExportResponse::from).collect(),
        total_count,
        skip,
        limit,
    }))
}

async fn download_export(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(export_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(storage) = state.storage() else {
        return Err(ApiError::ServiceUnavailable("File storage is not configured".to_string()));
    };

    let export = exports::find_by_id_for_user(state.db(), &export_id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load export"))?
        .ok_or_else(|| ApiError::NotFound("Export not found".to_string()))?;

    let bytes = storage
        .download_bytes(&export.file_key)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to download export file"))?;

    let filename =
        export.file_key.rsplit('/').next().unwrap_or("results.xlsx").to_string();
    let disposition = format!("attachment; filename=\"{filename}\"");

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

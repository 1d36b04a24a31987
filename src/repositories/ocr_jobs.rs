use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::OcrJob;

const COLUMNS: &str = "\
    id, user_id, test_id, image_key, processed_text, confidence_score, status, error_message, \
    processing_time_seconds, created_at, completed_at";

pub(crate) async fn find_by_id_for_user(
    pool: &PgPool,
    id: &str,
    user_id: &str,
) -> Result<Option<OcrJob>, sqlx::Error> {
    sqlx::query_as::<_, OcrJob>(&format!(
        "SELECT {COLUMNS} FROM ocr_jobs WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_user(
    pool: &PgPool,
    user_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<OcrJob>, sqlx::Error> {
    sqlx::query_as::<_, OcrJob>(&format!(
        "SELECT {COLUMNS} FROM ocr_jobs
         WHERE user_id = $1
         ORDER BY created_at DESC
         OFFSET $2 LIMIT $3"
    ))
    .bind(user_id)
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_user(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ocr_jobs WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub(crate) struct CreateOcrJob<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub test_id: Option<&'a str>,
    pub image_key: &'a str,
    pub created_at: PrimitiveDateTime,
}

pub(crate) async fn create(pool: &PgPool, params: CreateOcrJob<'_>) -> Result<OcrJob, sqlx::Error> {
    sqlx::query_as::<_, OcrJob>(&format!(
        "INSERT INTO ocr_jobs (id, user_id, test_id, image_key, status, created_at)
         VALUES ($1,$2,$3,$4,'pending',$5)
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.test_id)
    .bind(params.image_key)
    .bind(params.created_at)
    .fetch_one(pool)
    .await
}

/// Guarded transition `pending -> processing`. Returns false when the job was
/// not in `pending`, so a terminal job can never regress.
pub(crate) async fn mark_processing(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE ocr_jobs SET status = 'processing' WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn mark_completed(
    pool: &PgPool,
    id: &str,
    processed_text: &str,
    confidence_score: f64,
    processing_time_seconds: f64,
    completed_at: PrimitiveDateTime,
) -> Result<Option<OcrJob>, sqlx::Error> {
    sqlx::query_as::<_, OcrJob>(&format!(
        "UPDATE ocr_jobs
         SET status = 'completed',
             processed_text = $2,
             confidence_score = $3,
             processing_time_seconds = $4,
             completed_at = $5
         WHERE id = $1 AND status = 'processing'
         RETURNING {COLUMNS}",
    ))
    .bind(id)
    .bind(processed_text)
    .bind(confidence_score)
    .bind(processing_time_seconds)
    .bind(completed_at)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn mark_failed(
    pool: &PgPool,
    id: &str,
    error_message: &str,
    processing_time_seconds: f64,
) -> Result<Option<OcrJob>, sqlx::Error> {
    sqlx::query_as::<_, OcrJob>(&format!(
        "UPDATE ocr_jobs
         SET status = 'failed',
             error_message = $2,
             processing_time_seconds = $3
         WHERE id = $1 AND status IN ('pending', 'processing')
         RETURNING {COLUMNS}",
    ))
    .bind(id)
    .bind(error_message)
    .bind(processing_time_seconds)
    .fetch_optional(pool)
    .await
}

use std::time::Instant;

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use sqlx::PgPool;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{GradingResult, OcrJob};
use crate::repositories::ocr_jobs;
use crate::services::grading;
use crate::services::storage::StorageService;
use uuid::Uuid;

const NO_TEXT_MESSAGE: &str = "No usable text could be recognized from the image";
const STORE_FAILED_MESSAGE: &str = "Failed to store uploaded image";

pub(crate) struct UploadParams<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) test_id: Option<&'a str>,
    pub(crate) file_name: &'a str,
    pub(crate) content_type: &'a str,
    pub(crate) bytes: Vec<u8>,
}

pub(crate) struct ProcessOutcome {
    pub(crate) job: OcrJob,
    pub(crate) result: Option<GradingResult>,
    pub(crate) grading_error: Option<String>,
}

/// Runs one upload through the pipeline synchronously: store the image, run
/// recognition, record the terminal job status, then grade when the job is
/// tied to a test. Processing failures land in the job row, not in `Err`;
/// `Err` is reserved for database faults.
pub(crate) async fn process_upload(
    state: &AppState,
    storage: &StorageService,
    params: UploadParams<'_>,
) -> Result<ProcessOutcome> {
    let db = state.db();
    let job_id = Uuid::new_v4().to_string();
    let image_key = format!(
        "ocr_images/{}/{}_{}",
        params.user_id,
        job_id,
        sanitize_filename(params.file_name)
    );

    let job = ocr_jobs::create(
        db,
        ocr_jobs::CreateOcrJob {
            id: &job_id,
            user_id: params.user_id,
            test_id: params.test_id,
            image_key: &image_key,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .context("Failed to create recognition job")?;

    if !ocr_jobs::mark_processing(db, &job.id).await.context("Failed to start job")? {
        anyhow::bail!("job {} was not pending", job.id);
    }

    let started = Instant::now();

    if let Err(err) = storage
        .upload_bytes(&image_key, params.content_type, params.bytes.clone())
        .await
    {
        tracing::error!(job_id = %job.id, error = %err, "Image upload to storage failed");
        let job = fail_job(db, &job.id, STORE_FAILED_MESSAGE, started.elapsed().as_secs_f64())
            .await?;
        return Ok(ProcessOutcome { job, result: None, grading_error: None });
    }

    let (text, confidence) = state.recognition().extract(&params.bytes).await;
    let elapsed = started.elapsed().as_secs_f64();
    histogram!("ocr_processing_seconds").record(elapsed);

    let job = match text {
        Some(text) => {
            counter!("ocr_jobs_total", "status" => "completed").increment(1);
            ocr_jobs::mark_completed(
                db,
                &job.id,
                &text,
                confidence,
                elapsed,
                primitive_now_utc(),
            )
            .await
            .context("Failed to complete job")?
            .context("Job left the processing state unexpectedly")?
        }
        None => {
            let job = fail_job(db, &job.id, NO_TEXT_MESSAGE, elapsed).await?;
            return Ok(ProcessOutcome { job, result: None, grading_error: None });
        }
    };

    let (result, grading_error) = match params.test_id {
        Some(test_id) => match grading::grade_and_store(db, &job, test_id).await {
            Ok(result) => (Some(result), None),
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "Grading failed");
                (None, Some(format!("Grading failed: {err}")))
            }
        },
        None => (None, None),
    };

    Ok(ProcessOutcome { job, result, grading_error })
}

async fn fail_job(
    db: &PgPool,
    job_id: &str,
    message: &str,
    elapsed: f64,
) -> Result<OcrJob> {
    counter!("ocr_jobs_total", "status" => "failed").increment(1);
    ocr_jobs::mark_failed(db, job_id, message, elapsed)
        .await
        .context("Failed to record job failure")?
        .context("Job reached a terminal state twice")
}

/// Object-store keys keep only a conservative character set from the original
/// file name.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::sanitize_filename;

    #[test]
    fn filenames_are_reduced_to_safe_characters() {
        assert_eq!(sanitize_filename("sheet 1 (copy).png"), "sheet_1__copy_.png");
        assert_eq!(sanitize_filename("javob varaqasi.jpg"), "javob_varaqasi.jpg");
        assert_eq!(sanitize_filename("ok-name_2.jpeg"), "ok-name_2.jpeg");
    }

    #[test]
    fn empty_filename_gets_a_placeholder() {
        assert_eq!(sanitize_filename(""), "upload");
    }
}

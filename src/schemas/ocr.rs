use serde::Serialize;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{GradingResult, OcrJob};
use crate::db::types::OcrJobStatus;

#[derive(Debug, Serialize)]
pub(crate) struct OcrJobResponse {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) test_id: Option<String>,
    pub(crate) image_key: String,
    pub(crate) image_url: Option<String>,
    pub(crate) processed_text: Option<String>,
    pub(crate) confidence_score: f64,
    pub(crate) status: OcrJobStatus,
    pub(crate) error_message: Option<String>,
    pub(crate) processing_time_seconds: f64,
    pub(crate) created_at: String,
    pub(crate) completed_at: Option<String>,
}

impl OcrJobResponse {
    pub(crate) fn from_job(job: OcrJob, image_url: Option<String>) -> Self {
        Self {
            id: job.id,
            user_id: job.user_id,
            test_id: job.test_id,
            image_key: job.image_key,
            image_url,
            processed_text: job.processed_text,
            confidence_score: job.confidence_score,
            status: job.status,
            error_message: job.error_message,
            processing_time_seconds: job.processing_time_seconds,
            created_at: format_primitive(job.created_at),
            completed_at: job.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GradingResultResponse {
    pub(crate) id: String,
    pub(crate) ocr_job_id: String,
    pub(crate) test_id: String,
    pub(crate) student_name: String,
    pub(crate) student_class: Option<String>,
    pub(crate) total_questions: i32,
    pub(crate) correct_answers: i32,
    pub(crate) wrong_answers: i32,
    pub(crate) score: i32,
    pub(crate) percentage: f64,
    pub(crate) grade: String,
    pub(crate) processed_at: String,
}

impl From<GradingResult> for GradingResultResponse {
    fn from(result: GradingResult) -> Self {
        Self {
            id: result.id,
            ocr_job_id: result.ocr_job_id,
            test_id: result.test_id,
            student_name: result.student_name,
            student_class: result.student_class,
            total_questions: result.total_questions,
            correct_answers: result.correct_answers,
            wrong_answers: result.wrong_answers,
            score: result.score,
            percentage: result.percentage,
            grade: result.grade,
            processed_at: format_primitive(result.processed_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    pub(crate) message: String,
    pub(crate) job: OcrJobResponse,
    pub(crate) result: Option<GradingResultResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) grading_error: Option<String>,
}

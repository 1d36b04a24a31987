use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{OcrJobStatus, TestDifficulty};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) is_admin: bool,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TestDefinition {
    pub(crate) id: String,
    pub(crate) author_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject: String,
    pub(crate) grade_level: String,
    pub(crate) difficulty: TestDifficulty,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) question_text: String,
    pub(crate) points: i32,
    pub(crate) order_index: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Answer {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) answer_text: String,
    pub(crate) is_correct: bool,
    pub(crate) order_index: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

/// One submitted answer-sheet image and its processing outcome. The row is
/// created as `pending` and mutated once, synchronously, to a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct OcrJob {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) test_id: Option<String>,
    pub(crate) image_key: String,
    pub(crate) processed_text: Option<String>,
    pub(crate) confidence_score: f64,
    pub(crate) status: OcrJobStatus,
    pub(crate) error_message: Option<String>,
    pub(crate) processing_time_seconds: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GradingResult {
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
    pub(crate) processed_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ResultExport {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) test_id: String,
    pub(crate) file_key: String,
    pub(crate) total_students: i32,
    pub(crate) created_at: PrimitiveDateTime,
}
